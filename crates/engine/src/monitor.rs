//! Independent emergency monitoring.
//!
//! Runs on the shortest configured cadence, reading only the market data
//! feed and a position snapshot. Abnormal-market triggers go straight to
//! the position actor's emergency channel, bypassing the aggregator and the
//! risk gate. The same fast loop performs the protective-stop check so a
//! stop-loss crossing closes the position without waiting for the next
//! decision cycle.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use quorum_trade_core::{EmergencyConfig, MarketDataFeed, Position, PositionState, RiskLevel};

use crate::commands::{CloseReason, EmergencyReason};

/// Shared flag the decision cycle consults: while the feed is degraded the
/// engine holds instead of opening new exposure.
#[derive(Clone, Default)]
pub struct FeedHealth(Arc<AtomicBool>);

impl FeedHealth {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_degraded(&self, degraded: bool) {
        self.0.store(degraded, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Outcome of one monitor tick.
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorVerdict {
    /// Nothing abnormal.
    Quiet,
    /// A protective level was crossed; close through the normal path.
    ProtectiveClose { reason: CloseReason, price: Decimal },
    /// Abnormal market; force an emergency close.
    Emergency(EmergencyReason),
}

/// Evaluates abnormal-market conditions against the live feed.
pub struct EmergencyMonitor {
    feed: Arc<dyn MarketDataFeed>,
    config: EmergencyConfig,
    pair: String,
    leverage: u8,
    health: FeedHealth,
    price_history: VecDeque<(DateTime<Utc>, Decimal)>,
    consecutive_gaps: u32,
}

impl EmergencyMonitor {
    #[must_use]
    pub fn new(
        feed: Arc<dyn MarketDataFeed>,
        config: EmergencyConfig,
        pair: impl Into<String>,
        leverage: u8,
        health: FeedHealth,
    ) -> Self {
        Self {
            feed,
            config,
            pair: pair.into(),
            leverage,
            health,
            price_history: VecDeque::new(),
            consecutive_gaps: 0,
        }
    }

    /// One evaluation pass. Checks, in order: feed anomalies, abrupt price
    /// move, unrealized drawdown, volatility spike, then protective stops.
    /// Emergencies outrank protective closes.
    pub async fn tick(&mut self, position: &Position) -> MonitorVerdict {
        let now = Utc::now();
        let exposed = !position.is_flat();

        let price = match self.feed.current_price(&self.pair).await {
            Ok(price) if price > Decimal::ZERO => price,
            Ok(price) => {
                // A non-positive tick is as anomalous as a missing one.
                tracing::warn!("contradictory price tick {price} for {}", self.pair);
                return self.feed_gap(exposed);
            }
            Err(err) => {
                tracing::warn!("price unavailable for {}: {err}", self.pair);
                return self.feed_gap(exposed);
            }
        };

        self.consecutive_gaps = 0;
        self.health.set_degraded(false);
        self.record_price(now, price);

        if !exposed {
            return MonitorVerdict::Quiet;
        }

        if let Some(change_pct) = self.abrupt_move(price) {
            return MonitorVerdict::Emergency(EmergencyReason::AbruptPriceMove { change_pct });
        }

        if let Some(loss_fraction) = self.drawdown(position, price) {
            return MonitorVerdict::Emergency(EmergencyReason::DrawdownExceeded { loss_fraction });
        }

        if let Some(volatility) = self.volatility_spike().await {
            return MonitorVerdict::Emergency(EmergencyReason::VolatilitySpike { volatility });
        }

        let risk = position.risk_level(price, self.leverage);
        if matches!(risk, RiskLevel::High | RiskLevel::Extreme) {
            tracing::warn!("position risk level {risk:?} at mark {price}");
        }

        if position.state == PositionState::Open {
            if position.stop_hit(price) {
                tracing::info!("stop-loss crossed at {price}");
                return MonitorVerdict::ProtectiveClose {
                    reason: CloseReason::StopLoss,
                    price,
                };
            }
            if position.take_profit_hit(price) {
                tracing::info!("take-profit crossed at {price}");
                return MonitorVerdict::ProtectiveClose {
                    reason: CloseReason::TakeProfit,
                    price,
                };
            }
        }

        MonitorVerdict::Quiet
    }

    /// Bookkeeping for a missing or contradictory tick. The feed fails
    /// safe: degraded health blocks new exposure, and persistent gaps with
    /// an open position assume risk and trigger an emergency close.
    fn feed_gap(&mut self, exposed: bool) -> MonitorVerdict {
        self.consecutive_gaps += 1;
        self.health.set_degraded(true);
        if exposed && self.consecutive_gaps >= self.config.max_feed_gaps {
            MonitorVerdict::Emergency(EmergencyReason::FeedAnomaly {
                consecutive_gaps: self.consecutive_gaps,
            })
        } else {
            MonitorVerdict::Quiet
        }
    }

    fn record_price(&mut self, now: DateTime<Utc>, price: Decimal) {
        self.price_history.push_back((now, price));
        let cutoff = now - chrono::Duration::seconds(self.config.price_window_secs as i64);
        while let Some((ts, _)) = self.price_history.front() {
            if *ts < cutoff {
                self.price_history.pop_front();
            } else {
                break;
            }
        }
    }

    /// Change (percent) against the oldest price inside the window, when it
    /// breaches the configured threshold.
    fn abrupt_move(&self, current: Decimal) -> Option<f64> {
        let (_, oldest) = self.price_history.front()?;
        if oldest.is_zero() {
            return None;
        }
        let change_pct = decimal_to_f64((current - oldest) / *oldest) * 100.0;
        (change_pct.abs() >= self.config.price_move_pct).then_some(change_pct)
    }

    /// Unrealized loss as a fraction of notional, when it breaches the
    /// configured threshold.
    fn drawdown(&self, position: &Position, price: Decimal) -> Option<f64> {
        let notional = position.notional();
        if notional.is_zero() {
            return None;
        }
        let pnl = position.unrealized_pnl(price);
        if pnl >= Decimal::ZERO {
            return None;
        }
        let loss_fraction = decimal_to_f64(-pnl / notional);
        (loss_fraction >= self.config.max_drawdown).then_some(loss_fraction)
    }

    /// Volatility check degrades silently: the price path above already
    /// covers feed health.
    async fn volatility_spike(&self) -> Option<f64> {
        let window = Duration::from_secs(self.config.price_window_secs);
        match self.feed.recent_volatility(&self.pair, window).await {
            Ok(volatility) if volatility >= self.config.volatility_threshold => Some(volatility),
            Ok(_) => None,
            Err(err) => {
                tracing::debug!("volatility unavailable for {}: {err}", self.pair);
                None
            }
        }
    }
}

fn decimal_to_f64(value: Decimal) -> f64 {
    value.to_string().parse::<f64>().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use quorum_trade_core::{EngineError, Result, Side};
    use rust_decimal_macros::dec;
    use std::sync::Mutex;

    struct ScriptedFeed {
        prices: Mutex<VecDeque<Result<Decimal>>>,
        volatility: Mutex<f64>,
    }

    impl ScriptedFeed {
        fn new(prices: Vec<Result<Decimal>>) -> Arc<Self> {
            Arc::new(Self {
                prices: Mutex::new(prices.into()),
                volatility: Mutex::new(1.0),
            })
        }

        fn set_volatility(&self, value: f64) {
            *self.volatility.lock().unwrap() = value;
        }
    }

    #[async_trait]
    impl MarketDataFeed for ScriptedFeed {
        async fn current_price(&self, _pair: &str) -> Result<Decimal> {
            self.prices
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(EngineError::feed_unavailable("script exhausted")))
        }

        async fn recent_volatility(&self, _pair: &str, _window: Duration) -> Result<f64> {
            Ok(*self.volatility.lock().unwrap())
        }
    }

    fn open_long() -> Position {
        let mut p = Position::flat("BTCUSDT");
        p.begin_open(Side::Long, dec!(0.02), dec!(50000), dec!(49000), dec!(52000))
            .unwrap();
        p.confirm_open(dec!(50000), Utc::now()).unwrap();
        p
    }

    fn monitor(feed: Arc<ScriptedFeed>) -> EmergencyMonitor {
        EmergencyMonitor::new(
            feed,
            EmergencyConfig::default(),
            "BTCUSDT",
            5,
            FeedHealth::new(),
        )
    }

    #[tokio::test]
    async fn quiet_market_is_quiet() {
        let feed = ScriptedFeed::new(vec![Ok(dec!(50000)), Ok(dec!(50050))]);
        let mut monitor = monitor(feed);
        let position = open_long();
        assert_eq!(monitor.tick(&position).await, MonitorVerdict::Quiet);
        assert_eq!(monitor.tick(&position).await, MonitorVerdict::Quiet);
    }

    #[tokio::test]
    async fn ten_percent_drop_fires_emergency_despite_open_position() {
        let feed = ScriptedFeed::new(vec![Ok(dec!(50000)), Ok(dec!(45000))]);
        let mut monitor = monitor(feed);
        let position = open_long();
        assert_eq!(monitor.tick(&position).await, MonitorVerdict::Quiet);
        match monitor.tick(&position).await {
            MonitorVerdict::Emergency(EmergencyReason::AbruptPriceMove { change_pct }) => {
                assert!((change_pct + 10.0).abs() < 0.01);
            }
            other => panic!("expected abrupt-move emergency, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn abrupt_move_ignored_when_flat() {
        let feed = ScriptedFeed::new(vec![Ok(dec!(50000)), Ok(dec!(45000))]);
        let mut monitor = monitor(feed);
        let position = Position::flat("BTCUSDT");
        assert_eq!(monitor.tick(&position).await, MonitorVerdict::Quiet);
        assert_eq!(monitor.tick(&position).await, MonitorVerdict::Quiet);
    }

    #[tokio::test]
    async fn drawdown_beyond_threshold_fires_emergency() {
        // Entry 50000, stop far away so the stop check doesn't mask the
        // drawdown; -20% unrealized at 40000.
        let mut position = open_long();
        position.stop_loss = Some(dec!(30000));
        // Keep the window from seeing an abrupt move: only one tick.
        let feed = ScriptedFeed::new(vec![Ok(dec!(40000))]);
        let mut monitor = monitor(feed);
        match monitor.tick(&position).await {
            MonitorVerdict::Emergency(EmergencyReason::DrawdownExceeded { loss_fraction }) => {
                assert!((loss_fraction - 0.2).abs() < 1e-9);
            }
            other => panic!("expected drawdown emergency, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn volatility_spike_fires_emergency() {
        let feed = ScriptedFeed::new(vec![Ok(dec!(50000))]);
        feed.set_volatility(8.0);
        let mut monitor = monitor(feed);
        let position = open_long();
        match monitor.tick(&position).await {
            MonitorVerdict::Emergency(EmergencyReason::VolatilitySpike { volatility }) => {
                assert!((volatility - 8.0).abs() < f64::EPSILON);
            }
            other => panic!("expected volatility emergency, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn stop_crossing_closes_without_decision_cycle() {
        let feed = ScriptedFeed::new(vec![Ok(dec!(48900))]);
        let mut monitor = monitor(feed);
        let position = open_long();
        assert_eq!(
            monitor.tick(&position).await,
            MonitorVerdict::ProtectiveClose {
                reason: CloseReason::StopLoss,
                price: dec!(48900)
            }
        );
    }

    #[tokio::test]
    async fn take_profit_crossing_closes() {
        let feed = ScriptedFeed::new(vec![Ok(dec!(52100))]);
        let mut monitor = monitor(feed);
        let position = open_long();
        assert_eq!(
            monitor.tick(&position).await,
            MonitorVerdict::ProtectiveClose {
                reason: CloseReason::TakeProfit,
                price: dec!(52100)
            }
        );
    }

    #[tokio::test]
    async fn feed_gaps_mark_health_degraded_then_fire_with_exposure() {
        let feed = ScriptedFeed::new(vec![
            Err(EngineError::feed_unavailable("gap")),
            Err(EngineError::feed_unavailable("gap")),
            Err(EngineError::feed_unavailable("gap")),
        ]);
        let health = FeedHealth::new();
        let mut monitor = EmergencyMonitor::new(
            feed,
            EmergencyConfig::default(),
            "BTCUSDT",
            5,
            health.clone(),
        );
        let position = open_long();

        assert_eq!(monitor.tick(&position).await, MonitorVerdict::Quiet);
        assert!(health.is_degraded());
        assert_eq!(monitor.tick(&position).await, MonitorVerdict::Quiet);
        match monitor.tick(&position).await {
            MonitorVerdict::Emergency(EmergencyReason::FeedAnomaly { consecutive_gaps }) => {
                assert_eq!(consecutive_gaps, 3);
            }
            other => panic!("expected feed-anomaly emergency, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn feed_gaps_without_exposure_never_fire() {
        let feed = ScriptedFeed::new(vec![
            Err(EngineError::feed_unavailable("gap")),
            Err(EngineError::feed_unavailable("gap")),
            Err(EngineError::feed_unavailable("gap")),
            Err(EngineError::feed_unavailable("gap")),
        ]);
        let health = FeedHealth::new();
        let mut monitor = EmergencyMonitor::new(
            feed,
            EmergencyConfig::default(),
            "BTCUSDT",
            5,
            health.clone(),
        );
        let position = Position::flat("BTCUSDT");
        for _ in 0..4 {
            assert_eq!(monitor.tick(&position).await, MonitorVerdict::Quiet);
        }
        assert!(health.is_degraded());
    }

    #[tokio::test]
    async fn recovered_feed_clears_health_and_gap_count() {
        let feed = ScriptedFeed::new(vec![
            Err(EngineError::feed_unavailable("gap")),
            Ok(dec!(50000)),
        ]);
        let health = FeedHealth::new();
        let mut monitor = EmergencyMonitor::new(
            feed,
            EmergencyConfig::default(),
            "BTCUSDT",
            5,
            health.clone(),
        );
        let position = open_long();
        monitor.tick(&position).await;
        assert!(health.is_degraded());
        monitor.tick(&position).await;
        assert!(!health.is_degraded());
        assert_eq!(monitor.consecutive_gaps, 0);
    }

    #[tokio::test]
    async fn contradictory_tick_counts_as_gap() {
        let feed = ScriptedFeed::new(vec![Ok(dec!(0))]);
        let health = FeedHealth::new();
        let mut monitor = EmergencyMonitor::new(
            feed,
            EmergencyConfig::default(),
            "BTCUSDT",
            5,
            health.clone(),
        );
        assert_eq!(
            monitor.tick(&Position::flat("BTCUSDT")).await,
            MonitorVerdict::Quiet
        );
        assert!(health.is_degraded());
        assert_eq!(monitor.consecutive_gaps, 1);
    }

    #[tokio::test]
    async fn emergency_outranks_protective_stop() {
        // Price crashes through the stop: the crash wins.
        let feed = ScriptedFeed::new(vec![Ok(dec!(50000)), Ok(dec!(44000))]);
        let mut monitor = monitor(feed);
        let position = open_long();
        monitor.tick(&position).await;
        assert!(matches!(
            monitor.tick(&position).await,
            MonitorVerdict::Emergency(EmergencyReason::AbruptPriceMove { .. })
        ));
    }
}
