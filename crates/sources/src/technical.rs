//! Technical-indicator signal source.
//!
//! Consumes an indicator snapshot (MACD, RSI, stochastic, Bollinger) from an
//! analysis service and folds the individual indicator votes into one
//! direction with a combined confidence. Indicator computation itself is the
//! service's concern.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use quorum_trade_core::{Direction, Result, Signal, SignalSource};

use crate::client::ReasoningClient;

/// Weights of the individual indicator votes in the combined score.
const MACD_WEIGHT: f64 = 0.3;
const RSI_WEIGHT: f64 = 0.2;
const STOCH_WEIGHT: f64 = 0.2;
const BOLLINGER_WEIGHT: f64 = 0.3;

/// Indicator values returned by the analysis service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub macd: f64,
    pub macd_signal: f64,
    pub rsi: f64,
    pub stoch_k: f64,
    pub close: Decimal,
    pub bollinger_upper: Decimal,
    pub bollinger_lower: Decimal,
}

/// MACD vote: +1 above the signal line, -1 below.
#[must_use]
pub fn macd_vote(macd: f64, macd_signal: f64) -> f64 {
    if macd > macd_signal {
        1.0
    } else {
        -1.0
    }
}

/// RSI vote: +1 oversold (<30), -1 overbought (>70), 0 otherwise.
#[must_use]
pub fn rsi_vote(rsi: f64) -> f64 {
    if rsi < 30.0 {
        1.0
    } else if rsi > 70.0 {
        -1.0
    } else {
        0.0
    }
}

/// Stochastic vote: +1 below 20, -1 above 80, 0 otherwise.
#[must_use]
pub fn stoch_vote(stoch_k: f64) -> f64 {
    if stoch_k < 20.0 {
        1.0
    } else if stoch_k > 80.0 {
        -1.0
    } else {
        0.0
    }
}

/// Bollinger vote: +1 below the lower band, -1 above the upper band.
#[must_use]
pub fn bollinger_vote(close: Decimal, upper: Decimal, lower: Decimal) -> f64 {
    if close < lower {
        1.0
    } else if close > upper {
        -1.0
    } else {
        0.0
    }
}

/// Combined score in [-1.0, 1.0]; sign gives direction, magnitude gives
/// confidence.
#[must_use]
pub fn combined_score(snapshot: &IndicatorSnapshot) -> f64 {
    MACD_WEIGHT * macd_vote(snapshot.macd, snapshot.macd_signal)
        + RSI_WEIGHT * rsi_vote(snapshot.rsi)
        + STOCH_WEIGHT * stoch_vote(snapshot.stoch_k)
        + BOLLINGER_WEIGHT
            * bollinger_vote(
                snapshot.close,
                snapshot.bollinger_upper,
                snapshot.bollinger_lower,
            )
}

#[derive(Serialize)]
struct SnapshotRequest<'a> {
    pair: &'a str,
}

/// Signal source backed by a technical-analysis service.
pub struct TechnicalIndicatorSource {
    pair: String,
    client: ReasoningClient,
}

impl TechnicalIndicatorSource {
    #[must_use]
    pub fn new(pair: impl Into<String>, client: ReasoningClient) -> Self {
        Self {
            pair: pair.into(),
            client,
        }
    }

    fn signal_from_snapshot(&self, snapshot: &IndicatorSnapshot) -> Result<Signal> {
        let score = combined_score(snapshot);
        let direction = if score > 0.0 {
            Direction::Long
        } else if score < 0.0 {
            Direction::Short
        } else {
            Direction::Flat
        };
        Signal::new(self.id(), Utc::now(), direction, score.abs().min(1.0)).map(|s| {
            s.with_rationale(format!(
                "macd {:+.0} rsi {:+.0} stoch {:+.0} bb {:+.0}",
                macd_vote(snapshot.macd, snapshot.macd_signal),
                rsi_vote(snapshot.rsi),
                stoch_vote(snapshot.stoch_k),
                bollinger_vote(
                    snapshot.close,
                    snapshot.bollinger_upper,
                    snapshot.bollinger_lower
                ),
            ))
        })
    }
}

#[async_trait]
impl SignalSource for TechnicalIndicatorSource {
    async fn produce(&self) -> Result<Signal> {
        let snapshot: IndicatorSnapshot = self
            .client
            .post_json(&SnapshotRequest { pair: &self.pair })
            .await?;
        self.signal_from_snapshot(&snapshot)
    }

    fn id(&self) -> &str {
        self.client.source_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn snapshot() -> IndicatorSnapshot {
        IndicatorSnapshot {
            macd: 1.0,
            macd_signal: 0.5,
            rsi: 50.0,
            stoch_k: 50.0,
            close: dec!(50000),
            bollinger_upper: dec!(51000),
            bollinger_lower: dec!(49000),
        }
    }

    #[test]
    fn macd_vote_follows_signal_line() {
        assert!((macd_vote(1.0, 0.5) - 1.0).abs() < f64::EPSILON);
        assert!((macd_vote(0.4, 0.5) + 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rsi_vote_extremes() {
        assert!((rsi_vote(25.0) - 1.0).abs() < f64::EPSILON);
        assert!((rsi_vote(75.0) + 1.0).abs() < f64::EPSILON);
        assert!(rsi_vote(50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn stoch_vote_extremes() {
        assert!((stoch_vote(10.0) - 1.0).abs() < f64::EPSILON);
        assert!((stoch_vote(90.0) + 1.0).abs() < f64::EPSILON);
        assert!(stoch_vote(50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn bollinger_vote_bands() {
        assert!((bollinger_vote(dec!(48000), dec!(51000), dec!(49000)) - 1.0).abs() < f64::EPSILON);
        assert!((bollinger_vote(dec!(52000), dec!(51000), dec!(49000)) + 1.0).abs() < f64::EPSILON);
        assert!(bollinger_vote(dec!(50000), dec!(51000), dec!(49000)).abs() < f64::EPSILON);
    }

    #[test]
    fn combined_score_all_bullish_is_full_confidence() {
        let s = IndicatorSnapshot {
            macd: 1.0,
            macd_signal: 0.0,
            rsi: 25.0,
            stoch_k: 15.0,
            close: dec!(48000),
            bollinger_upper: dec!(51000),
            bollinger_lower: dec!(49000),
        };
        assert!((combined_score(&s) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn combined_score_neutral_indicators_only_macd_counts() {
        // MACD bullish, everything else neutral: 0.3.
        assert!((combined_score(&snapshot()) - 0.3).abs() < 1e-9);
    }

    #[test]
    fn snapshot_maps_to_long_signal() {
        let client = ReasoningClient::new(
            "technical",
            "http://localhost:9100/indicators",
            std::time::Duration::from_secs(5),
        )
        .unwrap();
        let source = TechnicalIndicatorSource::new("BTCUSDT", client);
        let signal = source.signal_from_snapshot(&snapshot()).unwrap();
        assert_eq!(signal.direction, Direction::Long);
        assert!((signal.confidence - 0.3).abs() < 1e-9);
        assert_eq!(signal.source_id, "technical");
    }

    #[test]
    fn bearish_snapshot_maps_to_short_signal() {
        let s = IndicatorSnapshot {
            macd: 0.0,
            macd_signal: 0.5,
            rsi: 80.0,
            stoch_k: 90.0,
            close: dec!(52000),
            bollinger_upper: dec!(51000),
            bollinger_lower: dec!(49000),
        };
        let client = ReasoningClient::new(
            "technical",
            "http://localhost:9100/indicators",
            std::time::Duration::from_secs(5),
        )
        .unwrap();
        let source = TechnicalIndicatorSource::new("BTCUSDT", client);
        let signal = source.signal_from_snapshot(&s).unwrap();
        assert_eq!(signal.direction, Direction::Short);
        assert!((signal.confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn indicator_snapshot_deserializes_from_service_json() {
        let json = r#"{
            "macd": 12.5,
            "macd_signal": 10.1,
            "rsi": 28.0,
            "stoch_k": 45.0,
            "close": "50123.5",
            "bollinger_upper": "51200",
            "bollinger_lower": "49100"
        }"#;
        let snapshot: IndicatorSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.close, dec!(50123.5));
        assert!((combined_score(&snapshot) - 0.5).abs() < 1e-9);
    }
}
