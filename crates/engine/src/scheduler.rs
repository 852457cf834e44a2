//! Engine wiring: three independent timer families around one position
//! actor.
//!
//! Per-source refresh tasks, the decision cycle, and the emergency check
//! run concurrently and meet only at the actor's command queue. Shutdown
//! flips a watch flag: timers stop, the actor drains any in-flight
//! transition to a terminal state, and the final position and trade summary
//! are logged.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::MissedTickBehavior;

use quorum_trade_core::{
    AppConfig, AuditSink, DecisionAction, DecisionRecord, ExecutionService, MarketDataFeed,
    Position, RetryPolicy, SignalSource,
};
use quorum_trade_sources::{spawn_refresh_tasks, SignalBook};
use quorum_trade_strategy::{RiskGate, SignalAggregator};

use crate::actor::PositionActor;
use crate::commands::{CloseReason, EmergencyReason, PositionCommand};
use crate::events::EngineEvent;
use crate::handle::PositionHandle;
use crate::monitor::{EmergencyMonitor, FeedHealth, MonitorVerdict};

/// Cloneable control surface for a running engine.
#[derive(Clone)]
pub struct EngineHandle {
    shutdown: Arc<watch::Sender<bool>>,
    events: broadcast::Sender<EngineEvent>,
    position: PositionHandle,
}

impl EngineHandle {
    /// Subscribes to the live event feed.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// The position handle, for status queries and operator commands.
    #[must_use]
    pub fn position(&self) -> &PositionHandle {
        &self.position
    }

    /// Signals the engine to stop. Idempotent.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

/// The assembled trading engine.
pub struct Engine {
    config: AppConfig,
    sources: Vec<Arc<dyn SignalSource>>,
    feed: Arc<dyn MarketDataFeed>,
    executor: Arc<dyn ExecutionService>,
    audit: Arc<dyn AuditSink>,
    events: broadcast::Sender<EngineEvent>,
    handle: EngineHandle,
    shutdown_rx: watch::Receiver<bool>,
    normal_rx: Option<mpsc::Receiver<PositionCommand>>,
    emergency_rx: Option<mpsc::Receiver<EmergencyReason>>,
    status_tx: Option<watch::Sender<Position>>,
}

impl Engine {
    /// Assembles an engine from its collaborators.
    ///
    /// # Errors
    /// Returns an error when the configuration is invalid.
    pub fn new(
        config: AppConfig,
        sources: Vec<Arc<dyn SignalSource>>,
        feed: Arc<dyn MarketDataFeed>,
        executor: Arc<dyn ExecutionService>,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self> {
        config.validate().context("invalid configuration")?;

        let (events, _) = broadcast::channel(256);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (position, normal_rx, emergency_rx, status_tx) =
            PositionHandle::channels(Position::flat(config.pair.clone()));
        let handle = EngineHandle {
            shutdown: Arc::new(shutdown_tx),
            events: events.clone(),
            position,
        };

        Ok(Self {
            config,
            sources,
            feed,
            executor,
            audit,
            events,
            handle,
            shutdown_rx,
            normal_rx: Some(normal_rx),
            emergency_rx: Some(emergency_rx),
            status_tx: Some(status_tx),
        })
    }

    /// Control surface; clone freely.
    #[must_use]
    pub fn handle(&self) -> EngineHandle {
        self.handle.clone()
    }

    /// Runs the engine until [`EngineHandle::shutdown`] is called.
    ///
    /// # Errors
    /// Returns an error if the engine was already run (receivers consumed).
    pub async fn run(mut self) -> Result<()> {
        let normal_rx = self.normal_rx.take().context("engine already run")?;
        let emergency_rx = self.emergency_rx.take().context("engine already run")?;
        let status_tx = self.status_tx.take().context("engine already run")?;

        tracing::info!(
            "engine starting for {} ({} sources, decision every {}s, emergency every {}s)",
            self.config.pair,
            self.sources.len(),
            self.config.schedule.decision_interval_secs,
            self.config.schedule.emergency_interval_secs
        );

        let actor = PositionActor::new(
            Position::flat(self.config.pair.clone()),
            self.executor.clone(),
            self.audit.clone(),
            self.events.clone(),
            status_tx,
            RetryPolicy::new(
                self.config.execution.max_retries,
                std::time::Duration::from_millis(self.config.execution.retry_base_delay_ms),
            ),
            normal_rx,
            emergency_rx,
        );
        let actor_task = tokio::spawn(actor.run());

        let book = SignalBook::new();
        let refresh_tasks = spawn_refresh_tasks(
            self.sources.clone(),
            &self.config.sources,
            book.clone(),
            self.shutdown_rx.clone(),
        );

        let health = FeedHealth::new();
        let monitor = EmergencyMonitor::new(
            self.feed.clone(),
            self.config.emergency.clone(),
            self.config.pair.clone(),
            self.config.risk.leverage,
            health.clone(),
        );
        let monitor_task = tokio::spawn(monitor_loop(
            monitor,
            self.handle.position.clone(),
            self.events.clone(),
            self.config.schedule.emergency_interval_secs,
            self.shutdown_rx.clone(),
        ));

        let decision_task = tokio::spawn(decision_loop(
            DecisionLoop {
                book,
                feed: self.feed.clone(),
                health,
                aggregator: SignalAggregator::new(
                    self.config.risk.clone(),
                    &self.config.sources,
                ),
                gate: RiskGate::new(self.config.risk.clone()),
                audit: self.audit.clone(),
                events: self.events.clone(),
                position: self.handle.position.clone(),
                pair: self.config.pair.clone(),
            },
            self.config.schedule.decision_interval_secs,
            self.shutdown_rx.clone(),
        ));

        // Park until shutdown is requested.
        let mut shutdown_rx = self.shutdown_rx.clone();
        while !*shutdown_rx.borrow() {
            if shutdown_rx.changed().await.is_err() {
                break;
            }
        }
        tracing::info!("engine shutting down");

        for task in refresh_tasks {
            let _ = task.await;
        }
        let _ = monitor_task.await;
        let _ = decision_task.await;

        // Drain the actor last so any in-flight transition reaches a
        // terminal state before we stop.
        let position = self.handle.position.status();
        tracing::info!(
            "final position: {:?} {:?} size {}",
            position.state,
            position.side,
            position.size
        );
        if let Ok(summary) = self.handle.position.history().await {
            tracing::info!(
                "session summary: {} trades, {} wins, total pnl {}",
                summary.num_trades,
                summary.wins,
                summary.total_pnl
            );
        }
        let _ = self.handle.position.shutdown().await;
        let _ = actor_task.await;

        tracing::info!("engine stopped");
        Ok(())
    }
}

struct DecisionLoop {
    book: SignalBook,
    feed: Arc<dyn MarketDataFeed>,
    health: FeedHealth,
    aggregator: SignalAggregator,
    gate: RiskGate,
    audit: Arc<dyn AuditSink>,
    events: broadcast::Sender<EngineEvent>,
    position: PositionHandle,
    pair: String,
}

impl DecisionLoop {
    /// One decision cycle: snapshot, aggregate, gate, command, audit.
    async fn cycle(&self) {
        let snapshot = self.position.status();
        let signals = self.book.snapshot().await;
        let mark = if self.health.is_degraded() {
            tracing::warn!("feed degraded; deciding without a mark price");
            None
        } else {
            match self.feed.current_price(&self.pair).await {
                Ok(price) => Some(price),
                Err(err) => {
                    tracing::warn!("mark price unavailable for decision cycle: {err}");
                    None
                }
            }
        };

        let decision = self
            .aggregator
            .aggregate(&signals, &snapshot, mark, Utc::now());
        let report = self.gate.review(decision, &snapshot);

        self.audit
            .record_decision(&DecisionRecord::new(
                self.pair.clone(),
                report.decision.clone(),
                report.rejection.clone(),
            ))
            .await;
        let _ = self.events.send(EngineEvent::DecisionMade {
            decision: report.decision.clone(),
            rejection: report.rejection.clone(),
        });

        let result = match report.decision.action {
            DecisionAction::OpenLong | DecisionAction::OpenShort => {
                self.position.open(report.decision).await
            }
            DecisionAction::AdjustStops => self.position.adjust_stops(report.decision).await,
            DecisionAction::Close => self.position.close(CloseReason::Decision).await,
            DecisionAction::Hold => Ok(()),
        };
        if let Err(err) = result {
            tracing::error!("failed to submit decision to position actor: {err}");
        }
    }
}

async fn decision_loop(ctx: DecisionLoop, interval_secs: u64, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => ctx.cycle().await,
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    tracing::info!("decision cycle stopped");
}

async fn monitor_loop(
    mut monitor: EmergencyMonitor,
    position: PositionHandle,
    events: broadcast::Sender<EngineEvent>,
    interval_secs: u64,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let snapshot = position.status();
                match monitor.tick(&snapshot).await {
                    MonitorVerdict::Quiet => {}
                    MonitorVerdict::ProtectiveClose { reason, price } => {
                        let _ = events.send(EngineEvent::ProtectiveStop {
                            reason: reason.to_string(),
                            price,
                        });
                        if let Err(err) = position.close(reason).await {
                            tracing::error!("failed to submit protective close: {err}");
                        }
                    }
                    MonitorVerdict::Emergency(reason) => {
                        if let Err(err) = position.emergency(reason).await {
                            tracing::error!("failed to submit emergency close: {err}");
                        }
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    tracing::info!("emergency monitor stopped");
}
