//! The position actor: single owner of the authoritative [`Position`].
//!
//! All writers submit transition requests through one serialization point.
//! Normal transitions are processed in arrival order, at most one in flight
//! at a time; the external execution step runs in a spawned task so that an
//! emergency can pre-empt a transition that is still awaiting confirmation.
//! A confirmation arriving after an emergency pre-empted it is discarded
//! and logged as stale. Execution failures leave the position in its
//! pre-transition state; nothing here ever assumes an order succeeded
//! without a confirmation.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use quorum_trade_core::{
    retry_with_backoff, AuditSink, Decision, ExecutionService, OrderConfirmation, OrderRequest,
    Position, PositionState, Result, RetryPolicy, RiskFlag, TransitionRecord,
};

use crate::commands::{CloseReason, EmergencyReason, PositionCommand};
use crate::events::EngineEvent;
use crate::history::{ClosedTrade, TradeHistory};

/// Result of one spawned execution step.
enum Confirmation {
    Opened(OrderConfirmation),
    Closed(OrderConfirmation),
    Adjusted,
}

/// Context of the in-flight normal transition.
enum PendingKind {
    Open,
    Close(CloseReason),
    Adjust {
        stop_loss: Decimal,
        take_profit: Decimal,
    },
}

impl PendingKind {
    const fn op(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Close(_) => "close",
            Self::Adjust { .. } => "adjust",
        }
    }
}

struct Pending {
    /// Epoch at submission; an emergency bumps the actor's epoch, turning
    /// this confirmation stale.
    epoch: u64,
    kind: PendingKind,
    rx: oneshot::Receiver<Result<Confirmation>>,
}

enum Step {
    Emergency(EmergencyReason),
    Confirmation(std::result::Result<Result<Confirmation>, oneshot::error::RecvError>),
    Command(PositionCommand),
    ChannelClosed,
}

/// Single-owner actor for the position state machine.
pub struct PositionActor {
    position: Position,
    executor: Arc<dyn ExecutionService>,
    audit: Arc<dyn AuditSink>,
    events: broadcast::Sender<EngineEvent>,
    status: watch::Sender<Position>,
    history: TradeHistory,
    normal_rx: mpsc::Receiver<PositionCommand>,
    emergency_rx: mpsc::Receiver<EmergencyReason>,
    retry: RetryPolicy,
    epoch: u64,
    pending: Option<Pending>,
}

impl PositionActor {
    #[must_use]
    pub fn new(
        position: Position,
        executor: Arc<dyn ExecutionService>,
        audit: Arc<dyn AuditSink>,
        events: broadcast::Sender<EngineEvent>,
        status: watch::Sender<Position>,
        retry: RetryPolicy,
        normal_rx: mpsc::Receiver<PositionCommand>,
        emergency_rx: mpsc::Receiver<EmergencyReason>,
    ) -> Self {
        Self {
            position,
            executor,
            audit,
            events,
            status,
            history: TradeHistory::new(),
            normal_rx,
            emergency_rx,
            retry,
            epoch: 0,
            pending: None,
        }
    }

    /// Runs the actor until shutdown or until every handle is dropped.
    pub async fn run(mut self) {
        tracing::info!("position actor for {} started", self.position.pair);
        self.publish_status();
        loop {
            let step = if let Some(pending) = self.pending.as_mut() {
                tokio::select! {
                    biased;
                    Some(reason) = self.emergency_rx.recv() => Step::Emergency(reason),
                    result = &mut pending.rx => Step::Confirmation(result),
                }
            } else {
                tokio::select! {
                    biased;
                    Some(reason) = self.emergency_rx.recv() => Step::Emergency(reason),
                    maybe = self.normal_rx.recv() => match maybe {
                        Some(cmd) => Step::Command(cmd),
                        None => Step::ChannelClosed,
                    },
                }
            };

            match step {
                Step::Emergency(reason) => self.handle_emergency(reason).await,
                Step::Confirmation(result) => {
                    let pending = self
                        .pending
                        .take()
                        .expect("confirmation step implies a pending transition");
                    self.apply_confirmation(pending, result).await;
                }
                Step::Command(PositionCommand::Shutdown) => {
                    self.drain_for_shutdown().await;
                    self.publish_status();
                    break;
                }
                Step::Command(cmd) => self.handle_command(cmd).await,
                Step::ChannelClosed => break,
            }
            self.publish_status();
        }
        tracing::info!("position actor for {} stopped", self.position.pair);
    }

    fn publish_status(&self) {
        let _ = self.status.send(self.position.clone());
    }

    async fn handle_command(&mut self, cmd: PositionCommand) {
        match cmd {
            PositionCommand::Open(decision) => self.start_open(*decision).await,
            PositionCommand::AdjustStops(decision) => self.start_adjust(*decision).await,
            PositionCommand::Close { reason } => self.start_close(reason).await,
            PositionCommand::History(tx) => {
                let _ = tx.send(self.history.summary());
            }
            PositionCommand::Shutdown => unreachable!("handled in run"),
        }
    }

    async fn start_open(&mut self, decision: Decision) {
        let (Some(side), Some(entry), Some(stop_loss), Some(take_profit)) = (
            decision.action.opens_side(),
            decision.entry_price,
            decision.stop_loss,
            decision.take_profit,
        ) else {
            self.report_invariant("open command without side or levels");
            return;
        };

        let from = self.position.state;
        if let Err(err) =
            self.position
                .begin_open(side, decision.size, entry, stop_loss, take_profit)
        {
            self.report_invariant(&err.to_string());
            return;
        }
        self.record_transition(from, "decision").await;

        let order = OrderRequest {
            pair: self.position.pair.clone(),
            side,
            size: decision.size,
            entry,
            stop_loss,
            take_profit,
        };
        self.spawn_execution(PendingKind::Open, move |executor, retry| async move {
            retry_with_backoff("open", retry, || executor.open(order.clone()))
                .await
                .map(Confirmation::Opened)
        });
    }

    async fn start_close(&mut self, reason: CloseReason) {
        if self.position.state != PositionState::Open {
            tracing::warn!(
                "close ({reason}) ignored in state {:?}",
                self.position.state
            );
            return;
        }

        let from = self.position.state;
        if let Err(err) = self.position.begin_close() {
            self.report_invariant(&err.to_string());
            return;
        }
        self.record_transition(from, reason.to_string()).await;

        let pair = self.position.pair.clone();
        let side = self.position.side;
        let size = self.position.size;
        self.spawn_execution(
            PendingKind::Close(reason),
            move |executor, retry| async move {
                retry_with_backoff("close", retry, || executor.close(&pair, side, size))
                    .await
                    .map(Confirmation::Closed)
            },
        );
    }

    async fn start_adjust(&mut self, decision: Decision) {
        if self.position.state != PositionState::Open {
            tracing::warn!("adjust_stops ignored in state {:?}", self.position.state);
            return;
        }
        let (Some(stop_loss), Some(take_profit)) = (decision.stop_loss, decision.take_profit)
        else {
            self.report_invariant("adjust_stops command without levels");
            return;
        };

        let pair = self.position.pair.clone();
        self.spawn_execution(
            PendingKind::Adjust {
                stop_loss,
                take_profit,
            },
            move |executor, retry| async move {
                retry_with_backoff("adjust", retry, || {
                    executor.adjust(&pair, stop_loss, take_profit)
                })
                .await
                .map(|()| Confirmation::Adjusted)
            },
        );
    }

    /// Spawns the external execution step so the actor stays responsive to
    /// emergencies while awaiting confirmation.
    fn spawn_execution<F, Fut>(&mut self, kind: PendingKind, run: F)
    where
        F: FnOnce(Arc<dyn ExecutionService>, RetryPolicy) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<Confirmation>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let executor = self.executor.clone();
        let retry = self.retry;
        tokio::spawn(async move {
            let result = run(executor, retry).await;
            let _ = tx.send(result);
        });
        self.pending = Some(Pending {
            epoch: self.epoch,
            kind,
            rx,
        });
    }

    async fn apply_confirmation(
        &mut self,
        pending: Pending,
        result: std::result::Result<Result<Confirmation>, oneshot::error::RecvError>,
    ) {
        let op = pending.kind.op();
        if pending.epoch != self.epoch {
            tracing::warn!("stale {op} confirmation discarded after emergency pre-emption");
            self.emit(EngineEvent::StaleConfirmationDiscarded { op: op.to_string() });
            self.record_transition_same_state(format!("stale {op} confirmation discarded"))
                .await;
            return;
        }

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(_) => Err(quorum_trade_core::EngineError::execution(
                op,
                "confirmation channel dropped",
                false,
            )),
        };

        match (pending.kind, outcome) {
            (PendingKind::Open, Ok(Confirmation::Opened(confirmation))) => {
                let from = self.position.state;
                if let Err(err) = self
                    .position
                    .confirm_open(confirmation.fill_price, Utc::now())
                {
                    self.report_invariant(&err.to_string());
                    return;
                }
                self.record_transition(from, format!("filled at {}", confirmation.fill_price))
                    .await;
            }
            (PendingKind::Close(reason), Ok(Confirmation::Closed(confirmation))) => {
                self.finish_close(reason.to_string(), &confirmation).await;
            }
            (
                PendingKind::Adjust {
                    stop_loss,
                    take_profit,
                },
                Ok(Confirmation::Adjusted),
            ) => {
                if let Err(err) = self.position.apply_stops(stop_loss, take_profit, Utc::now()) {
                    self.report_invariant(&err.to_string());
                    return;
                }
                self.record_transition_same_state(format!(
                    "stops adjusted to {stop_loss}/{take_profit}"
                ))
                .await;
            }
            (kind, Err(err)) => {
                tracing::error!("{} failed after retries: {err}", kind.op());
                self.emit(EngineEvent::ExecutionFailed {
                    op: kind.op().to_string(),
                    error: err.to_string(),
                });
                self.revert_pending(&kind).await;
            }
            (kind, Ok(_)) => {
                self.report_invariant(&format!(
                    "mismatched confirmation for {} step",
                    kind.op()
                ));
            }
        }
    }

    /// Failure semantics: the state machine returns to its pre-transition
    /// state; the failure was already surfaced to the operator.
    async fn revert_pending(&mut self, kind: &PendingKind) {
        let from = self.position.state;
        let result = match kind {
            PendingKind::Open => self.position.abort_open(),
            PendingKind::Close(_) => self.position.abort_close(),
            PendingKind::Adjust { .. } => Ok(()), // nothing was changed yet
        };
        match result {
            Ok(()) => {
                if from != self.position.state {
                    self.record_transition(from, format!("{} failed", kind.op()))
                        .await;
                }
            }
            Err(err) => self.report_invariant(&err.to_string()),
        }
    }

    async fn handle_emergency(&mut self, reason: EmergencyReason) {
        self.emit(EngineEvent::EmergencyTriggered {
            reason: reason.to_string(),
        });

        if self.position.is_flat() {
            tracing::info!("emergency ({reason}) with no exposure; nothing to close");
            return;
        }

        if let Some(pending) = &self.pending {
            tracing::warn!(
                "emergency pre-empts in-flight {} transition",
                pending.kind.op()
            );
            // The stale confirmation is discarded when it arrives.
            self.epoch += 1;
        }

        let from = self.position.state;
        if let Err(err) = self.position.begin_emergency(reason.risk_flag()) {
            self.report_invariant(&err.to_string());
            return;
        }
        self.record_transition(from, reason.to_string()).await;

        // The emergency close itself runs inline: nothing pre-empts an
        // emergency, and the retry budget is bounded.
        let pair = self.position.pair.clone();
        let side = self.position.side;
        let size = self.position.size;
        let executor = self.executor.clone();
        let retry = self.retry;
        let result =
            retry_with_backoff("emergency close", retry, || executor.close(&pair, side, size))
                .await;

        match result {
            Ok(confirmation) => {
                self.finish_emergency(reason, &confirmation).await;
            }
            Err(err) => {
                // Still emergency-closing; the monitor re-fires while the
                // abnormal condition persists, and shutdown records the
                // unconfirmed state.
                tracing::error!("emergency close failed after retries: {err}");
                self.position.risk_flags.insert(RiskFlag::ExecutionFailed);
                self.emit(EngineEvent::ExecutionFailed {
                    op: "emergency close".to_string(),
                    error: err.to_string(),
                });
                self.record_transition_same_state("emergency close failed".to_string())
                    .await;
            }
        }
    }

    async fn finish_emergency(&mut self, reason: EmergencyReason, conf: &OrderConfirmation) {
        let entry = self.position.entry_price.unwrap_or(conf.fill_price);
        let trade = ClosedTrade {
            pair: self.position.pair.clone(),
            side: self.position.side,
            size: self.position.size,
            entry_price: entry,
            exit_price: conf.fill_price,
            pnl: ClosedTrade::realized_pnl(
                self.position.side,
                self.position.size,
                entry,
                conf.fill_price,
            ),
            opened_at: self.position.opened_at,
            closed_at: conf.timestamp,
            reason: reason.to_string(),
        };
        let from = self.position.state;
        if let Err(err) = self.position.confirm_emergency() {
            self.report_invariant(&err.to_string());
            return;
        }
        self.history.push(trade);
        self.record_transition(from, format!("emergency close filled at {}", conf.fill_price))
            .await;
    }

    async fn finish_close(&mut self, reason: String, conf: &OrderConfirmation) {
        let entry = self.position.entry_price.unwrap_or(conf.fill_price);
        let trade = ClosedTrade {
            pair: self.position.pair.clone(),
            side: self.position.side,
            size: self.position.size,
            entry_price: entry,
            exit_price: conf.fill_price,
            pnl: ClosedTrade::realized_pnl(
                self.position.side,
                self.position.size,
                entry,
                conf.fill_price,
            ),
            opened_at: self.position.opened_at,
            closed_at: conf.timestamp,
            reason: reason.clone(),
        };
        let from = self.position.state;
        if let Err(err) = self.position.confirm_close() {
            self.report_invariant(&err.to_string());
            return;
        }
        self.history.push(trade);
        self.record_transition(from, format!("{reason}, filled at {}", conf.fill_price))
            .await;
    }

    /// Shutdown never abandons an in-flight transition: the pending
    /// confirmation is drained to a terminal state first, and anything
    /// still unconfirmed is recorded for recovery on restart.
    async fn drain_for_shutdown(&mut self) {
        if let Some(mut pending) = self.pending.take() {
            tracing::info!(
                "shutdown: waiting for in-flight {} confirmation",
                pending.kind.op()
            );
            let result = (&mut pending.rx).await;
            self.apply_confirmation(pending, result).await;
        }

        if !matches!(
            self.position.state,
            PositionState::Flat | PositionState::Open
        ) {
            tracing::error!(
                "shutdown with unconfirmed position state {:?}; recorded for recovery",
                self.position.state
            );
            self.position
                .risk_flags
                .insert(RiskFlag::UnconfirmedAtShutdown);
            self.record_transition_same_state("shutdown with unconfirmed transition".to_string())
                .await;
        }
    }

    fn report_invariant(&mut self, message: &str) {
        // Fatal to the current cycle only; the engine continues from the
        // last confirmed state.
        tracing::error!("invariant violation: {message}");
        self.emit(EngineEvent::Error {
            message: message.to_string(),
            timestamp: Utc::now(),
        });
    }

    async fn record_transition(&mut self, from: PositionState, reason: impl Into<String>) {
        let reason = reason.into();
        let to = self.position.state;
        self.emit(EngineEvent::TransitionApplied {
            from,
            to,
            reason: reason.clone(),
        });
        self.audit
            .record_transition(&TransitionRecord::new(
                self.position.pair.clone(),
                from,
                to,
                reason,
            ))
            .await;
    }

    async fn record_transition_same_state(&mut self, reason: String) {
        let state = self.position.state;
        self.record_transition(state, reason).await;
    }

    fn emit(&self, event: EngineEvent) {
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::PositionHandle;
    use async_trait::async_trait;
    use quorum_trade_core::{
        ContributingSignal, DecisionAction, Direction, EngineError, Side, Signal,
    };
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::time::Duration;

    struct MockExecutor {
        opens: AtomicU32,
        closes: AtomicU32,
        adjusts: AtomicU32,
        fail_open: AtomicBool,
        fail_close: AtomicBool,
        open_delay: Option<Duration>,
    }

    impl MockExecutor {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                opens: AtomicU32::new(0),
                closes: AtomicU32::new(0),
                adjusts: AtomicU32::new(0),
                fail_open: AtomicBool::new(false),
                fail_close: AtomicBool::new(false),
                open_delay: None,
            })
        }

        fn slow_open(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                opens: AtomicU32::new(0),
                closes: AtomicU32::new(0),
                adjusts: AtomicU32::new(0),
                fail_open: AtomicBool::new(false),
                fail_close: AtomicBool::new(false),
                open_delay: Some(delay),
            })
        }

        fn confirmation(price: Decimal) -> OrderConfirmation {
            OrderConfirmation {
                order_id: "mock-1".to_string(),
                fill_price: price,
                timestamp: Utc::now(),
            }
        }
    }

    #[async_trait]
    impl ExecutionService for MockExecutor {
        async fn open(&self, order: OrderRequest) -> Result<OrderConfirmation> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.open_delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail_open.load(Ordering::SeqCst) {
                return Err(EngineError::execution("open", "rejected", false));
            }
            Ok(Self::confirmation(order.entry))
        }

        async fn close(
            &self,
            _pair: &str,
            _side: Side,
            _size: Decimal,
        ) -> Result<OrderConfirmation> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            if self.fail_close.load(Ordering::SeqCst) {
                return Err(EngineError::execution("close", "rejected", false));
            }
            Ok(Self::confirmation(dec!(49500)))
        }

        async fn adjust(
            &self,
            _pair: &str,
            _stop_loss: Decimal,
            _take_profit: Decimal,
        ) -> Result<()> {
            self.adjusts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn open_decision() -> Decision {
        let signal = Signal::new("technical", Utc::now(), Direction::Long, 0.8).unwrap();
        Decision {
            action: DecisionAction::OpenLong,
            confidence: 0.8,
            entry_price: Some(dec!(50000)),
            stop_loss: Some(dec!(49000)),
            take_profit: Some(dec!(52000)),
            size: dec!(0.02),
            contributing: vec![ContributingSignal::from_signal(&signal, 1.0, false)],
            degraded: false,
            generated_at: Utc::now(),
        }
    }

    fn adjust_decision(stop: Decimal, take: Decimal) -> Decision {
        Decision {
            action: DecisionAction::AdjustStops,
            stop_loss: Some(stop),
            take_profit: Some(take),
            entry_price: Some(dec!(50000)),
            size: Decimal::ZERO,
            ..open_decision()
        }
    }

    fn spawn_actor(
        executor: Arc<dyn ExecutionService>,
    ) -> (PositionHandle, broadcast::Receiver<EngineEvent>) {
        let (handle, normal_rx, emergency_rx, status_tx) =
            PositionHandle::channels(Position::flat("BTCUSDT"));
        let (events_tx, events_rx) = broadcast::channel(64);
        let actor = PositionActor::new(
            Position::flat("BTCUSDT"),
            executor,
            Arc::new(crate::audit_sink::NullAuditSink),
            events_tx,
            status_tx,
            RetryPolicy::new(1, Duration::from_millis(1)),
            normal_rx,
            emergency_rx,
        );
        tokio::spawn(actor.run());
        (handle, events_rx)
    }

    async fn wait_for_state(handle: &PositionHandle, state: PositionState) -> Position {
        for _ in 0..100 {
            let snapshot = handle.status();
            if snapshot.state == state {
                return snapshot;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("position never reached {state:?}");
    }

    #[tokio::test]
    async fn open_decision_reaches_open_state() {
        let executor = MockExecutor::new();
        let (handle, _events) = spawn_actor(executor.clone());

        handle.open(open_decision()).await.unwrap();
        let position = wait_for_state(&handle, PositionState::Open).await;

        assert_eq!(position.side, Side::Long);
        assert_eq!(position.size, dec!(0.02));
        assert_eq!(position.entry_price, Some(dec!(50000)));
        assert_eq!(executor.opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_open_reverts_to_flat() {
        let executor = MockExecutor::new();
        executor.fail_open.store(true, Ordering::SeqCst);
        let (handle, mut events) = spawn_actor(executor.clone());

        handle.open(open_decision()).await.unwrap();
        let position = wait_for_state(&handle, PositionState::Flat).await;
        assert_eq!(position.side, Side::None);

        let mut saw_failure = false;
        while let Ok(event) = events.try_recv() {
            if matches!(event, EngineEvent::ExecutionFailed { ref op, .. } if op == "open") {
                saw_failure = true;
            }
        }
        assert!(saw_failure);
    }

    #[tokio::test]
    async fn close_appends_trade_history() {
        let executor = MockExecutor::new();
        let (handle, _events) = spawn_actor(executor.clone());

        handle.open(open_decision()).await.unwrap();
        wait_for_state(&handle, PositionState::Open).await;

        handle.close(CloseReason::Decision).await.unwrap();
        wait_for_state(&handle, PositionState::Flat).await;

        let summary = handle.history().await.unwrap();
        assert_eq!(summary.num_trades, 1);
        // Long 0.02 from 50000 closed at 49500: a 10 USDT loss.
        assert_eq!(summary.total_pnl, dec!(-10));
        assert_eq!(summary.wins, 0);
    }

    #[tokio::test]
    async fn failed_close_stays_open() {
        let executor = MockExecutor::new();
        let (handle, _events) = spawn_actor(executor.clone());

        handle.open(open_decision()).await.unwrap();
        wait_for_state(&handle, PositionState::Open).await;

        executor.fail_close.store(true, Ordering::SeqCst);
        handle.close(CloseReason::StopLoss).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        let position = wait_for_state(&handle, PositionState::Open).await;
        assert_eq!(position.size, dec!(0.02));
    }

    #[tokio::test]
    async fn adjust_is_idempotent_beyond_timestamp() {
        let executor = MockExecutor::new();
        let (handle, _events) = spawn_actor(executor.clone());

        handle.open(open_decision()).await.unwrap();
        wait_for_state(&handle, PositionState::Open).await;

        handle
            .adjust_stops(adjust_decision(dec!(49500), dec!(53000)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let first = handle.status();
        assert_eq!(first.stop_loss, Some(dec!(49500)));
        let first_adjusted_at = first.last_adjusted_at.unwrap();

        handle
            .adjust_stops(adjust_decision(dec!(49500), dec!(53000)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let second = handle.status();
        assert_eq!(second.stop_loss, Some(dec!(49500)));
        assert_eq!(second.take_profit, Some(dec!(53000)));
        assert_eq!(second.size, first.size);
        assert!(second.last_adjusted_at.unwrap() >= first_adjusted_at);
        assert_eq!(executor.adjusts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn emergency_preempts_pending_open_and_discards_confirmation() {
        let executor = MockExecutor::slow_open(Duration::from_millis(200));
        let (handle, mut events) = spawn_actor(executor.clone());

        handle.open(open_decision()).await.unwrap();
        // Wait until the open is staged but unconfirmed.
        wait_for_state(&handle, PositionState::Opening).await;

        handle
            .emergency(EmergencyReason::AbruptPriceMove { change_pct: 10.0 })
            .await
            .unwrap();

        let position = wait_for_state(&handle, PositionState::Flat).await;
        assert!(position.risk_flags.contains(&RiskFlag::AbruptPriceMove));

        // The slow open's confirmation eventually lands and is discarded.
        tokio::time::sleep(Duration::from_millis(300)).await;
        let mut discarded = false;
        while let Ok(event) = events.try_recv() {
            if matches!(event, EngineEvent::StaleConfirmationDiscarded { .. }) {
                discarded = true;
            }
        }
        assert!(discarded);

        // Still flat afterwards; the stale open never resurrects exposure.
        let position = handle.status();
        assert_eq!(position.state, PositionState::Flat);
    }

    #[tokio::test]
    async fn emergency_with_no_exposure_is_a_noop() {
        let executor = MockExecutor::new();
        let (handle, _events) = spawn_actor(executor.clone());

        handle
            .emergency(EmergencyReason::VolatilitySpike { volatility: 9.0 })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let position = handle.status();
        assert!(position.is_flat());
        assert_eq!(executor.closes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn emergency_close_records_history_with_reason() {
        let executor = MockExecutor::new();
        let (handle, _events) = spawn_actor(executor.clone());

        handle.open(open_decision()).await.unwrap();
        wait_for_state(&handle, PositionState::Open).await;

        handle
            .emergency(EmergencyReason::DrawdownExceeded {
                loss_fraction: 0.2,
            })
            .await
            .unwrap();
        wait_for_state(&handle, PositionState::Flat).await;

        let summary = handle.history().await.unwrap();
        assert_eq!(summary.num_trades, 1);
        assert_eq!(executor.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_emergency_close_stays_emergency_closing() {
        let executor = MockExecutor::new();
        executor.fail_close.store(true, Ordering::SeqCst);
        let (handle, _events) = spawn_actor(executor.clone());

        handle.open(open_decision()).await.unwrap();
        wait_for_state(&handle, PositionState::Open).await;

        handle
            .emergency(EmergencyReason::FeedAnomaly {
                consecutive_gaps: 5,
            })
            .await
            .unwrap();
        let position = wait_for_state(&handle, PositionState::EmergencyClosing).await;
        assert!(position.risk_flags.contains(&RiskFlag::ExecutionFailed));

        // A later emergency retries the close once the executor recovers.
        executor.fail_close.store(false, Ordering::SeqCst);
        handle
            .emergency(EmergencyReason::FeedAnomaly {
                consecutive_gaps: 6,
            })
            .await
            .unwrap();
        wait_for_state(&handle, PositionState::Flat).await;
    }

    #[tokio::test]
    async fn shutdown_drains_inflight_open() {
        let executor = MockExecutor::slow_open(Duration::from_millis(100));
        let (handle, _events) = spawn_actor(executor.clone());

        handle.open(open_decision()).await.unwrap();
        wait_for_state(&handle, PositionState::Opening).await;

        handle.shutdown().await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        // The actor applied the confirmation before stopping: the open
        // reached its terminal state rather than being abandoned.
        assert_eq!(executor.opens.load(Ordering::SeqCst), 1);
        let position = handle.status();
        assert_eq!(position.state, PositionState::Open);
        // The actor is gone.
        assert!(handle.history().await.is_err());
    }

    #[tokio::test]
    async fn queued_commands_apply_in_arrival_order() {
        let executor = MockExecutor::new();
        let (handle, _events) = spawn_actor(executor.clone());

        handle.open(open_decision()).await.unwrap();
        handle
            .adjust_stops(adjust_decision(dec!(49200), dec!(52500)))
            .await
            .unwrap();
        handle.close(CloseReason::Decision).await.unwrap();

        wait_for_state(&handle, PositionState::Flat).await;
        let summary = handle.history().await.unwrap();
        assert_eq!(summary.num_trades, 1);
        assert_eq!(executor.opens.load(Ordering::SeqCst), 1);
        assert_eq!(executor.adjusts.load(Ordering::SeqCst), 1);
        assert_eq!(executor.closes.load(Ordering::SeqCst), 1);
    }
}
