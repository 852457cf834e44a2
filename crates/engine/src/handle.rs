//! Cloneable handle to the position actor.
//!
//! All mutation of the position flows through this handle's channels:
//! normal transitions queue in arrival order, emergencies travel on their
//! own channel which the actor drains first. Position state is published on
//! a watch channel so readers (the emergency monitor in particular) are
//! never blocked behind an in-flight transition.

use anyhow::Result;
use tokio::sync::{mpsc, oneshot, watch};

use quorum_trade_core::{Decision, Position};

use crate::commands::{CloseReason, EmergencyReason, PositionCommand};
use crate::history::HistorySummary;

/// Capacity of the command queues.
const COMMAND_QUEUE_DEPTH: usize = 16;

/// Handle used by the decision cycle, the emergency monitor, and the CLI.
#[derive(Clone)]
pub struct PositionHandle {
    normal_tx: mpsc::Sender<PositionCommand>,
    emergency_tx: mpsc::Sender<EmergencyReason>,
    status_rx: watch::Receiver<Position>,
}

impl PositionHandle {
    /// Creates the handle plus the actor-side channel endpoints.
    #[must_use]
    pub fn channels(
        initial: Position,
    ) -> (
        Self,
        mpsc::Receiver<PositionCommand>,
        mpsc::Receiver<EmergencyReason>,
        watch::Sender<Position>,
    ) {
        let (normal_tx, normal_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let (emergency_tx, emergency_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let (status_tx, status_rx) = watch::channel(initial);
        (
            Self {
                normal_tx,
                emergency_tx,
                status_rx,
            },
            normal_rx,
            emergency_rx,
            status_tx,
        )
    }

    /// Requests an open per the gate-approved decision.
    ///
    /// # Errors
    /// Returns an error if the actor is gone.
    pub async fn open(&self, decision: Decision) -> Result<()> {
        self.normal_tx
            .send(PositionCommand::Open(Box::new(decision)))
            .await?;
        Ok(())
    }

    /// Requests a stop adjustment per the gate-approved decision.
    ///
    /// # Errors
    /// Returns an error if the actor is gone.
    pub async fn adjust_stops(&self, decision: Decision) -> Result<()> {
        self.normal_tx
            .send(PositionCommand::AdjustStops(Box::new(decision)))
            .await?;
        Ok(())
    }

    /// Requests a normal close.
    ///
    /// # Errors
    /// Returns an error if the actor is gone.
    pub async fn close(&self, reason: CloseReason) -> Result<()> {
        self.normal_tx
            .send(PositionCommand::Close { reason })
            .await?;
        Ok(())
    }

    /// Issues an emergency close; pre-empts any queued or in-flight normal
    /// transition.
    ///
    /// # Errors
    /// Returns an error if the actor is gone.
    pub async fn emergency(&self, reason: EmergencyReason) -> Result<()> {
        self.emergency_tx.send(reason).await?;
        Ok(())
    }

    /// Last published position state. Never blocks, even while a
    /// transition is awaiting external confirmation.
    #[must_use]
    pub fn status(&self) -> Position {
        self.status_rx.borrow().clone()
    }

    /// Reads the closed-trade summary.
    ///
    /// # Errors
    /// Returns an error if the actor is gone.
    pub async fn history(&self) -> Result<HistorySummary> {
        let (tx, rx) = oneshot::channel();
        self.normal_tx.send(PositionCommand::History(tx)).await?;
        Ok(rx.await?)
    }

    /// Asks the actor to drain any in-flight transition and stop.
    ///
    /// # Errors
    /// Returns an error if the actor is gone.
    pub async fn shutdown(&self) -> Result<()> {
        self.normal_tx.send(PositionCommand::Shutdown).await?;
        Ok(())
    }
}
