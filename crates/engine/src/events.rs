//! Broadcast events for observers (CLI display, operator reporting).
//!
//! The audit sink is the durable trail; these events are the live feed.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use quorum_trade_core::{Decision, PositionState};

/// Events emitted by the engine while it runs.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A decision cycle completed, after the risk gate.
    DecisionMade {
        decision: Decision,
        rejection: Option<String>,
    },
    /// A position transition was applied.
    TransitionApplied {
        from: PositionState,
        to: PositionState,
        reason: String,
    },
    /// The emergency monitor fired.
    EmergencyTriggered { reason: String },
    /// The live price crossed a protective level.
    ProtectiveStop { reason: String, price: Decimal },
    /// An execution step failed after bounded retries.
    ExecutionFailed { op: String, error: String },
    /// A confirmation arrived for a transition that an emergency had
    /// already pre-empted; it was discarded.
    StaleConfirmationDiscarded { op: String },
    /// Operator-facing error outside the normal degrade paths.
    Error {
        message: String,
        timestamp: DateTime<Utc>,
    },
}
