//! Audit trail record types.
//!
//! Every decision cycle and every applied position transition produces one
//! record for the append-only audit sink.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decision::Decision;
use crate::position::PositionState;

/// One decision cycle, including the risk gate's verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub pair: String,
    pub decision: Decision,
    /// Reason the risk gate downgraded the decision, if it did.
    pub rejection: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl DecisionRecord {
    #[must_use]
    pub fn new(pair: impl Into<String>, decision: Decision, rejection: Option<String>) -> Self {
        Self {
            pair: pair.into(),
            decision,
            rejection,
            recorded_at: Utc::now(),
        }
    }
}

/// One applied position transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub pair: String,
    pub from: PositionState,
    pub to: PositionState,
    /// Human-readable trigger ("decision", "stop_loss", an emergency
    /// reason, "stale confirmation discarded", ...).
    pub reason: String,
    pub recorded_at: DateTime<Utc>,
}

impl TransitionRecord {
    #[must_use]
    pub fn new(
        pair: impl Into<String>,
        from: PositionState,
        to: PositionState,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            pair: pair.into(),
            from,
            to,
            reason: reason.into(),
            recorded_at: Utc::now(),
        }
    }
}
