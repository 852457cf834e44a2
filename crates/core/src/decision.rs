//! The aggregator's resolved output for one decision cycle.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::position::Side;
use crate::signal::{Direction, Signal};

/// The single action resolved for a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionAction {
    OpenLong,
    OpenShort,
    Close,
    AdjustStops,
    Hold,
}

impl DecisionAction {
    /// Returns true for actions that create new exposure.
    #[must_use]
    pub const fn is_opening(self) -> bool {
        matches!(self, Self::OpenLong | Self::OpenShort)
    }

    /// Returns true for actions that must carry resolved price levels.
    #[must_use]
    pub const fn requires_levels(self) -> bool {
        matches!(self, Self::OpenLong | Self::OpenShort | Self::AdjustStops)
    }

    /// The side opened by this action, if any.
    #[must_use]
    pub const fn opens_side(self) -> Option<Side> {
        match self {
            Self::OpenLong => Some(Side::Long),
            Self::OpenShort => Some(Side::Short),
            _ => None,
        }
    }
}

/// Audit entry for one signal considered during aggregation.
///
/// Stale signals are recorded with `stale: true` and excluded from the vote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContributingSignal {
    pub source_id: String,
    pub direction: Direction,
    pub confidence: f64,
    pub trust_weight: f64,
    pub stale: bool,
    pub timestamp: DateTime<Utc>,
}

impl ContributingSignal {
    /// Builds an audit entry from a signal and its configured trust weight.
    #[must_use]
    pub fn from_signal(signal: &Signal, trust_weight: f64, stale: bool) -> Self {
        Self {
            source_id: signal.source_id.clone(),
            direction: signal.direction,
            confidence: signal.confidence,
            trust_weight,
            stale,
            timestamp: signal.timestamp,
        }
    }
}

/// The aggregator's output for one cycle.
///
/// Deterministic: identical contributing signals and configuration always
/// produce an identical decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub action: DecisionAction,
    /// Aggregate confidence in [0.0, 1.0].
    pub confidence: f64,
    /// Resolved entry price; required when the action opens a position.
    pub entry_price: Option<Decimal>,
    /// Resolved stop-loss; required for open/adjust actions.
    pub stop_loss: Option<Decimal>,
    /// Resolved take-profit; required for open/adjust actions.
    pub take_profit: Option<Decimal>,
    /// Quantity to open; zero for non-opening actions.
    pub size: Decimal,
    /// Ordered audit trail of the signals considered.
    pub contributing: Vec<ContributingSignal>,
    /// True when the cycle ran without any usable signal.
    pub degraded: bool,
    pub generated_at: DateTime<Utc>,
}

impl Decision {
    /// A hold decision carrying the cycle's audit trail.
    #[must_use]
    pub fn hold(
        generated_at: DateTime<Utc>,
        confidence: f64,
        contributing: Vec<ContributingSignal>,
        degraded: bool,
    ) -> Self {
        Self {
            action: DecisionAction::Hold,
            confidence,
            entry_price: None,
            stop_loss: None,
            take_profit: None,
            size: Decimal::ZERO,
            contributing,
            degraded,
            generated_at,
        }
    }

    /// Downgrades this decision to hold, keeping the audit trail.
    #[must_use]
    pub fn downgraded(mut self) -> Self {
        self.action = DecisionAction::Hold;
        self.entry_price = None;
        self.stop_loss = None;
        self.take_profit = None;
        self.size = Decimal::ZERO;
        self
    }
}
