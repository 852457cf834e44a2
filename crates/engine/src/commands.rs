//! Commands accepted by the position actor.
//!
//! Normal transitions queue in arrival order on one channel; emergency
//! transitions travel on a separate channel that the actor polls first.

use std::fmt;

use tokio::sync::oneshot;

use quorum_trade_core::{Decision, RiskFlag};

use crate::history::HistorySummary;

/// Why a normal close was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The aggregator decided to close (typically a reversal).
    Decision,
    /// Live price crossed the stop-loss level.
    StopLoss,
    /// Live price crossed the take-profit level.
    TakeProfit,
    /// Engine shutdown drains open exposure.
    Shutdown,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Decision => "decision",
            Self::StopLoss => "stop_loss",
            Self::TakeProfit => "take_profit",
            Self::Shutdown => "shutdown",
        };
        f.write_str(s)
    }
}

/// Abnormal-market trigger behind an emergency close.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EmergencyReason {
    /// Price moved more than the configured percentage inside the short
    /// window.
    AbruptPriceMove { change_pct: f64 },
    /// Unrealized loss exceeded the configured fraction of notional.
    DrawdownExceeded { loss_fraction: f64 },
    /// Short-window volatility exceeded the configured threshold.
    VolatilitySpike { volatility: f64 },
    /// The market data feed went missing or contradictory while exposure
    /// was open.
    FeedAnomaly { consecutive_gaps: u32 },
}

impl EmergencyReason {
    /// The risk flag recorded on the position for this trigger.
    #[must_use]
    pub const fn risk_flag(&self) -> RiskFlag {
        match self {
            Self::AbruptPriceMove { .. } => RiskFlag::AbruptPriceMove,
            Self::DrawdownExceeded { .. } => RiskFlag::DrawdownExceeded,
            Self::VolatilitySpike { .. } => RiskFlag::HighVolatility,
            Self::FeedAnomaly { .. } => RiskFlag::FeedAnomaly,
        }
    }
}

impl fmt::Display for EmergencyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AbruptPriceMove { change_pct } => {
                write!(f, "abrupt price move of {change_pct:.2}%")
            }
            Self::DrawdownExceeded { loss_fraction } => {
                write!(f, "unrealized loss at {:.1}% of notional", loss_fraction * 100.0)
            }
            Self::VolatilitySpike { volatility } => {
                write!(f, "volatility spike at {volatility:.2}")
            }
            Self::FeedAnomaly { consecutive_gaps } => {
                write!(f, "market data anomaly ({consecutive_gaps} consecutive gaps)")
            }
        }
    }
}

/// A request against the position state machine.
#[derive(Debug)]
pub enum PositionCommand {
    /// Open a position per the (gate-approved) decision.
    Open(Box<Decision>),
    /// Replace protective stops per the decision.
    AdjustStops(Box<Decision>),
    /// Close the open position.
    Close { reason: CloseReason },
    /// Summary of closed trades so far.
    History(oneshot::Sender<HistorySummary>),
    /// Drain any in-flight transition and stop the actor.
    Shutdown,
}
