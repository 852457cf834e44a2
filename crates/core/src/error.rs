//! Error taxonomy for the trading engine.
//!
//! Local, recoverable conditions (a single source failing, a transient feed
//! gap) degrade the current cycle; execution failures and invariant
//! violations are surfaced to the operator. `RiskRejected` is a verdict, not
//! a failure.

use thiserror::Error;

/// Errors produced by the engine core and its collaborators.
#[derive(Debug, Error)]
pub enum EngineError {
    /// One signal source failed this cycle; the cycle continues without it.
    #[error("signal source '{source_id}' unavailable: {reason}")]
    SourceUnavailable {
        /// Identity of the failing source.
        source_id: String,
        /// What went wrong.
        reason: String,
    },

    /// Market data could not be obtained.
    #[error("market data feed unavailable: {0}")]
    FeedUnavailable(String),

    /// An order placement/close/adjust step failed.
    #[error("execution '{op}' failed: {reason}")]
    Execution {
        /// The operation that failed ("open", "close", "adjust").
        op: String,
        /// What went wrong.
        reason: String,
        /// Whether retrying can reasonably succeed.
        retryable: bool,
    },

    /// The risk gate downgraded a decision to hold. Deliberate, always logged.
    #[error("risk gate rejected decision: {reason}")]
    RiskRejected {
        /// Why the decision was downgraded.
        reason: String,
    },

    /// A state-machine invariant was violated. Fatal to the current cycle.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// Bad or missing configuration.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl EngineError {
    /// Creates a source-unavailable error.
    pub fn source_unavailable(source: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            source_id: source.into(),
            reason: reason.into(),
        }
    }

    /// Creates a feed-unavailable error.
    pub fn feed_unavailable(reason: impl Into<String>) -> Self {
        Self::FeedUnavailable(reason.into())
    }

    /// Creates an execution error.
    pub fn execution(op: impl Into<String>, reason: impl Into<String>, retryable: bool) -> Self {
        Self::Execution {
            op: op.into(),
            reason: reason.into(),
            retryable,
        }
    }

    /// Creates a risk-rejection verdict.
    pub fn risk_rejected(reason: impl Into<String>) -> Self {
        Self::RiskRejected {
            reason: reason.into(),
        }
    }

    /// Creates an invariant-violation error.
    pub fn invariant(reason: impl Into<String>) -> Self {
        Self::InvariantViolation(reason.into())
    }

    /// Creates a configuration error.
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration(reason.into())
    }

    /// Returns true if the operation may succeed on retry.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::SourceUnavailable { .. } | Self::FeedUnavailable(_) => true,
            Self::Execution { retryable, .. } => *retryable,
            Self::RiskRejected { .. } | Self::InvariantViolation(_) | Self::Configuration(_) => {
                false
            }
        }
    }
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_unavailable_is_transient() {
        let err = EngineError::source_unavailable("sentiment", "connection refused");
        assert!(err.is_transient());
        assert!(err.to_string().contains("sentiment"));
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn feed_unavailable_is_transient() {
        let err = EngineError::feed_unavailable("timeout");
        assert!(err.is_transient());
    }

    #[test]
    fn execution_transience_follows_retryable_flag() {
        assert!(EngineError::execution("open", "503 from exchange", true).is_transient());
        assert!(!EngineError::execution("open", "insufficient margin", false).is_transient());
    }

    #[test]
    fn risk_rejection_is_not_transient() {
        let err = EngineError::risk_rejected("size exceeds max_position");
        assert!(!err.is_transient());
        assert!(err.to_string().contains("max_position"));
    }

    #[test]
    fn invariant_violation_is_not_transient() {
        let err = EngineError::invariant("two concurrent transitions");
        assert!(!err.is_transient());
    }

    #[test]
    fn execution_error_display_names_operation() {
        let err = EngineError::execution("adjust", "rejected", false);
        let display = err.to_string();
        assert!(display.contains("adjust"));
        assert!(display.contains("rejected"));
    }
}
