//! Signal types shared by every signal source.
//!
//! A [`Signal`] is one source's timestamped opinion about market direction,
//! confidence, and (optionally) entry/stop/take-profit levels. Signals are
//! immutable once produced; staleness is derived from the timestamp at
//! aggregation time.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Direction of a trading opinion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Bullish - expect price to go up.
    Long,
    /// Bearish - expect price to go down.
    Short,
    /// No directional bias.
    Flat,
}

impl Direction {
    /// Returns the opposite direction.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Long => Self::Short,
            Self::Short => Self::Long,
            Self::Flat => Self::Flat,
        }
    }

    /// Returns true if this direction has a directional bias.
    #[must_use]
    pub const fn is_directional(self) -> bool {
        !matches!(self, Self::Flat)
    }
}

/// One source's timestamped opinion for a single aggregation cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    /// Identity of the producing source (e.g. "technical", "risk_reviewer").
    pub source_id: String,
    /// Production time.
    pub timestamp: DateTime<Utc>,
    /// Proposed market direction.
    pub direction: Direction,
    /// Normalized confidence in [0.0, 1.0].
    pub confidence: f64,
    /// Proposed entry price, if the source opines on levels.
    #[serde(default)]
    pub entry: Option<Decimal>,
    /// Proposed stop-loss price.
    #[serde(default)]
    pub stop_loss: Option<Decimal>,
    /// Proposed take-profit price.
    #[serde(default)]
    pub take_profit: Option<Decimal>,
    /// Opaque explanatory text. Logged, never interpreted.
    #[serde(default)]
    pub rationale: String,
}

impl Signal {
    /// Creates a new signal with confidence validation.
    ///
    /// # Errors
    /// Returns an error if `confidence` is outside [0.0, 1.0].
    pub fn new(
        source_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        direction: Direction,
        confidence: f64,
    ) -> Result<Self> {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(EngineError::invariant(format!(
                "confidence must be in [0.0, 1.0], got {confidence}"
            )));
        }
        Ok(Self {
            source_id: source_id.into(),
            timestamp,
            direction,
            confidence,
            entry: None,
            stop_loss: None,
            take_profit: None,
            rationale: String::new(),
        })
    }

    /// Sets proposed price levels. Any of them may be absent.
    #[must_use]
    pub fn with_levels(
        mut self,
        entry: Option<Decimal>,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
    ) -> Self {
        self.entry = entry;
        self.stop_loss = stop_loss;
        self.take_profit = take_profit;
        self
    }

    /// Attaches explanatory text.
    #[must_use]
    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = rationale.into();
        self
    }

    /// Returns true if the source proposed at least one price level.
    #[must_use]
    pub fn proposes_levels(&self) -> bool {
        self.entry.is_some() || self.stop_loss.is_some() || self.take_profit.is_some()
    }

    /// Age of the signal relative to `now`.
    #[must_use]
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.timestamp
    }

    /// Staleness check against the producing source's refresh cadence.
    ///
    /// A signal older than `staleness_factor` times the source's refresh
    /// interval is excluded from aggregation.
    #[must_use]
    pub fn is_stale(
        &self,
        now: DateTime<Utc>,
        refresh_interval: Duration,
        staleness_factor: f64,
    ) -> bool {
        let budget_secs = refresh_interval.num_milliseconds() as f64 / 1000.0 * staleness_factor;
        self.age(now).num_milliseconds() as f64 / 1000.0 > budget_secs
    }
}
