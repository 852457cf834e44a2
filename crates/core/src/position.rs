//! The authoritative trading position.
//!
//! Exactly one [`Position`] exists per configured trading pair. All state
//! transitions are validated here and invoked only by the position actor,
//! which serializes mutation. An illegal edge returns
//! [`EngineError::InvariantViolation`] and leaves the position untouched.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Lifecycle state of the position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionState {
    /// No exposure.
    Flat,
    /// Open order submitted, awaiting execution confirmation.
    Opening,
    /// Confirmed exposure, monitored.
    Open,
    /// Close order submitted, awaiting execution confirmation.
    Closing,
    /// Emergency close in progress; pre-empts any other transition.
    EmergencyClosing,
}

/// Side of the exposure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Long,
    Short,
    #[default]
    None,
}

impl Side {
    /// Returns true if this side profits from the given price move.
    #[must_use]
    pub const fn is_directional(self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Active risk warnings carried by the position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskFlag {
    HighVolatility,
    AbruptPriceMove,
    DrawdownExceeded,
    FeedAnomaly,
    ExecutionFailed,
    UnconfirmedAtShutdown,
}

/// Risk grading of an open position, from unrealized PnL and distance to
/// the estimated liquidation price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Safe,
    Low,
    Medium,
    High,
    Extreme,
}

/// The live trading exposure tracked by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    /// Trading pair this position belongs to.
    pub pair: String,
    /// Lifecycle state.
    pub state: PositionState,
    /// Side of the exposure; `None` while flat.
    pub side: Side,
    /// Non-negative quantity.
    pub size: Decimal,
    /// Confirmed (or requested, while opening) entry price.
    pub entry_price: Option<Decimal>,
    /// Protective stop-loss level.
    pub stop_loss: Option<Decimal>,
    /// Take-profit level.
    pub take_profit: Option<Decimal>,
    /// When the position was confirmed open.
    pub opened_at: Option<DateTime<Utc>>,
    /// When stops were last adjusted.
    pub last_adjusted_at: Option<DateTime<Utc>>,
    /// Currently active risk warnings.
    pub risk_flags: BTreeSet<RiskFlag>,
}

impl Position {
    /// Creates a flat position for the given pair.
    #[must_use]
    pub fn flat(pair: impl Into<String>) -> Self {
        Self {
            pair: pair.into(),
            state: PositionState::Flat,
            side: Side::None,
            size: Decimal::ZERO,
            entry_price: None,
            stop_loss: None,
            take_profit: None,
            opened_at: None,
            last_adjusted_at: None,
            risk_flags: BTreeSet::new(),
        }
    }

    /// Returns true when there is no exposure and no transition in flight.
    #[must_use]
    pub fn is_flat(&self) -> bool {
        self.state == PositionState::Flat
    }

    /// Position notional at the entry price, zero while flat.
    #[must_use]
    pub fn notional(&self) -> Decimal {
        match self.entry_price {
            Some(entry) => entry * self.size,
            None => Decimal::ZERO,
        }
    }

    /// Unrealized PnL at the given mark price.
    #[must_use]
    pub fn unrealized_pnl(&self, mark: Decimal) -> Decimal {
        let Some(entry) = self.entry_price else {
            return Decimal::ZERO;
        };
        match self.side {
            Side::Long => (mark - entry) * self.size,
            Side::Short => (entry - mark) * self.size,
            Side::None => Decimal::ZERO,
        }
    }

    /// Returns true if the mark price has crossed the stop-loss level.
    #[must_use]
    pub fn stop_hit(&self, mark: Decimal) -> bool {
        let Some(stop) = self.stop_loss else {
            return false;
        };
        match self.side {
            Side::Long => mark <= stop,
            Side::Short => mark >= stop,
            Side::None => false,
        }
    }

    /// Returns true if the mark price has crossed the take-profit level.
    #[must_use]
    pub fn take_profit_hit(&self, mark: Decimal) -> bool {
        let Some(take) = self.take_profit else {
            return false;
        };
        match self.side {
            Side::Long => mark >= take,
            Side::Short => mark <= take,
            Side::None => false,
        }
    }

    /// Grades the risk of the current exposure at the given mark price.
    ///
    /// Uses the leverage-implied liquidation distance (a position is
    /// liquidated when the adverse move consumes the margin, roughly
    /// `1/leverage` of the entry price).
    #[must_use]
    pub fn risk_level(&self, mark: Decimal, leverage: u8) -> RiskLevel {
        let Some(entry) = self.entry_price else {
            return RiskLevel::Safe;
        };
        if !self.side.is_directional() || entry.is_zero() || self.size.is_zero() {
            return RiskLevel::Safe;
        }

        let notional = self.notional();
        let pnl_pct = if notional.is_zero() {
            0.0
        } else {
            decimal_to_f64(self.unrealized_pnl(mark) / notional) * 100.0
        };

        let liq_fraction = Decimal::ONE / Decimal::from(leverage.max(1));
        let liquidation_price = match self.side {
            Side::Long => entry * (Decimal::ONE - liq_fraction),
            Side::Short => entry * (Decimal::ONE + liq_fraction),
            Side::None => entry,
        };
        let liquidation_distance_pct = if mark.is_zero() {
            0.0
        } else {
            decimal_to_f64((mark - liquidation_price).abs() / mark) * 100.0
        };

        if liquidation_distance_pct <= 5.0 {
            RiskLevel::Extreme
        } else if liquidation_distance_pct <= 10.0 {
            RiskLevel::High
        } else if pnl_pct < -10.0 {
            RiskLevel::Medium
        } else if pnl_pct < -5.0 {
            RiskLevel::Low
        } else {
            RiskLevel::Safe
        }
    }

    // ---- Transitions (invoked only by the position actor) ----

    /// `flat -> opening`: stage an open with the requested parameters.
    ///
    /// # Errors
    /// Returns an invariant violation unless the position is flat.
    pub fn begin_open(
        &mut self,
        side: Side,
        size: Decimal,
        entry: Decimal,
        stop_loss: Decimal,
        take_profit: Decimal,
    ) -> Result<()> {
        if self.state != PositionState::Flat {
            return Err(EngineError::invariant(format!(
                "begin_open from {:?}",
                self.state
            )));
        }
        if !side.is_directional() || size <= Decimal::ZERO {
            return Err(EngineError::invariant(
                "begin_open requires a directional side and positive size",
            ));
        }
        self.state = PositionState::Opening;
        self.side = side;
        self.size = size;
        self.entry_price = Some(entry);
        self.stop_loss = Some(stop_loss);
        self.take_profit = Some(take_profit);
        self.risk_flags.clear();
        Ok(())
    }

    /// `opening -> open`: the execution collaborator confirmed the fill.
    ///
    /// # Errors
    /// Returns an invariant violation unless the position is opening.
    pub fn confirm_open(&mut self, fill_price: Decimal, now: DateTime<Utc>) -> Result<()> {
        if self.state != PositionState::Opening {
            return Err(EngineError::invariant(format!(
                "confirm_open from {:?}",
                self.state
            )));
        }
        self.state = PositionState::Open;
        self.entry_price = Some(fill_price);
        self.opened_at = Some(now);
        Ok(())
    }

    /// `opening -> flat`: the open order failed; nothing was filled.
    ///
    /// # Errors
    /// Returns an invariant violation unless the position is opening.
    pub fn abort_open(&mut self) -> Result<()> {
        if self.state != PositionState::Opening {
            return Err(EngineError::invariant(format!(
                "abort_open from {:?}",
                self.state
            )));
        }
        let flags = std::mem::take(&mut self.risk_flags);
        *self = Self::flat(std::mem::take(&mut self.pair));
        self.risk_flags = flags;
        Ok(())
    }

    /// `open -> open`: update protective stops. Size never changes here.
    ///
    /// Re-applying identical levels only touches `last_adjusted_at`.
    ///
    /// # Errors
    /// Returns an invariant violation unless the position is open.
    pub fn apply_stops(
        &mut self,
        stop_loss: Decimal,
        take_profit: Decimal,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if self.state != PositionState::Open {
            return Err(EngineError::invariant(format!(
                "apply_stops from {:?}",
                self.state
            )));
        }
        self.stop_loss = Some(stop_loss);
        self.take_profit = Some(take_profit);
        self.last_adjusted_at = Some(now);
        Ok(())
    }

    /// `open -> closing`: stage a close.
    ///
    /// # Errors
    /// Returns an invariant violation unless the position is open.
    pub fn begin_close(&mut self) -> Result<()> {
        if self.state != PositionState::Open {
            return Err(EngineError::invariant(format!(
                "begin_close from {:?}",
                self.state
            )));
        }
        self.state = PositionState::Closing;
        Ok(())
    }

    /// `closing -> open`: the close order failed; exposure is unchanged.
    ///
    /// # Errors
    /// Returns an invariant violation unless the position is closing.
    pub fn abort_close(&mut self) -> Result<()> {
        if self.state != PositionState::Closing {
            return Err(EngineError::invariant(format!(
                "abort_close from {:?}",
                self.state
            )));
        }
        self.state = PositionState::Open;
        Ok(())
    }

    /// `closing -> flat`: the close was confirmed.
    ///
    /// # Errors
    /// Returns an invariant violation unless the position is closing.
    pub fn confirm_close(&mut self) -> Result<()> {
        if self.state != PositionState::Closing {
            return Err(EngineError::invariant(format!(
                "confirm_close from {:?}",
                self.state
            )));
        }
        self.reset_to_flat();
        Ok(())
    }

    /// `* -> emergency_closing`: unconditional pre-emption from any non-flat
    /// state. Records the trigger in `risk_flags`. Re-entrant: an emergency
    /// arriving while one is already in progress only adds its flag.
    ///
    /// # Errors
    /// Returns an invariant violation when the position is flat (nothing to
    /// close).
    pub fn begin_emergency(&mut self, flag: RiskFlag) -> Result<()> {
        if self.state == PositionState::Flat {
            return Err(EngineError::invariant("begin_emergency while flat"));
        }
        self.state = PositionState::EmergencyClosing;
        self.risk_flags.insert(flag);
        Ok(())
    }

    /// `emergency_closing -> flat`: the emergency close was confirmed.
    /// Risk flags are retained on the flat position for operator visibility
    /// until the next open clears them.
    ///
    /// # Errors
    /// Returns an invariant violation unless an emergency close is in
    /// progress.
    pub fn confirm_emergency(&mut self) -> Result<()> {
        if self.state != PositionState::EmergencyClosing {
            return Err(EngineError::invariant(format!(
                "confirm_emergency from {:?}",
                self.state
            )));
        }
        let flags = self.risk_flags.clone();
        self.reset_to_flat();
        self.risk_flags = flags;
        Ok(())
    }

    fn reset_to_flat(&mut self) {
        self.state = PositionState::Flat;
        self.side = Side::None;
        self.size = Decimal::ZERO;
        self.entry_price = None;
        self.stop_loss = None;
        self.take_profit = None;
        self.opened_at = None;
        self.last_adjusted_at = None;
        self.risk_flags.clear();
    }
}

fn decimal_to_f64(value: Decimal) -> f64 {
    value.to_string().parse::<f64>().unwrap_or(0.0)
}
