//! Risk gate: the validation layer between the aggregator and the position
//! state machine.
//!
//! Opening and stop-adjusting decisions are checked against the configured
//! account limits. A rejection downgrades the action to hold and records the
//! reason; the gate never raises a decision to a more aggressive action.

use rust_decimal::Decimal;

use quorum_trade_core::{Decision, DecisionAction, Position, RiskConfig, Side};

/// Outcome of a gate review: the (possibly downgraded) decision plus the
/// rejection reason when one applies.
#[derive(Debug, Clone)]
pub struct GateReport {
    pub decision: Decision,
    pub rejection: Option<String>,
}

impl GateReport {
    fn approved(decision: Decision) -> Self {
        Self {
            decision,
            rejection: None,
        }
    }

    fn rejected(decision: Decision, reason: String) -> Self {
        tracing::info!("risk gate downgraded decision to hold: {reason}");
        Self {
            decision: decision.downgraded(),
            rejection: Some(reason),
        }
    }
}

/// Validates decisions against account and position limits.
pub struct RiskGate {
    risk: RiskConfig,
}

impl RiskGate {
    #[must_use]
    pub fn new(risk: RiskConfig) -> Self {
        Self { risk }
    }

    /// Reviews a decision before it reaches the position state machine.
    ///
    /// Only opening and stop-adjusting actions are gated; close and hold
    /// pass through untouched.
    #[must_use]
    pub fn review(&self, decision: Decision, position: &Position) -> GateReport {
        match decision.action {
            DecisionAction::OpenLong | DecisionAction::OpenShort => {
                self.review_open(decision, position)
            }
            DecisionAction::AdjustStops => self.review_adjust(decision, position),
            DecisionAction::Close | DecisionAction::Hold => GateReport::approved(decision),
        }
    }

    fn review_open(&self, decision: Decision, position: &Position) -> GateReport {
        if decision.confidence < self.risk.min_confidence_to_open {
            let reason = format!(
                "confidence {:.2} below minimum {:.2}",
                decision.confidence, self.risk.min_confidence_to_open
            );
            return GateReport::rejected(decision, reason);
        }

        if decision.size <= Decimal::ZERO {
            return GateReport::rejected(decision, "no position headroom available".to_string());
        }

        let resulting = position.size + decision.size;
        if resulting > self.risk.max_position {
            return GateReport::rejected(
                decision,
                format!(
                    "resulting size {resulting} exceeds max_position {}",
                    self.risk.max_position
                ),
            );
        }

        let (Some(entry), Some(stop_loss), Some(take_profit)) =
            (decision.entry_price, decision.stop_loss, decision.take_profit)
        else {
            return GateReport::rejected(
                decision,
                "opening decision is missing resolved levels".to_string(),
            );
        };

        let side = decision
            .action
            .opens_side()
            .expect("open actions carry a side");
        if let Err(reason) = levels_consistent(side, entry, stop_loss, take_profit) {
            return GateReport::rejected(decision, reason);
        }

        if let Err(reason) = self.stop_within_liquidation_margin(entry, stop_loss) {
            return GateReport::rejected(decision, reason);
        }

        GateReport::approved(decision)
    }

    fn review_adjust(&self, decision: Decision, position: &Position) -> GateReport {
        if position.side == Side::None {
            return GateReport::rejected(
                decision,
                "adjust_stops with no open position".to_string(),
            );
        }

        // Adjust never grows exposure; a size component that would breach
        // the cap is rejected outright.
        if position.size + decision.size > self.risk.max_position {
            return GateReport::rejected(
                decision,
                format!(
                    "adjustment size would exceed max_position {}",
                    self.risk.max_position
                ),
            );
        }

        let (Some(stop_loss), Some(take_profit)) = (decision.stop_loss, decision.take_profit)
        else {
            return GateReport::rejected(
                decision,
                "adjust_stops decision is missing levels".to_string(),
            );
        };

        let Some(entry) = position.entry_price else {
            return GateReport::rejected(
                decision,
                "adjust_stops with unknown entry price".to_string(),
            );
        };

        if let Err(reason) = levels_consistent(position.side, entry, stop_loss, take_profit) {
            return GateReport::rejected(decision, reason);
        }

        if let Err(reason) = self.stop_within_liquidation_margin(entry, stop_loss) {
            return GateReport::rejected(decision, reason);
        }

        GateReport::approved(decision)
    }

    /// The stop must trigger well before the leverage-implied liquidation
    /// price: its distance may use at most `1 - liquidation_safety_margin`
    /// of the liquidation distance.
    fn stop_within_liquidation_margin(
        &self,
        entry: Decimal,
        stop_loss: Decimal,
    ) -> Result<(), String> {
        if entry <= Decimal::ZERO {
            return Err("entry price must be positive".to_string());
        }
        let stop_distance = ((entry - stop_loss).abs() / entry)
            .to_string()
            .parse::<f64>()
            .unwrap_or(f64::MAX);
        let liquidation_distance = 1.0 / f64::from(self.risk.leverage.max(1));
        let allowed = liquidation_distance * (1.0 - self.risk.liquidation_safety_margin);
        if stop_distance > allowed {
            return Err(format!(
                "stop distance {:.1}% is inside the liquidation safety margin \
                 (max {:.1}% at {}x leverage)",
                stop_distance * 100.0,
                allowed * 100.0,
                self.risk.leverage
            ));
        }
        Ok(())
    }
}

/// Stops must bracket the entry on the correct sides.
fn levels_consistent(
    side: Side,
    entry: Decimal,
    stop_loss: Decimal,
    take_profit: Decimal,
) -> Result<(), String> {
    let ok = match side {
        Side::Long => stop_loss < entry && entry < take_profit,
        Side::Short => take_profit < entry && entry < stop_loss,
        Side::None => false,
    };
    if ok {
        Ok(())
    } else {
        Err(format!(
            "levels inconsistent for {side:?}: stop {stop_loss}, entry {entry}, take {take_profit}"
        ))
    }
}
