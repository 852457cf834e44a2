//! Confidence-weighted signal aggregation.
//!
//! Produces exactly one [`Decision`] per cycle from the latest available
//! signal of each configured source. Direction is a confidence-weighted
//! majority vote over non-stale signals with ties broken toward flat;
//! aggregate confidence is the trust-weighted mean of contributing
//! confidences. Given the same inputs the decision is always identical.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

use quorum_trade_core::{
    ContributingSignal, Decision, DecisionAction, Direction, Position, PositionState, RiskConfig,
    Side, Signal, SourceConfig,
};

/// Aggregation-relevant settings of one configured source.
#[derive(Debug, Clone)]
pub struct SourceProfile {
    pub trust_weight: f64,
    pub refresh: Duration,
    pub staleness_factor: f64,
}

impl From<&SourceConfig> for SourceProfile {
    fn from(cfg: &SourceConfig) -> Self {
        Self {
            trust_weight: cfg.trust_weight,
            refresh: Duration::seconds(cfg.refresh_secs as i64),
            staleness_factor: cfg.staleness_factor,
        }
    }
}

/// Merges per-source opinions into a single actionable decision.
pub struct SignalAggregator {
    profiles: HashMap<String, SourceProfile>,
    risk: RiskConfig,
}

impl SignalAggregator {
    #[must_use]
    pub fn new(risk: RiskConfig, sources: &[SourceConfig]) -> Self {
        let profiles = sources
            .iter()
            .map(|cfg| (cfg.id.clone(), SourceProfile::from(cfg)))
            .collect();
        Self { profiles, risk }
    }

    /// Produces the decision for one cycle.
    ///
    /// `mark_price` is the live price if the feed answered this cycle; when
    /// it is absent the aggregator never guesses a level and falls back to
    /// holding.
    #[must_use]
    pub fn aggregate(
        &self,
        signals: &[Signal],
        position: &Position,
        mark_price: Option<Decimal>,
        now: DateTime<Utc>,
    ) -> Decision {
        // Deterministic processing order regardless of book iteration.
        let mut ordered: Vec<&Signal> = signals.iter().collect();
        ordered.sort_by(|a, b| a.source_id.cmp(&b.source_id));

        let mut contributing = Vec::with_capacity(ordered.len());
        let mut fresh: Vec<(&Signal, f64)> = Vec::with_capacity(ordered.len());

        for signal in ordered {
            match self.profiles.get(&signal.source_id) {
                Some(profile) => {
                    let stale =
                        signal.is_stale(now, profile.refresh, profile.staleness_factor);
                    contributing.push(ContributingSignal::from_signal(
                        signal,
                        profile.trust_weight,
                        stale,
                    ));
                    if !stale {
                        fresh.push((signal, profile.trust_weight));
                    }
                }
                None => {
                    // Unconfigured sources carry no trust and never vote.
                    tracing::warn!(
                        "signal from unconfigured source '{}' excluded",
                        signal.source_id
                    );
                    contributing.push(ContributingSignal::from_signal(signal, 0.0, true));
                }
            }
        }

        if fresh.is_empty() {
            tracing::warn!("decision cycle degraded: no usable signal");
            return Decision::hold(now, 0.0, contributing, true);
        }

        let (direction, confidence) = Self::vote(&fresh);

        match position.state {
            PositionState::Flat => {
                self.decide_flat(direction, confidence, &fresh, mark_price, contributing, now)
            }
            PositionState::Open => {
                self.decide_open(position, direction, confidence, &fresh, contributing, now)
            }
            // A transition is already in flight; the cycle stands down.
            PositionState::Opening | PositionState::Closing | PositionState::EmergencyClosing => {
                Decision::hold(now, confidence, contributing, false)
            }
        }
    }

    /// Confidence-weighted majority vote. Ties resolve toward flat.
    fn vote(fresh: &[(&Signal, f64)]) -> (Direction, f64) {
        let mut long_votes = 0.0;
        let mut short_votes = 0.0;
        let mut weighted_confidence = 0.0;
        let mut total_trust = 0.0;

        for (signal, trust) in fresh {
            let vote = trust * signal.confidence;
            match signal.direction {
                Direction::Long => long_votes += vote,
                Direction::Short => short_votes += vote,
                Direction::Flat => {}
            }
            weighted_confidence += trust * signal.confidence;
            total_trust += trust;
        }

        let direction = if long_votes > short_votes {
            Direction::Long
        } else if short_votes > long_votes {
            Direction::Short
        } else {
            Direction::Flat
        };
        let confidence = if total_trust > 0.0 {
            (weighted_confidence / total_trust).clamp(0.0, 1.0)
        } else {
            0.0
        };
        (direction, confidence)
    }

    fn decide_flat(
        &self,
        direction: Direction,
        confidence: f64,
        fresh: &[(&Signal, f64)],
        mark_price: Option<Decimal>,
        contributing: Vec<ContributingSignal>,
        now: DateTime<Utc>,
    ) -> Decision {
        if !direction.is_directional() || confidence < self.risk.min_confidence_to_open {
            return Decision::hold(now, confidence, contributing, false);
        }

        let Some((entry, stop_loss, take_profit)) =
            self.resolve_open_levels(direction, fresh, mark_price)
        else {
            tracing::warn!("holding: no price available to resolve entry levels");
            return Decision::hold(now, confidence, contributing, false);
        };

        let size = crate::sizing::confidence_scaled_size(
            self.risk.position_size,
            confidence,
            self.risk.max_position,
            Decimal::ZERO,
        );

        Decision {
            action: match direction {
                Direction::Long => DecisionAction::OpenLong,
                Direction::Short => DecisionAction::OpenShort,
                Direction::Flat => unreachable!("directional checked above"),
            },
            confidence,
            entry_price: Some(entry),
            stop_loss: Some(stop_loss),
            take_profit: Some(take_profit),
            size,
            contributing,
            degraded: false,
            generated_at: now,
        }
    }

    fn decide_open(
        &self,
        position: &Position,
        direction: Direction,
        confidence: f64,
        fresh: &[(&Signal, f64)],
        contributing: Vec<ContributingSignal>,
        now: DateTime<Utc>,
    ) -> Decision {
        let held_direction = match position.side {
            Side::Long => Direction::Long,
            Side::Short => Direction::Short,
            Side::None => Direction::Flat,
        };

        // Reversal closes; reopening the other way is always a later cycle.
        if direction.is_directional()
            && direction == held_direction.opposite()
            && confidence >= self.risk.min_confidence_to_open
        {
            return Decision {
                action: DecisionAction::Close,
                confidence,
                entry_price: None,
                stop_loss: None,
                take_profit: None,
                size: Decimal::ZERO,
                contributing,
                degraded: false,
                generated_at: now,
            };
        }

        // Same-direction opinions may tighten stops, but only when a source
        // actually proposed levels; stops are never re-synthesized from
        // percentages on a live position.
        if direction == held_direction {
            if let Some(proposer) = Self::best_level_proposer(fresh) {
                let stop_loss = proposer.stop_loss.or(position.stop_loss);
                let take_profit = proposer.take_profit.or(position.take_profit);
                if let (Some(stop_loss), Some(take_profit)) = (stop_loss, take_profit) {
                    let unchanged = position.stop_loss == Some(stop_loss)
                        && position.take_profit == Some(take_profit);
                    if !unchanged {
                        return Decision {
                            action: DecisionAction::AdjustStops,
                            confidence,
                            entry_price: position.entry_price,
                            stop_loss: Some(stop_loss),
                            take_profit: Some(take_profit),
                            size: Decimal::ZERO,
                            contributing,
                            degraded: false,
                            generated_at: now,
                        };
                    }
                }
            }
        }

        Decision::hold(now, confidence, contributing, false)
    }

    /// Resolves entry/stop/take-profit for an opening action.
    ///
    /// Levels come from the highest-trust fresh source that proposed any;
    /// whatever is missing is derived from the configured percentage
    /// defaults around the entry (which itself defaults to the mark price).
    fn resolve_open_levels(
        &self,
        direction: Direction,
        fresh: &[(&Signal, f64)],
        mark_price: Option<Decimal>,
    ) -> Option<(Decimal, Decimal, Decimal)> {
        let proposer = Self::best_level_proposer(fresh);
        let entry = proposer.and_then(|s| s.entry).or(mark_price)?;

        let stop_pct = Decimal::try_from(self.risk.stop_loss_pct / 100.0).ok()?;
        let take_pct = Decimal::try_from(self.risk.take_profit_pct / 100.0).ok()?;
        let (default_stop, default_take) = match direction {
            Direction::Long => (
                entry * (Decimal::ONE - stop_pct),
                entry * (Decimal::ONE + take_pct),
            ),
            Direction::Short => (
                entry * (Decimal::ONE + stop_pct),
                entry * (Decimal::ONE - take_pct),
            ),
            Direction::Flat => return None,
        };

        let stop_loss = proposer.and_then(|s| s.stop_loss).unwrap_or(default_stop);
        let take_profit = proposer.and_then(|s| s.take_profit).unwrap_or(default_take);
        Some((entry, stop_loss, take_profit))
    }

    /// The highest-trust fresh signal proposing at least one level.
    fn best_level_proposer<'a>(fresh: &[(&'a Signal, f64)]) -> Option<&'a Signal> {
        fresh
            .iter()
            .filter(|(signal, _)| signal.proposes_levels())
            .max_by(|(a, wa), (b, wb)| {
                wa.partial_cmp(wb)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    // Deterministic winner among equal trust weights.
                    .then_with(|| b.source_id.cmp(&a.source_id))
            })
            .map(|(signal, _)| *signal)
    }
}
