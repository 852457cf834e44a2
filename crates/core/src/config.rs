//! Static engine configuration, loaded once at startup and treated as
//! read-only by the core.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Trading pair the engine manages (exactly one position per pair).
    pub pair: String,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub emergency: EmergencyConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    /// Configured signal sources. The aggregator knows sources only by id,
    /// trust weight, and cadence.
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

/// Account and position risk limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Leverage multiplier applied by the account.
    pub leverage: u8,
    /// Base order quantity before confidence scaling.
    pub position_size: Decimal,
    /// Hard cap on absolute position size.
    pub max_position: Decimal,
    /// Default stop-loss distance, percent of entry.
    pub stop_loss_pct: f64,
    /// Default take-profit distance, percent of entry.
    pub take_profit_pct: f64,
    /// Minimum aggregate confidence required to open a position.
    pub min_confidence_to_open: f64,
    /// Fraction of the leverage-implied liquidation distance that stops must
    /// stay inside of. 0.2 means a stop may use at most 80% of the distance.
    pub liquidation_safety_margin: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            leverage: 5,
            position_size: Decimal::new(1, 2),  // 0.01
            max_position: Decimal::new(5, 2),   // 0.05
            stop_loss_pct: 2.0,
            take_profit_pct: 4.0,
            min_confidence_to_open: 0.5,
            liquidation_safety_margin: 0.2,
        }
    }
}

/// Cadence of the two engine-owned timers. Per-source refresh cadence lives
/// in [`SourceConfig`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Decision cycle interval (aggregate, gate, transition).
    pub decision_interval_secs: u64,
    /// Emergency check interval; the shortest cadence in the system.
    pub emergency_interval_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            decision_interval_secs: 900,
            emergency_interval_secs: 300,
        }
    }
}

/// Abnormal-market thresholds for the emergency monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmergencyConfig {
    /// Price change (percent, either direction) within the short window that
    /// triggers an emergency close.
    pub price_move_pct: f64,
    /// Length of the short observation window in seconds.
    pub price_window_secs: u64,
    /// Unrealized loss as a fraction of position notional that triggers an
    /// emergency close.
    pub max_drawdown: f64,
    /// Short-window volatility level that triggers an emergency close.
    pub volatility_threshold: f64,
    /// Consecutive failed price ticks tolerated before the feed is treated
    /// as anomalous.
    pub max_feed_gaps: u32,
}

impl Default for EmergencyConfig {
    fn default() -> Self {
        Self {
            price_move_pct: 3.0,
            price_window_secs: 300,
            max_drawdown: 0.15,
            volatility_threshold: 5.0,
            max_feed_gaps: 3,
        }
    }
}

/// Bounded retry policy for external execution calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_base_delay_ms: 500,
        }
    }
}

/// Audit sink settings. Absent path means audit records go to the log only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditConfig {
    pub path: Option<String>,
}

/// One configured signal source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Unique identity; also the role tag (e.g. "technical",
    /// "risk_reviewer", "final_decision").
    pub id: String,
    /// Per-role trust multiplier for aggregation.
    pub trust_weight: f64,
    /// Refresh cadence in seconds.
    pub refresh_secs: u64,
    /// Per-call timeout; a slow source never stalls the decision cycle.
    pub timeout_secs: u64,
    /// Signals older than this factor times the refresh interval are
    /// excluded from aggregation.
    pub staleness_factor: f64,
    /// Service endpoint for service-backed sources.
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl SourceConfig {
    /// A source entry with the default cadence and trust.
    #[must_use]
    pub fn named(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            trust_weight: 1.0,
            refresh_secs: 60,
            timeout_secs: 10,
            staleness_factor: 2.0,
            endpoint: None,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            pair: "BTCUSDT".to_string(),
            risk: RiskConfig::default(),
            schedule: ScheduleConfig::default(),
            emergency: EmergencyConfig::default(),
            execution: ExecutionConfig::default(),
            audit: AuditConfig::default(),
            sources: vec![
                SourceConfig {
                    trust_weight: 1.0,
                    ..SourceConfig::named("technical")
                },
                SourceConfig {
                    trust_weight: 1.0,
                    ..SourceConfig::named("sentiment")
                },
                SourceConfig {
                    trust_weight: 1.5,
                    ..SourceConfig::named("risk_reviewer")
                },
            ],
        }
    }
}

impl AppConfig {
    /// Validates the configuration before the engine starts.
    ///
    /// # Errors
    /// Returns a configuration error naming the first violated constraint.
    pub fn validate(&self) -> Result<()> {
        if self.pair.is_empty() {
            return Err(EngineError::configuration("pair must not be empty"));
        }
        if self.risk.leverage == 0 {
            return Err(EngineError::configuration("leverage must be at least 1"));
        }
        if self.risk.position_size <= Decimal::ZERO {
            return Err(EngineError::configuration("position_size must be positive"));
        }
        if self.risk.max_position < self.risk.position_size {
            return Err(EngineError::configuration(
                "max_position must be at least position_size",
            ));
        }
        if !(0.0..=1.0).contains(&self.risk.min_confidence_to_open) {
            return Err(EngineError::configuration(
                "min_confidence_to_open must be in [0.0, 1.0]",
            ));
        }
        if self.risk.stop_loss_pct <= 0.0 || self.risk.take_profit_pct <= 0.0 {
            return Err(EngineError::configuration(
                "stop_loss_pct and take_profit_pct must be positive",
            ));
        }
        if !(0.0..1.0).contains(&self.risk.liquidation_safety_margin) {
            return Err(EngineError::configuration(
                "liquidation_safety_margin must be in [0.0, 1.0)",
            ));
        }
        if self.schedule.decision_interval_secs == 0 || self.schedule.emergency_interval_secs == 0
        {
            return Err(EngineError::configuration("intervals must be positive"));
        }
        if self.sources.is_empty() {
            return Err(EngineError::configuration(
                "at least one signal source must be configured",
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for source in &self.sources {
            if !seen.insert(source.id.as_str()) {
                return Err(EngineError::configuration(format!(
                    "duplicate source id '{}'",
                    source.id
                )));
            }
            if source.trust_weight <= 0.0 {
                return Err(EngineError::configuration(format!(
                    "source '{}' trust_weight must be positive",
                    source.id
                )));
            }
            if source.refresh_secs == 0 {
                return Err(EngineError::configuration(format!(
                    "source '{}' refresh_secs must be positive",
                    source.id
                )));
            }
            if source.staleness_factor <= 0.0 {
                return Err(EngineError::configuration(format!(
                    "source '{}' staleness_factor must be positive",
                    source.id
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn default_config_is_valid() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_zero_leverage() {
        let mut cfg = AppConfig::default();
        cfg.risk.leverage = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_max_position_below_base_size() {
        let mut cfg = AppConfig::default();
        cfg.risk.max_position = dec!(0.001);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_duplicate_source_ids() {
        let mut cfg = AppConfig::default();
        cfg.sources.push(SourceConfig::named("technical"));
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn rejects_out_of_range_confidence() {
        let mut cfg = AppConfig::default();
        cfg.risk.min_confidence_to_open = 1.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_empty_sources() {
        let mut cfg = AppConfig::default();
        cfg.sources.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_nonpositive_trust_weight() {
        let mut cfg = AppConfig::default();
        cfg.sources[0].trust_weight = 0.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn config_roundtrips_through_json() {
        let cfg = AppConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: AppConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.pair, cfg.pair);
        assert_eq!(back.sources.len(), cfg.sources.len());
        assert_eq!(back.risk.position_size, cfg.risk.position_size);
    }
}
