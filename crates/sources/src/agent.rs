//! Reasoning-agent signal sources.
//!
//! Each committee role (analyst, strategist, risk_reviewer, final_decision,
//! emergency_reviewer, ...) is just another [`SignalSource`]: it posts a
//! role-tagged request to the reasoning service and parses a structured
//! verdict. There is no separate code path for "multi-agent debate" - the
//! aggregator sees one more weighted opinion.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use quorum_trade_core::{Direction, EngineError, Result, Signal, SignalSource};

use crate::client::ReasoningClient;

/// Structured verdict returned by the reasoning service for one role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentVerdict {
    /// "long", "short", or "flat" (a few aliases are accepted).
    pub direction: String,
    /// Confidence in [0.0, 1.0].
    pub confidence: f64,
    #[serde(default)]
    pub entry: Option<Decimal>,
    #[serde(default)]
    pub stop_loss: Option<Decimal>,
    #[serde(default)]
    pub take_profit: Option<Decimal>,
    #[serde(default)]
    pub reason: String,
}

/// Parses the service's direction vocabulary.
///
/// # Errors
/// Returns `SourceUnavailable`-shaped malformed-data errors for unknown
/// words, so the cycle degrades instead of acting on a garbled verdict.
pub fn parse_direction(source: &str, word: &str) -> Result<Direction> {
    match word.to_ascii_lowercase().as_str() {
        "long" | "buy" | "open_long" => Ok(Direction::Long),
        "short" | "sell" | "open_short" => Ok(Direction::Short),
        "flat" | "hold" | "wait" | "close" => Ok(Direction::Flat),
        other => Err(EngineError::source_unavailable(
            source,
            format!("unknown direction '{other}'"),
        )),
    }
}

#[derive(Serialize)]
struct VerdictRequest<'a> {
    role: &'a str,
    pair: &'a str,
}

/// One committee role backed by the reasoning service.
pub struct AgentRoleSource {
    role: String,
    pair: String,
    client: ReasoningClient,
}

impl AgentRoleSource {
    /// Creates the source for a role. The client's source id doubles as the
    /// role tag sent to the service.
    #[must_use]
    pub fn new(pair: impl Into<String>, client: ReasoningClient) -> Self {
        Self {
            role: client.source_id().to_string(),
            pair: pair.into(),
            client,
        }
    }

    fn signal_from_verdict(&self, verdict: &AgentVerdict) -> Result<Signal> {
        let direction = parse_direction(&self.role, &verdict.direction)?;
        if !(0.0..=1.0).contains(&verdict.confidence) {
            return Err(EngineError::source_unavailable(
                &self.role,
                format!("confidence {} out of range", verdict.confidence),
            ));
        }
        Ok(Signal::new(self.id(), Utc::now(), direction, verdict.confidence)?
            .with_levels(verdict.entry, verdict.stop_loss, verdict.take_profit)
            .with_rationale(verdict.reason.clone()))
    }
}

#[async_trait]
impl SignalSource for AgentRoleSource {
    async fn produce(&self) -> Result<Signal> {
        let verdict: AgentVerdict = self
            .client
            .post_json(&VerdictRequest {
                role: &self.role,
                pair: &self.pair,
            })
            .await?;
        self.signal_from_verdict(&verdict)
    }

    fn id(&self) -> &str {
        self.client.source_id()
    }
}
