//! Scripted signal sources for paper runs and tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;

use quorum_trade_core::{Direction, EngineError, Result, Signal, SignalSource};

/// One scripted opinion.
#[derive(Debug, Clone)]
pub struct ScriptedOpinion {
    pub direction: Direction,
    pub confidence: f64,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
}

impl ScriptedOpinion {
    #[must_use]
    pub fn new(direction: Direction, confidence: f64) -> Self {
        Self {
            direction,
            confidence,
            stop_loss: None,
            take_profit: None,
        }
    }
}

/// Source that replays a fixed script of opinions, repeating the last one
/// once the script is exhausted.
pub struct ScriptedSource {
    id: String,
    script: Mutex<VecDeque<ScriptedOpinion>>,
    last: Mutex<Option<ScriptedOpinion>>,
}

impl ScriptedSource {
    #[must_use]
    pub fn new(id: impl Into<String>, script: Vec<ScriptedOpinion>) -> Self {
        Self {
            id: id.into(),
            script: Mutex::new(script.into()),
            last: Mutex::new(None),
        }
    }

    /// A source that always reports the same opinion.
    #[must_use]
    pub fn steady(id: impl Into<String>, direction: Direction, confidence: f64) -> Self {
        Self::new(id, vec![ScriptedOpinion::new(direction, confidence)])
    }
}

#[async_trait]
impl SignalSource for ScriptedSource {
    async fn produce(&self) -> Result<Signal> {
        let next = {
            let mut script = self.script.lock().unwrap();
            let mut last = self.last.lock().unwrap();
            match script.pop_front() {
                Some(opinion) => {
                    *last = Some(opinion.clone());
                    Some(opinion)
                }
                None => last.clone(),
            }
        };
        let Some(opinion) = next else {
            return Err(EngineError::source_unavailable(&self.id, "empty script"));
        };
        Ok(
            Signal::new(&self.id, Utc::now(), opinion.direction, opinion.confidence)?
                .with_levels(None, opinion.stop_loss, opinion.take_profit)
                .with_rationale("scripted"),
        )
    }

    fn id(&self) -> &str {
        &self.id
    }
}

/// Source that always fails; exercises the degraded-cycle path.
pub struct FailingSource {
    id: String,
}

impl FailingSource {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[async_trait]
impl SignalSource for FailingSource {
    async fn produce(&self) -> Result<Signal> {
        Err(EngineError::source_unavailable(&self.id, "always down"))
    }

    fn id(&self) -> &str {
        &self.id
    }
}
