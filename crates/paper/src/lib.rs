//! Paper-trading collaborators.
//!
//! Simulated fills, replayable market data, and scripted signal sources for
//! running the engine without touching an exchange. Zero network calls;
//! it is impossible to execute a real trade through anything in this crate.

pub mod execution;
pub mod feed;
pub mod scripted;

pub use execution::PaperExecutionService;
pub use feed::{ReplayMarketFeed, StaticMarketFeed};
pub use scripted::{FailingSource, ScriptedOpinion, ScriptedSource};
