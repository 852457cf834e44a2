//! Signal source implementations.
//!
//! Every provider of market opinions - technical analysis, news sentiment,
//! model predictions, reasoning-agent roles - implements the same
//! [`quorum_trade_core::SignalSource`] capability and feeds the shared
//! [`SignalBook`] on its own cadence. The aggregator downstream never
//! special-cases a source; only configured trust weights differ.

pub mod agent;
pub mod book;
pub mod client;
pub mod prediction;
pub mod refresh;
pub mod sentiment;
pub mod technical;

pub use agent::{AgentRoleSource, AgentVerdict};
pub use book::SignalBook;
pub use client::ReasoningClient;
pub use prediction::{PricePredictionSource, PredictionResponse};
pub use refresh::spawn_refresh_tasks;
pub use sentiment::{NewsSentimentSource, SentimentReading};
pub use technical::{IndicatorSnapshot, TechnicalIndicatorSource};
