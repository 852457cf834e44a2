//! Collaborator interfaces consumed by the engine.
//!
//! Signal sources, the market data feed, the order execution service, and
//! the audit sink are all external; the engine only ever talks to these
//! traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::time::Duration;

use crate::audit::{DecisionRecord, TransitionRecord};
use crate::error::Result;
use crate::position::Side;
use crate::signal::Signal;

/// A provider of timestamped opinions about market direction and risk.
///
/// Implementations cover technical analysis, news sentiment, model
/// predictions, and reasoning-agent roles alike; the aggregator
/// distinguishes them only by configured trust weight.
#[async_trait]
pub trait SignalSource: Send + Sync {
    /// Produces the source's current opinion.
    ///
    /// # Errors
    /// Returns `SourceUnavailable` when the upstream service cannot be
    /// reached or returns malformed data. The caller treats that as "no
    /// opinion this cycle", never as a fatal error.
    async fn produce(&self) -> Result<Signal>;

    /// Stable identity of this source, matching its configuration entry.
    fn id(&self) -> &str;
}

/// Live market data.
#[async_trait]
pub trait MarketDataFeed: Send + Sync {
    /// Latest mark price for the pair.
    ///
    /// # Errors
    /// Returns `FeedUnavailable` when no price can be obtained.
    async fn current_price(&self, pair: &str) -> Result<Decimal>;

    /// Short-window volatility statistic for the pair.
    ///
    /// # Errors
    /// Returns `FeedUnavailable` when the statistic cannot be computed.
    async fn recent_volatility(&self, pair: &str, window: Duration) -> Result<f64>;
}

/// Parameters for opening a position.
#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub pair: String,
    pub side: Side,
    pub size: Decimal,
    pub entry: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
}

/// Confirmation returned by the execution collaborator.
#[derive(Debug, Clone)]
pub struct OrderConfirmation {
    pub order_id: String,
    pub fill_price: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Order execution collaborator. The engine never assumes success without a
/// confirmation from one of these calls.
#[async_trait]
pub trait ExecutionService: Send + Sync {
    /// Places the opening order with protective stops attached.
    ///
    /// # Errors
    /// Returns `Execution` when the order cannot be placed.
    async fn open(&self, order: OrderRequest) -> Result<OrderConfirmation>;

    /// Closes the given exposure at market.
    ///
    /// # Errors
    /// Returns `Execution` when the close cannot be placed.
    async fn close(&self, pair: &str, side: Side, size: Decimal) -> Result<OrderConfirmation>;

    /// Replaces the protective stop and take-profit orders.
    ///
    /// # Errors
    /// Returns `Execution` when the adjustment is rejected.
    async fn adjust(&self, pair: &str, stop_loss: Decimal, take_profit: Decimal) -> Result<()>;
}

/// Append-only receiver of decision and transition records.
///
/// Write failures are non-fatal: implementations log and drop.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record_decision(&self, record: &DecisionRecord);
    async fn record_transition(&self, record: &TransitionRecord);
}
