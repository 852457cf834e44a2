//! Simulated order execution with slippage and commission.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;

use quorum_trade_core::{
    EngineError, ExecutionService, MarketDataFeed, OrderConfirmation, OrderRequest, Result, Side,
};

/// Execution service that fills orders locally against the feed's mark
/// price.
pub struct PaperExecutionService {
    feed: Arc<dyn MarketDataFeed>,
    commission_rate: Decimal,
    slippage_bps: Decimal,
}

impl PaperExecutionService {
    /// Creates a paper executor.
    ///
    /// `commission_rate` is a decimal fraction (0.001 = 0.1%),
    /// `slippage_bps` basis points applied against the trade direction.
    ///
    /// # Panics
    /// Panics if the f64 arguments cannot be converted to `Decimal`; normal
    /// finite values always convert.
    #[must_use]
    pub fn new(feed: Arc<dyn MarketDataFeed>, commission_rate: f64, slippage_bps: f64) -> Self {
        Self {
            feed,
            commission_rate: Decimal::try_from(commission_rate).unwrap(),
            slippage_bps: Decimal::try_from(slippage_bps).unwrap(),
        }
    }

    /// Buying pays up, selling receives less.
    fn apply_slippage(&self, price: Decimal, buying: bool) -> Decimal {
        let slippage = price * self.slippage_bps / Decimal::from(10_000);
        if buying {
            price + slippage
        } else {
            price - slippage
        }
    }

    fn confirmation(&self, fill_price: Decimal) -> OrderConfirmation {
        OrderConfirmation {
            order_id: uuid::Uuid::new_v4().to_string(),
            fill_price,
            timestamp: Utc::now(),
        }
    }
}

#[async_trait]
impl ExecutionService for PaperExecutionService {
    async fn open(&self, order: OrderRequest) -> Result<OrderConfirmation> {
        if order.size <= Decimal::ZERO {
            return Err(EngineError::execution("open", "non-positive size", false));
        }
        let buying = order.side == Side::Long;
        let fill_price = self.apply_slippage(order.entry, buying);
        let commission = fill_price * order.size * self.commission_rate;
        tracing::info!(
            "paper open {:?} {} {} at {fill_price} (commission {commission})",
            order.side,
            order.size,
            order.pair
        );
        Ok(self.confirmation(fill_price))
    }

    async fn close(&self, pair: &str, side: Side, size: Decimal) -> Result<OrderConfirmation> {
        let mark = self.feed.current_price(pair).await?;
        // Closing a long sells, closing a short buys.
        let buying = side == Side::Short;
        let fill_price = self.apply_slippage(mark, buying);
        tracing::info!("paper close {side:?} {size} {pair} at {fill_price}");
        Ok(self.confirmation(fill_price))
    }

    async fn adjust(&self, pair: &str, stop_loss: Decimal, take_profit: Decimal) -> Result<()> {
        tracing::info!("paper adjust {pair} stops to {stop_loss}/{take_profit}");
        Ok(())
    }
}
