//! Price-prediction signal source.
//!
//! Consumes a predicted price from a model service and compares it against
//! the live mark price. The predicted move size scales the confidence: a
//! move at or beyond `full_confidence_move_pct` is full confidence.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use quorum_trade_core::{Direction, MarketDataFeed, Result, Signal, SignalSource};

use crate::client::ReasoningClient;

/// Response from the prediction service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub predicted_price: Decimal,
    /// Prediction horizon, informational only.
    #[serde(default)]
    pub horizon_minutes: u32,
}

/// Maps a predicted move into direction and confidence.
#[must_use]
pub fn move_to_opinion(
    current: Decimal,
    predicted: Decimal,
    full_confidence_move_pct: f64,
) -> (Direction, f64) {
    if current <= Decimal::ZERO || full_confidence_move_pct <= 0.0 {
        return (Direction::Flat, 0.0);
    }
    let move_pct = ((predicted - current) / current)
        .to_string()
        .parse::<f64>()
        .unwrap_or(0.0)
        * 100.0;
    let confidence = (move_pct.abs() / full_confidence_move_pct).min(1.0);
    let direction = if move_pct > 0.0 {
        Direction::Long
    } else if move_pct < 0.0 {
        Direction::Short
    } else {
        Direction::Flat
    };
    (direction, confidence)
}

#[derive(Serialize)]
struct PredictionRequest<'a> {
    pair: &'a str,
}

/// Signal source backed by a price-prediction model service.
pub struct PricePredictionSource {
    pair: String,
    client: ReasoningClient,
    feed: Arc<dyn MarketDataFeed>,
    /// Predicted move (percent) that maps to confidence 1.0.
    full_confidence_move_pct: f64,
}

impl PricePredictionSource {
    #[must_use]
    pub fn new(
        pair: impl Into<String>,
        client: ReasoningClient,
        feed: Arc<dyn MarketDataFeed>,
        full_confidence_move_pct: f64,
    ) -> Self {
        Self {
            pair: pair.into(),
            client,
            feed,
            full_confidence_move_pct,
        }
    }
}

#[async_trait]
impl SignalSource for PricePredictionSource {
    async fn produce(&self) -> Result<Signal> {
        let prediction: PredictionResponse = self
            .client
            .post_json(&PredictionRequest { pair: &self.pair })
            .await?;
        let current = self.feed.current_price(&self.pair).await?;
        let (direction, confidence) = move_to_opinion(
            current,
            prediction.predicted_price,
            self.full_confidence_move_pct,
        );
        Signal::new(self.id(), Utc::now(), direction, confidence).map(|s| {
            s.with_rationale(format!(
                "model predicts {} from {current} over {}m",
                prediction.predicted_price, prediction.horizon_minutes
            ))
        })
    }

    fn id(&self) -> &str {
        self.client.source_id()
    }
}
