//! News sentiment signal source.
//!
//! Consumes a sentiment score in [-1.0, 1.0] from a sentiment-analysis
//! service (which owns news acquisition and scoring). Sign gives direction,
//! magnitude gives confidence; a near-zero score is a flat opinion.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use quorum_trade_core::{Direction, Result, Signal, SignalSource};

use crate::client::ReasoningClient;

/// Scores inside this band are treated as no opinion.
const NEUTRAL_BAND: f64 = 0.05;

/// Response from the sentiment service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentReading {
    /// Overall sentiment from -1.0 (extremely bearish) to 1.0 (extremely
    /// bullish). Out-of-range values are clamped.
    pub score: f64,
    /// Number of articles behind the score.
    #[serde(default)]
    pub article_count: u32,
    /// Short summary of the driving headlines.
    #[serde(default)]
    pub summary: String,
}

/// Maps a sentiment score to direction and confidence.
#[must_use]
pub fn score_to_opinion(score: f64) -> (Direction, f64) {
    let score = score.clamp(-1.0, 1.0);
    if score.abs() < NEUTRAL_BAND {
        (Direction::Flat, score.abs())
    } else if score > 0.0 {
        (Direction::Long, score)
    } else {
        (Direction::Short, -score)
    }
}

#[derive(Serialize)]
struct SentimentRequest<'a> {
    pair: &'a str,
    window_minutes: u32,
}

/// Signal source backed by a news sentiment service.
pub struct NewsSentimentSource {
    pair: String,
    window_minutes: u32,
    client: ReasoningClient,
}

impl NewsSentimentSource {
    #[must_use]
    pub fn new(pair: impl Into<String>, window_minutes: u32, client: ReasoningClient) -> Self {
        Self {
            pair: pair.into(),
            window_minutes,
            client,
        }
    }

    fn signal_from_reading(&self, reading: &SentimentReading) -> Result<Signal> {
        let (direction, confidence) = score_to_opinion(reading.score);
        Signal::new(self.id(), Utc::now(), direction, confidence).map(|s| {
            s.with_rationale(format!(
                "sentiment {:+.2} over {} articles: {}",
                reading.score.clamp(-1.0, 1.0),
                reading.article_count,
                reading.summary
            ))
        })
    }
}

#[async_trait]
impl SignalSource for NewsSentimentSource {
    async fn produce(&self) -> Result<Signal> {
        let reading: SentimentReading = self
            .client
            .post_json(&SentimentRequest {
                pair: &self.pair,
                window_minutes: self.window_minutes,
            })
            .await?;
        self.signal_from_reading(&reading)
    }

    fn id(&self) -> &str {
        self.client.source_id()
    }
}
