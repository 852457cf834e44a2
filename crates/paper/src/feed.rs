//! Simulated market data feeds.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;

use quorum_trade_core::{EngineError, MarketDataFeed, Result};

/// Feed returning a settable price and volatility. Tests drive the market
/// by mutating it.
pub struct StaticMarketFeed {
    price: Mutex<Decimal>,
    volatility: Mutex<f64>,
}

impl StaticMarketFeed {
    #[must_use]
    pub fn new(price: Decimal, volatility: f64) -> Self {
        Self {
            price: Mutex::new(price),
            volatility: Mutex::new(volatility),
        }
    }

    pub fn set_price(&self, price: Decimal) {
        *self.price.lock().unwrap() = price;
    }

    pub fn set_volatility(&self, volatility: f64) {
        *self.volatility.lock().unwrap() = volatility;
    }
}

#[async_trait]
impl MarketDataFeed for StaticMarketFeed {
    async fn current_price(&self, _pair: &str) -> Result<Decimal> {
        Ok(*self.price.lock().unwrap())
    }

    async fn recent_volatility(&self, _pair: &str, _window: Duration) -> Result<f64> {
        Ok(*self.volatility.lock().unwrap())
    }
}

/// Annualized-style volatility of a close series: standard deviation of log
/// returns scaled by the window length, in percent.
#[must_use]
pub fn close_series_volatility(closes: &[f64]) -> f64 {
    if closes.len() < 3 {
        return 0.0;
    }
    let returns: Vec<f64> = closes
        .windows(2)
        .filter(|w| w[0] > 0.0 && w[1] > 0.0)
        .map(|w| (w[1] / w[0]).ln())
        .collect();
    if returns.len() < 2 {
        return 0.0;
    }
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    variance.sqrt() * n.sqrt() * 100.0
}

/// Feed replaying a pre-recorded close series, one tick per price query.
/// Holds the last price once the series is exhausted. Volatility is
/// computed over the ticks consumed so far.
pub struct ReplayMarketFeed {
    remaining: Mutex<VecDeque<Decimal>>,
    consumed: Mutex<Vec<f64>>,
}

impl ReplayMarketFeed {
    #[must_use]
    pub fn new(closes: Vec<Decimal>) -> Self {
        Self {
            remaining: Mutex::new(closes.into()),
            consumed: Mutex::new(Vec::new()),
        }
    }

    /// Loads a close series from a CSV file. The first column of each
    /// record (after a header row) is the close price.
    ///
    /// # Errors
    /// Returns a configuration error when the file cannot be read or holds
    /// no parseable prices.
    pub fn from_csv(path: impl AsRef<Path>) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path.as_ref())
            .map_err(|e| EngineError::configuration(format!("price csv: {e}")))?;
        let mut closes = Vec::new();
        for record in reader.records() {
            let record =
                record.map_err(|e| EngineError::configuration(format!("price csv: {e}")))?;
            let Some(field) = record.get(0) else {
                continue;
            };
            match field.trim().parse::<Decimal>() {
                Ok(price) => closes.push(price),
                Err(err) => {
                    tracing::debug!("skipping unparseable close '{field}': {err}");
                }
            }
        }
        if closes.is_empty() {
            return Err(EngineError::configuration(
                "price csv holds no parseable closes",
            ));
        }
        Ok(Self::new(closes))
    }
}

#[async_trait]
impl MarketDataFeed for ReplayMarketFeed {
    async fn current_price(&self, _pair: &str) -> Result<Decimal> {
        let mut remaining = self.remaining.lock().unwrap();
        let mut consumed = self.consumed.lock().unwrap();
        if let Some(price) = remaining.pop_front() {
            consumed.push(price.to_string().parse::<f64>().unwrap_or(0.0));
            return Ok(price);
        }
        match consumed.last() {
            Some(last) => Decimal::try_from(*last)
                .map_err(|e| EngineError::feed_unavailable(format!("replay: {e}"))),
            None => Err(EngineError::feed_unavailable("replay series empty")),
        }
    }

    async fn recent_volatility(&self, _pair: &str, _window: Duration) -> Result<f64> {
        let consumed = self.consumed.lock().unwrap();
        if consumed.len() < 3 {
            return Err(EngineError::feed_unavailable(
                "not enough replay ticks for volatility",
            ));
        }
        Ok(close_series_volatility(&consumed))
    }
}
