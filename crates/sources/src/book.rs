//! Shared cache of the latest signal per source.
//!
//! Refresh tasks write on their own cadence; the decision cycle takes a
//! snapshot. A failed refresh leaves the previous entry in place, where it
//! ages out through the aggregator's staleness check.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use quorum_trade_core::Signal;

/// Latest signal per source id, shared between refresh tasks and the
/// decision cycle.
#[derive(Clone, Default)]
pub struct SignalBook {
    inner: Arc<RwLock<HashMap<String, Signal>>>,
}

impl SignalBook {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the source's latest signal.
    pub async fn publish(&self, signal: Signal) {
        let mut book = self.inner.write().await;
        book.insert(signal.source_id.clone(), signal);
    }

    /// The latest signal from one source, if any was ever published.
    pub async fn latest(&self, source_id: &str) -> Option<Signal> {
        self.inner.read().await.get(source_id).cloned()
    }

    /// All latest signals, ordered by source id for deterministic
    /// downstream processing.
    pub async fn snapshot(&self) -> Vec<Signal> {
        let book = self.inner.read().await;
        let mut signals: Vec<Signal> = book.values().cloned().collect();
        signals.sort_by(|a, b| a.source_id.cmp(&b.source_id));
        signals
    }

    /// Number of sources with a published signal.
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// True when no source has published yet.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use quorum_trade_core::Direction;

    fn signal(id: &str, confidence: f64) -> Signal {
        Signal::new(id, Utc::now(), Direction::Long, confidence).unwrap()
    }

    #[tokio::test]
    async fn publish_then_latest_round_trips() {
        let book = SignalBook::new();
        book.publish(signal("technical", 0.8)).await;
        let latest = book.latest("technical").await.unwrap();
        assert!((latest.confidence - 0.8).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn publish_replaces_previous_entry() {
        let book = SignalBook::new();
        book.publish(signal("technical", 0.4)).await;
        book.publish(signal("technical", 0.9)).await;
        assert_eq!(book.len().await, 1);
        let latest = book.latest("technical").await.unwrap();
        assert!((latest.confidence - 0.9).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn snapshot_is_sorted_by_source_id() {
        let book = SignalBook::new();
        book.publish(signal("sentiment", 0.5)).await;
        book.publish(signal("analyst", 0.6)).await;
        book.publish(signal("technical", 0.7)).await;
        let ids: Vec<String> = book
            .snapshot()
            .await
            .into_iter()
            .map(|s| s.source_id)
            .collect();
        assert_eq!(ids, vec!["analyst", "sentiment", "technical"]);
    }

    #[tokio::test]
    async fn empty_book_reports_empty() {
        let book = SignalBook::new();
        assert!(book.is_empty().await);
        assert!(book.latest("technical").await.is_none());
        assert!(book.snapshot().await.is_empty());
    }
}
