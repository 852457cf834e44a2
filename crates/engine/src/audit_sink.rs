//! Audit sink implementations.
//!
//! The JSONL sink appends one record per line. Audit writes are best
//! effort: a failure is logged and dropped, never retried indefinitely and
//! never allowed to disturb trading.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use quorum_trade_core::{AuditSink, DecisionRecord, TransitionRecord};

/// Append-only JSON-lines audit file.
pub struct JsonlAuditSink {
    path: PathBuf,
    file: Mutex<Option<tokio::fs::File>>,
}

impl JsonlAuditSink {
    /// Creates the sink; the file is opened lazily on first write.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: Mutex::new(None),
        }
    }

    async fn append(&self, line: String) {
        let mut guard = self.file.lock().await;
        if guard.is_none() {
            if let Some(parent) = self.path.parent() {
                let _ = tokio::fs::create_dir_all(parent).await;
            }
            match tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .await
            {
                Ok(file) => *guard = Some(file),
                Err(err) => {
                    tracing::warn!("audit file {:?} unavailable: {err}", self.path);
                    return;
                }
            }
        }
        if let Some(file) = guard.as_mut() {
            if let Err(err) = file.write_all(format!("{line}\n").as_bytes()).await {
                tracing::warn!("audit write failed: {err}");
                // Reopen on the next record.
                *guard = None;
            }
        }
    }
}

#[async_trait]
impl AuditSink for JsonlAuditSink {
    async fn record_decision(&self, record: &DecisionRecord) {
        match serde_json::to_string(record) {
            Ok(line) => self.append(line).await,
            Err(err) => tracing::warn!("audit decision serialization failed: {err}"),
        }
    }

    async fn record_transition(&self, record: &TransitionRecord) {
        match serde_json::to_string(record) {
            Ok(line) => self.append(line).await,
            Err(err) => tracing::warn!("audit transition serialization failed: {err}"),
        }
    }
}

/// Sink that records to the log only. Used when no audit path is
/// configured, and in tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAuditSink;

#[async_trait]
impl AuditSink for NullAuditSink {
    async fn record_decision(&self, record: &DecisionRecord) {
        tracing::debug!(
            "decision {:?} (rejection: {:?})",
            record.decision.action,
            record.rejection
        );
    }

    async fn record_transition(&self, record: &TransitionRecord) {
        tracing::debug!(
            "transition {:?} -> {:?} ({})",
            record.from,
            record.to,
            record.reason
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use quorum_trade_core::{Decision, PositionState};

    #[tokio::test]
    async fn jsonl_sink_appends_one_line_per_record() {
        let dir = std::env::temp_dir().join("quorum-audit-test");
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join(format!("audit-{}.jsonl", std::process::id()));
        let _ = tokio::fs::remove_file(&path).await;

        let sink = JsonlAuditSink::new(&path);
        sink.record_decision(&DecisionRecord::new(
            "BTCUSDT",
            Decision::hold(Utc::now(), 0.2, Vec::new(), false),
            None,
        ))
        .await;
        sink.record_transition(&TransitionRecord::new(
            "BTCUSDT",
            PositionState::Flat,
            PositionState::Opening,
            "decision",
        ))
        .await;

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"hold\""));
        assert!(lines[1].contains("\"opening\""));

        // Every line parses back as JSON.
        for line in lines {
            let _: serde_json::Value = serde_json::from_str(line).unwrap();
        }
        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn unwritable_path_is_non_fatal() {
        let sink = JsonlAuditSink::new("/nonexistent-dir/audit.jsonl");
        // Must not panic or error out.
        sink.record_transition(&TransitionRecord::new(
            "BTCUSDT",
            PositionState::Flat,
            PositionState::Opening,
            "decision",
        ))
        .await;
    }
}
