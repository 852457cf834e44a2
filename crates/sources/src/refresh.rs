//! Per-source refresh tasks.
//!
//! Each configured source runs on its own cadence in its own task. A
//! produce call is bounded by the source's timeout and a small retry
//! budget; a failed cycle only logs - the previous book entry stays and
//! ages out through the aggregator's staleness policy. A slow or dead
//! source can never stall the decision cycle.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use quorum_trade_core::{
    retry_with_backoff, EngineError, Result, RetryPolicy, Signal, SignalSource, SourceConfig,
};

use crate::book::SignalBook;

/// Retry budget for one refresh cycle; the next tick tries again anyway.
const REFRESH_RETRIES: u32 = 1;

/// Spawns one refresh task per source. Tasks stop when `shutdown` flips to
/// true.
#[must_use]
pub fn spawn_refresh_tasks(
    sources: Vec<Arc<dyn SignalSource>>,
    configs: &[SourceConfig],
    book: SignalBook,
    shutdown: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    let config_by_id: HashMap<&str, &SourceConfig> =
        configs.iter().map(|c| (c.id.as_str(), c)).collect();

    sources
        .into_iter()
        .filter_map(|source| {
            let Some(cfg) = config_by_id.get(source.id()) else {
                tracing::warn!("source '{}' has no configuration entry; not spawned", source.id());
                return None;
            };
            Some(spawn_one(
                source,
                Duration::from_secs(cfg.refresh_secs),
                Duration::from_secs(cfg.timeout_secs),
                book.clone(),
                shutdown.clone(),
            ))
        })
        .collect()
}

fn spawn_one(
    source: Arc<dyn SignalSource>,
    refresh: Duration,
    timeout: Duration,
    book: SignalBook,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(refresh);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!("source '{}' refreshing every {refresh:?}", source.id());

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match refresh_once(source.as_ref(), timeout).await {
                        Ok(signal) => {
                            tracing::debug!(
                                "source '{}' produced {:?} at {:.2}",
                                source.id(),
                                signal.direction,
                                signal.confidence
                            );
                            book.publish(signal).await;
                        }
                        Err(err) => {
                            // No opinion this cycle; never fatal.
                            tracing::warn!("source '{}' skipped this cycle: {err}", source.id());
                        }
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!("source '{}' stopping", source.id());
                        break;
                    }
                }
            }
        }
    })
}

/// One bounded produce attempt: per-call timeout plus a single retry.
async fn refresh_once(source: &dyn SignalSource, timeout: Duration) -> Result<Signal> {
    let policy = RetryPolicy::new(REFRESH_RETRIES, Duration::from_millis(250));
    retry_with_backoff(source.id(), policy, || async {
        tokio::time::timeout(timeout, source.produce())
            .await
            .map_err(|_| {
                EngineError::source_unavailable(
                    source.id(),
                    format!("timed out after {timeout:?}"),
                )
            })?
    })
    .await
}
