//! `run`: paper-trade the engine against a replayed price series.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use quorum_trade_core::{
    AppConfig, ConfigLoader, Direction, MarketDataFeed, PositionState, SignalSource, SourceConfig,
};
use quorum_trade_engine::{CloseReason, Engine, EngineEvent, JsonlAuditSink, NullAuditSink};
use quorum_trade_paper::{PaperExecutionService, ReplayMarketFeed, ScriptedSource};
use quorum_trade_sources::{
    AgentRoleSource, NewsSentimentSource, PricePredictionSource, ReasoningClient,
    TechnicalIndicatorSource,
};

/// Predicted move (percent) at which the prediction source reports full
/// confidence.
const FULL_CONFIDENCE_MOVE_PCT: f64 = 1.0;

pub async fn execute(
    config_path: &str,
    prices_path: &str,
    scripted: bool,
    commission: f64,
    slippage_bps: f64,
) -> Result<()> {
    let config = ConfigLoader::load_from(config_path).context("loading configuration")?;
    config.validate().context("validating configuration")?;

    let feed: Arc<dyn MarketDataFeed> = Arc::new(
        ReplayMarketFeed::from_csv(prices_path)
            .with_context(|| format!("loading price series from {prices_path}"))?,
    );
    let executor = Arc::new(PaperExecutionService::new(
        feed.clone(),
        commission,
        slippage_bps,
    ));

    let sources = if scripted {
        scripted_sources(&config)
    } else {
        service_sources(&config, feed.clone())?
    };

    let audit: Arc<dyn quorum_trade_core::AuditSink> = match &config.audit.path {
        Some(path) => Arc::new(JsonlAuditSink::new(path.clone())),
        None => Arc::new(NullAuditSink),
    };

    let engine = Engine::new(config, sources, feed, executor, audit)?;
    let handle = engine.handle();

    // Decision summaries to the operator log.
    let mut events = handle.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let EngineEvent::DecisionMade {
                decision,
                rejection,
            } = event
            {
                match rejection {
                    Some(reason) => {
                        tracing::info!(
                            "decision {:?} (confidence {:.2}) downgraded: {reason}",
                            decision.action,
                            decision.confidence
                        );
                    }
                    None => {
                        tracing::info!(
                            "decision {:?} (confidence {:.2}, {} contributing)",
                            decision.action,
                            decision.confidence,
                            decision.contributing.len()
                        );
                    }
                }
            }
        }
    });

    let run = tokio::spawn(engine.run());

    tokio::signal::ctrl_c()
        .await
        .context("waiting for ctrl-c")?;
    tracing::info!("ctrl-c received; flattening before shutdown");

    // Close open exposure, give the actor a moment to confirm, then stop.
    let position = handle.position().clone();
    if position.status().state == PositionState::Open {
        let _ = position.close(CloseReason::Shutdown).await;
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        while position.status().state != PositionState::Flat
            && tokio::time::Instant::now() < deadline
        {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
    handle.shutdown();

    run.await.context("engine task")??;
    Ok(())
}

/// Built-in demo sources: every configured id reports a steady long.
fn scripted_sources(config: &AppConfig) -> Vec<Arc<dyn SignalSource>> {
    config
        .sources
        .iter()
        .map(|cfg| {
            Arc::new(ScriptedSource::steady(cfg.id.clone(), Direction::Long, 0.75))
                as Arc<dyn SignalSource>
        })
        .collect()
}

/// Service-backed sources per the configuration. The source id selects the
/// adapter; any id outside the built-in set is a reasoning-agent role.
fn service_sources(
    config: &AppConfig,
    feed: Arc<dyn MarketDataFeed>,
) -> Result<Vec<Arc<dyn SignalSource>>> {
    let mut sources: Vec<Arc<dyn SignalSource>> = Vec::with_capacity(config.sources.len());
    for cfg in &config.sources {
        sources.push(build_source(cfg, &config.pair, feed.clone())?);
    }
    Ok(sources)
}

fn build_source(
    cfg: &SourceConfig,
    pair: &str,
    feed: Arc<dyn MarketDataFeed>,
) -> Result<Arc<dyn SignalSource>> {
    let Some(endpoint) = &cfg.endpoint else {
        bail!(
            "source '{}' has no endpoint; configure one or use --scripted",
            cfg.id
        );
    };
    let client = ReasoningClient::new(
        cfg.id.clone(),
        endpoint.clone(),
        Duration::from_secs(cfg.timeout_secs),
    )?;
    let source: Arc<dyn SignalSource> = match cfg.id.as_str() {
        "technical" => Arc::new(TechnicalIndicatorSource::new(pair, client)),
        "sentiment" => Arc::new(NewsSentimentSource::new(pair, 30, client)),
        "prediction" => Arc::new(PricePredictionSource::new(
            pair,
            client,
            feed,
            FULL_CONFIDENCE_MOVE_PCT,
        )),
        _ => Arc::new(AgentRoleSource::new(pair, client)),
    };
    Ok(source)
}
