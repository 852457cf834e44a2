//! `check-config`: validate and print the effective configuration.

use anyhow::{Context, Result};

use quorum_trade_core::ConfigLoader;

pub fn execute(config_path: &str) -> Result<()> {
    let config = ConfigLoader::load_from(config_path).context("loading configuration")?;
    config.validate().context("validating configuration")?;

    println!("configuration OK: {config_path}");
    println!("{}", serde_json::to_string_pretty(&config)?);
    println!();
    println!(
        "pair {} | leverage {}x | base size {} | max {} | min confidence {:.2}",
        config.pair,
        config.risk.leverage,
        config.risk.position_size,
        config.risk.max_position,
        config.risk.min_confidence_to_open
    );
    println!(
        "decision every {}s, emergency every {}s, {} sources:",
        config.schedule.decision_interval_secs,
        config.schedule.emergency_interval_secs,
        config.sources.len()
    );
    for source in &config.sources {
        println!(
            "  {:<16} trust {:.2}  refresh {}s  timeout {}s  endpoint {}",
            source.id,
            source.trust_weight,
            source.refresh_secs,
            source.timeout_secs,
            source.endpoint.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}
