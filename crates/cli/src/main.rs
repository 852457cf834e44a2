use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "quorum-trade")]
#[command(about = "Signal-fusing derivatives trading engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the engine in paper-trading mode against a recorded price series
    Run {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
        /// CSV of close prices replayed as the market feed
        #[arg(long)]
        prices: String,
        /// Use built-in scripted sources instead of configured endpoints
        #[arg(long)]
        scripted: bool,
        /// Commission rate for simulated fills (0.00025 = 0.025%)
        #[arg(long, default_value_t = 0.00025)]
        commission: f64,
        /// Slippage in basis points for simulated fills
        #[arg(long, default_value_t = 10.0)]
        slippage_bps: f64,
    },
    /// Validate the configuration and print the effective values
    CheckConfig {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            config,
            prices,
            scripted,
            commission,
            slippage_bps,
        } => commands::run::execute(&config, &prices, scripted, commission, slippage_bps).await,
        Commands::CheckConfig { config } => commands::check_config::execute(&config),
    }
}
