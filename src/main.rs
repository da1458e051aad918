//! CLI demo binary (§10): wires `EngineConfig` to the in-memory
//! market-data adapter, a paper executor, and a logging ML sink, and
//! drives the orchestrator for a fixed duration.
//!
//! Grounded on the `clap::Parser` + `dotenv` + `tracing_subscriber`
//! bootstrap in `examples/MrDecryptDecipher-Diia/src/bin/simple_trader.rs`.

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use dotenv::dotenv;
use tracing::info;
use tracing_subscriber::fmt::format::FmtSpan;

use scrapecore::prelude::*;

#[derive(Parser)]
#[clap(author, version, about = "Profit-scraping engine demo", long_about = None)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the engine against a seeded in-memory market for a fixed duration.
    Demo {
        /// Path to a TOML config file; defaults are used when absent.
        #[clap(long)]
        config: Option<PathBuf>,

        /// Demo duration in seconds.
        #[clap(long, default_value = "30")]
        duration_secs: u64,

        /// Seed for the in-memory random walk.
        #[clap(long, default_value = "42")]
        seed: u64,
    },
    /// Print the default configuration as TOML and exit.
    PrintConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_span_events(FmtSpan::CLOSE)
        .with_env_filter(env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::PrintConfig => {
            let cfg = EngineConfig::default();
            println!("{}", toml::to_string_pretty(&cfg)?);
            Ok(())
        }
        Commands::Demo { config, duration_secs, seed } => run_demo(config, duration_secs, seed).await,
    }
}

async fn run_demo(config_path: Option<PathBuf>, duration_secs: u64, seed: u64) -> anyhow::Result<()> {
    let config = EngineConfig::load(config_path.as_deref())?;
    info!(symbols = ?config.symbols, "starting profit-scraping demo");

    let market_data: Arc<dyn MarketData> =
        Arc::new(InMemoryMarketData::new(&config.symbols, seed, 24 * 60));
    let executor: Arc<dyn Executor> = Arc::new(PaperExecutor::new());
    let ml_sink: Arc<dyn MLSink> = Arc::new(LoggingMlSink);

    let orchestrator = Orchestrator::new(config.clone(), market_data, executor, ml_sink);
    orchestrator.start_scraping(config.symbols.clone()).await;

    tokio::time::sleep(std::time::Duration::from_secs(duration_secs)).await;

    let status = orchestrator.status().await;
    info!(
        active_trades = status.active_trade_count,
        opportunities = status.opportunity_count,
        levels = status.level_count,
        "demo finished"
    );

    orchestrator.stop_scraping().await;
    Ok(())
}
