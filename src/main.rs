//! Multi-Exchange Liquidity Aggregator
//!
//! Command-line front end over the aggregation engine.

use clap::{Parser, Subcommand};
use liquidity_aggregator::{client::HttpTransport, config::Config, Aggregator};
use std::collections::HashSet;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "liquidity-aggregator")]
#[command(about = "Aggregate prices and liquidity across exchanges")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path (falls back to default locations)
    #[arg(short, long)]
    config: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch normalized prices from every exchange
    Prices {
        /// Symbols to keep, e.g. BTCUSD (all when omitted)
        #[arg(short, long, value_delimiter = ',')]
        symbols: Vec<String>,
    },
    /// Show the per-exchange liquidity report for a pool
    Verify {
        target: String,
        #[arg(short, long, default_value = "0")]
        threshold: f64,
    },
    /// Extract from the exchange with the deepest qualifying liquidity
    Extract { target: String, amount: f64 },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };

    let transport = Arc::new(HttpTransport::new(&config.aggregator)?);
    let aggregator = Aggregator::from_config(&config, transport.clone())?;

    let result = run(&aggregator, cli.command).await;

    aggregator.shutdown();
    transport.close();
    result
}

async fn run(aggregator: &Aggregator, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Prices { symbols } => {
            let set: HashSet<String> = symbols
                .iter()
                .map(|s| liquidity_aggregator::data::normalize_symbol(s))
                .collect();
            let filter = (!set.is_empty()).then_some(&set);

            let outcome = aggregator.aggregate_detailed(filter).await;
            for failure in &outcome.failures {
                tracing::warn!("{}", failure);
            }
            println!("{}", serde_json::to_string_pretty(&outcome.records)?);
        }
        Commands::Verify { target, threshold } => {
            let report = aggregator.verify(&target, threshold).await;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Extract { target, amount } => {
            let extraction = aggregator.extract(&target, amount).await?;
            println!("{}", serde_json::to_string_pretty(&extraction)?);
        }
    }
    Ok(())
}
