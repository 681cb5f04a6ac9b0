use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::EnvFilter;

use stock_screener::analysis::AnalysisEngine;
use stock_screener::api::InvestApiClient;
use stock_screener::data_collector::DataCollector;
use stock_screener::ledger::PositionLedger;
use stock_screener::models::{Config, Recommendation};
use stock_screener::storage::DataStore;

#[derive(Parser)]
#[command(name = "stock-screener", about = "Daily buy/sell screening over exchange-listed equities")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Refresh the candle and fundamentals cache from the broker API
    Fetch {
        /// Refetch even when the cache is fresh
        #[arg(long)]
        force: bool,
    },
    /// Run the screening engine and update the ledger (default)
    Screen {
        /// Use the cached data without refreshing first
        #[arg(long)]
        offline: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            eprintln!("❌ Configuration Error: {}", e);
            eprintln!("Make sure you have a .env file with your Invest API token.");
            std::process::exit(1);
        }
    };

    match Cli::parse().command.unwrap_or(Command::Screen { offline: false }) {
        Command::Fetch { force } => run_fetch(&config, force).await,
        Command::Screen { offline } => run_screen(&config, offline).await,
    }
}

async fn run_fetch(config: &Config, force: bool) -> Result<()> {
    let store = DataStore::new(&config.data_dir)?;
    let client = Arc::new(InvestApiClient::new(config)?);
    let collector = DataCollector::new(client, store, config.clone());

    if !force && collector.cache_is_fresh() {
        println!("✅ Cached data is up to date");
        return Ok(());
    }

    let summary = collector.refresh().await?;
    println!(
        "✅ Fetched {} candle series and {} fundamentals ({} failed)",
        summary.candle_series, summary.fundamentals, summary.failed
    );
    Ok(())
}

async fn run_screen(config: &Config, offline: bool) -> Result<()> {
    if !offline {
        let store = DataStore::new(&config.data_dir)?;
        let client = Arc::new(InvestApiClient::new(config)?);
        let collector = DataCollector::new(client, store, config.clone());
        if collector.cache_is_fresh() {
            println!("✅ Cached data is up to date");
        } else {
            collector.refresh().await?;
        }
    }

    let store = DataStore::new(&config.data_dir)?;
    if !store.has_candles() {
        eprintln!("❌ No cached market data. Run `stock-screener fetch` first.");
        std::process::exit(1);
    }
    let prices = store.load_price_table()?;
    let fundamentals = store.load_fundamentals()?;

    let engine = AnalysisEngine::new(prices, &fundamentals);
    let (buy_list, sell_list) = engine.recommendations();

    print_recommendations("📈 BUY CANDIDATES", &buy_list);
    println!();
    print_recommendations("📉 SELL CANDIDATES", &sell_list);
    println!();

    let today = Utc::now().date_naive();
    let mut ledger = PositionLedger::load(&config.ledger_dir)?;
    ledger.reconcile(&buy_list, &sell_list, engine.prices(), today);
    ledger.save()?;
    print_ledger(&ledger);

    Ok(())
}

fn print_ledger(ledger: &PositionLedger) {
    println!("📒 TRACKED POSITIONS");
    println!("{}", "=".repeat(70));

    if ledger.positions().is_empty() {
        println!("  (none)");
        return;
    }

    println!(
        "{:<8} {:>6} {:>10} {:>12} {:>10} {:>12} {:>7}",
        "Ticker", "Signal", "Entry", "Entry date", "Last", "Last date", "Chg%"
    );
    for position in ledger.positions() {
        println!(
            "{:<8} {:>6} {:>10.2} {:>12} {:>10.2} {:>12} {:>7.1}",
            position.ticker,
            position.signal.to_string(),
            position.entry_price,
            position.entry_date.to_string(),
            position.last_price,
            position.last_date.to_string(),
            position.change_pct,
        );
    }
}

fn print_recommendations(title: &str, rows: &[Recommendation]) {
    println!("{}", title);
    println!("{}", "=".repeat(100));

    if rows.is_empty() {
        println!("  (none)");
        return;
    }

    println!(
        "{:<8} {:>10} {:>10} {:>10} {:>10} {:>10} {:>7} {:>8} {:>7} {:>7} {:>6} {:>6}",
        "Ticker", "Price", "Support", "Resist", "Buy at", "Sell at", "RSI", "Z-Score", "P/E", "ROE", "Div%", "Score"
    );
    for row in rows {
        println!(
            "{:<8} {:>10.2} {:>10.2} {:>10.2} {:>10.2} {:>10.2} {:>7} {:>8} {:>7.2} {:>7.2} {:>6.2} {:>6.2}",
            row.ticker,
            row.current_price,
            row.support,
            row.resistance,
            row.buy_price,
            row.sell_price,
            row.rsi.map_or_else(|| "-".to_string(), |v| format!("{:.2}", v)),
            row.z_score.map_or_else(|| "-".to_string(), |v| format!("{:.2}", v)),
            row.pe_ttm,
            row.roe,
            row.div_yield,
            row.score,
        );
    }
}
