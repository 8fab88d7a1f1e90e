//! Supertrend futures bot
//!
//! Single-symbol position-management engine: evaluates supertrend flips
//! with session-aware risk-reward, sizes entries under a fixed risk budget,
//! and supervises protective orders until the trade resolves.

mod config;
mod engine;
mod error;
mod feed;
mod models;
mod trading;
mod venue;

use anyhow::Result;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::venue::{BinanceFutures, PaperVenue};

/// Supertrend futures bot CLI.
#[derive(Parser)]
#[command(name = "supertrend-bot")]
#[command(about = "Session-aware supertrend futures bot", long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the trading engine
    Run {
        /// Futures symbol to trade
        #[arg(short, long, default_value = "BTCUSDT")]
        symbol: String,

        /// Candle timeframe
        #[arg(short, long, default_value = "3m")]
        timeframe: String,

        /// Seconds between strategy cycles
        #[arg(short, long, default_value = "60")]
        interval: u64,

        /// Risk budget per trade in quote currency
        #[arg(short, long, default_value = "0.8")]
        risk: f64,

        /// Simulate order flow against live market data
        #[arg(long)]
        dry_run: bool,
    },

    /// Show the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Run {
            symbol,
            timeframe,
            interval,
            risk,
            dry_run,
        } => {
            let config = EngineConfig {
                symbol,
                timeframe,
                risk_budget: Decimal::try_from(risk)?,
                cycle_interval_secs: interval,
                ..EngineConfig::default()
            };

            let venue = BinanceFutures::from_env()?;
            if !dry_run && !venue.has_credentials() {
                anyhow::bail!(
                    "BINANCE_API_KEY / BINANCE_SECRET_KEY not set; \
                     use --dry-run for simulated order flow"
                );
            }

            println!("\n=== Supertrend Futures Bot ===");
            println!("Symbol:    {}", config.symbol);
            println!("Timeframe: {}", config.timeframe);
            println!("Risk:      {} per trade", config.risk_budget);
            println!(
                "Mode:      {}",
                if dry_run { "DRY RUN (simulated orders)" } else { "LIVE TRADING" }
            );
            println!("\nPress Ctrl+C to stop.\n");

            if dry_run {
                info!("dry run: orders are simulated against live market data");
                let mut engine = Engine::connect(config, PaperVenue::new(venue)).await?;
                engine.run().await?;
            } else {
                let mut engine = Engine::connect(config, venue).await?;
                engine.run().await?;
            }
        }

        Commands::Config => {
            let config = EngineConfig::default();
            let s = &config.strategy;

            println!("\n=== Engine Configuration ===\n");
            println!("Symbol:               {}", config.symbol);
            println!("Timeframe:            {}", config.timeframe);
            println!("Cycle Interval:       {}s", config.cycle_interval_secs);
            println!("Entry Fill Timeout:   {}s", config.entry_fill_timeout_secs);
            println!("Risk Budget:          {}", config.risk_budget);
            println!("Fee Rate:             {}", config.fee_rate);

            println!("\n=== Strategy Configuration ===\n");
            println!("ATR Period:           {}", s.atr_period);
            println!("Supertrend Factor:    {}", s.supertrend_factor);
            println!("EMA Fast/Slow:        {}/{}", s.ema_fast_period, s.ema_slow_period);
            println!("RSI Period:           {}", s.rsi_period);
            println!("Volume SMA Period:    {}", s.volume_sma_period);
            println!("Volume Spike Factor:  {}x", s.volume_factor);
            println!("Min Body (ATR mult):  {}", s.min_body_atr);

            println!("\nSession Policy (UTC):");
            println!("  Asia (00-07):       stop {}x ATR, target 1:{}, no trailing",
                s.asia_ratio, s.asia_ratio);
            println!("  London/NY (07-24):  stop {}x ATR, target 1:{}, trailing {}x ATR",
                s.trailing_ratio, s.fixed_target_ratio, s.trailing_ratio);
        }
    }

    Ok(())
}
