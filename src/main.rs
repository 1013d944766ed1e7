mod api;
mod bot;
mod execution;
mod models;
mod trading;

use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use api::{BinanceClient, MarketData};
use bot::{Bot, BotConfig, BotState};
use trading::{AccountType, PositionSizer, RiskConfig, SignalEngine, StrategyConfig};

#[derive(Parser)]
#[command(name = "trendbot", about = "EMA trend-following trading bot")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the trading loop
    Run {
        #[arg(long, default_value = "BTCUSDT")]
        symbol: String,

        #[arg(long, default_value = "1h")]
        timeframe: String,

        /// Account equity in account currency
        #[arg(long, default_value_t = 10_000.0)]
        equity: f64,

        #[arg(long, default_value_t = 100)]
        leverage: u32,

        /// Risk per trade, percent of equity
        #[arg(long, default_value_t = 1.0)]
        risk: f64,

        /// Seconds between decision cycles
        #[arg(long, default_value_t = 60)]
        interval: u64,

        #[arg(long, default_value_t = 1)]
        max_positions: usize,

        /// Send real orders instead of simulating
        #[arg(long)]
        live: bool,
    },
    /// Fetch candles and print the current market read
    Analyze {
        #[arg(long, default_value = "BTCUSDT")]
        symbol: String,

        #[arg(long, default_value = "1h")]
        timeframe: String,
    },
    /// Size a hypothetical trade
    Size {
        #[arg(long)]
        symbol: String,

        #[arg(long)]
        entry: f64,

        #[arg(long)]
        stop: f64,

        #[arg(long)]
        target: f64,

        #[arg(long, default_value_t = 10_000.0)]
        equity: f64,

        #[arg(long, default_value_t = 100)]
        leverage: u32,

        #[arg(long, default_value_t = 1.0)]
        risk: f64,

        /// Lot convention: standard, mini, or micro
        #[arg(long, default_value = "standard")]
        account_type: String,
    },
    /// Print the default configuration
    Config,
}

fn parse_account_type(s: &str) -> Result<AccountType> {
    match s.to_lowercase().as_str() {
        "standard" => Ok(AccountType::Standard),
        "mini" => Ok(AccountType::Mini),
        "micro" => Ok(AccountType::Micro),
        other => anyhow::bail!("Unknown account type: {}", other),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            symbol,
            timeframe,
            equity,
            leverage,
            risk,
            interval,
            max_positions,
            live,
        } => {
            let config = BotConfig {
                symbol,
                timeframe,
                dry_run: !live,
                equity,
                leverage,
                risk_percent: risk,
                max_open_positions: max_positions,
                poll_interval: Duration::from_secs(interval),
                ..BotConfig::default()
            };
            run_bot(config).await
        }
        Commands::Analyze { symbol, timeframe } => analyze(&symbol, &timeframe).await,
        Commands::Size {
            symbol,
            entry,
            stop,
            target,
            equity,
            leverage,
            risk,
            account_type,
        } => {
            let config = RiskConfig {
                equity,
                leverage,
                account_type: parse_account_type(&account_type)?,
                default_risk_percent: risk,
                ..RiskConfig::default()
            };
            size_trade(&symbol, entry, stop, target, risk, config)
        }
        Commands::Config => {
            let config = BotConfig::default();
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

async fn run_bot(config: BotConfig) -> Result<()> {
    let bot = Bot::new(config);
    let market = MarketData::Binance(BinanceClient::new()?);

    bot.start(market).await?;
    info!("Bot running, press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    bot.stop().await;
    while bot.state().await != BotState::Stopped {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    let status = bot.status().await;
    println!("\nSession summary");
    println!("  cycles:  {}", status.stats.cycles_completed);
    println!("  signals: {}", status.stats.signals_generated);
    println!("  trades:  {}", status.stats.trades_executed);
    println!(
        "  w/l:     {}/{}",
        status.stats.winning_trades, status.stats.losing_trades
    );
    println!("  pnl:     {:.2}", status.stats.total_pnl);
    println!("  errors:  {}", status.stats.cycle_errors);
    Ok(())
}

async fn analyze(symbol: &str, timeframe: &str) -> Result<()> {
    let market = MarketData::Binance(BinanceClient::new()?);
    let engine = SignalEngine::new(StrategyConfig::default());

    let candles = market.fetch_candles(symbol, timeframe, 500).await;
    if candles.len() < engine.min_candles() {
        anyhow::bail!(
            "Not enough candle history: got {}, need {}",
            candles.len(),
            engine.min_candles()
        );
    }

    let state = engine
        .market_state(&candles)
        .context("Failed to compute market state")?;

    println!("{} {} market state", symbol, timeframe);
    println!("  price:      {:.4}", state.current_price);
    println!("  trend:      {}", state.trend.as_str());
    println!("  EMA 9:      {:.4}", state.ema_fast);
    println!("  EMA 21:     {:.4}", state.ema_medium);
    println!("  EMA 200:    {:.4}", state.ema_slow);
    println!("  swing low:  {:.4}", state.swing_low);
    println!("  swing high: {:.4}", state.swing_high);
    println!("  vs EMA 200: {:+.2}%", state.price_vs_slow_pct);

    match engine.evaluate(&candles) {
        Some(signal) => {
            println!("\nSignal: {} @ {:.4}", signal.direction, signal.entry_price);
            println!("  stop:       {:.4}", signal.stop_price);
            println!("  target:     {:.4}", signal.target_price);
            println!("  confidence: {:.0}%", signal.confidence);
            println!("  reason:     {}", signal.reason);
        }
        None => println!("\nNo signal"),
    }
    Ok(())
}

fn size_trade(
    symbol: &str,
    entry: f64,
    stop: f64,
    target: f64,
    risk: f64,
    config: RiskConfig,
) -> Result<()> {
    let sizer = PositionSizer::new(config);
    let result = sizer.size(symbol, entry, stop, target, Some(risk));

    println!("{} position size", symbol);
    println!("  lot size:   {:.4}", result.lot_size);
    println!("  units:      {}", result.units);
    println!("  risk:       ${:.2} ({:.2}%)", result.risk_amount, result.risk_percent_applied);
    println!("  stop:       {:.1} pips", result.stop_pips);
    println!("  max loss:   ${:.2}", result.projected_loss);
    println!("  max gain:   ${:.2}", result.projected_gain);
    println!("  margin:     ${:.2}", result.margin_required);
    println!("  valid:      {}", result.valid);
    if let Some(warning) = &result.warning {
        println!("  warning:    {}", warning);
    }

    let validation = sizer.validate(symbol, entry, stop, target, result.lot_size);
    for error in &validation.errors {
        println!("  error:      {}", error);
    }
    for warning in &validation.warnings {
        println!("  warning:    {}", warning);
    }
    Ok(())
}
