//! Bot controller: owns the poll-analyze-trade loop and all shared
//! state observers read.
//!
//! One decision cycle per poll interval: fetch candles, evaluate the
//! signal engine, size the candidate, hand it to the execution port.
//! A faulted cycle logs and backs off; it never tears the loop down.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::api::{MarketData, VenueClient};
use crate::execution::{Executor, LiveExecutor, SimulatedExecutor, TradeOrder};
use crate::models::{MarketState, OrderStatus, PositionStatus, TradeRecord, TradeSignal};
use crate::trading::{AccountType, PositionSizer, RiskConfig, SignalEngine, StrategyConfig};

/// Delay before retrying after a faulted cycle.
const ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Candles requested per cycle.
const CANDLE_FETCH_LIMIT: u32 = 500;

/// Retained log entries.
const LOG_CAPACITY: usize = 1000;

/// Event fan-out buffer per subscriber; a lagging subscriber loses its
/// oldest events, never blocks the loop.
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Lifecycle state of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BotState {
    Stopped,
    Starting,
    Running,
    Analyzing,
    Trading,
    Stopping,
    Error,
}

impl BotState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BotState::Stopped => "STOPPED",
            BotState::Starting => "STARTING",
            BotState::Running => "RUNNING",
            BotState::Analyzing => "ANALYZING",
            BotState::Trading => "TRADING",
            BotState::Stopping => "STOPPING",
            BotState::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for BotState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runtime configuration. Snapshotted at the top of each cycle, so
/// updates apply at the next cycle boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotConfig {
    pub symbol: String,
    pub timeframe: String,
    pub dry_run: bool,
    pub equity: f64,
    pub leverage: u32,
    pub risk_percent: f64,
    pub max_risk_percent: f64,
    pub account_type: AccountType,
    pub max_open_positions: usize,
    pub poll_interval: Duration,
    pub strategy: StrategyConfig,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            symbol: "BTCUSDT".to_string(),
            timeframe: "1h".to_string(),
            dry_run: true,
            equity: 10_000.0,
            leverage: 100,
            risk_percent: 1.0,
            max_risk_percent: 2.0,
            account_type: AccountType::Standard,
            max_open_positions: 1,
            poll_interval: Duration::from_secs(60),
            strategy: StrategyConfig::default(),
        }
    }
}

impl BotConfig {
    fn risk_config(&self) -> RiskConfig {
        RiskConfig {
            equity: self.equity,
            leverage: self.leverage,
            account_type: self.account_type,
            max_risk_percent: self.max_risk_percent,
            default_risk_percent: self.risk_percent,
        }
    }
}

/// Sparse runtime update; `None` fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigUpdate {
    pub symbol: Option<String>,
    pub timeframe: Option<String>,
    pub risk_percent: Option<f64>,
    pub max_open_positions: Option<usize>,
    pub poll_interval: Option<Duration>,
    pub min_confidence: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

/// One controller log entry, kept in a bounded ring for observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotLog {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

/// Bounded ring of log entries; the oldest entry is evicted first.
pub struct LogBuffer {
    entries: VecDeque<BotLog>,
    capacity: usize,
}

impl LogBuffer {
    pub fn new() -> Self {
        Self::with_capacity(LOG_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, entry: BotLog) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Most recent `limit` entries, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<BotLog> {
        let skip = self.entries.len().saturating_sub(limit);
        self.entries.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Counters accumulated since `start`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BotStats {
    pub cycles_completed: u64,
    pub signals_generated: u64,
    pub trades_executed: u64,
    pub winning_trades: u64,
    pub losing_trades: u64,
    pub total_pnl: f64,
    pub cycle_errors: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub last_signal_at: Option<DateTime<Utc>>,
}

/// Snapshot returned by [`Bot::status`].
#[derive(Debug, Clone, Serialize)]
pub struct BotStatus {
    pub state: BotState,
    pub mode: &'static str,
    pub symbol: String,
    pub timeframe: String,
    pub open_positions: usize,
    /// Market summary from the most recent analysis cycle.
    pub market: Option<MarketState>,
    /// Most recent signal the engine produced, kept after execution.
    pub last_signal: Option<TradeSignal>,
    pub stats: BotStats,
}

/// Latest analysis outputs, refreshed each cycle.
#[derive(Default)]
struct Analysis {
    market: Option<MarketState>,
    signal: Option<TradeSignal>,
}

/// Broadcast event stream for observers. Delivery is best-effort per
/// subscriber.
#[derive(Debug, Clone)]
pub enum BotEvent {
    StateChanged(BotState),
    Log(BotLog),
    Trade(TradeRecord),
}

struct BotInner {
    config: RwLock<BotConfig>,
    state: RwLock<BotState>,
    logs: Mutex<LogBuffer>,
    trades: RwLock<Vec<TradeRecord>>,
    stats: RwLock<BotStats>,
    analysis: RwLock<Analysis>,
    executor: Mutex<Option<Executor>>,
    loop_task: Mutex<Option<JoinHandle<()>>>,
    running: AtomicBool,
    stop_signal: Notify,
    events: broadcast::Sender<BotEvent>,
}

impl BotInner {
    async fn set_state(&self, state: BotState) {
        *self.state.write().await = state;
        debug!(state = %state, "Bot state changed");
        let _ = self.events.send(BotEvent::StateChanged(state));
    }

    /// End-of-cycle transition. Skipped once a stop is pending so
    /// observers see Stopping followed by Stopped, nothing in between.
    async fn back_to_running(&self) {
        if self.running.load(Ordering::SeqCst) {
            self.set_state(BotState::Running).await;
        }
    }

    async fn log(&self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Info => info!("{}", message),
            LogLevel::Warning => warn!("{}", message),
            LogLevel::Error => error!("{}", message),
        }
        let entry = BotLog {
            timestamp: Utc::now(),
            level,
            message,
        };
        self.logs.lock().await.push(entry.clone());
        let _ = self.events.send(BotEvent::Log(entry));
    }

    async fn open_position_count(&self) -> usize {
        self.trades
            .read()
            .await
            .iter()
            .filter(|t| t.status == PositionStatus::Open)
            .count()
    }
}

/// The trading bot. Cheap to clone; all clones share one controller.
#[derive(Clone)]
pub struct Bot {
    inner: Arc<BotInner>,
}

impl Bot {
    pub fn new(config: BotConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(BotInner {
                config: RwLock::new(config),
                state: RwLock::new(BotState::Stopped),
                logs: Mutex::new(LogBuffer::new()),
                trades: RwLock::new(Vec::new()),
                stats: RwLock::new(BotStats::default()),
                analysis: RwLock::new(Analysis::default()),
                executor: Mutex::new(None),
                loop_task: Mutex::new(None),
                running: AtomicBool::new(false),
                stop_signal: Notify::new(),
                events,
            }),
        }
    }

    /// Subscribe to the controller's event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<BotEvent> {
        self.inner.events.subscribe()
    }

    /// Start the decision loop against the given market data source.
    /// A second start while running warns and does nothing. A start
    /// right after a stop first waits for the previous loop task to
    /// exit, so two loops can never be alive at once.
    pub async fn start(&self, market: MarketData) -> Result<()> {
        // Lifecycle lock: serializes concurrent starts and holds the
        // previous loop's handle for draining
        let mut loop_task = self.inner.loop_task.lock().await;
        if self.inner.running.load(Ordering::SeqCst) {
            warn!("Bot already running, start ignored");
            return Ok(());
        }
        if let Some(handle) = loop_task.take() {
            let _ = handle.await;
        }
        self.inner.running.store(true, Ordering::SeqCst);

        self.inner.set_state(BotState::Starting).await;
        let config = self.inner.config.read().await.clone();

        let mut executor = if config.dry_run {
            Executor::Simulated(SimulatedExecutor::new(config.equity, config.leverage))
        } else {
            match VenueClient::from_env().context("Live venue credentials missing") {
                Ok(client) => Executor::Live(LiveExecutor::new(client)),
                Err(e) => {
                    return self.fail_start(e).await;
                }
            }
        };

        if let Err(e) = executor.connect().await {
            return self.fail_start(e.context("Executor connect failed")).await;
        }

        let mode = executor.mode();
        *self.inner.executor.lock().await = Some(executor);

        {
            let mut stats = self.inner.stats.write().await;
            *stats = BotStats {
                started_at: Some(Utc::now()),
                ..BotStats::default()
            };
        }

        self.inner
            .log(
                LogLevel::Info,
                format!(
                    "Bot started: {} {} [{}]",
                    config.symbol, config.timeframe, mode
                ),
            )
            .await;
        self.inner.set_state(BotState::Running).await;

        let inner = Arc::clone(&self.inner);
        *loop_task = Some(tokio::spawn(async move {
            run_loop(inner, market).await;
        }));

        Ok(())
    }

    async fn fail_start(&self, error: anyhow::Error) -> Result<()> {
        self.inner.running.store(false, Ordering::SeqCst);
        self.inner
            .log(LogLevel::Error, format!("Start failed: {:#}", error))
            .await;
        self.inner.set_state(BotState::Error).await;
        Err(error)
    }

    /// Request a stop; the loop finishes its current cycle first.
    pub async fn stop(&self) {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            warn!("Bot not running, stop ignored");
            return;
        }
        self.inner.set_state(BotState::Stopping).await;
        self.inner.log(LogLevel::Info, "Stop requested").await;
        self.inner.stop_signal.notify_one();
    }

    pub async fn state(&self) -> BotState {
        *self.inner.state.read().await
    }

    pub async fn status(&self) -> BotStatus {
        let config = self.inner.config.read().await;
        let analysis = self.inner.analysis.read().await;
        BotStatus {
            state: *self.inner.state.read().await,
            mode: if config.dry_run { "DRY_RUN" } else { "LIVE" },
            symbol: config.symbol.clone(),
            timeframe: config.timeframe.clone(),
            open_positions: self.inner.open_position_count().await,
            market: analysis.market.clone(),
            last_signal: analysis.signal.clone(),
            stats: *self.inner.stats.read().await,
        }
    }

    /// Most recent `limit` log entries, oldest first.
    pub async fn recent_logs(&self, limit: usize) -> Vec<BotLog> {
        self.inner.logs.lock().await.recent(limit)
    }

    pub async fn open_positions(&self) -> Vec<TradeRecord> {
        self.inner
            .trades
            .read()
            .await
            .iter()
            .filter(|t| t.status == PositionStatus::Open)
            .cloned()
            .collect()
    }

    /// Every trade ever opened by this bot, open and closed.
    pub async fn trade_history(&self) -> Vec<TradeRecord> {
        self.inner.trades.read().await.clone()
    }

    /// Apply a sparse config update; it takes effect at the next cycle.
    pub async fn update_config(&self, update: ConfigUpdate) {
        let mut config = self.inner.config.write().await;
        if let Some(symbol) = update.symbol {
            config.symbol = symbol;
        }
        if let Some(timeframe) = update.timeframe {
            config.timeframe = timeframe;
        }
        if let Some(risk) = update.risk_percent {
            config.risk_percent = risk.min(config.max_risk_percent);
        }
        if let Some(max) = update.max_open_positions {
            config.max_open_positions = max;
        }
        if let Some(interval) = update.poll_interval {
            config.poll_interval = interval;
        }
        if let Some(confidence) = update.min_confidence {
            config.strategy.min_confidence = confidence;
        }
        drop(config);
        self.inner
            .log(LogLevel::Info, "Configuration updated")
            .await;
    }

    pub async fn config(&self) -> BotConfig {
        self.inner.config.read().await.clone()
    }

    /// Manually close an open position at the given price.
    pub async fn close_position(&self, position_id: &str, exit_price: f64) -> Result<()> {
        let mut guard = self.inner.executor.lock().await;
        let executor = guard.as_mut().context("Bot is not running")?;

        let result = executor.close_position(position_id, exit_price).await;
        if result.status != OrderStatus::Filled {
            anyhow::bail!(
                "Close failed: {}",
                result.error_message.unwrap_or_default()
            );
        }
        drop(guard);

        let now = Utc::now();
        let mut trades = self.inner.trades.write().await;
        if let Some(record) = trades
            .iter_mut()
            .find(|t| t.id == position_id && t.status == PositionStatus::Open)
        {
            record.close(exit_price, now);
            let record = record.clone();
            drop(trades);
            {
                let mut stats = self.inner.stats.write().await;
                if record.realized_pnl > 0.0 {
                    stats.winning_trades += 1;
                } else if record.realized_pnl < 0.0 {
                    stats.losing_trades += 1;
                }
                stats.total_pnl += record.realized_pnl;
            }
            self.inner
                .log(
                    LogLevel::Info,
                    format!(
                        "Position {} closed, PnL {:.2}",
                        position_id, record.realized_pnl
                    ),
                )
                .await;
            let _ = self.inner.events.send(BotEvent::Trade(record));
        }
        Ok(())
    }
}

async fn run_loop(inner: Arc<BotInner>, market: MarketData) {
    info!("Decision loop started");

    while inner.running.load(Ordering::SeqCst) {
        let wait = match run_cycle(&inner, &market).await {
            Ok(()) => inner.config.read().await.poll_interval,
            Err(e) => {
                inner.stats.write().await.cycle_errors += 1;
                inner
                    .log(LogLevel::Error, format!("Cycle failed: {}", e))
                    .await;
                ERROR_BACKOFF
            }
        };

        if !inner.running.load(Ordering::SeqCst) {
            break;
        }

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = inner.stop_signal.notified() => {}
        }
    }

    if let Some(executor) = inner.executor.lock().await.as_mut() {
        executor.disconnect().await;
    }
    *inner.executor.lock().await = None;

    inner.set_state(BotState::Stopped).await;
    inner.log(LogLevel::Info, "Bot stopped").await;
}

async fn run_cycle(inner: &Arc<BotInner>, market: &MarketData) -> Result<()> {
    // Snapshot so a mid-cycle update cannot mix parameter sets
    let config = inner.config.read().await.clone();
    let engine = SignalEngine::new(config.strategy.clone());
    let mut sizer = PositionSizer::new(config.risk_config());

    inner.set_state(BotState::Analyzing).await;

    let candles = market
        .fetch_candles(&config.symbol, &config.timeframe, CANDLE_FETCH_LIMIT)
        .await;
    inner.stats.write().await.cycles_completed += 1;

    if candles.len() < engine.min_candles() {
        inner
            .log(
                LogLevel::Warning,
                format!(
                    "Insufficient candle history ({} of {}), skipping cycle",
                    candles.len(),
                    engine.min_candles()
                ),
            )
            .await;
        inner.back_to_running().await;
        return Ok(());
    }

    if let Some(state) = engine.market_state(&candles) {
        inner
            .log(
                LogLevel::Info,
                format!(
                    "Market: {} | price {:.2}",
                    state.trend.as_str(),
                    state.current_price
                ),
            )
            .await;
        inner.analysis.write().await.market = Some(state);
    }

    let Some(signal) = engine.evaluate(&candles) else {
        inner.back_to_running().await;
        return Ok(());
    };

    {
        let mut stats = inner.stats.write().await;
        stats.signals_generated += 1;
        stats.last_signal_at = Some(signal.generated_at);
    }
    inner.analysis.write().await.signal = Some(signal.clone());
    inner
        .log(
            LogLevel::Info,
            format!(
                "{} signal @ {:.2} (confidence {:.0}%): {}",
                signal.direction, signal.entry_price, signal.confidence, signal.reason
            ),
        )
        .await;

    let open = inner.open_position_count().await;
    if open >= config.max_open_positions {
        inner
            .log(
                LogLevel::Warning,
                format!(
                    "Maximum open positions reached ({}), signal skipped",
                    config.max_open_positions
                ),
            )
            .await;
        inner.back_to_running().await;
        return Ok(());
    }

    // Track settled equity so sizing follows the account
    {
        let guard = inner.executor.lock().await;
        if let Some(executor) = guard.as_ref() {
            if let Ok(balance) = executor.balance().await {
                sizer.update_equity(balance.total);
            }
        }
    }

    let size = sizer.size(
        &config.symbol,
        signal.entry_price,
        signal.stop_price,
        signal.target_price,
        Some(config.risk_percent),
    );
    if !size.valid {
        inner
            .log(
                LogLevel::Warning,
                format!(
                    "Sizing rejected the signal: {}",
                    size.warning.unwrap_or_default()
                ),
            )
            .await;
        inner.back_to_running().await;
        return Ok(());
    }
    if let Some(warning) = &size.warning {
        inner.log(LogLevel::Warning, warning.clone()).await;
    }

    inner.set_state(BotState::Trading).await;

    let order = TradeOrder {
        client_order_id: Uuid::new_v4().to_string(),
        symbol: config.symbol.clone(),
        side: signal.direction.into(),
        quantity: size.lot_size,
        entry_price: signal.entry_price,
        stop_price: Some(signal.stop_price),
        target_price: Some(signal.target_price),
    };

    let result = {
        let mut guard = inner.executor.lock().await;
        let executor = guard.as_mut().context("Executor unavailable")?;
        executor.execute_trade(&order).await
    };

    if result.status == OrderStatus::Filled {
        let record = TradeRecord {
            id: result.order_id.clone(),
            symbol: config.symbol.clone(),
            side: signal.direction,
            entry_price: result.filled_price.unwrap_or(signal.entry_price),
            exit_price: None,
            quantity: result.filled_quantity,
            stop_price: signal.stop_price,
            target_price: signal.target_price,
            status: PositionStatus::Open,
            realized_pnl: 0.0,
            opened_at: result.created_at,
            closed_at: None,
        };
        inner.trades.write().await.push(record.clone());
        inner.stats.write().await.trades_executed += 1;
        inner
            .log(
                LogLevel::Info,
                format!(
                    "Trade executed: {} {} {:.4} @ {:.2}",
                    record.side, record.symbol, record.quantity, record.entry_price
                ),
            )
            .await;
        let _ = inner.events.send(BotEvent::Trade(record));
    } else {
        inner
            .log(
                LogLevel::Error,
                format!(
                    "Order not filled ({:?}): {}",
                    result.status,
                    result.error_message.unwrap_or_default()
                ),
            )
            .await;
    }

    inner.back_to_running().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ReplayFeed;
    use crate::models::Candle;

    fn candle(close: f64, volume: f64, index: i64) -> Candle {
        Candle {
            open: close,
            high: close,
            low: close,
            close,
            volume,
            timestamp: index,
        }
    }

    /// 250 flat candles, a shallow dip, then a strong recovery close
    /// that produces a bullish fast/medium crossover above the slow
    /// EMA.
    fn bullish_cross_series() -> Vec<Candle> {
        let mut candles = Vec::new();
        let mut index = 0i64;
        for _ in 0..250 {
            candles.push(candle(100.0, 1000.0, index));
            index += 1;
        }
        for close in [99.0, 98.0, 97.0, 96.0, 95.0, 95.0, 95.0, 95.0, 95.0, 95.0] {
            candles.push(candle(close, 1000.0, index));
            index += 1;
        }
        candles.push(candle(120.0, 3000.0, index));
        candles
    }

    fn test_config() -> BotConfig {
        BotConfig {
            // Four-decimal pip instrument keeps margin within equity
            symbol: "EURUSD".to_string(),
            max_open_positions: 1,
            poll_interval: Duration::from_millis(50),
            ..BotConfig::default()
        }
    }

    async fn wait_for<F, Fut>(mut check: F) -> bool
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        for _ in 0..500 {
            if check().await {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_returns_to_stopped() {
        let bot = Bot::new(test_config());
        let market = MarketData::Replay(ReplayFeed::new(vec![candle(100.0, 1.0, 0)]));

        bot.start(market).await.unwrap();
        let bot2 = bot.clone();
        assert!(
            wait_for(|| {
                let b = bot2.clone();
                async move { b.state().await != BotState::Stopped }
            })
            .await
        );

        bot.stop().await;
        let bot2 = bot.clone();
        assert!(
            wait_for(|| {
                let b = bot2.clone();
                async move { b.state().await == BotState::Stopped }
            })
            .await
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_insufficient_history_skips_cycle() {
        let bot = Bot::new(test_config());
        let market = MarketData::Replay(ReplayFeed::new(vec![candle(100.0, 1.0, 0)]));

        bot.start(market).await.unwrap();
        let bot2 = bot.clone();
        assert!(
            wait_for(|| {
                let b = bot2.clone();
                async move {
                    b.recent_logs(100)
                        .await
                        .iter()
                        .any(|l| l.message.contains("Insufficient candle history"))
                }
            })
            .await
        );

        assert!(bot.trade_history().await.is_empty());
        bot.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_dry_run_executes_and_caps_positions() {
        let bot = Bot::new(test_config());
        let market = MarketData::Replay(ReplayFeed::new(bullish_cross_series()));

        bot.start(market).await.unwrap();

        let bot2 = bot.clone();
        assert!(
            wait_for(|| {
                let b = bot2.clone();
                async move { !b.trade_history().await.is_empty() }
            })
            .await
        );

        let trades = bot.trade_history().await;
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].status, PositionStatus::Open);
        assert!(trades[0].quantity > 0.0);

        // The same signal fires every cycle; the cap must hold it to one
        let bot2 = bot.clone();
        assert!(
            wait_for(|| {
                let b = bot2.clone();
                async move {
                    b.recent_logs(200)
                        .await
                        .iter()
                        .any(|l| l.message.contains("Maximum open positions"))
                }
            })
            .await
        );
        assert_eq!(bot.open_positions().await.len(), 1);

        // Observers see the last analysis alongside the counters
        let status = bot.status().await;
        assert!(status.market.is_some());
        let signal = status.last_signal.expect("signal retained");
        assert_eq!(signal.entry_price, 120.0);
        assert!(status.stats.last_signal_at.is_some());
        assert!(bot
            .recent_logs(200)
            .await
            .iter()
            .any(|l| l.message.starts_with("Market:")));

        // Closing above entry books a win and its PnL
        let entry = trades[0].entry_price;
        bot.close_position(&trades[0].id, entry + 10.0).await.unwrap();
        let stats = bot.status().await.stats;
        assert_eq!(stats.winning_trades, 1);
        assert_eq!(stats.losing_trades, 0);
        assert!(stats.total_pnl > 0.0);

        bot.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_drains_previous_loop() {
        let bot = Bot::new(test_config());
        let feed = || MarketData::Replay(ReplayFeed::new(vec![candle(100.0, 1.0, 0)]));

        bot.start(feed()).await.unwrap();
        let bot2 = bot.clone();
        assert!(
            wait_for(|| {
                let b = bot2.clone();
                async move { b.state().await != BotState::Stopped }
            })
            .await
        );

        // An immediate restart must wait out the first loop; exactly
        // one loop exit has been logged when start returns
        bot.stop().await;
        bot.start(feed()).await.unwrap();
        let stops = |logs: Vec<BotLog>| {
            logs.iter()
                .filter(|l| l.message == "Bot stopped")
                .count()
        };
        assert_eq!(stops(bot.recent_logs(1000).await), 1);
        assert_ne!(bot.state().await, BotState::Stopped);

        // Stopping again produces exactly one more loop exit; two
        // would mean two loops had been alive concurrently
        bot.stop().await;
        let bot2 = bot.clone();
        assert!(
            wait_for(|| {
                let b = bot2.clone();
                async move { b.state().await == BotState::Stopped }
            })
            .await
        );
        assert_eq!(stops(bot.recent_logs(1000).await), 2);
    }

    #[tokio::test]
    async fn test_cycle_with_stop_pending_skips_running_transition() {
        // A cycle that straddles a stop must not flip the state back
        // to Running on its way out; the run flag is already down here
        let bot = Bot::new(test_config());
        let market = MarketData::Replay(ReplayFeed::new(vec![candle(100.0, 1.0, 0)]));

        run_cycle(&bot.inner, &market).await.unwrap();

        assert_ne!(bot.state().await, BotState::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_start_is_noop() {
        let bot = Bot::new(test_config());
        let market = MarketData::Replay(ReplayFeed::new(vec![candle(100.0, 1.0, 0)]));
        bot.start(market).await.unwrap();

        let again = MarketData::Replay(ReplayFeed::new(vec![candle(100.0, 1.0, 0)]));
        bot.start(again).await.unwrap();

        assert_ne!(bot.state().await, BotState::Error);
        bot.stop().await;
    }

    #[tokio::test]
    async fn test_update_config_applies_sparse_fields() {
        let bot = Bot::new(test_config());

        bot.update_config(ConfigUpdate {
            risk_percent: Some(1.5),
            max_open_positions: Some(3),
            ..ConfigUpdate::default()
        })
        .await;

        let config = bot.config().await;
        assert_eq!(config.risk_percent, 1.5);
        assert_eq!(config.max_open_positions, 3);
        // Untouched fields keep their values
        assert_eq!(config.symbol, "EURUSD");
    }

    #[tokio::test]
    async fn test_update_config_clamps_risk() {
        let bot = Bot::new(test_config());

        bot.update_config(ConfigUpdate {
            risk_percent: Some(50.0),
            ..ConfigUpdate::default()
        })
        .await;

        assert_eq!(bot.config().await.risk_percent, 2.0);
    }

    #[test]
    fn test_log_buffer_evicts_oldest() {
        let mut buffer = LogBuffer::with_capacity(3);
        for i in 0..5 {
            buffer.push(BotLog {
                timestamp: Utc::now(),
                level: LogLevel::Info,
                message: format!("entry {}", i),
            });
        }

        assert_eq!(buffer.len(), 3);
        let recent = buffer.recent(10);
        assert_eq!(recent[0].message, "entry 2");
        assert_eq!(recent[2].message, "entry 4");
    }

    #[test]
    fn test_log_buffer_recent_limit() {
        let mut buffer = LogBuffer::with_capacity(10);
        for i in 0..5 {
            buffer.push(BotLog {
                timestamp: Utc::now(),
                level: LogLevel::Info,
                message: format!("entry {}", i),
            });
        }

        let recent = buffer.recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].message, "entry 3");
        assert_eq!(recent[1].message, "entry 4");
    }

    #[tokio::test]
    async fn test_close_position_while_stopped_fails() {
        let bot = Bot::new(test_config());
        let result = bot.close_position("SIM_000001", 100.0).await;
        assert!(result.is_err());
    }
}
