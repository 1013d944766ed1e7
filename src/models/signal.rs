//! Trade signals produced by the signal engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Direction of a candidate trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Long => "LONG",
            Direction::Short => "SHORT",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully-derived trade decision. Created only by the signal engine,
/// immutable, and consumed at most once by the sizing/execution stage
/// of the same cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeSignal {
    pub direction: Direction,
    pub entry_price: f64,
    pub stop_price: f64,
    pub target_price: f64,
    /// Swing extremum the stop was derived from.
    pub swing_point: f64,
    pub ema_fast: f64,
    pub ema_medium: f64,
    pub ema_slow: f64,
    pub risk_reward_ratio: f64,
    /// Confidence score in [0, 100].
    pub confidence: f64,
    pub generated_at: DateTime<Utc>,
    /// Human-readable explanation of why the signal fired.
    pub reason: String,
}

impl TradeSignal {
    /// Distance from entry to stop, always positive.
    pub fn stop_distance(&self) -> f64 {
        (self.entry_price - self.stop_price).abs()
    }
}

/// Coarse trend classification for observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrendLabel {
    StrongUptrend,
    WeakUptrend,
    StrongDowntrend,
    WeakDowntrend,
    Sideways,
}

impl TrendLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendLabel::StrongUptrend => "STRONG_UPTREND",
            TrendLabel::WeakUptrend => "WEAK_UPTREND",
            TrendLabel::StrongDowntrend => "STRONG_DOWNTREND",
            TrendLabel::WeakDowntrend => "WEAK_DOWNTREND",
            TrendLabel::Sideways => "SIDEWAYS",
        }
    }
}

/// Snapshot of current market conditions, computed every cycle for
/// observers regardless of whether a signal fired.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketState {
    pub current_price: f64,
    pub ema_fast: f64,
    pub ema_medium: f64,
    pub ema_slow: f64,
    pub trend: TrendLabel,
    pub swing_low: f64,
    pub swing_high: f64,
    /// Percent distance of price from the slow EMA.
    pub price_vs_slow_pct: f64,
    pub ready_for_long: bool,
    pub ready_for_short: bool,
}
