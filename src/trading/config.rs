//! Strategy and risk configuration.

use serde::{Deserialize, Serialize};

/// Parameters for the signal engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Fast EMA period for the crossover trigger
    pub ema_fast: usize,

    /// Medium EMA period for the crossover trigger
    pub ema_medium: usize,

    /// Slow EMA period for the trend filter
    pub ema_slow: usize,

    /// Lookback window for swing high/low detection
    pub swing_lookback: usize,

    /// Minimum risk-reward multiplier applied to the stop distance
    pub min_risk_reward: f64,

    /// Signals scoring below this confidence are discarded (0-100)
    pub min_confidence: f64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            ema_fast: 9,
            ema_medium: 21,
            ema_slow: 200,
            swing_lookback: 10,
            min_risk_reward: 1.5,
            min_confidence: 60.0,
        }
    }
}

/// Lot convention of the trading account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Standard,
    Mini,
    Micro,
}

impl AccountType {
    /// Units of base instrument per 1.0 lot.
    pub fn lot_units(&self) -> f64 {
        match self {
            AccountType::Standard => 100_000.0,
            AccountType::Mini => 10_000.0,
            AccountType::Micro => 1_000.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Standard => "standard",
            AccountType::Mini => "mini",
            AccountType::Micro => "micro",
        }
    }
}

/// Account state and risk limits for position sizing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Account equity in account currency
    pub equity: f64,

    /// Account leverage (1:N)
    pub leverage: u32,

    /// Lot convention
    pub account_type: AccountType,

    /// Hard cap on risk per trade, percent of equity
    pub max_risk_percent: f64,

    /// Risk per trade when the caller does not specify one
    pub default_risk_percent: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            equity: 10_000.0,
            leverage: 100,
            account_type: AccountType::Standard,
            max_risk_percent: 2.0,
            default_risk_percent: 1.0,
        }
    }
}
