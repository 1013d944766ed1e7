//! Decision pipeline: indicators, signal engine, and position sizing.

mod config;
pub mod indicators;
mod position_sizer;
mod strategy;

pub use config::{AccountType, RiskConfig, StrategyConfig};
pub use position_sizer::{AccountSummary, PositionSizeResult, PositionSizer, TradeValidation};
pub use strategy::SignalEngine;
