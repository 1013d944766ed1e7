//! Core data types shared across the bot.

mod candle;
mod order;
mod position;
mod signal;

pub use candle::Candle;
pub use order::{OrderResult, OrderSide, OrderStatus};
pub use position::{PositionStatus, TradeRecord};
pub use signal::{Direction, MarketState, TradeSignal, TrendLabel};
