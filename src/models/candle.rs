//! OHLCV candle type.

use serde::{Deserialize, Serialize};

/// A single OHLCV candle. Immutable once produced; sequences are
/// ordered oldest-first.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    /// Open time in milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl Candle {
    /// Full high-to-low range of the candle.
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    /// True if the candle closed above its open.
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }
}
