//! Wire types for the market data and venue APIs.

use serde::Deserialize;

/// Raw Binance kline entry: a positional JSON array of mixed numbers
/// and numeric strings.
#[derive(Debug, Deserialize)]
pub struct RawKline(
    pub i64,    // open time (ms)
    pub String, // open
    pub String, // high
    pub String, // low
    pub String, // close
    pub String, // volume
    pub i64,    // close time (ms)
    pub String, // quote asset volume
    pub i64,    // trade count
    pub String, // taker buy base volume
    pub String, // taker buy quote volume
    pub String, // ignored
);

/// Venue response to an order submission.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VenueOrder {
    pub order_id: i64,
    #[serde(default)]
    pub client_order_id: String,
    pub status: String,
    #[serde(default)]
    pub avg_price: String,
    #[serde(default)]
    pub executed_qty: String,
}

impl VenueOrder {
    pub fn filled_price(&self) -> Option<f64> {
        self.avg_price.parse().ok().filter(|p: &f64| *p > 0.0)
    }

    pub fn filled_quantity(&self) -> f64 {
        self.executed_qty.parse().unwrap_or(0.0)
    }
}

/// One asset entry from the venue balance endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawBalanceEntry {
    pub asset: String,
    pub balance: String,
    pub available_balance: String,
}

/// Account balance summary in the settlement currency.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VenueBalance {
    pub total: f64,
    pub free: f64,
    pub used: f64,
}

/// An open position as reported by the venue.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VenuePosition {
    pub symbol: String,
    /// Signed quantity: positive long, negative short.
    #[serde(rename = "positionAmt")]
    pub position_amount: String,
    pub entry_price: String,
}

impl VenuePosition {
    pub fn quantity(&self) -> f64 {
        self.position_amount.parse().unwrap_or(0.0)
    }

    pub fn is_open(&self) -> bool {
        self.quantity() != 0.0
    }
}
