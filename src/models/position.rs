//! Open positions and completed trades.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Direction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionStatus {
    Open,
    Closed,
}

/// A position opened by the bot. Created when an order fills, owned
/// exclusively by the controller's in-memory ledger, and mutated to
/// `Closed` with realized PnL when externally closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub id: String,
    pub symbol: String,
    pub side: Direction,
    pub entry_price: f64,
    pub exit_price: Option<f64>,
    pub quantity: f64,
    pub stop_price: f64,
    pub target_price: f64,
    pub status: PositionStatus,
    pub realized_pnl: f64,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl TradeRecord {
    /// Finalize the record at the given exit price.
    pub fn close(&mut self, exit_price: f64, closed_at: DateTime<Utc>) {
        let pnl = match self.side {
            Direction::Long => (exit_price - self.entry_price) * self.quantity,
            Direction::Short => (self.entry_price - exit_price) * self.quantity,
        };
        self.exit_price = Some(exit_price);
        self.realized_pnl = pnl;
        self.status = PositionStatus::Closed;
        self.closed_at = Some(closed_at);
    }
}
