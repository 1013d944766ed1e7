//! Order execution results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Direction;

/// Side of an order as submitted to a venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }

    /// Side used to close or protect a position opened on this side.
    pub fn opposite(&self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

impl From<Direction> for OrderSide {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Long => OrderSide::Buy,
            Direction::Short => OrderSide::Sell,
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Filled,
    PartiallyFilled,
    Cancelled,
    Rejected,
    Error,
}

impl OrderStatus {
    /// Terminal statuses will never transition further.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled
                | OrderStatus::Cancelled
                | OrderStatus::Rejected
                | OrderStatus::Error
        )
    }
}

/// Uniform result of submitting an order through the execution port,
/// regardless of backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderResult {
    pub order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub status: OrderStatus,
    pub requested_price: f64,
    pub filled_price: Option<f64>,
    pub requested_quantity: f64,
    pub filled_quantity: f64,
    pub stop_price: Option<f64>,
    pub target_price: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub error_message: Option<String>,
}

impl OrderResult {
    /// A rejection produced before any venue interaction.
    pub fn rejected(
        symbol: &str,
        side: OrderSide,
        requested_price: f64,
        requested_quantity: f64,
        message: impl Into<String>,
    ) -> Self {
        Self {
            order_id: String::new(),
            symbol: symbol.to_string(),
            side,
            status: OrderStatus::Rejected,
            requested_price,
            filled_price: None,
            requested_quantity,
            filled_quantity: 0.0,
            stop_price: None,
            target_price: None,
            created_at: Utc::now(),
            error_message: Some(message.into()),
        }
    }

    /// A transport or venue fault.
    pub fn error(
        symbol: &str,
        side: OrderSide,
        requested_price: f64,
        requested_quantity: f64,
        message: impl Into<String>,
    ) -> Self {
        Self {
            status: OrderStatus::Error,
            ..Self::rejected(symbol, side, requested_price, requested_quantity, message)
        }
    }
}
