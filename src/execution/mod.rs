//! Order execution port: one contract, two backends.
//!
//! The simulated backend keeps an in-process ledger; the live backend
//! delegates to the venue client. Both are driven through the
//! [`Executor`] tagged variant so the controller never branches on the
//! mode itself.
//!
//! Order placement is not idempotent across retries: the controller
//! attaches one client-assigned id per decision cycle and never
//! retries a submission, so semantics are at-most-once best-effort.

mod live;
mod simulated;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::models::{OrderResult, OrderSide};

pub use live::LiveExecutor;
pub use simulated::{SimulatedExecutor, SimulatorStats};

/// A fully-specified order request handed to the port.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeOrder {
    /// Client-assigned id, one per decision cycle.
    pub client_order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: f64,
    /// Reference price the decision was made at.
    pub entry_price: f64,
    pub stop_price: Option<f64>,
    pub target_price: Option<f64>,
}

/// Account balance as seen by the execution backend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccountBalance {
    pub total: f64,
    pub free: f64,
    pub used: f64,
}

/// An open position as reported by the execution backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortPosition {
    pub id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: f64,
    pub entry_price: f64,
    pub stop_price: Option<f64>,
    pub target_price: Option<f64>,
}

/// Execution backend selector.
pub enum Executor {
    Simulated(SimulatedExecutor),
    Live(LiveExecutor),
}

impl Executor {
    pub fn mode(&self) -> &'static str {
        match self {
            Executor::Simulated(_) => "DRY_RUN",
            Executor::Live(_) => "LIVE",
        }
    }

    pub async fn connect(&mut self) -> Result<()> {
        match self {
            Executor::Simulated(e) => {
                e.connect();
                Ok(())
            }
            Executor::Live(e) => e.connect().await,
        }
    }

    pub async fn disconnect(&mut self) {
        match self {
            Executor::Simulated(e) => e.disconnect(),
            Executor::Live(e) => e.disconnect().await,
        }
    }

    pub async fn balance(&self) -> Result<AccountBalance> {
        match self {
            Executor::Simulated(e) => Ok(e.balance()),
            Executor::Live(e) => e.balance().await,
        }
    }

    /// Submit an order; business-level refusals come back as
    /// `Rejected`/`Error` statuses, never as `Err`.
    pub async fn execute_trade(&mut self, order: &TradeOrder) -> OrderResult {
        match self {
            Executor::Simulated(e) => e.execute_trade(order),
            Executor::Live(e) => e.execute_trade(order).await,
        }
    }

    pub async fn open_positions(&self) -> Result<Vec<PortPosition>> {
        match self {
            Executor::Simulated(e) => Ok(e.open_positions()),
            Executor::Live(e) => e.open_positions().await,
        }
    }

    /// Close a position at the given price. Unknown ids come back as
    /// an `Error` result with the ledger untouched.
    pub async fn close_position(&mut self, position_id: &str, exit_price: f64) -> OrderResult {
        match self {
            Executor::Simulated(e) => e.close_position(position_id, exit_price),
            Executor::Live(e) => e.close_position(position_id, exit_price).await,
        }
    }
}
