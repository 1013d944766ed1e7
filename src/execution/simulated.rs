//! Simulated execution backend: an in-process ledger for dry runs.

use chrono::Utc;
use tracing::{debug, info};

use crate::models::{OrderResult, OrderStatus};

use super::{AccountBalance, PortPosition, TradeOrder};

/// Aggregate statistics over the simulator's order history.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulatorStats {
    pub total_orders: usize,
    pub filled_orders: usize,
    pub open_positions: usize,
    pub balance: f64,
}

/// Dry-run executor. Fills immediately at the requested price with no
/// slippage modeling, reserves margin per position, and settles PnL to
/// the balance on close.
pub struct SimulatedExecutor {
    balance: f64,
    leverage: f64,
    positions: Vec<PortPosition>,
    margins: Vec<f64>,
    order_history: Vec<OrderResult>,
    order_counter: u64,
    connected: bool,
}

impl SimulatedExecutor {
    pub fn new(initial_balance: f64, leverage: u32) -> Self {
        info!(balance = initial_balance, "Simulated executor initialized");
        Self {
            balance: initial_balance,
            leverage: leverage.max(1) as f64,
            positions: Vec::new(),
            margins: Vec::new(),
            order_history: Vec::new(),
            order_counter: 0,
            connected: false,
        }
    }

    pub fn connect(&mut self) {
        self.connected = true;
        info!("[DRY RUN] Connected to simulated venue");
    }

    pub fn disconnect(&mut self) {
        self.connected = false;
        info!("[DRY RUN] Disconnected from simulated venue");
    }

    pub fn balance(&self) -> AccountBalance {
        let used: f64 = self.margins.iter().sum();
        AccountBalance {
            total: self.balance,
            free: self.balance - used,
            used,
        }
    }

    pub fn open_positions(&self) -> Vec<PortPosition> {
        self.positions.clone()
    }

    pub fn order_history(&self) -> &[OrderResult] {
        &self.order_history
    }

    pub fn stats(&self) -> SimulatorStats {
        SimulatorStats {
            total_orders: self.order_history.len(),
            filled_orders: self
                .order_history
                .iter()
                .filter(|o| o.status == OrderStatus::Filled)
                .count(),
            open_positions: self.positions.len(),
            balance: self.balance,
        }
    }

    pub fn execute_trade(&mut self, order: &TradeOrder) -> OrderResult {
        if !self.connected {
            return OrderResult::error(
                &order.symbol,
                order.side,
                order.entry_price,
                order.quantity,
                "Executor not connected",
            );
        }

        self.order_counter += 1;
        let order_id = format!("SIM_{:06}", self.order_counter);

        debug!(
            order_id = %order_id,
            side = %order.side,
            quantity = order.quantity,
            price = order.entry_price,
            "[DRY RUN] Executing trade"
        );

        let margin_required = order.quantity * order.entry_price / self.leverage;
        let free = self.balance().free;

        if margin_required > free {
            let result = OrderResult {
                order_id: order_id.clone(),
                ..OrderResult::rejected(
                    &order.symbol,
                    order.side,
                    order.entry_price,
                    order.quantity,
                    format!(
                        "Insufficient balance: required ${:.2}, available ${:.2}",
                        margin_required, free
                    ),
                )
            };
            self.order_history.push(result.clone());
            return result;
        }

        // Immediate fill at the requested price
        let filled_price = order.entry_price;

        self.positions.push(PortPosition {
            id: order_id.clone(),
            symbol: order.symbol.clone(),
            side: order.side,
            quantity: order.quantity,
            entry_price: filled_price,
            stop_price: order.stop_price,
            target_price: order.target_price,
        });
        self.margins.push(margin_required);

        let result = OrderResult {
            order_id: order_id.clone(),
            symbol: order.symbol.clone(),
            side: order.side,
            status: OrderStatus::Filled,
            requested_price: order.entry_price,
            filled_price: Some(filled_price),
            requested_quantity: order.quantity,
            filled_quantity: order.quantity,
            stop_price: order.stop_price,
            target_price: order.target_price,
            created_at: Utc::now(),
            error_message: None,
        };

        info!(
            order_id = %order_id,
            side = %order.side,
            quantity = order.quantity,
            price = filled_price,
            "[DRY RUN] Order filled"
        );

        self.order_history.push(result.clone());
        result
    }

    pub fn close_position(&mut self, position_id: &str, exit_price: f64) -> OrderResult {
        let Some(index) = self.positions.iter().position(|p| p.id == position_id) else {
            return OrderResult {
                order_id: format!("CLOSE_{}", position_id),
                ..OrderResult::error(
                    "",
                    crate::models::OrderSide::Sell,
                    0.0,
                    0.0,
                    format!("Position {} not found", position_id),
                )
            };
        };

        let position = self.positions.remove(index);
        self.margins.remove(index);

        let pnl = match position.side {
            crate::models::OrderSide::Buy => {
                (exit_price - position.entry_price) * position.quantity
            }
            crate::models::OrderSide::Sell => {
                (position.entry_price - exit_price) * position.quantity
            }
        };
        self.balance += pnl;

        info!(
            position_id = %position_id,
            pnl = pnl,
            balance = self.balance,
            "[DRY RUN] Position closed"
        );

        OrderResult {
            order_id: format!("CLOSE_{}", position_id),
            symbol: position.symbol,
            side: position.side.opposite(),
            status: OrderStatus::Filled,
            requested_price: exit_price,
            filled_price: Some(exit_price),
            requested_quantity: position.quantity,
            filled_quantity: position.quantity,
            stop_price: None,
            target_price: None,
            created_at: Utc::now(),
            error_message: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrderSide;

    fn connected(balance: f64) -> SimulatedExecutor {
        let mut exec = SimulatedExecutor::new(balance, 100);
        exec.connect();
        exec
    }

    fn order(side: OrderSide, quantity: f64, price: f64) -> TradeOrder {
        TradeOrder {
            client_order_id: "cycle-1".to_string(),
            symbol: "BTCUSDT".to_string(),
            side,
            quantity,
            entry_price: price,
            stop_price: Some(price * 0.98),
            target_price: Some(price * 1.03),
        }
    }

    #[test]
    fn test_fill_reserves_margin() {
        let mut exec = connected(10_000.0);

        let result = exec.execute_trade(&order(OrderSide::Buy, 0.1, 50_000.0));

        assert_eq!(result.status, OrderStatus::Filled);
        assert_eq!(result.filled_price, Some(50_000.0));
        assert_eq!(exec.open_positions().len(), 1);

        // Margin = 0.1 * 50,000 / 100 = 50
        let balance = exec.balance();
        assert!((balance.used - 50.0).abs() < 1e-9);
        assert!((balance.free - 9_950.0).abs() < 1e-9);
        assert_eq!(balance.total, 10_000.0);
    }

    #[test]
    fn test_insufficient_margin_rejected() {
        let mut exec = connected(100.0);

        // Margin = 10 * 50,000 / 100 = 5,000 > 100
        let result = exec.execute_trade(&order(OrderSide::Buy, 10.0, 50_000.0));

        assert_eq!(result.status, OrderStatus::Rejected);
        assert_eq!(result.filled_quantity, 0.0);
        assert!(exec.open_positions().is_empty());
        assert_eq!(exec.balance().total, 100.0);
    }

    #[test]
    fn test_close_long_credits_pnl() {
        let mut exec = connected(10_000.0);
        let opened = exec.execute_trade(&order(OrderSide::Buy, 2.0, 1_000.0));

        let closed = exec.close_position(&opened.order_id, 1_050.0);

        assert_eq!(closed.status, OrderStatus::Filled);
        assert_eq!(closed.side, OrderSide::Sell);
        assert!(exec.open_positions().is_empty());
        // PnL = (1050 - 1000) * 2 = +100
        assert!((exec.balance().total - 10_100.0).abs() < 1e-9);
        assert_eq!(exec.balance().used, 0.0);
    }

    #[test]
    fn test_close_short_debits_loss() {
        let mut exec = connected(10_000.0);
        let opened = exec.execute_trade(&order(OrderSide::Sell, 2.0, 1_000.0));

        exec.close_position(&opened.order_id, 1_050.0);

        // Short loses when price rises: (1000 - 1050) * 2 = -100
        assert!((exec.balance().total - 9_900.0).abs() < 1e-9);
    }

    #[test]
    fn test_close_unknown_position_is_error() {
        let mut exec = connected(10_000.0);
        exec.execute_trade(&order(OrderSide::Buy, 1.0, 1_000.0));

        let result = exec.close_position("NOPE", 1_100.0);

        assert_eq!(result.status, OrderStatus::Error);
        assert!(result
            .error_message
            .as_deref()
            .unwrap_or("")
            .contains("not found"));
        // Ledger unchanged
        assert_eq!(exec.open_positions().len(), 1);
        assert_eq!(exec.balance().total, 10_000.0);
    }

    #[test]
    fn test_unconnected_executor_refuses() {
        let mut exec = SimulatedExecutor::new(10_000.0, 100);

        let result = exec.execute_trade(&order(OrderSide::Buy, 0.1, 1_000.0));

        assert_eq!(result.status, OrderStatus::Error);
        assert!(exec.open_positions().is_empty());
    }

    #[test]
    fn test_stats_track_orders() {
        let mut exec = connected(100.0);
        exec.execute_trade(&order(OrderSide::Buy, 0.001, 1_000.0));
        exec.execute_trade(&order(OrderSide::Buy, 500.0, 50_000.0)); // rejected

        let stats = exec.stats();
        assert_eq!(stats.total_orders, 2);
        assert_eq!(stats.filled_orders, 1);
        assert_eq!(stats.open_positions, 1);
    }
}
