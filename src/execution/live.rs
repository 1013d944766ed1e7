//! Live execution backend: delegates to the venue client.

use anyhow::Result;
use chrono::Utc;
use tracing::{error, info, warn};

use crate::api::VenueClient;
use crate::models::{OrderResult, OrderStatus};

use super::{AccountBalance, PortPosition, TradeOrder};

/// Live executor. Checks free balance before submitting, then places
/// the market order followed by reduce-only protective stop and target
/// legs. A filled position with a dropped protective leg is the most
/// dangerous failure mode, so leg failures are always surfaced loudly.
pub struct LiveExecutor {
    client: VenueClient,
    connected: bool,
}

impl LiveExecutor {
    pub fn new(client: VenueClient) -> Self {
        warn!("LIVE TRADING MODE - real orders will be sent");
        Self {
            client,
            connected: false,
        }
    }

    pub async fn connect(&mut self) -> Result<()> {
        // Balance probe doubles as a credential check
        let balance = self.client.fetch_balance().await?;
        self.connected = true;
        info!(free = balance.free, "Connected to live venue");
        Ok(())
    }

    pub async fn disconnect(&mut self) {
        self.connected = false;
        info!("Disconnected from live venue");
    }

    pub async fn balance(&self) -> Result<AccountBalance> {
        let balance = self.client.fetch_balance().await?;
        Ok(AccountBalance {
            total: balance.total,
            free: balance.free,
            used: balance.used,
        })
    }

    pub async fn open_positions(&self) -> Result<Vec<PortPosition>> {
        let positions = self.client.fetch_open_positions().await?;
        Ok(positions
            .iter()
            .map(|p| {
                let quantity = p.quantity();
                PortPosition {
                    id: p.symbol.clone(),
                    symbol: p.symbol.clone(),
                    side: if quantity >= 0.0 {
                        crate::models::OrderSide::Buy
                    } else {
                        crate::models::OrderSide::Sell
                    },
                    quantity: quantity.abs(),
                    entry_price: p.entry_price.parse().unwrap_or(0.0),
                    stop_price: None,
                    target_price: None,
                }
            })
            .collect())
    }

    pub async fn execute_trade(&mut self, order: &TradeOrder) -> OrderResult {
        if !self.connected {
            return OrderResult::error(
                &order.symbol,
                order.side,
                order.entry_price,
                order.quantity,
                "Executor not connected",
            );
        }

        // Balance gate: refuse before touching the order endpoint
        let free = match self.client.fetch_balance().await {
            Ok(balance) => balance.free,
            Err(e) => {
                error!(error = %e, "Balance check failed");
                return OrderResult::error(
                    &order.symbol,
                    order.side,
                    order.entry_price,
                    order.quantity,
                    format!("Balance check failed: {}", e),
                );
            }
        };

        let required = order.quantity * order.entry_price;
        if required > free {
            return OrderResult::rejected(
                &order.symbol,
                order.side,
                order.entry_price,
                order.quantity,
                format!(
                    "Insufficient balance: required ${:.2}, available ${:.2}",
                    required, free
                ),
            );
        }

        let venue_order = match self
            .client
            .submit_market_order(
                &order.symbol,
                order.side,
                order.quantity,
                &order.client_order_id,
            )
            .await
        {
            Ok(venue_order) => venue_order,
            Err(e) => {
                error!(error = %e, "Market order failed");
                return OrderResult::error(
                    &order.symbol,
                    order.side,
                    order.entry_price,
                    order.quantity,
                    e.to_string(),
                );
            }
        };

        // Protective legs are opposite-side reduce-only triggers. A
        // failure here leaves a filled, unprotected position: surface
        // it as an error and never drop a leg silently.
        let protect_side = order.side.opposite();

        if let Some(stop_price) = order.stop_price {
            if let Err(e) = self
                .client
                .submit_stop_order(&order.symbol, protect_side, order.quantity, stop_price)
                .await
            {
                warn!(
                    order_id = venue_order.order_id,
                    error = %e,
                    "Stop leg failed, position is UNPROTECTED"
                );
                return self.leg_failure(order, &venue_order, "stop", &e);
            }
            info!(stop = stop_price, "Stop leg placed");
        }

        if let Some(target_price) = order.target_price {
            if let Err(e) = self
                .client
                .submit_target_order(&order.symbol, protect_side, order.quantity, target_price)
                .await
            {
                warn!(
                    order_id = venue_order.order_id,
                    error = %e,
                    "Target leg failed, position has no take-profit"
                );
                return self.leg_failure(order, &venue_order, "target", &e);
            }
            info!(target = target_price, "Target leg placed");
        }

        OrderResult {
            order_id: venue_order.order_id.to_string(),
            symbol: order.symbol.clone(),
            side: order.side,
            status: if venue_order.status == "FILLED" {
                OrderStatus::Filled
            } else {
                OrderStatus::Pending
            },
            requested_price: order.entry_price,
            filled_price: venue_order.filled_price(),
            requested_quantity: order.quantity,
            filled_quantity: venue_order.filled_quantity(),
            stop_price: order.stop_price,
            target_price: order.target_price,
            created_at: Utc::now(),
            error_message: None,
        }
    }

    fn leg_failure(
        &self,
        order: &TradeOrder,
        venue_order: &crate::api::VenueOrder,
        leg: &str,
        err: &anyhow::Error,
    ) -> OrderResult {
        OrderResult {
            order_id: venue_order.order_id.to_string(),
            filled_price: venue_order.filled_price(),
            filled_quantity: venue_order.filled_quantity(),
            stop_price: order.stop_price,
            target_price: order.target_price,
            ..OrderResult::error(
                &order.symbol,
                order.side,
                order.entry_price,
                order.quantity,
                format!("{} leg failed after fill: {}", leg, err),
            )
        }
    }

    /// Close by submitting an opposite-side reduce-only market order.
    pub async fn close_position(&mut self, position_id: &str, exit_price: f64) -> OrderResult {
        let positions = match self.open_positions().await {
            Ok(positions) => positions,
            Err(e) => {
                return OrderResult::error("", crate::models::OrderSide::Sell, 0.0, 0.0, {
                    format!("Position lookup failed: {}", e)
                });
            }
        };

        let Some(position) = positions.into_iter().find(|p| p.id == position_id) else {
            return OrderResult::error(
                "",
                crate::models::OrderSide::Sell,
                0.0,
                0.0,
                format!("Position {} not found", position_id),
            );
        };

        let close_side = position.side.opposite();
        match self
            .client
            .submit_market_order(
                &position.symbol,
                close_side,
                position.quantity,
                &format!("close-{}", position_id),
            )
            .await
        {
            Ok(venue_order) => OrderResult {
                order_id: venue_order.order_id.to_string(),
                symbol: position.symbol,
                side: close_side,
                status: OrderStatus::Filled,
                requested_price: exit_price,
                filled_price: venue_order.filled_price().or(Some(exit_price)),
                requested_quantity: position.quantity,
                filled_quantity: venue_order.filled_quantity(),
                stop_price: None,
                target_price: None,
                created_at: Utc::now(),
                error_message: None,
            },
            Err(e) => {
                error!(error = %e, "Close order failed");
                OrderResult::error(
                    &position.symbol,
                    close_side,
                    exit_price,
                    position.quantity,
                    e.to_string(),
                )
            }
        }
    }
}
