//! Signed REST client for the live order-routing venue.
//!
//! Covers exactly the capability set the execution port needs: market
//! orders, reduce-only protective stop/target legs, balance, and open
//! positions. Requests are HMAC-SHA256 signed over the query string.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use hmac::{Hmac, Mac};
use reqwest::Client;
use sha2::Sha256;
use tracing::{debug, info};

use crate::models::OrderSide;

use super::types::{RawBalanceEntry, VenueBalance, VenueOrder, VenuePosition};

type HmacSha256 = Hmac<Sha256>;

const VENUE_API_BASE: &str = "https://fapi.binance.com";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const RECV_WINDOW: &str = "5000";

/// Settlement asset the balance endpoints are reduced to.
const SETTLEMENT_ASSET: &str = "USDT";

pub struct VenueClient {
    client: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
}

impl VenueClient {
    /// Build a client from `VENUE_API_KEY` / `VENUE_API_SECRET`
    /// environment variables.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("VENUE_API_KEY").context("VENUE_API_KEY not set")?;
        let api_secret = std::env::var("VENUE_API_SECRET").context("VENUE_API_SECRET not set")?;
        Self::new(api_key, api_secret)
    }

    pub fn new(api_key: String, api_secret: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: VENUE_API_BASE.to_string(),
            api_key,
            api_secret,
        })
    }

    /// Create with custom base URL (for testing).
    pub fn with_base_url(api_key: String, api_secret: String, base_url: String) -> Result<Self> {
        let mut client = Self::new(api_key, api_secret)?;
        client.base_url = base_url;
        Ok(client)
    }

    fn timestamp_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }

    fn sign(&self, payload: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn signed_query(&self, params: &str) -> String {
        let query = format!(
            "{}&recvWindow={}&timestamp={}",
            params,
            RECV_WINDOW,
            Self::timestamp_ms()
        );
        let signature = self.sign(&query);
        format!("{}&signature={}", query, signature)
    }

    async fn post_order(&self, params: &str) -> Result<VenueOrder> {
        let url = format!(
            "{}/fapi/v1/order?{}",
            self.base_url,
            self.signed_query(params)
        );

        debug!(params = %params, "Submitting order");

        let response = self
            .client
            .post(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await
            .context("Failed to submit order")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Order submission failed: {} - {}", status, body);
        }

        response
            .json()
            .await
            .context("Failed to parse order response")
    }

    /// Submit a market order with a client-assigned id.
    pub async fn submit_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
        client_order_id: &str,
    ) -> Result<VenueOrder> {
        let params = format!(
            "symbol={}&side={}&type=MARKET&quantity={}&newClientOrderId={}",
            symbol.to_uppercase(),
            side.as_str(),
            quantity,
            client_order_id
        );

        let order = self.post_order(&params).await?;
        info!(order_id = order.order_id, symbol = %symbol, side = %side, "Market order submitted");
        Ok(order)
    }

    /// Submit a reduce-only protective stop leg.
    pub async fn submit_stop_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
        trigger_price: f64,
    ) -> Result<VenueOrder> {
        let params = format!(
            "symbol={}&side={}&type=STOP_MARKET&quantity={}&stopPrice={}&reduceOnly=true",
            symbol.to_uppercase(),
            side.as_str(),
            quantity,
            trigger_price
        );
        self.post_order(&params).await
    }

    /// Submit a reduce-only take-profit leg.
    pub async fn submit_target_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
        trigger_price: f64,
    ) -> Result<VenueOrder> {
        let params = format!(
            "symbol={}&side={}&type=TAKE_PROFIT_MARKET&quantity={}&stopPrice={}&reduceOnly=true",
            symbol.to_uppercase(),
            side.as_str(),
            quantity,
            trigger_price
        );
        self.post_order(&params).await
    }

    /// Fetch the account balance reduced to the settlement asset.
    pub async fn fetch_balance(&self) -> Result<VenueBalance> {
        let url = format!(
            "{}/fapi/v2/balance?{}",
            self.base_url,
            self.signed_query("")
        );

        let response = self
            .client
            .get(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await
            .context("Failed to fetch balance")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Balance request failed: {} - {}", status, body);
        }

        let entries: Vec<RawBalanceEntry> = response
            .json()
            .await
            .context("Failed to parse balance response")?;

        let entry = entries
            .iter()
            .find(|e| e.asset == SETTLEMENT_ASSET)
            .with_context(|| format!("No {} balance entry", SETTLEMENT_ASSET))?;

        let total: f64 = entry.balance.parse().context("Bad balance value")?;
        let free: f64 = entry
            .available_balance
            .parse()
            .context("Bad available balance value")?;

        Ok(VenueBalance {
            total,
            free,
            used: total - free,
        })
    }

    /// Fetch currently open positions.
    pub async fn fetch_open_positions(&self) -> Result<Vec<VenuePosition>> {
        let url = format!(
            "{}/fapi/v2/positionRisk?{}",
            self.base_url,
            self.signed_query("")
        );

        let response = self
            .client
            .get(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await
            .context("Failed to fetch positions")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Positions request failed: {} - {}", status, body);
        }

        let positions: Vec<VenuePosition> = response
            .json()
            .await
            .context("Failed to parse positions response")?;

        Ok(positions.into_iter().filter(|p| p.is_open()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_is_stable_hex() {
        let client =
            VenueClient::new("key".to_string(), "secret".to_string()).expect("client builds");

        let a = client.sign("symbol=BTCUSDT&side=BUY");
        let b = client.sign("symbol=BTCUSDT&side=BUY");

        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_signed_query_shape() {
        let client =
            VenueClient::new("key".to_string(), "secret".to_string()).expect("client builds");

        let query = client.signed_query("symbol=BTCUSDT");
        assert!(query.starts_with("symbol=BTCUSDT&recvWindow=5000&timestamp="));
        assert!(query.contains("&signature="));
    }
}
