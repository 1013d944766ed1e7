//! Market data source: OHLCV candles for the controller.
//!
//! Transient failures never surface as errors — `fetch_candles`
//! returns an empty sequence so the controller can log and retry on
//! the next cycle instead of crashing.

use std::time::Duration;

use anyhow::{Context, Result};
use backoff::ExponentialBackoff;
use reqwest::Client;
use tracing::{debug, warn};

use crate::models::Candle;

use super::types::RawKline;

const BINANCE_API_BASE: &str = "https://api.binance.com";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Cap on time spent retrying a single fetch; one candle poll must
/// never outlive its cycle.
const MAX_RETRY_ELAPSED: Duration = Duration::from_secs(20);

const SUPPORTED_TIMEFRAMES: &[&str] = &["1m", "5m", "15m", "30m", "1h", "4h", "1d"];

/// Candle source consumed by the bot controller. The replay variant
/// serves a fixed candle set, used for offline analysis and tests.
pub enum MarketData {
    Binance(BinanceClient),
    Replay(ReplayFeed),
}

impl MarketData {
    /// Fetch up to `limit` candles, oldest-first. Returns an empty
    /// vector on transient failure.
    pub async fn fetch_candles(&self, symbol: &str, timeframe: &str, limit: u32) -> Vec<Candle> {
        match self {
            MarketData::Binance(client) => {
                match client.fetch_klines(symbol, timeframe, limit).await {
                    Ok(candles) => candles,
                    Err(e) => {
                        warn!(symbol = %symbol, error = %e, "Candle fetch failed, returning empty");
                        Vec::new()
                    }
                }
            }
            MarketData::Replay(feed) => feed.candles.clone(),
        }
    }
}

/// Client for the Binance spot klines endpoint (read-only).
pub struct BinanceClient {
    client: Client,
    base_url: String,
}

impl BinanceClient {
    /// Create a new client with default settings.
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: BINANCE_API_BASE.to_string(),
        })
    }

    /// Create with custom base URL (for testing).
    pub fn with_base_url(base_url: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, base_url })
    }

    /// Fetch klines with bounded exponential-backoff retry on
    /// transient failures.
    async fn fetch_klines(&self, symbol: &str, timeframe: &str, limit: u32) -> Result<Vec<Candle>> {
        let interval = if SUPPORTED_TIMEFRAMES.contains(&timeframe) {
            timeframe
        } else {
            warn!(timeframe = %timeframe, "Unsupported timeframe, defaulting to 1h");
            "1h"
        };

        let url = format!(
            "{}/api/v3/klines?symbol={}&interval={}&limit={}",
            self.base_url,
            symbol.to_uppercase(),
            interval,
            limit.min(1000)
        );

        debug!(url = %url, "Fetching klines");

        let policy = ExponentialBackoff {
            max_elapsed_time: Some(MAX_RETRY_ELAPSED),
            ..Default::default()
        };

        let raw: Vec<RawKline> = backoff::future::retry(policy, || async {
            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| backoff::Error::transient(anyhow::Error::from(e)))?;

            let status = response.status();
            if status.is_server_error() || status.as_u16() == 429 {
                return Err(backoff::Error::transient(anyhow::anyhow!(
                    "Klines request failed: {}",
                    status
                )));
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(backoff::Error::permanent(anyhow::anyhow!(
                    "Klines request failed: {} - {}",
                    status,
                    body
                )));
            }

            response
                .json()
                .await
                .map_err(|e| backoff::Error::permanent(anyhow::Error::from(e)))
        })
        .await?;

        let candles = raw
            .iter()
            .map(|k| {
                Ok(Candle {
                    timestamp: k.0,
                    open: k.1.parse().context("Bad open price")?,
                    high: k.2.parse().context("Bad high price")?,
                    low: k.3.parse().context("Bad low price")?,
                    close: k.4.parse().context("Bad close price")?,
                    volume: k.5.parse().context("Bad volume")?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(candles)
    }
}

/// Fixed candle set served on every fetch.
pub struct ReplayFeed {
    candles: Vec<Candle>,
}

impl ReplayFeed {
    pub fn new(candles: Vec<Candle>) -> Self {
        Self { candles }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(close: f64, index: i64) -> Candle {
        Candle {
            open: close,
            high: close,
            low: close,
            close,
            volume: 1.0,
            timestamp: index,
        }
    }

    #[tokio::test]
    async fn test_replay_serves_fixed_candles() {
        let candles = vec![candle(1.0, 0), candle(2.0, 1)];
        let feed = MarketData::Replay(ReplayFeed::new(candles.clone()));

        let fetched = feed.fetch_candles("BTCUSDT", "1h", 500).await;
        assert_eq!(fetched, candles);
    }

    #[tokio::test]
    async fn test_unreachable_binance_returns_empty() {
        // Nothing listens here; the fetch must degrade to an empty vec
        let client = BinanceClient::with_base_url("http://127.0.0.1:1".to_string()).unwrap();
        let feed = MarketData::Binance(client);

        let fetched = feed.fetch_candles("BTCUSDT", "1h", 10).await;
        assert!(fetched.is_empty());
    }
}
