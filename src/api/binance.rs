use super::MarketData;
use crate::models::{BarInterval, PriceBar, PriceQuote};
use crate::{BotError, Result};
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use governor::{Quota, RateLimiter};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::num::NonZeroU32;
use std::sync::Arc;
use tokio::time::{sleep, Duration};

pub const BINANCE_FUTURES_API_BASE: &str = "https://fapi.binance.com";
pub const DEFAULT_RATE_LIMIT_RPM: u32 = 1200;
const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 2000; // Start with 2 seconds
const MAX_KLINES_LIMIT: usize = 1500;

type BinanceRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Client for Binance USDⓈ-M futures public market data
///
/// Cloneable; clones share the rate limiter.
#[derive(Clone)]
pub struct BinanceFuturesClient {
    client: Client,
    base_url: String,
    rate_limiter: Arc<BinanceRateLimiter>,
    retry_backoff: Duration,
}

#[derive(Debug, Deserialize)]
struct TickerPriceResponse {
    #[allow(dead_code)]
    symbol: String,
    price: String,
    #[serde(default)]
    time: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    code: i64,
    msg: String,
}

impl BinanceFuturesClient {
    pub fn new(base_url: impl Into<String>, requests_per_minute: u32) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .context("Failed to build HTTP client")?;

        let rpm = NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_minute(rpm)));

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            rate_limiter,
            retry_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
        })
    }

    /// Client pointed at the production futures API
    pub fn production() -> anyhow::Result<Self> {
        Self::new(BINANCE_FUTURES_API_BASE, DEFAULT_RATE_LIMIT_RPM)
    }

    /// Override the initial retry backoff (doubles per attempt)
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Rate-limited GET with retry on network errors, 429 and 5xx
    ///
    /// Other 4xx responses are returned immediately with Binance's message.
    async fn get_with_retry(&self, path: &str, query: &[(&str, String)]) -> std::result::Result<String, String> {
        let url = format!("{}{}", self.base_url, path);
        let mut last_error = String::from("no attempt made");

        for attempt in 1..=MAX_RETRIES {
            self.rate_limiter.until_ready().await;

            match self.client.get(&url).query(query).send().await {
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.map_err(|e| e.to_string())?;

                    if status.is_success() {
                        if attempt > 1 {
                            tracing::info!("✓ {} succeeded after {} attempts", path, attempt);
                        }
                        return Ok(body);
                    }

                    last_error = describe_error(status, &body);
                    let retryable =
                        status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
                    if !retryable {
                        return Err(last_error);
                    }
                }
                Err(e) => {
                    last_error = e.to_string();
                }
            }

            if attempt < MAX_RETRIES {
                let backoff = self.retry_backoff * 2_u32.pow(attempt - 1);
                tracing::warn!(
                    "Attempt {}/{} for {} failed: {}. Retrying in {:?}...",
                    attempt,
                    MAX_RETRIES,
                    path,
                    last_error,
                    backoff
                );
                sleep(backoff).await;
            }
        }

        Err(last_error)
    }
}

fn describe_error(status: StatusCode, body: &str) -> String {
    match serde_json::from_str::<ApiErrorResponse>(body) {
        Ok(err) => format!("HTTP {} (code {}): {}", status.as_u16(), err.code, err.msg),
        Err(_) => format!("HTTP {}", status.as_u16()),
    }
}

fn parse_decimal(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::String(s) => s.parse().ok(),
        serde_json::Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

fn millis_to_utc(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

/// Parse one kline row: `[openTime, open, high, low, close, volume, closeTime, ...]`
fn parse_kline(row: &[serde_json::Value]) -> Option<PriceBar> {
    if row.len() < 6 {
        return None;
    }

    Some(PriceBar {
        timestamp: millis_to_utc(row[0].as_i64()?)?,
        open: parse_decimal(&row[1])?,
        high: parse_decimal(&row[2])?,
        low: parse_decimal(&row[3])?,
        close: parse_decimal(&row[4])?,
        volume: parse_decimal(&row[5])?,
    })
}

#[async_trait]
impl MarketData for BinanceFuturesClient {
    async fn fetch_bars(
        &self,
        instrument: &str,
        interval: BarInterval,
        count: usize,
    ) -> Result<Vec<PriceBar>> {
        let limit = count.clamp(1, MAX_KLINES_LIMIT);
        let query = [
            ("symbol", instrument.to_string()),
            ("interval", interval.as_str().to_string()),
            ("limit", limit.to_string()),
        ];

        let body = self
            .get_with_retry("/fapi/v1/klines", &query)
            .await
            .map_err(|e| BotError::data_unavailable(instrument, e))?;

        let rows: Vec<Vec<serde_json::Value>> = serde_json::from_str(&body)
            .map_err(|e| BotError::data_unavailable(instrument, format!("bad klines payload: {}", e)))?;

        rows.iter()
            .enumerate()
            .map(|(i, row)| {
                parse_kline(row).ok_or_else(|| {
                    BotError::data_unavailable(instrument, format!("malformed kline at row {}", i))
                })
            })
            .collect()
    }

    async fn fetch_last_price(&self, instrument: &str) -> Result<PriceQuote> {
        let query = [("symbol", instrument.to_string())];

        let body = self
            .get_with_retry("/fapi/v1/ticker/price", &query)
            .await
            .map_err(|e| BotError::price_unavailable(instrument, e))?;

        let ticker: TickerPriceResponse = serde_json::from_str(&body)
            .map_err(|e| BotError::price_unavailable(instrument, format!("bad ticker payload: {}", e)))?;

        let price: f64 = ticker.price.parse().map_err(|_| {
            BotError::price_unavailable(instrument, format!("non-numeric price '{}'", ticker.price))
        })?;
        if !price.is_finite() || price <= 0.0 {
            return Err(BotError::price_unavailable(
                instrument,
                format!("invalid price {}", price),
            ));
        }

        let timestamp = ticker.time.and_then(millis_to_utc).unwrap_or_else(Utc::now);

        Ok(PriceQuote { price, timestamp })
    }
}
