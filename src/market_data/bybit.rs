//! Bybit-shaped reference REST adapter. Grounded on
//! `examples/MrDecryptDecipher-Diia/src/bybit/client.rs`: the same
//! HMAC-SHA256 request signing, recv-window header set, and testnet
//! vs. mainnet base URL switch, trimmed to the read-only market-data
//! surface this core actually needs.

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use tracing::debug;

use crate::domain::Candle;
use crate::error::MarketDataError;

use super::MarketData;

type HmacSha256 = Hmac<Sha256>;

/// Public, read-only Bybit v5 market-data adapter. No API key is
/// needed for `klines`/`tickers`, but the signing helper is kept
/// alongside for parity with the teacher's authenticated client and
/// for future write-surface reuse.
pub struct BybitMarketData {
    base_url: String,
    client: reqwest::Client,
    api_key: Option<String>,
    api_secret: Option<String>,
}

impl BybitMarketData {
    pub fn new(is_testnet: bool) -> Self {
        let base_url = if is_testnet {
            "https://api-testnet.bybit.com".to_string()
        } else {
            "https://api.bybit.com".to_string()
        };
        Self { base_url, client: reqwest::Client::new(), api_key: None, api_secret: None }
    }

    pub fn with_credentials(mut self, api_key: String, api_secret: String) -> Self {
        self.api_key = Some(api_key);
        self.api_secret = Some(api_secret);
        self
    }

    fn timestamp_millis() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before epoch")
            .as_millis() as u64
    }

    #[allow(dead_code)]
    fn sign(&self, timestamp: u64, recv_window: &str, query: &str) -> Option<String> {
        let secret = self.api_secret.as_ref()?;
        let key = self.api_key.as_ref()?;
        let message = format!("{timestamp}{key}{recv_window}{query}");
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
        mac.update(message.as_bytes());
        Some(hex::encode(mac.finalize().into_bytes()))
    }

    fn unavailable(symbol: &str, err: impl std::fmt::Display) -> MarketDataError {
        MarketDataError::Unavailable { symbol: symbol.to_string(), reason: err.to_string() }
    }

    /// Maps the engine's interval vocabulary onto Bybit's numeric/letter
    /// kline interval codes.
    fn bybit_interval(symbol: &str, interval: &str) -> Result<&'static str, MarketDataError> {
        match interval {
            "1m" => Ok("1"),
            "5m" => Ok("5"),
            "15m" => Ok("15"),
            "1h" => Ok("60"),
            "4h" => Ok("240"),
            "1d" => Ok("D"),
            other => Err(MarketDataError::Malformed {
                symbol: symbol.to_string(),
                reason: format!("unsupported interval {other}"),
            }),
        }
    }
}

#[async_trait]
impl MarketData for BybitMarketData {
    async fn last_price(&self, symbol: &str) -> Result<f64, MarketDataError> {
        let url = format!("{}/v5/market/tickers", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("category", "linear"), ("symbol", symbol)])
            .send()
            .await
            .map_err(|e| Self::unavailable(symbol, e))?;

        let body: Value = response.json().await.map_err(|e| Self::unavailable(symbol, e))?;
        debug!(symbol, "bybit ticker response received");

        body["result"]["list"]
            .get(0)
            .and_then(|row| row["lastPrice"].as_str())
            .and_then(|s| s.parse::<f64>().ok())
            .ok_or_else(|| MarketDataError::Malformed {
                symbol: symbol.to_string(),
                reason: "missing result.list[0].lastPrice".to_string(),
            })
    }

    async fn klines(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, MarketDataError> {
        let bybit_interval = Self::bybit_interval(symbol, interval)?;
        let timestamp = Self::timestamp_millis();
        let url = format!("{}/v5/market/kline", self.base_url);
        let limit_str = limit.to_string();
        let response = self
            .client
            .get(&url)
            .query(&[
                ("category", "linear"),
                ("symbol", symbol),
                ("interval", bybit_interval),
                ("limit", limit_str.as_str()),
            ])
            .send()
            .await
            .map_err(|e| Self::unavailable(symbol, e))?;

        let body: Value = response.json().await.map_err(|e| Self::unavailable(symbol, e))?;
        let rows = body["result"]["list"].as_array().ok_or_else(|| MarketDataError::Malformed {
            symbol: symbol.to_string(),
            reason: "missing result.list".to_string(),
        })?;

        let mut candles = Vec::with_capacity(rows.len());
        for row in rows.iter().rev() {
            let get = |i: usize| -> Option<f64> { row.get(i)?.as_str()?.parse::<f64>().ok() };
            let ts_millis = row.get(0).and_then(|v| v.as_str()).and_then(|s| s.parse::<i64>().ok());
            let (Some(ts_millis), Some(open), Some(high), Some(low), Some(close), Some(volume)) =
                (ts_millis, get(1), get(2), get(3), get(4), get(5))
            else {
                continue;
            };
            let timestamp = chrono::DateTime::from_timestamp_millis(ts_millis).unwrap_or(timestamp_to_utc(timestamp));
            candles.push(Candle { timestamp, open, high, low, close, volume });
        }

        if candles.is_empty() {
            return Err(MarketDataError::InsufficientHistory {
                symbol: symbol.to_string(),
                got: 0,
                need: 1,
            });
        }
        Ok(candles)
    }
}

fn timestamp_to_utc(millis: u64) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::from_timestamp_millis(millis as i64).unwrap_or_else(chrono::Utc::now)
}
