//! In-memory seeded random-walk market data adapter for tests and the
//! CLI demo. Grounded on the teacher's paper-trading simulators, which
//! synthesize price action with `rand_distr` rather than hitting a
//! live exchange.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use crate::domain::Candle;
use crate::error::MarketDataError;

use super::MarketData;

struct SymbolSeries {
    candles: Vec<Candle>,
}

/// Deterministic for a given seed: candle generation in `new` uses a
/// `StdRng::seed_from_u64`, never the OS RNG, so repeated runs and
/// tests are reproducible without faking the system clock.
pub struct InMemoryMarketData {
    series: RwLock<HashMap<String, SymbolSeries>>,
}

impl InMemoryMarketData {
    pub fn new(symbols: &[String], seed: u64, history_hours: usize) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut series = HashMap::new();
        for (i, symbol) in symbols.iter().enumerate() {
            let candles = generate_walk(&mut rng, history_hours, 50_000.0 + i as f64 * 1_000.0);
            series.insert(symbol.clone(), SymbolSeries { candles });
        }
        Self { series: RwLock::new(series) }
    }

    /// Appends one more candle to the walk, e.g. to simulate time
    /// passing between orchestrator ticks in a demo.
    pub fn advance(&self, symbol: &str, seed: u64) {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut guard = self.series.write().expect("market data lock poisoned");
        if let Some(s) = guard.get_mut(symbol) {
            if let Some(last) = s.candles.last() {
                let next = step_candle(&mut rng, last);
                s.candles.push(next);
            }
        }
    }
}

fn generate_walk(rng: &mut StdRng, hours: usize, start_price: f64) -> Vec<Candle> {
    let mut candles = Vec::with_capacity(hours);
    let start_time = Utc::now() - Duration::hours(hours as i64);
    let mut price = start_price;
    for i in 0..hours {
        let timestamp = start_time + Duration::hours(i as i64);
        let candle = step_candle_from(rng, timestamp, price);
        price = candle.close;
        candles.push(candle);
    }
    candles
}

fn step_candle(rng: &mut StdRng, prev: &Candle) -> Candle {
    let timestamp = prev.timestamp + Duration::hours(1);
    step_candle_from(rng, timestamp, prev.close)
}

fn step_candle_from(rng: &mut StdRng, timestamp: DateTime<Utc>, open: f64) -> Candle {
    let normal = Normal::new(0.0, 0.004).expect("valid normal distribution params");
    let drift = normal.sample(rng);
    let close = (open * (1.0 + drift)).max(1.0);
    let wick = open.max(close) * 0.002;
    let high = open.max(close) + wick * rng_unit(rng);
    let low = (open.min(close) - wick * rng_unit(rng)).max(0.5);
    let volume = 100.0 + 50.0 * rng_unit(rng);
    Candle { timestamp, open, high, low, close, volume }
}

fn rng_unit(rng: &mut StdRng) -> f64 {
    use rand::Rng;
    rng.gen::<f64>()
}

#[async_trait]
impl MarketData for InMemoryMarketData {
    async fn last_price(&self, symbol: &str) -> Result<f64, MarketDataError> {
        let guard = self.series.read().expect("market data lock poisoned");
        guard
            .get(symbol)
            .and_then(|s| s.candles.last())
            .map(|c| c.close)
            .ok_or_else(|| MarketDataError::Unavailable {
                symbol: symbol.to_string(),
                reason: "symbol not seeded".to_string(),
            })
    }

    async fn klines(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, MarketDataError> {
        if interval != "1h" {
            return Err(MarketDataError::Malformed {
                symbol: symbol.to_string(),
                reason: format!("in-memory walk is hourly only, got interval {interval}"),
            });
        }
        let guard = self.series.read().expect("market data lock poisoned");
        let series = guard.get(symbol).ok_or_else(|| MarketDataError::Unavailable {
            symbol: symbol.to_string(),
            reason: "symbol not seeded".to_string(),
        })?;
        if series.candles.len() < limit {
            return Err(MarketDataError::InsufficientHistory {
                symbol: symbol.to_string(),
                got: series.candles.len(),
                need: limit,
            });
        }
        let start = series.candles.len() - limit;
        Ok(series.candles[start..].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn seeded_walk_is_deterministic() {
        let symbols = vec!["BTCUSDT".to_string()];
        let a = InMemoryMarketData::new(&symbols, 42, 200);
        let b = InMemoryMarketData::new(&symbols, 42, 200);
        let ka = a.klines("BTCUSDT", "1h", 50).await.unwrap();
        let kb = b.klines("BTCUSDT", "1h", 50).await.unwrap();
        for (ca, cb) in ka.iter().zip(kb.iter()) {
            assert!((ca.close - cb.close).abs() < 1e-9);
        }
    }

    #[tokio::test]
    async fn insufficient_history_is_reported() {
        let symbols = vec!["ETHUSDT".to_string()];
        let data = InMemoryMarketData::new(&symbols, 1, 10);
        let err = data.klines("ETHUSDT", "1h", 100).await.unwrap_err();
        assert!(matches!(err, MarketDataError::InsufficientHistory { .. }));
    }

    #[tokio::test]
    async fn unsupported_interval_is_rejected() {
        let symbols = vec!["BTCUSDT".to_string()];
        let data = InMemoryMarketData::new(&symbols, 7, 50);
        let err = data.klines("BTCUSDT", "5m", 10).await.unwrap_err();
        assert!(matches!(err, MarketDataError::Malformed { .. }));
    }
}
