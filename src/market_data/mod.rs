//! Market data collaborator (§4.1, §10): a narrow trait the core
//! depends on, plus two reference implementations — a Bybit-shaped
//! REST adapter grounded on `bybit/client.rs`'s request-signing style,
//! and an in-memory seeded random walk for tests and demos.

mod bybit;
mod memory;

pub use bybit::BybitMarketData;
pub use memory::InMemoryMarketData;

use async_trait::async_trait;

use crate::domain::Candle;
use crate::error::MarketDataError;

/// Everything the core needs from an exchange or data source: the
/// latest trade price and recent candle history. Kept narrow so paper
/// and real backends are interchangeable (§9 design notes).
#[async_trait]
pub trait MarketData: Send + Sync {
    async fn last_price(&self, symbol: &str) -> Result<f64, MarketDataError>;

    /// Most recent `limit` candles at the given resolution, oldest
    /// first. `interval` is one of `"1m"`, `"5m"`, `"15m"`, `"1h"`,
    /// `"4h"`, `"1d"`; the engine itself only ever requests `"1h"`.
    async fn klines(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, MarketDataError>;
}
