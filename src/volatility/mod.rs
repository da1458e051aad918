//! Volatility Model (§4.2): ATR%, regime classification, and the
//! per-symbol `ToleranceProfile`, cached for 30 minutes.
//!
//! Grounded on the True Range formula in the teacher's
//! `strategy/indicators.rs::calculate_atr`, generalized to expose the
//! regime/tolerance derivation the original Python
//! `profit_scraping_engine.py::_classify_volatility_regime` performs.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::clock::Clock;
use crate::domain::{Candle, Regime, ToleranceProfile};

pub const ATR_PERIOD: usize = 14;
const FALLBACK_ATR_PCT: f64 = 0.02;

fn clamp(value: f64, lo: f64, hi: f64) -> f64 {
    value.max(lo).min(hi)
}

/// Standard True-Range ATR over `period` candles (teacher's
/// `calculate_atr`, unchanged).
pub fn calculate_atr(candles: &[Candle], period: usize) -> Option<f64> {
    if candles.len() < period + 1 {
        return None;
    }
    let start = candles.len() - period;
    let mut sum = 0.0;
    for i in start..candles.len() {
        let prev_close = candles[i - 1].close;
        sum += candles[i].true_range(prev_close);
    }
    Some(sum / period as f64)
}

pub fn atr_pct_from_candles(candles: &[Candle], period: usize) -> Option<f64> {
    let atr = calculate_atr(candles, period)?;
    let last_close = candles.last()?.close;
    if last_close <= 0.0 {
        return None;
    }
    Some(atr / last_close)
}

/// Derives the full tolerance profile deterministically from `atr_pct`
/// (§4.2). `built_at` is stamped by the caller via the supplied clock.
pub fn derive_tolerance_profile(atr_pct: f64, clock: &dyn Clock) -> ToleranceProfile {
    let regime = Regime::classify(atr_pct);

    let clustering_pct = clamp(atr_pct * 0.20, 0.0010, 0.0050);
    let validation_pct = clamp(atr_pct * 0.40, 0.0030, 0.0120);
    let entry_pct = clamp(atr_pct * 0.25, 0.0020, 0.0080);
    let proximity_pct = clamp(atr_pct * 0.50, 0.0050, 0.0200);

    let base = validation_pct * 0.8;
    let close_buffer_pct = match regime {
        Regime::Calm => (0.0015_f64).max(0.75 * base),
        Regime::Normal => (0.0020_f64).max(0.85 * base),
        Regime::Elevated => (0.0025_f64).max(0.95 * base),
        Regime::High => (0.0035_f64).max(1.00 * base),
    };

    ToleranceProfile {
        atr_pct,
        regime,
        clustering_pct,
        validation_pct,
        entry_pct,
        proximity_pct,
        close_buffer_pct,
        built_at: clock.wall_now(),
    }
}

struct CacheEntry {
    profile: ToleranceProfile,
    cached_at_mono: f64,
}

/// Per-symbol ATR/tolerance cache with a 30-minute TTL. Writes are
/// atomic swaps (behind a `std::sync::RwLock`) so readers never
/// observe a torn profile (§5 ordering guarantees).
pub struct VolatilityModel {
    clock: Arc<dyn Clock>,
    ttl_secs: f64,
    period: usize,
    cache: std::sync::RwLock<HashMap<String, CacheEntry>>,
}

impl VolatilityModel {
    pub fn new(clock: Arc<dyn Clock>, ttl_secs: u64, period: usize) -> Self {
        Self {
            clock,
            ttl_secs: ttl_secs as f64,
            period,
            cache: std::sync::RwLock::new(HashMap::new()),
        }
    }

    /// Returns a cached profile if still fresh, otherwise rebuilds from
    /// `candles` (falling back to the documented NORMAL default on
    /// insufficient history) and refreshes the cache.
    pub fn tolerance_profile(&self, symbol: &str, candles: &[Candle]) -> ToleranceProfile {
        if let Some(entry) = self.cache.read().unwrap().get(symbol) {
            if self.clock.monotonic_secs() - entry.cached_at_mono < self.ttl_secs {
                debug!(symbol, "tolerance profile served from cache");
                return entry.profile;
            }
        }

        let atr_pct = match atr_pct_from_candles(candles, self.period) {
            Some(pct) => pct,
            None => {
                warn!(symbol, "insufficient history for ATR; falling back to NORMAL default");
                FALLBACK_ATR_PCT
            }
        };

        let profile = derive_tolerance_profile(atr_pct, self.clock.as_ref());
        self.cache.write().unwrap().insert(
            symbol.to_string(),
            CacheEntry { profile, cached_at_mono: self.clock.monotonic_secs() },
        );
        profile
    }

    pub fn invalidate(&self, symbol: &str) {
        self.cache.write().unwrap().remove(symbol);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TestClock;
    use chrono::Utc;

    fn candle(open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle { timestamp: Utc::now(), open, high, low, close, volume: 1.0 }
    }

    #[test]
    fn regime_monotonicity_proximity_never_decreases_and_never_exceeds_cap() {
        let boundaries = [0.01, 0.015, 0.02, 0.035, 0.04, 0.055, 0.06, 0.10];
        let clock = TestClock::new(Utc::now());
        let mut last_proximity = 0.0;
        for &atr_pct in &boundaries {
            let profile = derive_tolerance_profile(atr_pct, clock.as_ref());
            assert!(profile.proximity_pct >= last_proximity - 1e-9);
            assert!(profile.proximity_pct <= 0.02 + 1e-9);
            last_proximity = profile.proximity_pct;
        }
    }

    #[test]
    fn e6_regime_tolerances_calm() {
        let clock = TestClock::new(Utc::now());
        let profile = derive_tolerance_profile(0.012, clock.as_ref());
        assert_eq!(profile.regime, Regime::Calm);
        assert!((profile.clustering_pct - 0.0024).abs() < 1e-9);
        assert!((profile.validation_pct - 0.0048).abs() < 1e-9);
        assert!((profile.entry_pct - 0.0030).abs() < 1e-9);
        assert!((profile.proximity_pct - 0.0060).abs() < 1e-9);
        // max(0.0015, 0.75 * 0.8 * 0.0048) = max(0.0015, 0.00288) = 0.00288
        assert!((profile.close_buffer_pct - 0.00288).abs() < 1e-9);
    }

    #[test]
    fn tolerance_consistency_within_cache_window() {
        // Rebuilding from the same atr_pct yields a bit-identical profile.
        let clock = TestClock::new(Utc::now());
        let p1 = derive_tolerance_profile(0.02, clock.as_ref());
        let p2 = derive_tolerance_profile(0.02, clock.as_ref());
        assert_eq!(p1.clustering_pct, p2.clustering_pct);
        assert_eq!(p1.validation_pct, p2.validation_pct);
        assert_eq!(p1.entry_pct, p2.entry_pct);
        assert_eq!(p1.proximity_pct, p2.proximity_pct);
    }

    #[test]
    fn atr_matches_standard_true_range() {
        let candles = vec![
            candle(100.0, 105.0, 95.0, 100.0),
            candle(100.0, 110.0, 98.0, 108.0),
            candle(108.0, 112.0, 104.0, 106.0),
        ];
        let atr = calculate_atr(&candles, 2).unwrap();
        // bar1 TR = max(110-98,|110-100|,|98-100|) = 12
        // bar2 TR = max(112-104,|112-108|,|104-108|) = 8
        assert!((atr - 10.0).abs() < 1e-9);
    }

    #[test]
    fn cache_serves_within_ttl_and_rebuilds_after() {
        let clock = TestClock::new(Utc::now());
        let model = VolatilityModel::new(clock.clone(), 1800, ATR_PERIOD);
        let candles = vec![candle(100.0, 101.0, 99.0, 100.0); 20];
        let first = model.tolerance_profile("BTCUSDT", &candles);
        let second = model.tolerance_profile("BTCUSDT", &candles);
        assert_eq!(first, second);
        clock.advance(1801.0);
        let third = model.tolerance_profile("BTCUSDT", &candles);
        // same inputs still produce the same numeric profile, just rebuilt
        assert_eq!(third.atr_pct, first.atr_pct);
    }
}
