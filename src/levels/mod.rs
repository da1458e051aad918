//! Level Analyzer (§4.3): pivot detection, density clustering, bounce
//! analysis, strength scoring, and the validation/relevance filters.
//!
//! Grounded on `examples/original_source/.../price_level_analyzer.py`:
//! pivot detection mirrors `scipy.signal.argrelextrema(order=5)`,
//! clustering mirrors `sklearn.cluster.DBSCAN(eps, min_samples=2)` with
//! a hand-rolled equivalent (no DBSCAN crate in the teacher's stack).

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::domain::{Candle, LevelKind, PriceLevel, ToleranceProfile};

const PIVOT_WINDOW: usize = 5;
const MIN_SAMPLES: usize = 2;
const MIN_TOUCHES: usize = 3;
const BOUNCE_WINDOW: usize = 10;
const BOUNCE_MOVE_PCT: f64 = 0.005;
const MIN_CANDLES: usize = 100;

/// A local extremum: index into the candle slice and its price.
#[derive(Debug, Clone, Copy)]
struct Pivot {
    index: usize,
    price: f64,
}

/// Local maxima of `high` / minima of `low` over a symmetric window of
/// `PIVOT_WINDOW` candles on each side.
fn find_pivots(candles: &[Candle], kind: LevelKind) -> Vec<Pivot> {
    let n = candles.len();
    let mut pivots = Vec::new();
    if n < 2 * PIVOT_WINDOW + 1 {
        return pivots;
    }
    for i in PIVOT_WINDOW..n - PIVOT_WINDOW {
        let value = match kind {
            LevelKind::Resistance => candles[i].high,
            LevelKind::Support => candles[i].low,
        };
        let window = &candles[i - PIVOT_WINDOW..=i + PIVOT_WINDOW];
        let is_extreme = match kind {
            LevelKind::Resistance => window.iter().all(|c| c.high <= value),
            LevelKind::Support => window.iter().all(|c| c.low >= value),
        };
        if is_extreme {
            pivots.push(Pivot { index: i, price: value });
        }
    }
    pivots
}

/// Density clustering equivalent to `DBSCAN(eps, min_samples)` on a
/// 1-D set of prices: two points are neighbours iff within `eps`;
/// a cluster grows by transitive neighbourhood membership; clusters
/// smaller than `min_samples` are noise (dropped).
fn cluster_1d(mut points: Vec<Pivot>, eps: f64, min_samples: usize) -> Vec<Vec<Pivot>> {
    points.sort_by(|a, b| a.price.partial_cmp(&b.price).unwrap());
    let mut clusters: Vec<Vec<Pivot>> = Vec::new();
    let mut current: Vec<Pivot> = Vec::new();

    for p in points {
        match current.last() {
            Some(prev) if (p.price - prev.price).abs() <= eps => current.push(p),
            Some(_) => {
                if current.len() >= min_samples {
                    clusters.push(std::mem::take(&mut current));
                } else {
                    current.clear();
                }
                current.push(p);
            }
            None => current.push(p),
        }
    }
    if current.len() >= min_samples {
        clusters.push(current);
    }
    clusters
}

/// `strength = touch_score + bounce_reliability + bounce_strength`,
/// clamped to `[0,100]` (§4.3).
pub fn strength_score(touch_count: u32, bounce_count: u32, avg_bounce_pct: f64) -> f64 {
    let touch_score = (touch_count as f64 * 8.0).min(40.0);
    let bounce_reliability = (bounce_count as f64 / (touch_count.max(1) as f64)) * 30.0;
    let bounce_strength = (avg_bounce_pct * 1000.0).min(30.0);
    (touch_score + bounce_reliability + bounce_strength).clamp(0.0, 100.0)
}

struct BounceStats {
    touch_count: u32,
    bounce_count: u32,
    avg_bounce_pct: f64,
    max_bounce_pct: f64,
    last_tested_at: DateTime<Utc>,
    avg_volume_at_level: f64,
}

/// Scans the whole candle history for touches of `p` and whether the
/// next `BOUNCE_WINDOW` candles produced a bounce/rejection.
fn analyze_bounces(
    candles: &[Candle],
    p: f64,
    kind: LevelKind,
    validation_pct: f64,
) -> BounceStats {
    let tolerance = p * validation_pct;
    let mut touch_count = 0u32;
    let mut bounce_count = 0u32;
    let mut bounce_pcts = Vec::new();
    let mut last_tested_at = candles[0].timestamp;
    let mut touch_volumes = Vec::new();

    for i in 0..candles.len() {
        let c = candles[i];
        let touched = match kind {
            LevelKind::Support => (c.low - p).abs() <= tolerance,
            LevelKind::Resistance => (c.high - p).abs() <= tolerance,
        };
        if !touched {
            continue;
        }
        touch_count += 1;
        last_tested_at = c.timestamp;
        touch_volumes.push(c.volume);

        let window_end = (i + 1 + BOUNCE_WINDOW).min(candles.len());
        let future = &candles[i + 1..window_end];
        let bounced = match kind {
            LevelKind::Support => future.iter().any(|f| f.high > p * (1.0 + BOUNCE_MOVE_PCT)),
            LevelKind::Resistance => future.iter().any(|f| f.low < p * (1.0 - BOUNCE_MOVE_PCT)),
        };
        if bounced {
            bounce_count += 1;
            let extreme = match kind {
                LevelKind::Support => future.iter().fold(0.0_f64, |m, f| m.max(f.high)),
                LevelKind::Resistance => future.iter().fold(f64::MAX, |m, f| m.min(f.low)),
            };
            bounce_pcts.push(((extreme - p) / p).abs());
        }
    }

    let avg_bounce_pct = if bounce_pcts.is_empty() {
        0.0
    } else {
        bounce_pcts.iter().sum::<f64>() / bounce_pcts.len() as f64
    };
    let max_bounce_pct = bounce_pcts.iter().cloned().fold(0.0, f64::max);
    let avg_volume_at_level = if touch_volumes.is_empty() {
        0.0
    } else {
        touch_volumes.iter().sum::<f64>() / touch_volumes.len() as f64
    };

    BounceStats {
        touch_count,
        bounce_count,
        avg_bounce_pct,
        max_bounce_pct,
        last_tested_at,
        avg_volume_at_level,
    }
}

/// Keep only levels within 10% of current price, tested within the
/// last 14 days, and with bounce rate >= 30% (§4.3 validation filter).
fn passes_validation(level: &PriceLevel, current_price: f64, now: DateTime<Utc>) -> bool {
    let distance_ok = level.distance_pct(current_price) <= 0.10;
    let age_days = (now - level.last_tested_at).num_seconds() as f64 / 86_400.0;
    let fresh_ok = age_days <= 14.0;
    let bounce_rate = level.bounce_count as f64 / level.touch_count.max(1) as f64;
    let bounce_ok = bounce_rate >= 0.30;
    distance_ok && fresh_ok && bounce_ok
}

/// §4.3 relevance check, used by the entry gate: last tested within 30
/// days, within 15% of current price, `avg_volume_at_level >= 0.8`,
/// and at least one touch in the most recent 20 candles.
pub fn is_relevant(
    level: &PriceLevel,
    current_price: f64,
    now: DateTime<Utc>,
    recent_candles: &[Candle],
    validation_pct: f64,
) -> bool {
    let age_days = (now - level.last_tested_at).num_seconds() as f64 / 86_400.0;
    if age_days > 30.0 {
        return false;
    }
    if level.distance_pct(current_price) > 0.15 {
        return false;
    }
    if level.avg_volume_at_level < 0.8 {
        return false;
    }
    let tail_start = recent_candles.len().saturating_sub(20);
    let tail = &recent_candles[tail_start..];
    let tolerance = level.price * validation_pct;
    let touched_recently = tail.iter().any(|c| match level.kind {
        LevelKind::Support => (c.low - level.price).abs() <= tolerance,
        LevelKind::Resistance => (c.high - level.price).abs() <= tolerance,
    });
    touched_recently
}

/// Full reanalysis for one symbol: produces the replacement
/// `PriceLevel` set, or an empty set when fewer than `MIN_CANDLES` are
/// available (§4.3).
pub fn analyze_levels(
    symbol: &str,
    candles: &[Candle],
    tolerance: &ToleranceProfile,
    now: DateTime<Utc>,
) -> Vec<PriceLevel> {
    if candles.len() < MIN_CANDLES {
        debug!(symbol, got = candles.len(), need = MIN_CANDLES, "insufficient history for level analysis");
        return Vec::new();
    }

    let current_price = candles.last().unwrap().close;
    let mut levels = Vec::new();

    for kind in [LevelKind::Support, LevelKind::Resistance] {
        let pivots = find_pivots(candles, kind);
        if pivots.is_empty() {
            continue;
        }
        let mean_price = pivots.iter().map(|p| p.price).sum::<f64>() / pivots.len() as f64;
        let eps = mean_price * tolerance.clustering_pct;
        let clusters = cluster_1d(pivots, eps, MIN_SAMPLES);

        for cluster in clusters {
            if cluster.len() < MIN_TOUCHES {
                continue;
            }
            let p = cluster.iter().map(|c| c.price).sum::<f64>() / cluster.len() as f64;
            let first_identified_at = candles[cluster.iter().map(|c| c.index).min().unwrap()].timestamp;
            let stats = analyze_bounces(candles, p, kind, tolerance.validation_pct);
            let strength = strength_score(stats.touch_count, stats.bounce_count, stats.avg_bounce_pct);

            let level = PriceLevel {
                price: p,
                kind,
                strength,
                touch_count: stats.touch_count,
                bounce_count: stats.bounce_count,
                avg_bounce_pct: stats.avg_bounce_pct,
                max_bounce_pct: stats.max_bounce_pct,
                last_tested_at: stats.last_tested_at,
                first_identified_at,
                avg_volume_at_level: stats.avg_volume_at_level,
            };
            if passes_validation(&level, current_price, now) {
                levels.push(level);
            }
        }
    }

    levels
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_candles(n: usize, base: f64) -> Vec<Candle> {
        (0..n)
            .map(|i| Candle {
                timestamp: Utc::now() + chrono::Duration::hours(i as i64),
                open: base,
                high: base + 1.0,
                low: base - 1.0,
                close: base,
                volume: 1.0,
            })
            .collect()
    }

    #[test]
    fn strength_bounds_always_hold() {
        for touches in 0..20u32 {
            for bounces in 0..=touches {
                let s = strength_score(touches, bounces, 0.5);
                assert!((0.0..=100.0).contains(&s));
            }
        }
    }

    #[test]
    fn insufficient_history_yields_empty_levels() {
        let candles = flat_candles(10, 100.0);
        let clock = crate::clock::TestClock::new(Utc::now());
        let tol = crate::volatility::derive_tolerance_profile(0.02, clock.as_ref());
        let levels = analyze_levels("BTCUSDT", &candles, &tol, Utc::now());
        assert!(levels.is_empty());
    }

    #[test]
    fn cluster_1d_groups_nearby_points_and_drops_small_clusters() {
        let points = vec![
            Pivot { index: 0, price: 100.0 },
            Pivot { index: 1, price: 100.4 },
            Pivot { index: 2, price: 100.2 },
            Pivot { index: 3, price: 250.0 },
        ];
        let clusters = cluster_1d(points, 1.0, 2);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].len(), 3);
    }
}
