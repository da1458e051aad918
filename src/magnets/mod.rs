//! Magnet Detector (§4.4): round-number, Fibonacci, prior-extreme, and
//! psychological magnets near the current price.
//!
//! Grounded on
//! `examples/original_source/.../magnet_level_detector.py`.

use crate::domain::{Candle, MagnetKind, MagnetLevel, PriceLevel};

const FIB_RATIOS: [f64; 8] = [0.236, 0.382, 0.5, 0.618, 0.786, 1.0, 1.272, 1.618];
const MIN_KEPT_STRENGTH: f64 = 40.0;

fn round_number_intervals(price: f64) -> &'static [f64] {
    if price >= 10_000.0 {
        &[1000.0, 500.0, 100.0]
    } else if price >= 1_000.0 {
        &[100.0, 50.0, 10.0]
    } else if price >= 100.0 {
        &[10.0, 5.0, 1.0]
    } else {
        &[1.0, 0.5, 0.1]
    }
}

fn round_number_base_strength(interval: f64, price: f64) -> f64 {
    match round_number_intervals(price).iter().position(|i| *i == interval) {
        Some(0) => 100.0,
        Some(1) => 80.0,
        _ => 60.0,
    }
}

fn detect_round_numbers(current_price: f64) -> Vec<MagnetLevel> {
    let mut out = Vec::new();
    for &interval in round_number_intervals(current_price) {
        let nearest = (current_price / interval).round() * interval;
        for candidate in [nearest - interval, nearest, nearest + interval] {
            if candidate <= 0.0 {
                continue;
            }
            let distance = (candidate - current_price).abs() / current_price;
            if distance > 0.15 {
                continue;
            }
            let base = round_number_base_strength(interval, current_price);
            let multiple = candidate / interval;
            let mut bonus = 0.0;
            if (multiple / 10.0).fract().abs() < 1e-6 {
                bonus += 15.0;
            } else if (multiple / 5.0).fract().abs() < 1e-6 {
                bonus += 8.0;
            }
            let distance_factor = 1.0 - (distance / 0.15);
            let strength = ((base + bonus) * distance_factor).clamp(0.0, 100.0);
            out.push(MagnetLevel {
                price: candidate,
                kind: MagnetKind::RoundNumber,
                strength,
                attraction_radius: candidate * 0.005,
                historical_reactions: 0,
                last_reaction_at: None,
            });
        }
    }
    out
}

fn detect_fibonacci(current_price: f64, history: &[Candle]) -> Vec<MagnetLevel> {
    if history.is_empty() {
        return Vec::new();
    }
    let tail_start = history.len().saturating_sub(100);
    let tail = &history[tail_start..];
    let high = tail.iter().fold(f64::MIN, |m, c| m.max(c.high));
    let low = tail.iter().fold(f64::MAX, |m, c| m.min(c.low));
    let span = high - low;
    if span <= 0.0 {
        return Vec::new();
    }

    let base_strength = |ratio: f64| -> f64 {
        if (ratio - 0.382).abs() < 1e-9 || (ratio - 0.618).abs() < 1e-9 {
            80.0
        } else if (ratio - 0.5).abs() < 1e-9 || (ratio - 1.0).abs() < 1e-9 {
            70.0
        } else if ratio < 1.0 {
            60.0
        } else {
            50.0
        }
    };

    let mut out = Vec::new();
    for &ratio in FIB_RATIOS.iter() {
        let retracement = high - span * ratio;
        let extension = low + span * ratio;
        for price in [retracement, extension] {
            if price <= 0.0 {
                continue;
            }
            let distance = (price - current_price).abs() / current_price;
            if distance > 0.10 {
                continue;
            }
            out.push(MagnetLevel {
                price,
                kind: MagnetKind::Fibonacci,
                strength: base_strength(ratio),
                attraction_radius: price * 0.008,
                historical_reactions: 0,
                last_reaction_at: None,
            });
        }
    }
    out
}

fn window_extreme(history: &[Candle], hours: usize) -> Option<(f64, f64)> {
    if history.is_empty() {
        return None;
    }
    let start = history.len().saturating_sub(hours);
    let window = &history[start..];
    let high = window.iter().fold(f64::MIN, |m, c| m.max(c.high));
    let low = window.iter().fold(f64::MAX, |m, c| m.min(c.low));
    Some((high, low))
}

fn detect_previous_extremes(current_price: f64, history: &[Candle]) -> Vec<MagnetLevel> {
    let mut out = Vec::new();
    for (hours, base_strength) in [(24usize, 85.0), (168, 70.0), (720, 55.0)] {
        let Some((high, low)) = window_extreme(history, hours) else { continue };
        for (price, kind) in [(high, MagnetKind::PreviousHigh), (low, MagnetKind::PreviousLow)] {
            let distance = (price - current_price).abs() / current_price;
            if !(0.01..=0.08).contains(&distance) {
                continue;
            }
            out.push(MagnetLevel {
                price,
                kind,
                strength: base_strength,
                attraction_radius: price * 0.006,
                historical_reactions: 0,
                last_reaction_at: None,
            });
        }
    }
    out
}

fn detect_psychological(current_price: f64) -> Vec<MagnetLevel> {
    let intervals = round_number_intervals(current_price);
    let main = intervals[0];
    let quarter = main / 4.0;
    let half = main / 2.0;
    let nearest = (current_price / quarter).round() * quarter;

    let mut out = Vec::new();
    for candidate in [nearest - quarter, nearest, nearest + quarter] {
        if candidate <= 0.0 {
            continue;
        }
        let distance = (candidate - current_price).abs() / current_price;
        if distance > 0.10 {
            continue;
        }
        let remainder = (candidate / half).fract().abs();
        let mut strength = 40.0;
        if remainder < 1e-6 {
            strength += 15.0; // falls on a half
        }
        if (candidate / main).fract().abs() < 1e-6 {
            strength += 20.0; // falls on a whole main interval, i.e. a "quarter" anchor
        }
        let distance_factor = 1.0 - (distance / 0.10);
        strength = (strength * distance_factor).max(0.0);
        if strength >= 30.0 {
            out.push(MagnetLevel {
                price: candidate,
                kind: MagnetKind::Psychological,
                strength,
                attraction_radius: candidate * 0.004,
                historical_reactions: 0,
                last_reaction_at: None,
            });
        }
    }
    out
}

/// Boosts a magnet's strength by up to +30 when a `PriceLevel` sits
/// within 1%, and carries over its touch history.
fn enhance_with_levels(mut magnet: MagnetLevel, levels: &[PriceLevel]) -> MagnetLevel {
    if let Some(strongest) = levels
        .iter()
        .filter(|l| l.distance_pct(magnet.price) <= 0.01)
        .max_by(|a, b| a.strength.partial_cmp(&b.strength).unwrap())
    {
        let boost = (strongest.strength / 2.0).min(30.0);
        magnet.strength = (magnet.strength + boost).min(100.0);
        magnet.historical_reactions = strongest.touch_count;
        magnet.last_reaction_at = Some(strongest.last_tested_at);
    }
    magnet
}

/// Full reanalysis for one symbol across all four magnet families,
/// enhanced against the symbol's current `PriceLevel` set and filtered
/// to strength >= 40 (§4.4).
pub fn detect_magnets(
    current_price: f64,
    history: &[Candle],
    levels: &[PriceLevel],
) -> Vec<MagnetLevel> {
    let mut all = Vec::new();
    all.extend(detect_round_numbers(current_price));
    all.extend(detect_fibonacci(current_price, history));
    all.extend(detect_previous_extremes(current_price, history));
    all.extend(detect_psychological(current_price));

    all.into_iter()
        .map(|m| enhance_with_levels(m, levels))
        .filter(|m| m.strength >= MIN_KEPT_STRENGTH)
        .collect()
}

/// Nearest magnet with strength >= 60 within 5% of current price.
pub fn nearest_tradeable_magnet(current_price: f64, magnets: &[MagnetLevel]) -> Option<&MagnetLevel> {
    magnets
        .iter()
        .filter(|m| m.strength >= 60.0 && m.distance_pct(current_price) <= 0.05)
        .min_by(|a, b| {
            a.distance_pct(current_price)
                .partial_cmp(&b.distance_pct(current_price))
                .unwrap()
        })
}

pub fn is_price_near_magnet(current_price: f64, magnet: &MagnetLevel) -> bool {
    (current_price - magnet.price).abs() <= magnet.attraction_radius
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn hist(n: usize, low: f64, high: f64) -> Vec<Candle> {
        (0..n)
            .map(|i| Candle {
                timestamp: Utc::now() + chrono::Duration::hours(i as i64),
                open: low,
                high,
                low,
                close: (low + high) / 2.0,
                volume: 1.0,
            })
            .collect()
    }

    #[test]
    fn all_kept_magnets_meet_strength_floor() {
        let history = hist(120, 48000.0, 52000.0);
        let levels = vec![];
        let magnets = detect_magnets(50000.0, &history, &levels);
        for m in &magnets {
            assert!(m.strength >= MIN_KEPT_STRENGTH - 1e-9);
        }
    }

    #[test]
    fn nearest_tradeable_requires_strength_and_distance() {
        let magnets = vec![
            MagnetLevel {
                price: 50100.0,
                kind: MagnetKind::RoundNumber,
                strength: 70.0,
                attraction_radius: 10.0,
                historical_reactions: 0,
                last_reaction_at: None,
            },
            MagnetLevel {
                price: 52000.0,
                kind: MagnetKind::RoundNumber,
                strength: 90.0,
                attraction_radius: 10.0,
                historical_reactions: 0,
                last_reaction_at: None,
            },
        ];
        let nearest = nearest_tradeable_magnet(50000.0, &magnets).unwrap();
        assert!((nearest.price - 50100.0).abs() < 1e-9);
    }
}
