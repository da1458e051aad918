//! Multi-timeframe trend detection (§4.5.4).
//!
//! Grounded on `_detect_market_trend`/`_calculate_trend_score` in
//! `examples/original_source/.../profit_scraping_engine.py`, and on the
//! teacher's `strategy/indicators.rs::is_uptrend/is_downtrend` for the
//! moving-average idiom.

use crate::domain::Candle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    StrongUp,
    Up,
    Neutral,
    Down,
    StrongDown,
}

impl Trend {
    pub fn is_up(self) -> bool {
        matches!(self, Trend::Up | Trend::StrongUp)
    }

    pub fn is_down(self) -> bool {
        matches!(self, Trend::Down | Trend::StrongDown)
    }
}

fn sma(candles: &[Candle]) -> f64 {
    candles.iter().map(|c| c.close).sum::<f64>() / candles.len() as f64
}

/// Single-window trend score combining 5-bar momentum, a 20-bar
/// moving-average slope over the last 10 bars, and a
/// higher-high/higher-low (or lower/lower) pattern check.
fn window_score(candles: &[Candle]) -> f64 {
    if candles.len() < 30 {
        return 0.0;
    }
    let n = candles.len();

    // (a) 5-bar momentum vs 5-bar older average.
    let recent5 = sma(&candles[n - 5..]);
    let older5 = sma(&candles[n - 10..n - 5]);
    let momentum = if older5 > 0.0 { (recent5 - older5) / older5 } else { 0.0 };

    // (b) 20-bar moving-average slope over the last 10 bars.
    let ma_now = sma(&candles[n - 20..]);
    let ma_10_ago = sma(&candles[n - 30..n - 10]);
    let slope = if ma_10_ago > 0.0 { (ma_now - ma_10_ago) / ma_10_ago } else { 0.0 };

    // (c) higher-high/higher-low (or lower/lower) pattern, last 10 vs
    // earlier 10 bars.
    let last10 = &candles[n - 10..];
    let earlier10 = &candles[n - 20..n - 10];
    let last_high = last10.iter().fold(f64::MIN, |m, c| m.max(c.high));
    let last_low = last10.iter().fold(f64::MAX, |m, c| m.min(c.low));
    let earlier_high = earlier10.iter().fold(f64::MIN, |m, c| m.max(c.high));
    let earlier_low = earlier10.iter().fold(f64::MAX, |m, c| m.min(c.low));
    let pattern = if last_high > earlier_high && last_low > earlier_low {
        1.0
    } else if last_high < earlier_high && last_low < earlier_low {
        -1.0
    } else {
        0.0
    };

    (momentum + slope + pattern * 0.01) / 3.0
}

/// Combined score across 7d / 21d / 60d 1h windows:
/// `0.5*short + 0.3*medium + 0.2*long`.
pub fn trend_score(candles_1h: &[Candle]) -> f64 {
    let short_window = candles_1h.len().min(7 * 24);
    let medium_window = candles_1h.len().min(21 * 24);
    let long_window = candles_1h.len().min(60 * 24);

    let short = window_score(&candles_1h[candles_1h.len() - short_window..]);
    let medium = window_score(&candles_1h[candles_1h.len() - medium_window..]);
    let long = window_score(&candles_1h[candles_1h.len() - long_window..]);

    0.5 * short + 0.3 * medium + 0.2 * long
}

pub fn classify_trend(score: f64) -> Trend {
    if score > 0.015 {
        Trend::StrongUp
    } else if score > 0.005 {
        Trend::Up
    } else if score < -0.015 {
        Trend::StrongDown
    } else if score < -0.005 {
        Trend::Down
    } else {
        Trend::Neutral
    }
}

pub fn detect_trend(candles_1h: &[Candle]) -> Trend {
    classify_trend(trend_score(candles_1h))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn trending(n: usize, start: f64, step: f64) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let price = start + step * i as f64;
                Candle {
                    timestamp: Utc::now() + chrono::Duration::hours(i as i64),
                    open: price,
                    high: price + 1.0,
                    low: price - 1.0,
                    close: price,
                    volume: 1.0,
                }
            })
            .collect()
    }

    #[test]
    fn strong_uptrend_classifies_up() {
        let candles = trending(7 * 24, 100.0, 0.5);
        let trend = detect_trend(&candles);
        assert!(trend.is_up());
    }

    #[test]
    fn flat_series_is_neutral() {
        let candles = trending(7 * 24, 100.0, 0.0);
        assert_eq!(detect_trend(&candles), Trend::Neutral);
    }

    #[test]
    fn strong_downtrend_classifies_down() {
        let candles = trending(7 * 24, 500.0, -0.5);
        let trend = detect_trend(&candles);
        assert!(trend.is_down());
    }
}
