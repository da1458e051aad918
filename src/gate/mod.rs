//! Opportunity construction and the multi-stage entry gate (§4.5,
//! §4.5.3). Grounded on `_validate_entry_conditions` and
//! `_find_profit_scraping_opportunities` in
//! `examples/original_source/.../profit_scraping_engine.py`.

use chrono::{DateTime, Utc};

use crate::config::{ExecutionConfig, TargetMode};
use crate::domain::{Candle, LevelKind, MagnetLevel, Opportunity, PriceLevel, Side, ToleranceProfile};
use crate::levels;
use crate::targeting;
use crate::trend::Trend;

const OPPORTUNITY_MAX_DISTANCE_PCT: f64 = 0.03;
const MAGNET_MATCH_DISTANCE_PCT: f64 = 0.01;
const MAX_OPPORTUNITIES_PER_SYMBOL: usize = 3;
const RECENT_CANDLES_FOR_BOUNCE_HISTORY: usize = 10;

/// Specific, test-exposable reason an opportunity failed the gate
/// (§4.5.3, §7 `GateRejection`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateRejectionReason {
    NotRelevant,
    OutOfBounds,
    CounterTrendStrength { required: u32, actual: u32 },
    TrendWeaknessStrength { required: u32, actual: u32 },
    BounceRejectionRateTooLow { rate_pct: u32 },
    ConfirmationCandleClose,
    ConfirmationCandleWick,
    ConfirmationCandleDirection,
}

impl std::fmt::Display for GateRejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GateRejectionReason::NotRelevant => write!(f, "level_not_relevant"),
            GateRejectionReason::OutOfBounds => write!(f, "price_out_of_bounds"),
            GateRejectionReason::CounterTrendStrength { required, actual } => {
                write!(f, "counter_trend_strength < {required} (actual {actual})")
            }
            GateRejectionReason::TrendWeaknessStrength { required, actual } => {
                write!(f, "trend_weakness_strength < {required} (actual {actual})")
            }
            GateRejectionReason::BounceRejectionRateTooLow { rate_pct } => {
                write!(f, "bounce_rejection_rate {rate_pct}% < 50%")
            }
            GateRejectionReason::ConfirmationCandleClose => write!(f, "confirmation_candle_close"),
            GateRejectionReason::ConfirmationCandleWick => write!(f, "confirmation_candle_wick"),
            GateRejectionReason::ConfirmationCandleDirection => {
                write!(f, "confirmation_candle_direction")
            }
        }
    }
}

/// Builds the per-symbol opportunity set: every level within 3% of
/// current price, paired with its nearest magnet (if any within 1%),
/// scored, and truncated to the top 3 (§4.5).
pub fn build_opportunities(
    symbol: &str,
    levels: &[PriceLevel],
    magnets: &[MagnetLevel],
    current_price: f64,
    tolerance: &ToleranceProfile,
    execution: &ExecutionConfig,
    target_mode: TargetMode,
    now: DateTime<Utc>,
) -> Vec<Opportunity> {
    let mut opportunities: Vec<Opportunity> = levels
        .iter()
        .filter(|l| l.distance_pct(current_price) <= OPPORTUNITY_MAX_DISTANCE_PCT)
        .map(|level| {
            let magnet = magnets
                .iter()
                .filter(|m| m.distance_pct(level.price) <= MAGNET_MATCH_DISTANCE_PCT)
                .max_by(|a, b| a.strength.partial_cmp(&b.strength).unwrap())
                .cloned();
            let targets = targeting::compute_targets(target_mode, level, tolerance, execution);
            let distance_pct = level.distance_pct(current_price);
            let score = targeting::opportunity_score(level, &targets, distance_pct, magnet.as_ref());
            Opportunity {
                symbol: symbol.to_string(),
                level: level.clone(),
                magnet,
                targets,
                current_price,
                distance_pct,
                score,
                created_at: now,
            }
        })
        .collect();

    opportunities.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());
    opportunities.truncate(MAX_OPPORTUNITIES_PER_SYMBOL);
    opportunities
}

fn side_for(level_kind: LevelKind) -> Side {
    match level_kind {
        LevelKind::Support => Side::Long,
        LevelKind::Resistance => Side::Short,
    }
}

/// Regime-stepped confirmation-candle close threshold (§4.5.3 stage 6).
/// Distinct from `close_buffer_pct` in §4.2: this is a separate,
/// coarser step table used only to confirm the candle actually closed
/// through the level, not to size the tolerance cache itself.
fn confirmation_close_pct(tolerance: &ToleranceProfile) -> f64 {
    use crate::domain::Regime;
    match tolerance.regime {
        Regime::Calm => 0.0012,
        Regime::Normal => 0.0018,
        Regime::Elevated => 0.0024,
        Regime::High => 0.0030,
    }
}

/// Evaluates every gate stage for one opportunity, in order, short
/// circuiting on the first failure (§4.5.3).
pub fn evaluate_entry_gate(
    opportunity: &Opportunity,
    tolerance: &ToleranceProfile,
    recent_candles: &[Candle],
    trend: Trend,
    now: DateTime<Utc>,
) -> Result<(), GateRejectionReason> {
    let level = &opportunity.level;
    let price = opportunity.current_price;
    let side = side_for(level.kind);

    // 1. Relevance.
    if !levels::is_relevant(level, price, now, recent_candles, tolerance.validation_pct) {
        return Err(GateRejectionReason::NotRelevant);
    }

    // 2. Bounds.
    let in_bounds = match level.kind {
        LevelKind::Support => price >= level.price && price <= level.price * (1.0 + tolerance.entry_pct),
        LevelKind::Resistance => {
            price <= level.price && price >= level.price * (1.0 - tolerance.entry_pct)
        }
    };
    if !in_bounds {
        return Err(GateRejectionReason::OutOfBounds);
    }

    // 3. Counter-trend strictness.
    let is_counter_trend = (side == Side::Long && trend.is_down()) || (side == Side::Short && trend.is_up());
    if is_counter_trend {
        let distance_ok = opportunity.distance_pct <= 0.75 * tolerance.proximity_pct;
        if level.strength < 88.0 || !distance_ok {
            return Err(GateRejectionReason::CounterTrendStrength {
                required: 88,
                actual: level.strength as u32,
            });
        }
    }

    // 4. Trend-weakness vs level-strength.
    let strong_opposing_trend = (side == Side::Long && trend == Trend::StrongDown)
        || (side == Side::Short && trend == Trend::StrongUp);
    if strong_opposing_trend && level.strength < 85.0 {
        return Err(GateRejectionReason::TrendWeaknessStrength {
            required: 85,
            actual: level.strength as u32,
        });
    }

    // 5. Bounce/rejection history over the last 10 candles.
    let tail_start = recent_candles.len().saturating_sub(RECENT_CANDLES_FOR_BOUNCE_HISTORY);
    let tail = &recent_candles[tail_start..];
    let touch_tolerance = level.price * tolerance.validation_pct;
    let close_pct = (0.002_f64).max(0.8 * tolerance.validation_pct);
    let mut touches = 0u32;
    let mut reacted = 0u32;
    for c in tail {
        let touched = match level.kind {
            LevelKind::Support => (c.low - level.price).abs() <= touch_tolerance,
            LevelKind::Resistance => (c.high - level.price).abs() <= touch_tolerance,
        };
        if !touched {
            continue;
        }
        touches += 1;
        let reaction = match level.kind {
            LevelKind::Support => c.close >= level.price * (1.0 + close_pct),
            LevelKind::Resistance => c.close <= level.price * (1.0 - close_pct),
        };
        if reaction {
            reacted += 1;
        }
    }
    if touches > 0 {
        let rate = reacted as f64 / touches as f64;
        if rate < 0.50 {
            return Err(GateRejectionReason::BounceRejectionRateTooLow {
                rate_pct: (rate * 100.0) as u32,
            });
        }
    }

    // 6. Confirmation candle: the most recent closed candle.
    let Some(confirm) = recent_candles.last() else {
        return Err(GateRejectionReason::ConfirmationCandleWick);
    };
    check_confirmation_candle(level, confirm, tolerance.entry_pct, confirmation_close_pct(tolerance))?;

    Ok(())
}

/// Stage 6 in isolation (§4.5.3 point 6): wick-touch, close-through,
/// and directional close on the most recent closed candle.
fn check_confirmation_candle(
    level: &PriceLevel,
    confirm: &Candle,
    entry_pct: f64,
    close_pct: f64,
) -> Result<(), GateRejectionReason> {
    match level.kind {
        LevelKind::Support => {
            let wick_ok = confirm.low <= level.price * (1.0 + entry_pct);
            if !wick_ok {
                return Err(GateRejectionReason::ConfirmationCandleWick);
            }
            if confirm.close < level.price * (1.0 + close_pct) {
                return Err(GateRejectionReason::ConfirmationCandleClose);
            }
            if confirm.close <= confirm.open {
                return Err(GateRejectionReason::ConfirmationCandleDirection);
            }
        }
        LevelKind::Resistance => {
            let wick_ok = confirm.high >= level.price * (1.0 - entry_pct);
            if !wick_ok {
                return Err(GateRejectionReason::ConfirmationCandleWick);
            }
            if confirm.close > level.price * (1.0 - close_pct) {
                return Err(GateRejectionReason::ConfirmationCandleClose);
            }
            if confirm.close >= confirm.open {
                return Err(GateRejectionReason::ConfirmationCandleDirection);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LevelKind;

    fn candle(open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle { timestamp: Utc::now(), open, high, low, close, volume: 1.0 }
    }

    fn support_level(strength: f64) -> PriceLevel {
        PriceLevel {
            price: 50_000.0,
            kind: LevelKind::Support,
            strength,
            touch_count: 5,
            bounce_count: 4,
            avg_bounce_pct: 0.01,
            max_bounce_pct: 0.02,
            last_tested_at: Utc::now(),
            first_identified_at: Utc::now() - chrono::Duration::days(5),
            avg_volume_at_level: 1.0,
        }
    }

    #[test]
    fn e3_confirmation_candle_rejection() {
        // Support 50_000, current price 50_100, last closed candle
        // {open 50_050, high 50_110, low 49_990, close 50_040},
        // entry_pct = 0.003, close_pct = 0.0024.
        // Wick 49_990 <= 50_000*1.003 = 50_150: ok.
        // Close 50_040 >= 50_000*1.0024 = 50_120? No -> rejected.
        let level = support_level(90.0);
        let confirm = candle(50_050.0, 50_110.0, 49_990.0, 50_040.0);
        let result = check_confirmation_candle(&level, &confirm, 0.003, 0.0024);
        assert_eq!(result, Err(GateRejectionReason::ConfirmationCandleClose));
    }

    #[test]
    fn e4_counter_trend_block() {
        let tolerance = crate::volatility::derive_tolerance_profile(
            0.02,
            crate::clock::TestClock::new(Utc::now()).as_ref(),
        );
        let level = support_level(80.0);
        let opportunity = Opportunity {
            symbol: "BTCUSDT".to_string(),
            level: level.clone(),
            magnet: None,
            targets: targeting::rule_based_targets(&level, &ExecutionConfig::default()),
            current_price: level.price * 1.002,
            distance_pct: 0.002,
            score: 0.0,
            created_at: Utc::now(),
        };
        let recent = vec![candle(49_900.0, 50_050.0, 49_800.0, 49_950.0); 25];
        let result =
            evaluate_entry_gate(&opportunity, &tolerance, &recent, Trend::StrongDown, Utc::now());
        assert_eq!(
            result,
            Err(GateRejectionReason::CounterTrendStrength { required: 88, actual: 80 })
        );
    }

    #[test]
    fn opportunities_capped_at_three_per_symbol() {
        let tolerance = crate::volatility::derive_tolerance_profile(
            0.02,
            crate::clock::TestClock::new(Utc::now()).as_ref(),
        );
        let levels: Vec<PriceLevel> = (0..6)
            .map(|i| {
                let mut l = support_level(60.0 + i as f64);
                l.price = 50_000.0 + i as f64 * 10.0;
                l
            })
            .collect();
        let opportunities = build_opportunities(
            "BTCUSDT",
            &levels,
            &[],
            50_000.0,
            &tolerance,
            &ExecutionConfig::default(),
            TargetMode::RuleBased,
            Utc::now(),
        );
        assert!(opportunities.len() <= 3);
    }
}
