//! Risk-based position sizing (§9 design notes), independent of the
//! fixed `position_size_usd` default. Grounded on
//! `get_optimal_position_size` in
//! `examples/original_source/.../statistical_calculator.py`.

use crate::domain::TradingTargets;

/// `optimal_size = (account_balance * max_risk_per_trade / risk_per_unit) * (confidence/100)`.
/// Returns `0.0` if `stop_loss == entry_price` (no risk distance to size against).
pub fn optimal_position_size(
    targets: &TradingTargets,
    account_balance: f64,
    max_risk_per_trade: f64,
) -> f64 {
    let risk_per_unit = (targets.entry_price - targets.stop_loss).abs();
    if risk_per_unit <= 0.0 {
        return 0.0;
    }
    let max_risk_amount = account_balance * max_risk_per_trade;
    let max_position_size = max_risk_amount / risk_per_unit;
    let confidence_factor = targets.confidence / 100.0;
    max_position_size * confidence_factor
}

#[cfg(test)]
mod tests {
    use super::*;

    fn targets(entry: f64, stop: f64, confidence: f64) -> TradingTargets {
        TradingTargets {
            entry_price: entry,
            profit_target: entry + (entry - stop),
            stop_loss: stop,
            profit_probability: 0.5,
            risk_reward_ratio: 1.0,
            expected_duration_minutes: 30,
            confidence,
            tp_net_usd: 17.60,
            sl_net_usd: 17.60,
            floor_net_usd: 14.60,
        }
    }

    #[test]
    fn scales_with_confidence() {
        let t = targets(50_000.0, 49_500.0, 80.0);
        let size = optimal_position_size(&t, 10_000.0, 0.02);
        // risk_per_unit = 500, max_risk_amount = 200, max_position_size = 0.4
        // optimal = 0.4 * 0.8 = 0.32
        assert!((size - 0.32).abs() < 1e-9);
    }

    #[test]
    fn zero_risk_distance_yields_zero() {
        let t = targets(50_000.0, 50_000.0, 80.0);
        assert_eq!(optimal_position_size(&t, 10_000.0, 0.02), 0.0);
    }
}
