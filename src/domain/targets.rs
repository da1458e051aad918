use serde::{Deserialize, Serialize};

/// Precomputed exits for an opportunity, produced by one of the two
/// target calculators in `crate::targeting`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TradingTargets {
    pub entry_price: f64,
    pub profit_target: f64,
    pub stop_loss: f64,
    pub profit_probability: f64,
    pub risk_reward_ratio: f64,
    pub expected_duration_minutes: u32,
    pub confidence: f64,
    pub tp_net_usd: f64,
    pub sl_net_usd: f64,
    pub floor_net_usd: f64,
}
