use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Discrete volatility class driving every downstream tolerance and
/// TP/SL/trail multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Regime {
    Calm,
    Normal,
    Elevated,
    High,
}

impl Regime {
    pub fn classify(atr_pct: f64) -> Self {
        if atr_pct < 0.015 {
            Regime::Calm
        } else if atr_pct < 0.035 {
            Regime::Normal
        } else if atr_pct < 0.055 {
            Regime::Elevated
        } else {
            Regime::High
        }
    }

    /// `(tp, sl, trail, be)` multipliers for this regime.
    pub fn multipliers(self) -> RegimeMultipliers {
        match self {
            Regime::Calm => RegimeMultipliers { tp: 0.8, sl: 0.7, trail: 0.5, be: 0.6 },
            Regime::Normal => RegimeMultipliers { tp: 1.1, sl: 0.9, trail: 0.7, be: 0.8 },
            Regime::Elevated => RegimeMultipliers { tp: 1.3, sl: 1.0, trail: 0.9, be: 1.0 },
            Regime::High => RegimeMultipliers { tp: 1.6, sl: 1.1, trail: 1.2, be: 1.1 },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegimeMultipliers {
    pub tp: f64,
    pub sl: f64,
    pub trail: f64,
    pub be: f64,
}

/// Single source of truth for ATR-driven tolerances on one symbol.
/// All fields are deterministic functions of `atr_pct`; see
/// `crate::volatility` for the derivation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToleranceProfile {
    pub atr_pct: f64,
    pub regime: Regime,
    pub clustering_pct: f64,
    pub validation_pct: f64,
    pub entry_pct: f64,
    pub proximity_pct: f64,
    pub close_buffer_pct: f64,
    pub built_at: DateTime<Utc>,
}
