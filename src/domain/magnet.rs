use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MagnetKind {
    RoundNumber,
    Fibonacci,
    PreviousHigh,
    PreviousLow,
    Psychological,
}

/// A psychological/liquidity attractor, recomputed on each reanalysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MagnetLevel {
    pub price: f64,
    pub kind: MagnetKind,
    pub strength: f64,
    pub attraction_radius: f64,
    pub historical_reactions: u32,
    pub last_reaction_at: Option<DateTime<Utc>>,
}

impl MagnetLevel {
    pub fn distance_pct(&self, price: f64) -> f64 {
        (price - self.price).abs() / self.price
    }

    pub fn is_strong(&self) -> bool {
        self.strength >= 60.0
    }
}
