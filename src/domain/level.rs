use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of a discovered horizontal level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LevelKind {
    Support,
    Resistance,
}

/// A discovered support/resistance level, replaced wholesale per symbol
/// on each reanalysis. Never mutated incrementally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: f64,
    pub kind: LevelKind,
    pub strength: f64,
    pub touch_count: u32,
    pub bounce_count: u32,
    pub avg_bounce_pct: f64,
    pub max_bounce_pct: f64,
    pub last_tested_at: DateTime<Utc>,
    pub first_identified_at: DateTime<Utc>,
    pub avg_volume_at_level: f64,
}

impl PriceLevel {
    /// `0 ≤ bounce_count ≤ touch_count`.
    pub fn invariants_hold(&self) -> bool {
        self.bounce_count <= self.touch_count && (0.0..=100.0).contains(&self.strength)
    }

    pub fn distance_pct(&self, price: f64) -> f64 {
        (price - self.price).abs() / self.price
    }
}
