use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::level::PriceLevel;
use super::magnet::MagnetLevel;
use super::targets::TradingTargets;

/// Transient per-symbol candidate, kept only as the top-3 per scan
/// cycle. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    pub symbol: String,
    pub level: PriceLevel,
    pub magnet: Option<MagnetLevel>,
    pub targets: TradingTargets,
    pub current_price: f64,
    pub distance_pct: f64,
    pub score: f64,
    pub created_at: DateTime<Utc>,
}
