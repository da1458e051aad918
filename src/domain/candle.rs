use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single OHLCV bar. Immutable once constructed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn true_range(&self, prev_close: f64) -> f64 {
        let tr1 = self.high - self.low;
        let tr2 = (self.high - prev_close).abs();
        let tr3 = (self.low - prev_close).abs();
        tr1.max(tr2).max(tr3)
    }
}

/// Trade direction for a position or a candidate opportunity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn is_long(self) -> bool {
        matches!(self, Side::Long)
    }
}
