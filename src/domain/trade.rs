use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::candle::Side;
use super::level::LevelKind;

/// Lifecycle state of a trade. SL mutations occur only in `Open`.
/// `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeState {
    Open,
    Closing,
    Closed,
}

/// Local trailing-stop state carried per trade. Defaults per spec §4.6.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrailingState {
    pub locked_profit_usd: f64,
    pub last_step_usd: f64,
    pub max_trail_cap_usd: f64,
    pub step_increment_usd: f64,
    pub step_mode_percent: bool,
    pub step_increment_pct: f64,
    pub step_cooldown_sec: f64,
    pub hysteresis_pct: f64,
    pub trail_start_net_usd: f64,
    pub fee_buffer_usd: f64,
    pub cap_handoff_tight_atr: bool,
    pub cap_trail_mult: f64,
    /// Monotonic timestamp (seconds) of the last SL-advancing step, if any.
    pub last_step_mono_secs: Option<f64>,
}

impl Default for TrailingState {
    fn default() -> Self {
        Self {
            locked_profit_usd: 0.0,
            last_step_usd: 0.0,
            max_trail_cap_usd: 60.0,
            step_increment_usd: 15.0,
            step_mode_percent: false,
            step_increment_pct: 0.002,
            step_cooldown_sec: 40.0,
            hysteresis_pct: 0.0012,
            trail_start_net_usd: 20.0,
            fee_buffer_usd: 0.40,
            cap_handoff_tight_atr: true,
            cap_trail_mult: 0.40,
            last_step_mono_secs: None,
        }
    }
}

/// The only mutable lifecycle entity. Identity is `trade_id`, assigned
/// by the execution collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveTrade {
    pub trade_id: String,
    pub symbol: String,
    pub side: Side,
    pub entry_price: f64,
    pub quantity: f64,
    pub leverage: f64,
    pub profit_target: f64,
    pub stop_loss: f64,
    pub entry_time: DateTime<Utc>,
    pub level_kind: LevelKind,
    pub confidence: f64,
    pub atr_pct: f64,
    pub trend_aligned: TrendAlignment,
    pub state: TradeState,
    pub trailing: TrailingState,
    pub close_failures: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrendAlignment {
    Aligned,
    CounterTrend,
    Neutral,
}

impl ActiveTrade {
    pub fn notional(&self) -> f64 {
        self.quantity * self.entry_price
    }

    /// Signed favourable percent move for this trade's side.
    pub fn unrealized_pct(&self, price: f64) -> f64 {
        match self.side {
            Side::Long => (price - self.entry_price) / self.entry_price,
            Side::Short => (self.entry_price - price) / self.entry_price,
        }
    }

    pub fn unrealized_usd(&self, price: f64) -> f64 {
        self.unrealized_pct(price) * self.leverage * self.notional()
    }

    pub fn minutes_open(&self, now: DateTime<Utc>) -> f64 {
        (now - self.entry_time).num_seconds() as f64 / 60.0
    }
}
