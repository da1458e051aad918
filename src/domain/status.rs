use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Derived read-model snapshot of the running engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineStatus {
    pub active: bool,
    pub monitored_symbols: Vec<String>,
    pub active_trade_count: usize,
    pub level_count: usize,
    pub opportunity_count: usize,
    pub total_trades: u64,
    pub winning_trades: u64,
    pub win_rate: f64,
    pub total_profit: f64,
    pub start_time: DateTime<Utc>,
    pub uptime_minutes: f64,
    pub trading_engine_type: String,
}
