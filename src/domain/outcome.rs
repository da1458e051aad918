use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::tolerance::Regime;

/// Exit reason taxonomy emitted on the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    ProfitTarget,
    StopLoss,
    TimeExitMax,
    TimeExitFlat,
    SafetyTimeExit,
    ManualStop,
    CloseFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SystemType {
    Paper,
    Real,
}

/// Fire-and-forget record handed to the ML collaborator on close.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeOutcome {
    pub trade_id: String,
    pub symbol: String,
    pub strategy_type: String,
    pub system_type: SystemType,
    pub confidence_score: f64,
    pub ml_score: Option<f64>,
    pub entry_price: f64,
    pub exit_price: f64,
    pub pnl_pct: f64,
    pub duration_minutes: f64,
    pub market_regime: String,
    pub volatility_regime: Regime,
    pub exit_reason: ExitReason,
    pub success: bool,
    pub features: HashMap<String, f64>,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
}

/// Result of an execution-collaborator `close()` call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CloseOutcome {
    pub entry_price: f64,
    pub exit_price: f64,
    pub pnl_usd: f64,
    pub pnl_pct: f64,
    pub duration_minutes: f64,
    pub exit_reason: ExitReason,
}
