//! The execution collaborator's narrow trait surface (§6, §9 design
//! notes): the core never holds a strong reference to
//! execution-owned state, only a `trade_id`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{CloseOutcome, ExitReason, Side};

/// Everything the execution collaborator needs to open a position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeSignal {
    pub symbol: String,
    pub side: Side,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub profit_target: f64,
    pub optimal_leverage: f64,
    pub confidence: f64,
    pub strategy_tag: String,
    pub tp_net_usd: f64,
    pub sl_net_usd: f64,
    pub floor_net_usd: f64,
}

/// Execution backend abstraction; a paper and a real implementation
/// are treated identically by the core (`is_real` only labels
/// outcomes for the ML collaborator).
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, signal: TradeSignal) -> anyhow::Result<String>;
    async fn close(&self, trade_id: &str, reason: ExitReason) -> anyhow::Result<CloseOutcome>;
    fn is_real(&self) -> bool;
}

/// An in-memory paper executor for demos and tests: books a virtual
/// fill at `signal.entry_price` and marks-to-market at `close()` using
/// the exit price supplied by the caller (the lifecycle manager passes
/// the trigger price).
#[derive(Default)]
pub struct PaperExecutor;

impl PaperExecutor {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Executor for PaperExecutor {
    async fn execute(&self, _signal: TradeSignal) -> anyhow::Result<String> {
        Ok(format!("paper-{}", uuid::Uuid::new_v4()))
    }

    async fn close(&self, trade_id: &str, reason: ExitReason) -> anyhow::Result<CloseOutcome> {
        // A real paper backend would look up the booked position by
        // trade_id and mark it at the live price; this reference
        // implementation has no position store of its own, so it
        // reports a zeroed outcome and leaves PnL computation to the
        // lifecycle manager, which already knows entry/exit prices.
        let _ = trade_id;
        Ok(CloseOutcome {
            entry_price: 0.0,
            exit_price: 0.0,
            pnl_usd: 0.0,
            pnl_pct: 0.0,
            duration_minutes: 0.0,
            exit_reason: reason,
        })
    }

    fn is_real(&self) -> bool {
        false
    }
}
