//! The ML learning collaborator's narrow trait surface (§6). Failures
//! here MUST NOT block the lifecycle — callers log and drop them.

use async_trait::async_trait;
use tracing::warn;

use crate::domain::TradeOutcome;

#[async_trait]
pub trait MLSink: Send + Sync {
    async fn record_trade_outcome(&self, outcome: TradeOutcome) -> anyhow::Result<()>;
}

/// Logs outcomes instead of persisting them; stands in for a real
/// learning store in tests and demos.
#[derive(Default)]
pub struct LoggingMlSink;

#[async_trait]
impl MLSink for LoggingMlSink {
    async fn record_trade_outcome(&self, outcome: TradeOutcome) -> anyhow::Result<()> {
        tracing::info!(
            trade_id = %outcome.trade_id,
            symbol = %outcome.symbol,
            pnl_pct = outcome.pnl_pct,
            success = outcome.success,
            "trade outcome recorded"
        );
        Ok(())
    }
}

/// Calls `sink.record_trade_outcome`, logging and swallowing any
/// failure so the lifecycle loop never stalls on the ML collaborator.
pub async fn record_fire_and_forget(sink: &dyn MLSink, outcome: TradeOutcome) {
    if let Err(e) = sink.record_trade_outcome(outcome).await {
        warn!(error = %e, "ML sink failed to record trade outcome; dropping");
    }
}
