//! Typed errors at domain boundaries (§7); `anyhow` everywhere else.

use thiserror::Error;

/// Failure modes reported by a `MarketData` collaborator.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MarketDataError {
    #[error("market data unavailable for {symbol}: {reason}")]
    Unavailable { symbol: String, reason: String },

    #[error("insufficient history for {symbol}: got {got}, need {need}")]
    InsufficientHistory { symbol: String, got: usize, need: usize },

    #[error("malformed market data for {symbol}: {reason}")]
    Malformed { symbol: String, reason: String },
}

/// The four error kinds of §7.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("data unavailable: {0}")]
    DataUnavailable(String),

    #[error("insufficient history: {0}")]
    InsufficientHistory(String),

    #[error("entry gate rejected: {stage}: {reason}")]
    GateRejection { stage: String, reason: String },

    #[error("fatal: {0}")]
    Fatal(String),
}

impl From<MarketDataError> for CoreError {
    fn from(e: MarketDataError) -> Self {
        match e {
            MarketDataError::Unavailable { .. } => CoreError::DataUnavailable(e.to_string()),
            MarketDataError::InsufficientHistory { .. } => {
                CoreError::InsufficientHistory(e.to_string())
            }
            MarketDataError::Malformed { .. } => CoreError::DataUnavailable(e.to_string()),
        }
    }
}
