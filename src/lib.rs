//! Profit-scraping trading engine core: level discovery, a
//! volatility-adaptive entry gate, and a hybrid trailing-stop
//! lifecycle, decoupled from any one exchange via narrow collaborator
//! traits (`MarketData`, `Executor`, `MLSink`).

pub mod clock;
pub mod config;
pub mod domain;
pub mod error;
pub mod execution;
pub mod gate;
pub mod levels;
pub mod lifecycle;
pub mod magnets;
pub mod market_data;
pub mod ml;
pub mod orchestrator;
pub mod risk;
pub mod targeting;
pub mod trend;
pub mod volatility;

/// Commonly imported surface for consumers wiring up an engine.
pub mod prelude {
    pub use crate::clock::{Clock, SystemClock, TestClock};
    pub use crate::config::{EngineConfig, ExecutionConfig, TargetMode, TargetsConfig};
    pub use crate::domain::{
        ActiveTrade, Candle, EngineStatus, ExitReason, LevelKind, MagnetKind, MagnetLevel,
        Opportunity, PriceLevel, Regime, Side, SystemType, ToleranceProfile, TradeOutcome,
        TradeState, TradingTargets, TrailingState, TrendAlignment,
    };
    pub use crate::error::{CoreError, MarketDataError};
    pub use crate::execution::{Executor, PaperExecutor, TradeSignal};
    pub use crate::market_data::{BybitMarketData, InMemoryMarketData, MarketData};
    pub use crate::ml::{LoggingMlSink, MLSink};
    pub use crate::orchestrator::Orchestrator;
}
