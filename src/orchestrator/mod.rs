//! Orchestrator (§5, §6): owns every per-symbol map, runs the four
//! background loops, and exposes the control surface consumed by the
//! API layer.
//!
//! Grounded on the `Arc<RwLock<...>>` state + `tokio::spawn` interval
//! loop idiom in `examples/MrDecryptDecipher-Diia/src/market_data/real_time_feed.rs`
//! (`RealTimeMarketFeed::start`/`stop`, `is_active` flag), generalized
//! from one feed loop to the monitoring/reanalysis/lifecycle/initial-
//! analysis loops of §5. Callers hold this behind `Arc<Orchestrator>`
//! so background tasks can clone a handle to the same state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::domain::{
    ActiveTrade, EngineStatus, ExitReason, LevelKind, MagnetLevel, Opportunity, PriceLevel, Regime,
    Side, SystemType, ToleranceProfile, TradeOutcome, TradeState, TrendAlignment,
};
use crate::execution::{Executor, TradeSignal};
use crate::gate;
use crate::levels;
use crate::lifecycle::PositionLifecycleManager;
use crate::magnets;
use crate::market_data::MarketData;
use crate::ml::{self, MLSink};
use crate::trend;
use crate::volatility::{self, VolatilityModel};

const RESTART_MAX_ATTEMPTS: u32 = 3;
const RESTART_BACKOFF_SECS: u64 = 15;
const FATAL_QUARANTINE_THRESHOLD: u32 = 3;
const HISTORY_CANDLES: usize = 24 * 60;

struct SymbolState {
    levels: Vec<PriceLevel>,
    magnets: Vec<MagnetLevel>,
    opportunities: Vec<Opportunity>,
    consecutive_fatals: u32,
    quarantined: bool,
}

impl Default for SymbolState {
    fn default() -> Self {
        Self {
            levels: Vec::new(),
            magnets: Vec::new(),
            opportunities: Vec::new(),
            consecutive_fatals: 0,
            quarantined: false,
        }
    }
}

/// Everything the core owns, per §3: the symbol maps, the active
/// trade table, and the collaborators behind narrow trait objects.
/// Always held as `Arc<Orchestrator>` so the background loops can
/// clone a handle into their `tokio::spawn`ed futures.
pub struct Orchestrator {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    market_data: Arc<dyn MarketData>,
    executor: Arc<dyn Executor>,
    ml_sink: Arc<dyn MLSink>,
    volatility: Arc<VolatilityModel>,
    symbols: RwLock<HashMap<String, SymbolState>>,
    trades: RwLock<PositionLifecycleManager>,
    active: AtomicBool,
    tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
    start_time: DateTime<Utc>,
    total_trades: AtomicU64,
    winning_trades: AtomicU64,
    total_profit: std::sync::Mutex<f64>,
}

impl Orchestrator {
    pub fn new(
        config: EngineConfig,
        market_data: Arc<dyn MarketData>,
        executor: Arc<dyn Executor>,
        ml_sink: Arc<dyn MLSink>,
    ) -> Arc<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock::default());
        let volatility = Arc::new(VolatilityModel::new(
            clock.clone(),
            config.volatility.cache_ttl_secs,
            config.volatility.atr_period,
        ));
        let mut symbols = HashMap::new();
        for symbol in &config.symbols {
            symbols.insert(symbol.clone(), SymbolState::default());
        }
        Arc::new(Self {
            config,
            clock: clock.clone(),
            market_data,
            executor,
            ml_sink,
            volatility,
            symbols: RwLock::new(symbols),
            trades: RwLock::new(PositionLifecycleManager::new(clock)),
            active: AtomicBool::new(false),
            tasks: std::sync::Mutex::new(Vec::new()),
            start_time: Utc::now(),
            total_trades: AtomicU64::new(0),
            winning_trades: AtomicU64::new(0),
            total_profit: std::sync::Mutex::new(0.0),
        })
    }

    /// Idempotent: a second call while already active is a no-op that
    /// still returns `true` (§6).
    pub async fn start_scraping(self: &Arc<Self>, symbols: Vec<String>) -> bool {
        if self.active.swap(true, Ordering::SeqCst) {
            return true;
        }

        {
            let mut guard = self.symbols.write().await;
            for symbol in &symbols {
                guard.entry(symbol.clone()).or_insert_with(SymbolState::default);
            }
        }

        info!(count = symbols.len(), "starting scraping engine");

        self.spawn_initial_analysis();
        self.spawn_reanalysis_loop();
        self.spawn_monitoring_loop();
        self.spawn_lifecycle_loop();
        true
    }

    /// Cancels all background tasks and closes every open trade with
    /// `MANUAL_STOP` (§6).
    pub async fn stop_scraping(self: &Arc<Self>) {
        info!("stopping scraping engine");
        self.active.store(false, Ordering::SeqCst);

        let handles = {
            let mut guard = self.tasks.lock().unwrap();
            std::mem::take(&mut *guard)
        };
        for handle in handles {
            handle.abort();
        }

        let trade_ids: Vec<String> = {
            let trades = self.trades.read().await;
            trades.active_trades().map(|t| t.trade_id.clone()).collect()
        };
        for trade_id in trade_ids {
            self.close_trade(&trade_id, ExitReason::ManualStop).await;
        }
    }

    pub async fn status(&self) -> EngineStatus {
        let symbols = self.symbols.read().await;
        let trades = self.trades.read().await;
        let total = self.total_trades.load(Ordering::SeqCst);
        let wins = self.winning_trades.load(Ordering::SeqCst);
        let win_rate = if total > 0 { wins as f64 / total as f64 } else { 0.0 };
        let uptime_minutes = (Utc::now() - self.start_time).num_seconds() as f64 / 60.0;
        EngineStatus {
            active: self.active.load(Ordering::SeqCst),
            monitored_symbols: symbols.keys().cloned().collect(),
            active_trade_count: trades.len(),
            level_count: symbols.values().map(|s| s.levels.len()).sum(),
            opportunity_count: symbols.values().map(|s| s.opportunities.len()).sum(),
            total_trades: total,
            winning_trades: wins,
            win_rate,
            total_profit: *self.total_profit.lock().unwrap(),
            start_time: self.start_time,
            uptime_minutes,
            trading_engine_type: if self.executor.is_real() { "real".to_string() } else { "paper".to_string() },
        }
    }

    pub async fn opportunities(&self) -> HashMap<String, Vec<Opportunity>> {
        let symbols = self.symbols.read().await;
        symbols.iter().map(|(s, state)| (s.clone(), state.opportunities.clone())).collect()
    }

    pub async fn identified_levels(&self, symbol: &str) -> (Vec<PriceLevel>, Vec<MagnetLevel>) {
        let symbols = self.symbols.read().await;
        match symbols.get(symbol) {
            Some(state) => (state.levels.clone(), state.magnets.clone()),
            None => (Vec::new(), Vec::new()),
        }
    }

    /// Pure, read-only: recomputes the entry-gate pass/fail set over
    /// the current opportunities without mutating anything, so two
    /// calls without an intervening price change are identical (§8
    /// property 7).
    pub async fn ready_to_trade_signals(&self) -> Vec<TradeSignal> {
        let symbols = self.symbols.read().await;
        let mut signals = Vec::new();
        let now = self.clock.wall_now();

        for (symbol, state) in symbols.iter() {
            if state.quarantined {
                continue;
            }
            let Ok(candles) = self.market_data.klines(symbol, "1h", HISTORY_CANDLES).await else {
                continue;
            };
            if candles.is_empty() {
                continue;
            }
            let tolerance = self.volatility.tolerance_profile(symbol, &candles);
            let trend = trend::detect_trend(&candles);
            let recent = &candles[candles.len().saturating_sub(10)..];

            for opportunity in &state.opportunities {
                if gate::evaluate_entry_gate(opportunity, &tolerance, recent, trend, now).is_ok() {
                    signals.push(self.signal_for(opportunity, &tolerance));
                }
            }
        }
        signals
    }

    fn signal_for(&self, opportunity: &Opportunity, tolerance: &ToleranceProfile) -> TradeSignal {
        let side = match opportunity.level.kind {
            LevelKind::Support => Side::Long,
            LevelKind::Resistance => Side::Short,
        };
        let mult = tolerance.regime.multipliers();
        let leverage_scale = (1.0 / mult.sl).clamp(0.5, 1.0);
        TradeSignal {
            symbol: opportunity.symbol.clone(),
            side,
            entry_price: opportunity.targets.entry_price,
            stop_loss: opportunity.targets.stop_loss,
            profit_target: opportunity.targets.profit_target,
            optimal_leverage: self.config.execution.leverage * leverage_scale,
            confidence: opportunity.targets.confidence,
            strategy_tag: "profit_scraping".to_string(),
            tp_net_usd: opportunity.targets.tp_net_usd,
            sl_net_usd: opportunity.targets.sl_net_usd,
            floor_net_usd: opportunity.targets.floor_net_usd,
        }
    }

    fn spawn_initial_analysis(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let symbols: Vec<String> = this.symbols.read().await.keys().cloned().collect();
            for symbol in symbols {
                this.reanalyze_symbol(&symbol).await;
            }
        });
        self.tasks.lock().unwrap().push(handle);
    }

    fn spawn_reanalysis_loop(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let cadence = Duration::from_secs(self.config.loops.reanalysis_cadence_secs);
        let batch_size = self.config.loops.reanalysis_batch_size.max(1);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(cadence);
            interval.tick().await;
            loop {
                interval.tick().await;
                if !this.active.load(Ordering::SeqCst) {
                    break;
                }
                let symbols: Vec<String> = this.symbols.read().await.keys().cloned().collect();
                for batch in symbols.chunks(batch_size) {
                    for symbol in batch {
                        this.reanalyze_symbol(symbol).await;
                    }
                    tokio::time::sleep(Duration::from_millis(200)).await;
                }
            }
        });
        self.tasks.lock().unwrap().push(handle);
    }

    fn spawn_monitoring_loop(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let cadence = Duration::from_secs(self.config.loops.monitor_cadence_secs);
        let handle = tokio::spawn(async move {
            let mut attempts = 0u32;
            loop {
                if !this.active.load(Ordering::SeqCst) {
                    break;
                }
                match this.run_monitoring_cycle(cadence).await {
                    Ok(()) => break,
                    Err(e) => {
                        attempts += 1;
                        error!(attempts, error = %e, "monitoring loop failed");
                        if attempts > RESTART_MAX_ATTEMPTS {
                            error!("monitoring loop exceeded restart budget; giving up");
                            break;
                        }
                        tokio::time::sleep(Duration::from_secs(RESTART_BACKOFF_SECS)).await;
                    }
                }
            }
        });
        self.tasks.lock().unwrap().push(handle);
    }

    async fn run_monitoring_cycle(self: &Arc<Self>, cadence: Duration) -> anyhow::Result<()> {
        let mut interval = tokio::time::interval(cadence);
        interval.tick().await;
        loop {
            interval.tick().await;
            if !self.active.load(Ordering::SeqCst) {
                return Ok(());
            }
            let symbols: Vec<String> = self.symbols.read().await.keys().cloned().collect();
            for symbol in symbols {
                self.update_opportunities(&symbol).await;
            }
        }
    }

    fn spawn_lifecycle_loop(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let cadence = Duration::from_secs(self.config.loops.monitor_cadence_secs);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(cadence);
            interval.tick().await;
            loop {
                interval.tick().await;
                if !this.active.load(Ordering::SeqCst) {
                    break;
                }
                this.tick_lifecycle().await;
            }
        });
        self.tasks.lock().unwrap().push(handle);
    }

    async fn reanalyze_symbol(self: &Arc<Self>, symbol: &str) {
        let candles = match self.market_data.klines(symbol, "1h", HISTORY_CANDLES).await {
            Ok(c) => c,
            Err(e) => {
                warn!(symbol, error = %e, "reanalysis skipped: market data unavailable");
                self.record_fatal(symbol).await;
                return;
            }
        };
        let now = self.clock.wall_now();
        let tolerance = self.volatility.tolerance_profile(symbol, &candles);
        let current_price = candles.last().map(|c| c.close).unwrap_or(0.0);

        let levels = levels::analyze_levels(symbol, &candles, &tolerance, now);
        let magnets = magnets::detect_magnets(current_price, &candles, &levels);

        let mut guard = self.symbols.write().await;
        if let Some(state) = guard.get_mut(symbol) {
            state.levels = levels;
            state.magnets = magnets;
            state.consecutive_fatals = 0;
        }
    }

    async fn update_opportunities(self: &Arc<Self>, symbol: &str) {
        let price = match self.market_data.last_price(symbol).await {
            Ok(p) => p,
            Err(e) => {
                warn!(symbol, error = %e, "monitoring cycle skipped: price unavailable");
                self.record_fatal(symbol).await;
                return;
            }
        };
        let candles = match self.market_data.klines(symbol, "1h", HISTORY_CANDLES).await {
            Ok(c) => c,
            Err(_) => return,
        };
        if candles.is_empty() {
            return;
        }
        let now = self.clock.wall_now();
        let tolerance = self.volatility.tolerance_profile(symbol, &candles);

        let (levels, magnets) = {
            let guard = self.symbols.read().await;
            match guard.get(symbol) {
                Some(state) => (state.levels.clone(), state.magnets.clone()),
                None => return,
            }
        };

        let opportunities = gate::build_opportunities(
            symbol,
            &levels,
            &magnets,
            price,
            &tolerance,
            &self.config.execution,
            self.config.targets.mode,
            now,
        );

        let mut guard = self.symbols.write().await;
        if let Some(state) = guard.get_mut(symbol) {
            state.opportunities = opportunities;
        }
    }

    async fn record_fatal(&self, symbol: &str) {
        let mut guard = self.symbols.write().await;
        if let Some(state) = guard.get_mut(symbol) {
            state.consecutive_fatals += 1;
            if state.consecutive_fatals >= FATAL_QUARANTINE_THRESHOLD {
                state.quarantined = true;
                warn!(symbol, "symbol quarantined after repeated fatals");
            }
        }
    }

    async fn tick_lifecycle(self: &Arc<Self>) {
        let symbols: Vec<String> = self.symbols.read().await.keys().cloned().collect();
        let mut prices = HashMap::new();
        for symbol in &symbols {
            if let Ok(price) = self.market_data.last_price(symbol).await {
                prices.insert(symbol.clone(), price);
            }
        }

        let closures = {
            let mut trades = self.trades.write().await;
            trades.tick_all(&prices)
        };

        for (trade_id, reason) in closures {
            self.close_trade(&trade_id, reason).await;
        }
    }

    async fn close_trade(&self, trade_id: &str, reason: ExitReason) {
        let trade = {
            let trades = self.trades.read().await;
            trades.get(trade_id).cloned()
        };
        let Some(trade) = trade else { return };

        match self.executor.close(trade_id, reason).await {
            Ok(outcome) => {
                self.total_trades.fetch_add(1, Ordering::SeqCst);
                let success = outcome.pnl_usd > 0.0 || matches!(reason, ExitReason::ProfitTarget);
                if success {
                    self.winning_trades.fetch_add(1, Ordering::SeqCst);
                }
                *self.total_profit.lock().unwrap() += outcome.pnl_usd;

                self.trades.write().await.remove(trade_id);

                let trade_outcome = TradeOutcome {
                    trade_id: trade_id.to_string(),
                    symbol: trade.symbol.clone(),
                    strategy_type: "profit_scraping".to_string(),
                    system_type: if self.executor.is_real() { SystemType::Real } else { SystemType::Paper },
                    confidence_score: trade.confidence,
                    ml_score: None,
                    entry_price: trade.entry_price,
                    exit_price: outcome.exit_price,
                    pnl_pct: outcome.pnl_pct,
                    duration_minutes: outcome.duration_minutes,
                    market_regime: format!("{:?}", Regime::classify(trade.atr_pct)),
                    volatility_regime: Regime::classify(trade.atr_pct),
                    exit_reason: reason,
                    success,
                    features: HashMap::new(),
                    entry_time: trade.entry_time,
                    exit_time: self.clock.wall_now(),
                };
                ml::record_fire_and_forget(self.ml_sink.as_ref(), trade_outcome).await;
            }
            Err(e) => {
                warn!(trade_id, error = %e, "close failed; recording failure");
                let force_removed = self.trades.write().await.record_close_failure(trade_id);
                if force_removed {
                    warn!(trade_id, "trade force-removed after repeated close failures");
                }
            }
        }
    }

    /// Opens a trade from a signal already vetted by the entry gate
    /// (§4.5.3), respecting `max_trades_per_symbol` (§5 backpressure).
    pub async fn open_trade(&self, signal: TradeSignal, trend_alignment: TrendAlignment) -> anyhow::Result<String> {
        {
            let trades = self.trades.read().await;
            let open_for_symbol =
                trades.active_trades().filter(|t| t.symbol == signal.symbol).count() as u32;
            if open_for_symbol >= self.config.execution.max_trades_per_symbol {
                anyhow::bail!("max_trades_per_symbol reached for {}", signal.symbol);
            }
        }

        let trade_id = self.executor.execute(signal.clone()).await?;
        let candles = self
            .market_data
            .klines(&signal.symbol, "1h", self.config.volatility.atr_period + 1)
            .await
            .ok();
        let atr_pct = candles
            .as_deref()
            .and_then(|c| volatility::atr_pct_from_candles(c, self.config.volatility.atr_period))
            .unwrap_or(0.02);

        let trade = ActiveTrade {
            trade_id: trade_id.clone(),
            symbol: signal.symbol.clone(),
            side: signal.side,
            entry_price: signal.entry_price,
            quantity: self.config.execution.position_size_usd / signal.entry_price,
            leverage: signal.optimal_leverage,
            profit_target: signal.profit_target,
            stop_loss: signal.stop_loss,
            entry_time: self.clock.wall_now(),
            level_kind: match signal.side {
                Side::Long => LevelKind::Support,
                Side::Short => LevelKind::Resistance,
            },
            confidence: signal.confidence,
            atr_pct,
            trend_aligned: trend_alignment,
            state: TradeState::Open,
            trailing: Default::default(),
            close_failures: 0,
        };
        self.trades.write().await.insert(trade);
        Ok(trade_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::PaperExecutor;
    use crate::market_data::InMemoryMarketData;
    use crate::ml::LoggingMlSink;

    fn test_config() -> EngineConfig {
        let mut cfg = EngineConfig::default();
        cfg.symbols = vec!["BTCUSDT".to_string()];
        cfg
    }

    #[tokio::test]
    async fn start_scraping_is_idempotent() {
        let market_data = Arc::new(InMemoryMarketData::new(&["BTCUSDT".to_string()], 7, 200));
        let executor = Arc::new(PaperExecutor::new());
        let ml_sink = Arc::new(LoggingMlSink);
        let orchestrator = Orchestrator::new(test_config(), market_data, executor, ml_sink);

        assert!(orchestrator.start_scraping(vec!["BTCUSDT".to_string()]).await);
        assert!(orchestrator.start_scraping(vec!["BTCUSDT".to_string()]).await);
        orchestrator.stop_scraping().await;
    }

    #[tokio::test]
    async fn status_reports_monitored_symbols() {
        let market_data = Arc::new(InMemoryMarketData::new(&["BTCUSDT".to_string()], 7, 200));
        let executor = Arc::new(PaperExecutor::new());
        let ml_sink = Arc::new(LoggingMlSink);
        let orchestrator = Orchestrator::new(test_config(), market_data, executor, ml_sink);

        let status = orchestrator.status().await;
        assert_eq!(status.monitored_symbols, vec!["BTCUSDT".to_string()]);
        assert!(!status.active);
    }

    #[tokio::test]
    async fn ready_to_trade_signals_is_idempotent_without_price_change() {
        let market_data = Arc::new(InMemoryMarketData::new(&["BTCUSDT".to_string()], 7, 200));
        let executor = Arc::new(PaperExecutor::new());
        let ml_sink = Arc::new(LoggingMlSink);
        let orchestrator = Orchestrator::new(test_config(), market_data, executor, ml_sink);

        orchestrator.reanalyze_symbol("BTCUSDT").await;
        orchestrator.update_opportunities("BTCUSDT").await;

        let first = orchestrator.ready_to_trade_signals().await;
        let second = orchestrator.ready_to_trade_signals().await;
        assert_eq!(first.len(), second.len());
    }
}
