//! Position Lifecycle Manager (§4.6): the hybrid trailing-stop and
//! exit state machine run once per tick for every `ActiveTrade`.
//!
//! Grounded on `_monitor_active_trades` in
//! `examples/original_source/.../profit_scraping_engine.py`, adapted
//! to the teacher's `position/position_manager.rs` style of owning a
//! `HashMap<String, Position>` and mutating in place.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::clock::Clock;
use crate::domain::{ActiveTrade, ExitReason, Regime, Side, TradeState, TrendAlignment};
use crate::trend::Trend;

const SAFETY_HOLD_HOURS: f64 = 24.0;
const SAFETY_UNDERWATER_PCT: f64 = 0.05;
const MAX_CLOSE_FAILURES: u32 = 3;

/// Per-side-aware "does this SL move help the trade" check — the only
/// gate on every SL mutation (§3 monotonicity invariant).
fn favourable_move(side: Side, current_sl: f64, candidate_sl: f64) -> bool {
    match side {
        Side::Long => candidate_sl > current_sl,
        Side::Short => candidate_sl < current_sl,
    }
}

fn apply_sl_if_favourable(trade: &mut ActiveTrade, candidate_sl: f64) -> bool {
    if favourable_move(trade.side, trade.stop_loss, candidate_sl) {
        trade.stop_loss = candidate_sl;
        true
    } else {
        false
    }
}

/// `entry +/- locked_usd / (qty * leverage)`, signed by side.
fn price_for_locked_usd(trade: &ActiveTrade, locked_usd: f64) -> f64 {
    let denom = trade.quantity * trade.leverage;
    if denom <= 0.0 {
        return trade.entry_price;
    }
    match trade.side {
        Side::Long => trade.entry_price + locked_usd / denom,
        Side::Short => trade.entry_price - locked_usd / denom,
    }
}

/// Time budgets for the §4.6.1 step 6 time-based exit, keyed by trend
/// alignment.
fn time_budget_minutes(alignment: TrendAlignment) -> (f64, f64) {
    match alignment {
        TrendAlignment::Aligned => (90.0, 30.0),
        TrendAlignment::CounterTrend => (45.0, 10.0),
        TrendAlignment::Neutral => (60.0, 15.0),
    }
}

/// Outcome of one lifecycle tick: either the trade stays open (with
/// any SL mutation already applied) or it must be closed with the
/// given reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    StillOpen,
    Close(ExitReason),
}

/// Runs the full §4.6.1 algorithm for one trade at one tick. Mutates
/// `trade.stop_loss` and `trade.trailing` in place; never mutates
/// anything when the trade is not `Open`.
pub fn tick(trade: &mut ActiveTrade, price: f64, clock: &dyn Clock) -> TickOutcome {
    if trade.state != TradeState::Open {
        return TickOutcome::StillOpen;
    }

    // 1. Hard exits.
    let profit_hit = match trade.side {
        Side::Long => price >= trade.profit_target,
        Side::Short => price <= trade.profit_target,
    };
    if profit_hit {
        return TickOutcome::Close(ExitReason::ProfitTarget);
    }
    let stop_hit = match trade.side {
        Side::Long => price <= trade.stop_loss,
        Side::Short => price >= trade.stop_loss,
    };
    if stop_hit {
        return TickOutcome::Close(ExitReason::StopLoss);
    }

    let notional = trade.notional();
    let unrealized_usd = trade.unrealized_usd(price);

    // 2. Stepwise USD lock trail.
    let start_threshold = trade.trailing.trail_start_net_usd + trade.trailing.fee_buffer_usd;
    if unrealized_usd >= start_threshold {
        let step_usd = if trade.trailing.step_mode_percent {
            trade.trailing.step_increment_pct * trade.leverage * notional
        } else {
            trade.trailing.step_increment_usd
        };
        let next_step = step_usd.max(trade.trailing.last_step_usd + step_usd);
        let target_lock = next_step.min(trade.trailing.max_trail_cap_usd);
        let arm_level =
            target_lock + trade.trailing.hysteresis_pct * trade.entry_price * trade.quantity * trade.leverage;

        let cooldown_elapsed = match trade.trailing.last_step_mono_secs {
            Some(last) => clock.monotonic_secs() - last >= trade.trailing.step_cooldown_sec,
            None => true,
        };

        if unrealized_usd >= arm_level && cooldown_elapsed && target_lock > trade.trailing.locked_profit_usd {
            let candidate_sl = price_for_locked_usd(trade, target_lock);
            if apply_sl_if_favourable(trade, candidate_sl) {
                trade.trailing.locked_profit_usd = target_lock;
                trade.trailing.last_step_usd = target_lock;
                trade.trailing.last_step_mono_secs = Some(clock.monotonic_secs());
                info!(trade_id = %trade.trade_id, target_lock, "stepwise trail armed");
            }
        }
    }

    // 3. Cap hand-off.
    if trade.trailing.locked_profit_usd >= trade.trailing.max_trail_cap_usd
        && trade.trailing.cap_handoff_tight_atr
    {
        let tight_gap = (trade.atr_pct * trade.trailing.cap_trail_mult).max(0.0012);
        let candidate_sl = match trade.side {
            Side::Long => price * (1.0 - tight_gap),
            Side::Short => price * (1.0 + tight_gap),
        };
        apply_sl_if_favourable(trade, candidate_sl);
    }

    // 4. ATR breakeven.
    let mult = Regime::classify(trade.atr_pct).multipliers();
    let favourable = trade.unrealized_pct(price);
    if favourable >= trade.atr_pct * mult.be {
        let be_gap = (trade.atr_pct * 0.1).max(0.0006);
        let candidate_sl = match trade.side {
            Side::Long => trade.entry_price * (1.0 - be_gap),
            Side::Short => trade.entry_price * (1.0 + be_gap),
        };
        apply_sl_if_favourable(trade, candidate_sl);
    }

    // 5. ATR trail.
    if favourable >= trade.atr_pct * (mult.be + mult.trail) {
        let candidate_sl = match trade.side {
            Side::Long => price * (1.0 - trade.atr_pct * mult.trail),
            Side::Short => price * (1.0 + trade.atr_pct * mult.trail),
        };
        apply_sl_if_favourable(trade, candidate_sl);
    }

    // 6. Time-based exits.
    let now = clock.wall_now();
    let minutes_open = trade.minutes_open(now);
    let (max_hold, flat_cut) = time_budget_minutes(trade.trend_aligned);
    if minutes_open >= max_hold {
        return TickOutcome::Close(ExitReason::TimeExitMax);
    }
    if minutes_open >= flat_cut {
        let edge_floor = (0.0020_f64).max(0.8 * trade.atr_pct);
        if favourable <= edge_floor {
            return TickOutcome::Close(ExitReason::TimeExitFlat);
        }
    }

    // 7. Safety time exit, regardless of SL position.
    let hours_open = minutes_open / 60.0;
    if hours_open > SAFETY_HOLD_HOURS {
        let underwater = -trade.unrealized_pct(price);
        if underwater >= SAFETY_UNDERWATER_PCT {
            return TickOutcome::Close(ExitReason::SafetyTimeExit);
        }
    }

    TickOutcome::StillOpen
}

/// Owns the `trade_id -> ActiveTrade` map and drives one tick over
/// every active trade (§3 ownership, §5 ordering guarantees: at most
/// one tick per trade runs at a time because this takes `&mut self`).
pub struct PositionLifecycleManager {
    clock: Arc<dyn Clock>,
    trades: HashMap<String, ActiveTrade>,
}

impl PositionLifecycleManager {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock, trades: HashMap::new() }
    }

    pub fn insert(&mut self, trade: ActiveTrade) {
        self.trades.insert(trade.trade_id.clone(), trade);
    }

    pub fn get(&self, trade_id: &str) -> Option<&ActiveTrade> {
        self.trades.get(trade_id)
    }

    pub fn active_trades(&self) -> impl Iterator<Item = &ActiveTrade> {
        self.trades.values()
    }

    pub fn len(&self) -> usize {
        self.trades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }

    /// Ticks every `Open` trade against its last known price (looked
    /// up via `prices`, keyed by symbol). A missing price is a data
    /// failure: the tick is skipped entirely for that trade (§4.6.3).
    /// Returns the set of trade_ids that must now be closed, paired
    /// with their exit reason.
    pub fn tick_all(&mut self, prices: &HashMap<String, f64>) -> Vec<(String, ExitReason)> {
        let mut to_close = Vec::new();
        for (trade_id, trade) in self.trades.iter_mut() {
            let Some(&price) = prices.get(&trade.symbol) else {
                warn!(trade_id, symbol = %trade.symbol, "price unavailable; skipping tick");
                continue;
            };
            match tick(trade, price, self.clock.as_ref()) {
                TickOutcome::StillOpen => {}
                TickOutcome::Close(reason) => {
                    trade.state = TradeState::Closing;
                    to_close.push((trade_id.clone(), reason));
                }
            }
        }
        to_close
    }

    /// Records a failed close attempt (§4.6.3): after `MAX_CLOSE_FAILURES`
    /// consecutive failures the trade is force-removed with
    /// `CloseFailed`.
    pub fn record_close_failure(&mut self, trade_id: &str) -> bool {
        if let Some(trade) = self.trades.get_mut(trade_id) {
            trade.close_failures += 1;
            if trade.close_failures >= MAX_CLOSE_FAILURES {
                self.trades.remove(trade_id);
                return true;
            }
        }
        false
    }

    pub fn remove(&mut self, trade_id: &str) -> Option<ActiveTrade> {
        self.trades.remove(trade_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{LevelKind, TrailingState};
    use chrono::Utc;

    fn base_trade(side: Side, entry: f64, qty: f64, leverage: f64, now: chrono::DateTime<Utc>) -> ActiveTrade {
        ActiveTrade {
            trade_id: "t1".to_string(),
            symbol: "BTCUSDT".to_string(),
            side,
            entry_price: entry,
            quantity: qty,
            leverage,
            profit_target: match side {
                Side::Long => entry * 2.0,
                Side::Short => entry * 0.5,
            },
            stop_loss: match side {
                Side::Long => entry * 0.5,
                Side::Short => entry * 2.0,
            },
            entry_time: now,
            level_kind: LevelKind::Support,
            confidence: 80.0,
            atr_pct: 0.02,
            trend_aligned: TrendAlignment::Aligned,
            state: TradeState::Open,
            trailing: TrailingState::default(),
            close_failures: 0,
        }
    }

    #[test]
    fn e1_btc_long_stepwise_lock() {
        let clock = crate::clock::TestClock::new(Utc::now());
        let mut trade = base_trade(Side::Long, 50_000.0, 0.01, 10.0, clock.wall_now());

        for price in [50_050.0, 50_120.0, 50_220.0] {
            tick(&mut trade, price, clock.as_ref());
        }
        // notional*lev = 5000; unrealized_usd at 50_220 = (220/50000)*5000 = 22.
        // arm_level = step_usd(15) + hysteresis_pct(0.0012)*entry*qty*lev(5000) = 21; 22 clears it.
        assert!((trade.trailing.locked_profit_usd - 15.0).abs() < 1e-6);
        assert!((trade.stop_loss - (50_000.0 + 15.0 / (0.01 * 10.0))).abs() < 1e-6);

        let sl_after_first_step = trade.stop_loss;
        clock.advance(5.0);
        tick(&mut trade, 50_180.0, clock.as_ref());
        tick(&mut trade, 50_260.0, clock.as_ref());
        // still within cooldown (40s) of the first step -> SL unchanged
        assert_eq!(trade.stop_loss, sl_after_first_step);
    }

    #[test]
    fn e2_eth_short_cap_handoff() {
        let clock = crate::clock::TestClock::new(Utc::now());
        let mut trade = base_trade(Side::Short, 3_000.0, 0.67, 10.0, clock.wall_now());
        trade.atr_pct = 0.02;
        trade.trailing.locked_profit_usd = 60.0;

        tick(&mut trade, 2_950.0, clock.as_ref());
        // tight_gap = max(0.02*0.40, 0.0012) = 0.008
        let max_allowed_sl = 2_950.0 * 1.008;
        assert!(trade.stop_loss <= max_allowed_sl + 1e-9);
    }

    #[test]
    fn e5_safety_time_exit() {
        let clock = crate::clock::TestClock::new(Utc::now() - chrono::Duration::hours(25));
        let mut trade = base_trade(Side::Long, 50_000.0, 0.01, 10.0, clock.wall_now());
        let outcome = tick(&mut trade, 47_400.0, clock.as_ref());
        assert_eq!(outcome, TickOutcome::Close(ExitReason::SafetyTimeExit));
    }

    #[test]
    fn sl_monotonicity_long_never_decreases() {
        let clock = crate::clock::TestClock::new(Utc::now());
        let mut trade = base_trade(Side::Long, 50_000.0, 0.01, 10.0, clock.wall_now());
        let mut last_sl = trade.stop_loss;
        for i in 0..20 {
            clock.advance(41.0);
            let price = 50_000.0 + i as f64 * 30.0;
            tick(&mut trade, price, clock.as_ref());
            assert!(trade.stop_loss >= last_sl - 1e-9);
            last_sl = trade.stop_loss;
        }
    }

    #[test]
    fn locked_profit_never_decreases() {
        let clock = crate::clock::TestClock::new(Utc::now());
        let mut trade = base_trade(Side::Long, 50_000.0, 0.01, 10.0, clock.wall_now());
        let mut last_locked = trade.trailing.locked_profit_usd;
        for i in 0..20 {
            clock.advance(41.0);
            let price = 50_000.0 + i as f64 * 30.0;
            tick(&mut trade, price, clock.as_ref());
            assert!(trade.trailing.locked_profit_usd >= last_locked - 1e-9);
            last_locked = trade.trailing.locked_profit_usd;
        }
    }

    #[test]
    fn cooldown_enforced_between_steps() {
        let clock = crate::clock::TestClock::new(Utc::now());
        let mut trade = base_trade(Side::Long, 50_000.0, 0.01, 10.0, clock.wall_now());
        tick(&mut trade, 50_200.0, clock.as_ref());
        let step_time = trade.trailing.last_step_mono_secs.unwrap();
        clock.advance(10.0);
        tick(&mut trade, 50_400.0, clock.as_ref());
        if let Some(second) = trade.trailing.last_step_mono_secs {
            if second != step_time {
                assert!(second - step_time >= trade.trailing.step_cooldown_sec - 1e-9);
            }
        }
    }
}

