//! Core data model (§3): the types that flow between every subsystem.

mod candle;
mod level;
mod magnet;
mod opportunity;
mod outcome;
mod status;
mod targets;
mod tolerance;
mod trade;

pub use candle::{Candle, Side};
pub use level::{LevelKind, PriceLevel};
pub use magnet::{MagnetKind, MagnetLevel};
pub use opportunity::Opportunity;
pub use outcome::{CloseOutcome, ExitReason, SystemType, TradeOutcome};
pub use status::EngineStatus;
pub use targets::TradingTargets;
pub use tolerance::{Regime, RegimeMultipliers, ToleranceProfile};
pub use trade::{ActiveTrade, TradeState, TrailingState, TrendAlignment};

/// Round-trip coverage for §8 property 8 (lossless encode/decode) over
/// every exported type that crosses a collaborator boundary.
#[cfg(test)]
mod round_trip_tests {
    use std::collections::HashMap;

    use chrono::Utc;

    use super::*;

    #[test]
    fn opportunity_round_trips_through_json() {
        let level = PriceLevel {
            price: 50_000.0,
            kind: LevelKind::Support,
            strength: 72.0,
            touch_count: 4,
            bounce_count: 3,
            avg_bounce_pct: 0.012,
            max_bounce_pct: 0.021,
            last_tested_at: Utc::now(),
            first_identified_at: Utc::now(),
            avg_volume_at_level: 1_250.0,
        };
        let magnet = MagnetLevel {
            price: 50_500.0,
            kind: MagnetKind::RoundNumber,
            strength: 65.0,
            attraction_radius: 0.004,
            historical_reactions: 6,
            last_reaction_at: Some(Utc::now()),
        };
        let targets = TradingTargets {
            entry_price: 50_000.0,
            profit_target: 50_600.0,
            stop_loss: 49_700.0,
            profit_probability: 0.62,
            risk_reward_ratio: 2.0,
            expected_duration_minutes: 45,
            confidence: 72.0,
            tp_net_usd: 17.60,
            sl_net_usd: 14.60,
            floor_net_usd: 10.0,
        };
        let opportunity = Opportunity {
            symbol: "BTCUSDT".to_string(),
            level,
            magnet: Some(magnet),
            targets,
            current_price: 50_050.0,
            distance_pct: 0.001,
            score: 81.5,
            created_at: Utc::now(),
        };

        let raw = serde_json::to_string(&opportunity).unwrap();
        let back: Opportunity = serde_json::from_str(&raw).unwrap();
        assert_eq!(opportunity, back);
    }

    #[test]
    fn trading_targets_round_trips_through_json() {
        let targets = TradingTargets {
            entry_price: 3_000.0,
            profit_target: 2_940.0,
            stop_loss: 3_030.0,
            profit_probability: 0.58,
            risk_reward_ratio: 1.8,
            expected_duration_minutes: 30,
            confidence: 68.0,
            tp_net_usd: 17.60,
            sl_net_usd: 14.60,
            floor_net_usd: 10.0,
        };
        let raw = serde_json::to_string(&targets).unwrap();
        let back: TradingTargets = serde_json::from_str(&raw).unwrap();
        assert_eq!(targets, back);
    }

    #[test]
    fn active_trade_round_trips_through_json() {
        let trade = ActiveTrade {
            trade_id: "t-1".to_string(),
            symbol: "BTCUSDT".to_string(),
            side: Side::Long,
            entry_price: 50_000.0,
            quantity: 0.01,
            leverage: 10.0,
            profit_target: 50_600.0,
            stop_loss: 49_700.0,
            entry_time: Utc::now(),
            level_kind: LevelKind::Support,
            confidence: 80.0,
            atr_pct: 0.02,
            trend_aligned: TrendAlignment::Aligned,
            state: TradeState::Open,
            trailing: TrailingState::default(),
            close_failures: 0,
        };
        let raw = serde_json::to_string(&trade).unwrap();
        let back: ActiveTrade = serde_json::from_str(&raw).unwrap();
        assert_eq!(trade, back);
    }

    #[test]
    fn trade_outcome_round_trips_through_json() {
        let mut features = HashMap::new();
        features.insert("atr_pct".to_string(), 0.02);
        features.insert("confidence".to_string(), 80.0);

        let outcome = TradeOutcome {
            trade_id: "t-1".to_string(),
            symbol: "BTCUSDT".to_string(),
            strategy_type: "profit_scraping".to_string(),
            system_type: SystemType::Paper,
            confidence_score: 80.0,
            ml_score: Some(0.71),
            entry_price: 50_000.0,
            exit_price: 50_600.0,
            pnl_pct: 0.012,
            duration_minutes: 37.0,
            market_regime: "normal".to_string(),
            volatility_regime: Regime::Normal,
            exit_reason: ExitReason::ProfitTarget,
            success: true,
            features,
            entry_time: Utc::now(),
            exit_time: Utc::now(),
        };
        let raw = serde_json::to_string(&outcome).unwrap();
        let back: TradeOutcome = serde_json::from_str(&raw).unwrap();
        assert_eq!(outcome, back);
    }
}
