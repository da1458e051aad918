//! Layered configuration (§6, §10): a fully-defaulted `EngineConfig`,
//! optionally overlaid from a TOML file, following the corpus's
//! load -> validate -> use pattern.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Which target calculator (§4.5.1) the orchestrator uses. Fixed for
/// the lifetime of one `EngineConfig` — never mixed within a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetMode {
    RuleBased,
    AtrAware,
}

impl Default for TargetMode {
    fn default() -> Self {
        TargetMode::RuleBased
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub position_size_usd: f64,
    pub leverage: f64,
    pub max_risk_per_trade: f64,
    pub max_trades_per_symbol: u32,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            position_size_usd: 500.0,
            leverage: 10.0,
            max_risk_per_trade: 0.05,
            max_trades_per_symbol: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetsConfig {
    pub primary_target_dollars: f64,
    pub absolute_floor_dollars: f64,
    pub stop_loss_dollars: f64,
    pub mode: TargetMode,
}

impl Default for TargetsConfig {
    fn default() -> Self {
        Self {
            primary_target_dollars: 18.0,
            absolute_floor_dollars: 15.0,
            stop_loss_dollars: 18.0,
            mode: TargetMode::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    pub monitor_cadence_secs: u64,
    pub reanalysis_cadence_secs: u64,
    pub reanalysis_batch_size: usize,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            monitor_cadence_secs: 5,
            reanalysis_cadence_secs: 600,
            reanalysis_batch_size: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolatilityConfig {
    pub cache_ttl_secs: u64,
    pub atr_period: usize,
    pub history_days: u32,
}

impl Default for VolatilityConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 1800,
            atr_period: 14,
            history_days: 30,
        }
    }
}

/// Top-level, fully-defaulted engine configuration. A zero-config run
/// (`EngineConfig::default()`) is always valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub symbols: Vec<String>,
    pub execution: ExecutionConfig,
    pub targets: TargetsConfig,
    pub loops: LoopConfig,
    pub volatility: VolatilityConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            symbols: vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()],
            execution: ExecutionConfig::default(),
            targets: TargetsConfig::default(),
            loops: LoopConfig::default(),
            volatility: VolatilityConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Loads from an optional TOML path, falling back to defaults when
    /// absent, then validates.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(p) if p.exists() => {
                let raw = std::fs::read_to_string(p)
                    .with_context(|| format!("reading config file {}", p.display()))?;
                toml::from_str::<EngineConfig>(&raw)
                    .with_context(|| format!("parsing config file {}", p.display()))?
            }
            _ => EngineConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let raw = toml::to_string_pretty(self).context("serializing config")?;
        std::fs::write(path, raw)
            .with_context(|| format!("writing config file {}", path.display()))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.symbols.is_empty() {
            bail!("config invalid: symbols must not be empty");
        }
        if self.execution.position_size_usd <= 0.0 {
            bail!("config invalid: execution.position_size_usd must be positive");
        }
        if self.execution.leverage <= 0.0 {
            bail!("config invalid: execution.leverage must be positive");
        }
        if self.execution.max_trades_per_symbol == 0 {
            bail!("config invalid: execution.max_trades_per_symbol must be at least 1");
        }
        if self.volatility.atr_period == 0 {
            bail!("config invalid: volatility.atr_period must be positive");
        }
        if self.loops.reanalysis_batch_size == 0 {
            bail!("config invalid: loops.reanalysis_batch_size must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        EngineConfig::default().validate().unwrap();
    }

    #[test]
    fn empty_symbols_rejected() {
        let mut cfg = EngineConfig::default();
        cfg.symbols.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn round_trips_through_toml() {
        let cfg = EngineConfig::default();
        let raw = toml::to_string_pretty(&cfg).unwrap();
        let back: EngineConfig = toml::from_str(&raw).unwrap();
        assert_eq!(cfg, back);
    }

    #[test]
    fn save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.toml");
        let cfg = EngineConfig::default();
        cfg.save(&path).unwrap();
        let loaded = EngineConfig::load(Some(&path)).unwrap();
        assert_eq!(cfg, loaded);
    }
}
