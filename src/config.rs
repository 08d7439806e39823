//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Broker API keys are referenced by env-var name in the config and
//! resolved at runtime via `std::env::var`.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fs;

use crate::strategy::{EdgeConfig, KellyConfig, OptimizerConfig};
use crate::types::Sport;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub strategy: StrategyConfig,
    pub brokers: BrokersConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EngineConfig {
    pub name: String,
    pub initial_bankroll: Decimal,
    /// Sports the daily fetch covers. Defaults to everything.
    #[serde(default = "default_active_sports")]
    pub active_sports: Vec<Sport>,
    /// Fallback log verbosity when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// How often the scheduler triggers the daily run check.
    pub daily_interval_secs: u64,
    /// How often placed bets are swept for results.
    pub resolution_interval_secs: u64,
    /// Per-broker fetch timeout.
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
    /// Attempts per broker fetch before the broker is skipped.
    #[serde(default = "default_fetch_attempts")]
    pub fetch_attempts: u32,
    #[serde(default = "default_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Proposed bets older than this get reconciled against the broker.
    #[serde(default = "default_stale_hours")]
    pub stale_proposed_hours: i64,
    /// Snapshot file path override.
    #[serde(default)]
    pub state_file: Option<String>,
}

fn default_active_sports() -> Vec<Sport> {
    Sport::ALL.to_vec()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_fetch_timeout() -> u64 {
    30
}
fn default_fetch_attempts() -> u32 {
    3
}
fn default_backoff_ms() -> u64 {
    500
}
fn default_stale_hours() -> i64 {
    1
}

#[derive(Debug, Deserialize, Clone)]
pub struct StrategyConfig {
    pub max_daily_stake: Decimal,
    pub min_edge: Decimal,
    pub max_single_bet_fraction: Decimal,
    pub kelly_multiplier: Decimal,
    pub max_bankroll_fraction: Decimal,
    pub max_legs: usize,
    pub exact_candidate_bound: usize,
    pub max_bets_per_cycle: usize,
    /// Books that must quote a selection before the consensus model
    /// trusts it.
    #[serde(default = "default_min_books")]
    pub min_books: usize,
}

fn default_min_books() -> usize {
    2
}

impl StrategyConfig {
    pub fn edge_config(&self) -> EdgeConfig {
        EdgeConfig {
            min_edge: self.min_edge,
            ..EdgeConfig::default()
        }
    }

    pub fn kelly_config(&self) -> KellyConfig {
        KellyConfig {
            multiplier: self.kelly_multiplier,
            max_bankroll_fraction: self.max_bankroll_fraction,
        }
    }

    pub fn optimizer_config(&self) -> OptimizerConfig {
        OptimizerConfig {
            max_legs: self.max_legs,
            exact_candidate_bound: self.exact_candidate_bound,
            max_bets_per_cycle: self.max_bets_per_cycle,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct BrokersConfig {
    pub draftkings: BrokerConfig,
    pub prizepicks: BrokerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BrokerConfig {
    pub enabled: bool,
    pub api_key_env: String,
    /// Acknowledge placements locally instead of hitting the wire.
    #[serde(default = "default_simulate")]
    pub simulate: bool,
    #[serde(default)]
    pub base_url: Option<String>,
}

fn default_simulate() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    pub enabled: bool,
    pub port: u16,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        Ok(config)
    }

    /// Resolve an environment variable name to its value.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_full_config() {
        let toml_src = r#"
            [engine]
            name = "STAKEWISE-001"
            initial_bankroll = 1000.0
            active_sports = ["NFL", "NBA"]
            daily_interval_secs = 3600
            resolution_interval_secs = 1800

            [strategy]
            max_daily_stake = 200.0
            min_edge = 0.02
            max_single_bet_fraction = 0.25
            kelly_multiplier = 0.25
            max_bankroll_fraction = 0.05
            max_legs = 3
            exact_candidate_bound = 20
            max_bets_per_cycle = 10

            [brokers.draftkings]
            enabled = true
            api_key_env = "DRAFTKINGS_API_KEY"

            [brokers.prizepicks]
            enabled = true
            api_key_env = "PRIZEPICKS_API_KEY"
            simulate = false

            [api]
            enabled = true
            port = 8080
        "#;
        let cfg: AppConfig = toml::from_str(toml_src).unwrap();
        assert_eq!(cfg.engine.name, "STAKEWISE-001");
        assert_eq!(cfg.engine.initial_bankroll, dec!(1000));
        assert_eq!(cfg.engine.active_sports, vec![Sport::Nfl, Sport::Nba]);
        assert_eq!(cfg.engine.log_level, "info");
        assert_eq!(cfg.engine.fetch_attempts, 3);
        assert_eq!(cfg.strategy.min_edge, dec!(0.02));
        assert_eq!(cfg.strategy.min_books, 2);
        assert!(cfg.brokers.draftkings.simulate);
        assert!(!cfg.brokers.prizepicks.simulate);
        assert_eq!(cfg.api.port, 8080);

        let kelly = cfg.strategy.kelly_config();
        assert_eq!(kelly.multiplier, dec!(0.25));
        let opt = cfg.strategy.optimizer_config();
        assert_eq!(opt.max_legs, 3);
    }

    #[test]
    fn test_missing_section_fails() {
        let toml_src = r#"
            [engine]
            name = "STAKEWISE-001"
            initial_bankroll = 1000.0
            daily_interval_secs = 3600
            resolution_interval_secs = 1800
        "#;
        assert!(toml::from_str::<AppConfig>(toml_src).is_err());
    }
}
