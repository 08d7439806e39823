//! STAKEWISE: Automated Sports-Wager Decision Engine
//!
//! Entry point. Loads configuration, initialises structured logging,
//! restores the engine snapshot from disk (or starts fresh), wires up
//! the broker clients, and runs the scheduler and API server until a
//! shutdown signal arrives.

use anyhow::{Context, Result};
use secrecy::Secret;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

use stakewise::api::{self, routes::ApiContext};
use stakewise::brokers::draftkings::DraftKingsClient;
use stakewise::brokers::prizepicks::PrizePicksClient;
use stakewise::brokers::BrokerRegistry;
use stakewise::budget::Budget;
use stakewise::config::{AppConfig, BrokerConfig};
use stakewise::engine::cycle::{CycleConfig, CycleOrchestrator, EngineState};
use stakewise::scheduler;
use stakewise::storage;
use stakewise::strategy::{EdgeModel, KellyCalculator, ParlayOptimizer};

const BANNER: &str = r#"
 ____ _____  _    _  _______        _____ ____  _____
/ ___|_   _|/ \  | |/ / ____\ \    / /_ _/ ___|| ____|
\___ \ | | / _ \ | ' /|  _|  \ \/\/ / | |\___ \|  _|
 ___) || |/ ___ \| . \| |___  \    /  | | ___) | |___
|____/ |_/_/   \_\_|\_\_____|  \/\/  |___|____/|_____|

  Automated Sports-Wager Decision Engine
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = AppConfig::load("config.toml")?;
    init_logging(&cfg.engine.log_level);

    println!("{BANNER}");
    info!(
        engine_name = %cfg.engine.name,
        initial_bankroll = %cfg.engine.initial_bankroll,
        max_daily_stake = %cfg.strategy.max_daily_stake,
        "STAKEWISE starting up"
    );

    // -- Restore or create state -----------------------------------------

    let state_file = cfg.engine.state_file.clone();
    let state = match storage::load_snapshot(state_file.as_deref())? {
        Some(snapshot) => {
            info!(
                bankroll = %snapshot.account.bankroll,
                bets = snapshot.ledger.len(),
                "resumed from saved snapshot"
            );
            EngineState::from_snapshot(snapshot)
        }
        None => {
            info!(bankroll = %cfg.engine.initial_bankroll, "fresh start");
            EngineState::fresh(
                cfg.engine.initial_bankroll,
                Budget::new(
                    chrono::Utc::now().date_naive(),
                    cfg.strategy.max_daily_stake,
                    cfg.strategy.min_edge,
                    cfg.strategy.max_single_bet_fraction,
                ),
            )
        }
    };
    let state = Arc::new(Mutex::new(state));

    // -- Broker clients ---------------------------------------------------

    let mut registry = BrokerRegistry::new();
    if cfg.brokers.draftkings.enabled {
        let key = broker_key(&cfg.brokers.draftkings)?;
        let client = match &cfg.brokers.draftkings.base_url {
            Some(url) => DraftKingsClient::with_base_url(key, cfg.brokers.draftkings.simulate, url)?,
            None => DraftKingsClient::new(key, cfg.brokers.draftkings.simulate)?,
        };
        registry.register(Arc::new(client));
    }
    if cfg.brokers.prizepicks.enabled {
        let key = broker_key(&cfg.brokers.prizepicks)?;
        let client = match &cfg.brokers.prizepicks.base_url {
            Some(url) => PrizePicksClient::with_base_url(key, cfg.brokers.prizepicks.simulate, url)?,
            None => PrizePicksClient::new(key, cfg.brokers.prizepicks.simulate)?,
        };
        registry.register(Arc::new(client));
    }
    if registry.is_empty() {
        warn!("no brokers enabled, runs will find nothing to bet on");
    }

    // -- Orchestrator ------------------------------------------------------

    let orchestrator = Arc::new(CycleOrchestrator::new(
        registry,
        EdgeModel::new(cfg.strategy.edge_config()),
        ParlayOptimizer::new(
            cfg.strategy.optimizer_config(),
            KellyCalculator::new(cfg.strategy.kelly_config()),
        ),
        CycleConfig {
            fetch_timeout: Duration::from_secs(cfg.engine.fetch_timeout_secs),
            fetch_attempts: cfg.engine.fetch_attempts,
            retry_backoff: Duration::from_millis(cfg.engine.retry_backoff_ms),
            stale_proposed: chrono::Duration::hours(cfg.engine.stale_proposed_hours),
            min_books: cfg.strategy.min_books,
            active_sports: cfg.engine.active_sports.clone(),
            state_file,
        },
        state,
    ));

    // -- Scheduler and API -------------------------------------------------

    let handle = scheduler::init(
        orchestrator.clone(),
        Duration::from_secs(cfg.engine.daily_interval_secs),
        Duration::from_secs(cfg.engine.resolution_interval_secs),
    );

    if cfg.api.enabled {
        api::spawn_api(Arc::new(ApiContext::new(orchestrator)), cfg.api.port)?;
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown signal received");
    scheduler::teardown(handle);
    info!("STAKEWISE shut down cleanly.");
    Ok(())
}

fn broker_key(cfg: &BrokerConfig) -> Result<Secret<String>> {
    // Simulated brokers still build a client; a missing key only
    // matters for live placement.
    let key = std::env::var(&cfg.api_key_env).unwrap_or_default();
    if key.is_empty() && !cfg.simulate {
        anyhow::bail!("environment variable not set: {}", cfg.api_key_env);
    }
    Ok(Secret::new(key))
}

/// Initialise the `tracing` subscriber. `RUST_LOG` wins over the
/// configured fallback level.
fn init_logging(level: &str) {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("stakewise={level}")));

    let json_logging = std::env::var("STAKEWISE_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
