//! Interval scheduler.
//!
//! Spawns one tokio task per run kind. Ticks just trigger the
//! orchestrator; its single-flight guard and per-day idempotency make
//! overlapping or redundant ticks harmless.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::engine::CycleOrchestrator;
use crate::types::StakewiseError;

pub struct SchedulerHandle {
    daily: JoinHandle<()>,
    resolution: JoinHandle<()>,
}

/// Start the interval tasks. Does not block.
pub fn init(
    orchestrator: Arc<CycleOrchestrator>,
    daily_interval: Duration,
    resolution_interval: Duration,
) -> SchedulerHandle {
    info!(
        daily_secs = daily_interval.as_secs(),
        resolution_secs = resolution_interval.as_secs(),
        "scheduler starting"
    );

    let daily = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(daily_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match orchestrator.run_daily().await {
                    Ok(report) if report.already_ran => {}
                    Ok(report) => info!(%report, "scheduled daily run finished"),
                    Err(StakewiseError::RunInProgress(_)) => {}
                    Err(e) => warn!(%e, "scheduled daily run failed"),
                }
            }
        })
    };

    let resolution = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(resolution_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match orchestrator.run_resolution().await {
                Ok(report) if report.bets_checked == 0 => {}
                Ok(report) => info!(%report, "scheduled resolution finished"),
                Err(StakewiseError::RunInProgress(_)) => {}
                Err(e) => warn!(%e, "scheduled resolution failed"),
            }
        }
    });

    SchedulerHandle { daily, resolution }
}

/// Stop both interval tasks.
pub fn teardown(handle: SchedulerHandle) {
    handle.daily.abort();
    handle.resolution.abort();
    info!("scheduler stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brokers::BrokerRegistry;
    use crate::budget::Budget;
    use crate::engine::cycle::{CycleConfig, CycleOrchestrator, EngineState};
    use crate::strategy::{
        EdgeConfig, EdgeModel, KellyCalculator, KellyConfig, OptimizerConfig, ParlayOptimizer,
    };
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use tokio::sync::Mutex;

    fn orchestrator() -> Arc<CycleOrchestrator> {
        let state = Arc::new(Mutex::new(EngineState::fresh(
            dec!(1000),
            Budget::new(Utc::now().date_naive(), dec!(200), dec!(0.02), dec!(0.25)),
        )));
        Arc::new(CycleOrchestrator::new(
            BrokerRegistry::new(),
            EdgeModel::new(EdgeConfig::default()),
            ParlayOptimizer::new(
                OptimizerConfig::default(),
                KellyCalculator::new(KellyConfig::default()),
            ),
            CycleConfig {
                state_file: Some(format!(
                    "{}/stakewise_sched_test_{}.json",
                    std::env::temp_dir().display(),
                    uuid::Uuid::new_v4()
                )),
                ..CycleConfig::default()
            },
            state,
        ))
    }

    #[tokio::test]
    async fn test_init_and_teardown() {
        let handle = init(
            orchestrator(),
            Duration::from_secs(3600),
            Duration::from_secs(3600),
        );
        // Give the tasks a beat to start their tickers.
        tokio::time::sleep(Duration::from_millis(10)).await;
        teardown(handle);
    }
}
