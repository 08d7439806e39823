//! Full-cycle simulation tests.
//!
//! Drive the orchestrator against mock sportsbooks through complete
//! daily and resolution runs: edge discovery over a two-book consensus,
//! placement, broker failure, lost-ack reconciliation, settlement, and
//! snapshot persistence.
//!
//! The fixture quotes one NBA moneyline at two books. Book "alpha"
//! prices both sides 1.87; book "beta" hangs HOME at 2.5, well past the
//! consensus, which yields exactly one positive edge and a quarter-Kelly
//! stake of $15.62 on a $1000 bankroll.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use chrono::Utc;
use rust_decimal_macros::dec;

use stakewise::brokers::BrokerRegistry;
use stakewise::budget::Budget;
use stakewise::engine::cycle::{CycleConfig, CycleOrchestrator, EngineState};
use stakewise::storage;
use stakewise::strategy::{
    EdgeConfig, EdgeModel, KellyCalculator, KellyConfig, OptimizerConfig, ParlayOptimizer,
};
use stakewise::types::{
    BetState, MarketType, Offering, Outcome, PlacementResult, PlacementStatus, Price, Sport,
    StakewiseError,
};

use crate::mock_broker::{MockBroker, PlacementMode};

// ---------------------------------------------------------------------------
// Fixture
// ---------------------------------------------------------------------------

fn offering(broker: &str, selection: &str, price: rust_decimal::Decimal) -> Offering {
    Offering::new(
        broker,
        Sport::Nba,
        "E1",
        MarketType::Moneyline,
        selection,
        Price::Decimal(price),
        dec!(1),
        dec!(500),
        Utc::now() + chrono::Duration::hours(6),
    )
    .unwrap()
}

fn result(event: &str, winner: Option<&str>) -> Outcome {
    Outcome {
        event_id: event.to_string(),
        market: MarketType::Moneyline,
        winning_selection: winner.map(str::to_string),
        reported_at: Utc::now(),
    }
}

struct Harness {
    orchestrator: Arc<CycleOrchestrator>,
    alpha: Arc<MockBroker>,
    beta: Arc<MockBroker>,
    state_file: String,
}

fn harness() -> Harness {
    harness_with_stale(chrono::Duration::hours(1))
}

fn harness_with_stale(stale_proposed: chrono::Duration) -> Harness {
    let alpha = MockBroker::new(
        "alpha",
        vec![
            offering("alpha", "HOME", dec!(1.87)),
            offering("alpha", "AWAY", dec!(1.87)),
        ],
    );
    let beta = MockBroker::new(
        "beta",
        vec![
            offering("beta", "HOME", dec!(2.5)),
            offering("beta", "AWAY", dec!(1.5)),
        ],
    );

    let mut registry = BrokerRegistry::new();
    registry.register(alpha.clone());
    registry.register(beta.clone());

    let state_file = format!(
        "{}/stakewise_sim_test_{}.json",
        std::env::temp_dir().display(),
        uuid::Uuid::new_v4()
    );
    let state = Arc::new(Mutex::new(EngineState::fresh(
        dec!(1000),
        Budget::new(Utc::now().date_naive(), dec!(200), dec!(0.02), dec!(0.25)),
    )));
    let orchestrator = Arc::new(CycleOrchestrator::new(
        registry,
        EdgeModel::new(EdgeConfig::default()),
        ParlayOptimizer::new(
            OptimizerConfig::default(),
            KellyCalculator::new(KellyConfig::default()),
        ),
        CycleConfig {
            fetch_timeout: Duration::from_secs(5),
            fetch_attempts: 2,
            retry_backoff: Duration::from_millis(10),
            stale_proposed,
            min_books: 2,
            active_sports: vec![Sport::Nba],
            state_file: Some(state_file.clone()),
        },
        state,
    ));

    Harness {
        orchestrator,
        alpha,
        beta,
        state_file,
    }
}

// ---------------------------------------------------------------------------
// Daily run
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_daily_cycle_places_the_positive_edge_bet() {
    let h = harness();
    let report = h.orchestrator.run_daily().await.unwrap();

    assert!(!report.already_ran);
    assert_eq!(report.offerings_fetched, 4);
    assert_eq!(report.edges_found, 1);
    assert_eq!(report.bets_proposed, 1);
    assert_eq!(report.bets_placed, 1);
    assert_eq!(report.bets_voided, 0);
    assert_eq!(report.total_staked, dec!(15.62));
    assert!(report.brokers_skipped.is_empty());

    // The bet landed at beta, whose HOME price carries the edge.
    let placed = h.beta.placed_bets();
    assert_eq!(placed.len(), 1);
    assert_eq!(placed[0].stake, dec!(15.62));
    assert!(h.alpha.placed_bets().is_empty());

    let state = h.orchestrator.state_handle();
    let state = state.lock().await;
    assert_eq!(state.account.bankroll, dec!(984.38));
    assert_eq!(state.budget.committed, dec!(15.62));
    let open = state.ledger.in_state(BetState::Placed);
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].bet.broker, "beta");
    assert!(open[0].broker_ref.as_deref().unwrap().starts_with("mock-beta-"));
}

#[tokio::test]
async fn test_daily_run_is_idempotent_per_day() {
    let h = harness();
    let first = h.orchestrator.run_daily().await.unwrap();
    assert_eq!(first.bets_placed, 1);

    let second = h.orchestrator.run_daily().await.unwrap();
    assert!(second.already_ran);
    assert_eq!(second.bets_proposed, 0);
    // Nothing reached the broker a second time.
    assert_eq!(h.beta.placed_bets().len(), 1);
}

#[tokio::test]
async fn test_failing_broker_is_skipped_not_fatal() {
    let h = harness();
    h.alpha.set_error("503 service unavailable");

    let report = h.orchestrator.run_daily().await.unwrap();
    assert_eq!(report.brokers_skipped, vec!["alpha".to_string()]);
    assert_eq!(report.offerings_fetched, 2);
    // One book is below the consensus floor, so no edges and no bets.
    assert_eq!(report.edges_found, 0);
    assert_eq!(report.bets_placed, 0);
}

#[tokio::test]
async fn test_daily_run_is_single_flight() {
    let h = harness();
    h.alpha.set_fetch_delay(Duration::from_millis(300));

    let orchestrator = h.orchestrator.clone();
    let first = tokio::spawn(async move { orchestrator.run_daily().await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = h.orchestrator.run_daily().await.unwrap_err();
    assert!(matches!(err, StakewiseError::RunInProgress("daily")));

    let report = first.await.unwrap().unwrap();
    assert_eq!(report.bets_placed, 1);
}

// ---------------------------------------------------------------------------
// Placement failure handling
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_rejected_placement_is_voided_and_refunded() {
    let h = harness();
    h.beta.set_placement_mode(PlacementMode::Reject);

    let report = h.orchestrator.run_daily().await.unwrap();
    assert_eq!(report.bets_proposed, 1);
    assert_eq!(report.bets_placed, 0);
    assert_eq!(report.bets_voided, 1);
    assert_eq!(report.total_staked, dec!(0));

    let state = h.orchestrator.state_handle();
    let state = state.lock().await;
    assert_eq!(state.account.bankroll, dec!(1000));
    assert_eq!(state.budget.committed, dec!(0));
    assert_eq!(state.ledger.in_state(BetState::Voided).len(), 1);
}

#[tokio::test]
async fn test_lost_ack_leaves_bet_proposed_with_stake_held() {
    let h = harness();
    h.beta.set_placement_mode(PlacementMode::Fail);

    let report = h.orchestrator.run_daily().await.unwrap();
    assert_eq!(report.bets_proposed, 1);
    assert_eq!(report.bets_placed, 0);
    assert_eq!(report.bets_voided, 0);

    // No blind retry: the money stays committed until reconciliation
    // settles the bet's fate.
    let state = h.orchestrator.state_handle();
    let state = state.lock().await;
    assert_eq!(state.ledger.in_state(BetState::Proposed).len(), 1);
    assert_eq!(state.account.bankroll, dec!(984.38));
    assert_eq!(state.budget.committed, dec!(15.62));
}

#[tokio::test]
async fn test_reconciliation_voids_bet_unknown_to_broker() {
    let h = harness_with_stale(chrono::Duration::zero());
    h.beta.set_placement_mode(PlacementMode::Fail);
    h.orchestrator.run_daily().await.unwrap();

    // Next day's run reconciles before proposing. The broker has no
    // record of the bet, so it is voided and the money comes back.
    h.beta.set_placement_mode(PlacementMode::Accept);
    h.alpha.set_offerings(Vec::new());
    h.beta.set_offerings(Vec::new());
    {
        let state = h.orchestrator.state_handle();
        state.lock().await.last_daily_run = None;
    }
    let report = h.orchestrator.run_daily().await.unwrap();
    assert_eq!(report.bets_proposed, 0);

    let state = h.orchestrator.state_handle();
    let state = state.lock().await;
    assert_eq!(state.ledger.in_state(BetState::Voided).len(), 1);
    assert_eq!(state.account.bankroll, dec!(1000));
    assert_eq!(state.budget.committed, dec!(0));
}

#[tokio::test]
async fn test_reconciliation_confirms_bet_the_broker_accepted() {
    let h = harness_with_stale(chrono::Duration::zero());
    h.beta.set_placement_mode(PlacementMode::Fail);
    h.orchestrator.run_daily().await.unwrap();

    let bet_id = {
        let state = h.orchestrator.state_handle();
        let state = state.lock().await;
        state.ledger.in_state(BetState::Proposed)[0].bet.id
    };
    // The placement actually landed; only the ack was lost.
    h.beta.set_status(
        bet_id,
        PlacementResult {
            status: PlacementStatus::Accepted,
            broker_ref: Some("mock-beta-recovered".to_string()),
        },
    );

    h.alpha.set_offerings(Vec::new());
    h.beta.set_offerings(Vec::new());
    {
        let state = h.orchestrator.state_handle();
        state.lock().await.last_daily_run = None;
    }
    h.orchestrator.run_daily().await.unwrap();

    let state = h.orchestrator.state_handle();
    let state = state.lock().await;
    let entry = state.ledger.get(bet_id).unwrap();
    assert_eq!(entry.state, BetState::Placed);
    assert_eq!(entry.broker_ref.as_deref(), Some("mock-beta-recovered"));
    // Stake stays committed for the now-live bet.
    assert_eq!(state.account.bankroll, dec!(984.38));
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_resolution_settles_a_win() {
    let h = harness();
    h.orchestrator.run_daily().await.unwrap();
    h.beta.set_outcomes(vec![result("E1", Some("HOME"))]);

    let report = h.orchestrator.run_resolution().await.unwrap();
    assert_eq!(report.bets_checked, 1);
    assert_eq!(report.transitions_applied, 2);
    assert_eq!(report.bets_settled, 1);
    assert_eq!(report.bets_deferred, 0);

    // $15.62 at 2.5 pays $39.05 gross.
    let state = h.orchestrator.state_handle();
    let state = state.lock().await;
    assert_eq!(state.account.bankroll, dec!(1023.43));
    assert_eq!(state.account.total_pnl, dec!(23.43));
    assert_eq!(state.account.bets_won, 1);

    let settled = state.ledger.in_state(BetState::Settled);
    assert_eq!(settled.len(), 1);
    assert_eq!(settled[0].payout, Some(dec!(39.05)));

    // The audit trail replays to the projection.
    for (id, replayed) in state.ledger.replay() {
        assert_eq!(state.ledger.get(id).unwrap().state, replayed);
    }
}

#[tokio::test]
async fn test_resolution_settles_a_loss() {
    let h = harness();
    h.orchestrator.run_daily().await.unwrap();
    h.beta.set_outcomes(vec![result("E1", Some("AWAY"))]);

    let report = h.orchestrator.run_resolution().await.unwrap();
    assert_eq!(report.bets_settled, 1);

    let state = h.orchestrator.state_handle();
    let state = state.lock().await;
    assert_eq!(state.account.bankroll, dec!(984.38));
    assert_eq!(state.account.total_pnl, dec!(-15.62));
    assert_eq!(state.account.bets_lost, 1);
}

#[tokio::test]
async fn test_unreported_event_defers_the_bet() {
    let h = harness();
    h.orchestrator.run_daily().await.unwrap();

    let report = h.orchestrator.run_resolution().await.unwrap();
    assert_eq!(report.bets_checked, 1);
    assert_eq!(report.transitions_applied, 0);
    assert_eq!(report.bets_deferred, 1);

    let state = h.orchestrator.state_handle();
    let state = state.lock().await;
    assert_eq!(state.ledger.in_state(BetState::Placed).len(), 1);
    assert_eq!(state.account.bankroll, dec!(984.38));
}

#[tokio::test]
async fn test_ambiguous_results_defer_the_broker() {
    let h = harness();
    h.orchestrator.run_daily().await.unwrap();
    // Duplicate reports for the same market poison the whole batch.
    h.beta
        .set_outcomes(vec![result("E1", Some("HOME")), result("E1", Some("HOME"))]);

    let report = h.orchestrator.run_resolution().await.unwrap();
    assert_eq!(report.transitions_applied, 0);
    assert_eq!(report.bets_deferred, 1);

    let state = h.orchestrator.state_handle();
    let state = state.lock().await;
    assert_eq!(state.ledger.in_state(BetState::Placed).len(), 1);
    assert_eq!(state.account.bankroll, dec!(984.38));
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_snapshot_survives_a_restart() {
    let h = harness();
    h.orchestrator.run_daily().await.unwrap();

    let snapshot = storage::load_snapshot(Some(&h.state_file)).unwrap().unwrap();
    assert_eq!(snapshot.account.bankroll, dec!(984.38));
    assert_eq!(snapshot.ledger.len(), 1);
    assert_eq!(snapshot.last_daily_run, Some(Utc::now().date_naive()));

    // A restarted engine resumes the day and does not re-run it.
    let mut registry = BrokerRegistry::new();
    registry.register(h.alpha.clone());
    registry.register(h.beta.clone());
    let restarted = CycleOrchestrator::new(
        registry,
        EdgeModel::new(EdgeConfig::default()),
        ParlayOptimizer::new(
            OptimizerConfig::default(),
            KellyCalculator::new(KellyConfig::default()),
        ),
        CycleConfig {
            state_file: Some(h.state_file.clone()),
            ..CycleConfig::default()
        },
        Arc::new(Mutex::new(EngineState::from_snapshot(snapshot))),
    );

    let report = restarted.run_daily().await.unwrap();
    assert!(report.already_ran);
    assert_eq!(h.beta.placed_bets().len(), 1);

    storage::delete_snapshot(Some(&h.state_file)).unwrap();
}
