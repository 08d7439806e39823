//! Cycle orchestration.
//!
//! Ties the pipeline together: reconcile stale placements, fetch
//! offerings from every broker, build the consensus model, score
//! edges, select a portfolio, and place it. A second entry point
//! sweeps placed bets against confirmed results and books settlements.
//!
//! Concurrency model: broker I/O fans out with an independent timeout
//! and bounded retry per broker; a failing broker is skipped, never
//! fatal. All budget, ledger, and account mutation happens under one
//! state lock. Each run kind is single-flight: a trigger that arrives
//! while the same kind is running is rejected, not queued.

use chrono::{NaiveDate, Utc};
use futures::future::join_all;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::resolver::ResolutionEngine;
use crate::brokers::{BrokerRegistry, SportsbookBroker};
use crate::budget::Budget;
use crate::ledger::BetLedger;
use crate::model::ConsensusModel;
use crate::storage::{self, EngineSnapshot};
use crate::strategy::{EdgeModel, ParlayOptimizer};
use crate::types::{
    AccountState, Bet, BetEvent, CycleReport, Offering, Outcome, PlacementStatus,
    ResolutionReport, Sport, StakewiseError,
};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Everything mutable the engine owns. One lock guards it all; the
/// pieces are never mutated independently.
#[derive(Debug)]
pub struct EngineState {
    pub account: AccountState,
    pub budget: Budget,
    pub ledger: BetLedger,
    pub last_daily_run: Option<NaiveDate>,
}

impl EngineState {
    pub fn fresh(initial_bankroll: Decimal, budget: Budget) -> Self {
        Self {
            account: AccountState::new(initial_bankroll),
            budget,
            ledger: BetLedger::new(),
            last_daily_run: None,
        }
    }

    pub fn from_snapshot(snapshot: EngineSnapshot) -> Self {
        Self {
            account: snapshot.account,
            budget: snapshot.budget,
            ledger: snapshot.ledger,
            last_daily_run: snapshot.last_daily_run,
        }
    }

    fn to_snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            account: self.account.clone(),
            budget: self.budget.clone(),
            ledger: self.ledger.clone(),
            last_daily_run: self.last_daily_run,
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CycleConfig {
    pub fetch_timeout: Duration,
    pub fetch_attempts: u32,
    pub retry_backoff: Duration,
    /// Proposed bets older than this get reconciled with the broker.
    pub stale_proposed: chrono::Duration,
    pub min_books: usize,
    /// Sports the daily fetch asks brokers for.
    pub active_sports: Vec<Sport>,
    pub state_file: Option<String>,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(30),
            fetch_attempts: 3,
            retry_backoff: Duration::from_millis(500),
            stale_proposed: chrono::Duration::hours(1),
            min_books: 2,
            active_sports: Sport::ALL.to_vec(),
            state_file: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct CycleOrchestrator {
    registry: BrokerRegistry,
    edge_model: EdgeModel,
    optimizer: ParlayOptimizer,
    config: CycleConfig,
    state: Arc<Mutex<EngineState>>,
    daily_gate: Mutex<()>,
    resolution_gate: Mutex<()>,
}

impl CycleOrchestrator {
    pub fn new(
        registry: BrokerRegistry,
        edge_model: EdgeModel,
        optimizer: ParlayOptimizer,
        config: CycleConfig,
        state: Arc<Mutex<EngineState>>,
    ) -> Self {
        Self {
            registry,
            edge_model,
            optimizer,
            config,
            state,
            daily_gate: Mutex::new(()),
            resolution_gate: Mutex::new(()),
        }
    }

    /// Shared handle for the API layer's status views.
    pub fn state_handle(&self) -> Arc<Mutex<EngineState>> {
        self.state.clone()
    }

    /// Run the daily decision cycle. Idempotent per calendar day and
    /// single-flight: a second trigger while one runs gets
    /// `RunInProgress`; a trigger after today's run completed returns
    /// a report flagged `already_ran`.
    pub async fn run_daily(&self) -> Result<CycleReport, StakewiseError> {
        let _gate = self
            .daily_gate
            .try_lock()
            .map_err(|_| StakewiseError::RunInProgress("daily"))?;

        let today = Utc::now().date_naive();
        {
            let state = self.state.lock().await;
            if state.last_daily_run == Some(today) {
                info!(%today, "daily run already completed, skipping");
                return Ok(noop_report(today));
            }
        }

        info!(%today, "daily run starting");
        self.reconcile_stale_proposed().await;

        let (offerings, skipped) = self.fetch_all_offerings().await;
        let model = ConsensusModel::with_min_books(&offerings, self.config.min_books);
        let edges = self.edge_model.filter_edges(&offerings, &model)?;
        info!(offerings = offerings.len(), edges = edges.len(), "edges scored");

        // Propose under the critical section: commit the budget and
        // the bankroll, admit to the ledger, all-or-nothing per bet.
        let proposed: Vec<Bet> = {
            let mut state = self.state.lock().await;
            state.budget.reset_for(today);
            let bankroll = state.account.bankroll;
            let bets = match self.optimizer.select(&edges, &state.budget, bankroll) {
                Ok(bets) => bets,
                Err(StakewiseError::BudgetExhausted { remaining }) => {
                    warn!(%remaining, "no budget for today, proposing nothing");
                    Vec::new()
                }
                Err(e) => return Err(e),
            };

            let mut admitted = Vec::with_capacity(bets.len());
            for bet in bets {
                if let Err(e) = state.budget.commit(bet.stake) {
                    warn!(bet_id = %bet.id, %e, "budget commit refused, dropping bet");
                    continue;
                }
                state.account.commit_stake(bet.stake);
                state.ledger.propose(bet.clone());
                admitted.push(bet);
            }
            admitted
        };

        // Placement happens outside the lock. A failure here leaves
        // the bet Proposed with its budget committed; reconciliation
        // settles the question on the next run rather than a blind
        // retry risking a double placement.
        let mut bets_placed = 0usize;
        let mut bets_voided = 0usize;
        let mut total_staked = Decimal::ZERO;
        for bet in &proposed {
            match self.place_one(bet).await {
                PlacementDisposition::Placed => {
                    bets_placed += 1;
                    total_staked += bet.stake;
                }
                PlacementDisposition::Voided => bets_voided += 1,
                PlacementDisposition::Unknown => {}
            }
        }

        let report = CycleReport {
            day: today,
            timestamp: Utc::now(),
            offerings_fetched: offerings.len(),
            edges_found: edges.len(),
            bets_proposed: proposed.len(),
            bets_placed,
            bets_voided,
            total_staked,
            brokers_skipped: skipped,
            already_ran: false,
        };

        {
            let mut state = self.state.lock().await;
            state.last_daily_run = Some(today);
            self.persist(&state);
        }
        info!(%report, "daily run complete");
        Ok(report)
    }

    /// Sweep placed bets against confirmed results and book the
    /// settlements. Single-flight like the daily run.
    pub async fn run_resolution(&self) -> Result<ResolutionReport, StakewiseError> {
        let _gate = self
            .resolution_gate
            .try_lock()
            .map_err(|_| StakewiseError::RunInProgress("resolution"))?;

        // Which events each broker owes us results for.
        let (bets_checked, wanted): (usize, HashMap<String, Vec<String>>) = {
            let state = self.state.lock().await;
            let placed = state.ledger.in_state(crate::types::BetState::Placed);
            let mut wanted: HashMap<String, Vec<String>> = HashMap::new();
            for entry in &placed {
                let events = wanted.entry(entry.bet.broker.clone()).or_default();
                for id in entry.bet.event_ids() {
                    if !events.contains(&id) {
                        events.push(id);
                    }
                }
            }
            (placed.len(), wanted)
        };

        let mut broker_names: Vec<&String> = wanted.keys().collect();
        broker_names.sort();

        let mut transitions_applied = 0usize;
        let mut bets_settled = 0usize;
        for name in broker_names {
            let Some(broker) = self.registry.get(name) else {
                warn!(broker = %name, "placed bets reference unknown broker");
                continue;
            };
            let outcomes = match self.fetch_results_with_retry(&broker, &wanted[name]).await {
                Ok(outcomes) => outcomes,
                Err(e) => {
                    warn!(broker = %name, %e, "results fetch failed, deferring broker");
                    continue;
                }
            };

            let (applied, settled) = self.apply_results(name, &outcomes).await?;
            transitions_applied += applied;
            bets_settled += settled;
        }

        let bets_deferred = {
            let state = self.state.lock().await;
            let deferred = state.ledger.in_state(crate::types::BetState::Placed).len();
            self.persist(&state);
            deferred
        };

        let report = ResolutionReport {
            timestamp: Utc::now(),
            bets_checked,
            transitions_applied,
            bets_settled,
            bets_deferred,
        };
        info!(%report, "resolution run complete");
        Ok(report)
    }

    /// Resolve one broker's placed bets against its outcomes and apply
    /// the transitions. An ambiguous results batch defers the whole
    /// broker with zero transitions.
    async fn apply_results(
        &self,
        broker: &str,
        outcomes: &[Outcome],
    ) -> Result<(usize, usize), StakewiseError> {
        let mut state = self.state.lock().await;

        let transitions = {
            let entries: Vec<&crate::ledger::LedgerEntry> = state
                .ledger
                .entries()
                .filter(|e| e.bet.broker == broker)
                .collect();
            match ResolutionEngine::resolve(&entries, outcomes) {
                Ok(transitions) => transitions,
                Err(e @ StakewiseError::AmbiguousOutcome { .. }) => {
                    error!(%broker, %e, "results feed ambiguous, deferring broker");
                    return Ok((0, 0));
                }
                Err(e) => return Err(e),
            }
        };

        let mut applied = 0usize;
        let mut settled = 0usize;
        for request in transitions {
            let BetEvent::ResultConfirmed { outcome, payout } = request.event else {
                continue;
            };
            let stake = state
                .ledger
                .get(request.bet_id)
                .map(|e| e.bet.stake)
                .ok_or(StakewiseError::UnknownBet(request.bet_id))?;

            state
                .ledger
                .record(request.bet_id, BetEvent::ResultConfirmed { outcome, payout })?;
            applied += 1;

            state
                .ledger
                .record(request.bet_id, BetEvent::SettlementRecorded)?;
            state.account.record_settlement(outcome, stake, payout);
            applied += 1;
            settled += 1;
        }
        Ok((applied, settled))
    }

    /// Settle the fate of Proposed bets whose placement ack never
    /// arrived: confirm them if the broker has the bet, void them and
    /// return the money if it does not. Errors leave the bet Proposed
    /// for the next pass.
    async fn reconcile_stale_proposed(&self) {
        let cutoff = Utc::now() - self.config.stale_proposed;
        let stale: Vec<(Uuid, String, Decimal)> = {
            let state = self.state.lock().await;
            state
                .ledger
                .proposed_before(cutoff)
                .into_iter()
                .filter_map(|id| {
                    state
                        .ledger
                        .get(id)
                        .map(|e| (id, e.bet.broker.clone(), e.bet.stake))
                })
                .collect()
        };
        if stale.is_empty() {
            return;
        }
        info!(count = stale.len(), "reconciling stale proposed bets");

        for (bet_id, broker_name, stake) in stale {
            let Some(broker) = self.registry.get(&broker_name) else {
                warn!(%bet_id, broker = %broker_name, "unknown broker, cannot reconcile");
                continue;
            };
            match broker.check_bet_status(bet_id).await {
                Ok(Some(result)) if result.status == PlacementStatus::Accepted => {
                    let mut state = self.state.lock().await;
                    let event = BetEvent::PlacementConfirmed {
                        broker_ref: result.broker_ref.unwrap_or_default(),
                    };
                    if let Err(e) = state.ledger.record(bet_id, event) {
                        warn!(%bet_id, %e, "late confirmation rejected");
                    }
                }
                Ok(Some(result)) if result.status == PlacementStatus::Pending => {
                    debug!(%bet_id, "placement still pending broker-side");
                }
                Ok(_) => {
                    // Rejected, or no record at all: the bet never
                    // happened. Void it and put the money back.
                    let mut state = self.state.lock().await;
                    let event = BetEvent::Voided {
                        reason: "placement not found at broker".to_string(),
                    };
                    match state.ledger.record(bet_id, event) {
                        Ok(_) => {
                            state.budget.release(stake);
                            state.account.release_stake(stake);
                        }
                        Err(e) => warn!(%bet_id, %e, "void rejected"),
                    }
                }
                Err(e) => {
                    warn!(%bet_id, %e, "status query failed, leaving bet proposed");
                }
            }
        }
    }

    // -- Broker I/O ------------------------------------------------------

    async fn fetch_all_offerings(&self) -> (Vec<Offering>, Vec<String>) {
        let brokers = self.registry.all();
        let fetches = brokers
            .iter()
            .map(|broker| self.fetch_offerings_with_retry(broker.clone()));
        let results = join_all(fetches).await;

        let mut offerings = Vec::new();
        let mut skipped = Vec::new();
        for (broker, result) in brokers.iter().zip(results) {
            match result {
                Ok(fetched) => offerings.extend(fetched),
                Err(e) => {
                    warn!(broker = %broker.name(), %e, "offerings fetch failed, skipping broker");
                    skipped.push(broker.name().to_string());
                }
            }
        }
        (offerings, skipped)
    }

    async fn fetch_offerings_with_retry(
        &self,
        broker: Arc<dyn SportsbookBroker>,
    ) -> Result<Vec<Offering>, StakewiseError> {
        let mut last_err = timeout_err(broker.name());
        for attempt in 1..=self.config.fetch_attempts {
            let fetch = broker.fetch_offerings(&self.config.active_sports);
            match timeout(self.config.fetch_timeout, fetch).await {
                Ok(Ok(offerings)) => return Ok(offerings),
                Ok(Err(e)) => last_err = e,
                Err(_) => last_err = timeout_err(broker.name()),
            }
            if attempt < self.config.fetch_attempts {
                debug!(broker = %broker.name(), attempt, "fetch retry");
                sleep(self.config.retry_backoff * attempt).await;
            }
        }
        Err(last_err)
    }

    async fn fetch_results_with_retry(
        &self,
        broker: &Arc<dyn SportsbookBroker>,
        event_ids: &[String],
    ) -> Result<Vec<Outcome>, StakewiseError> {
        let mut last_err = timeout_err(broker.name());
        for attempt in 1..=self.config.fetch_attempts {
            match timeout(self.config.fetch_timeout, broker.fetch_results(event_ids)).await {
                Ok(Ok(outcomes)) => return Ok(outcomes),
                Ok(Err(e)) => last_err = e,
                Err(_) => last_err = timeout_err(broker.name()),
            }
            if attempt < self.config.fetch_attempts {
                sleep(self.config.retry_backoff * attempt).await;
            }
        }
        Err(last_err)
    }

    async fn place_one(&self, bet: &Bet) -> PlacementDisposition {
        let Some(broker) = self.registry.get(&bet.broker) else {
            warn!(bet_id = %bet.id, broker = %bet.broker, "no client for broker, voiding");
            return self
                .void_proposed(bet, "broker not configured")
                .await;
        };

        match broker.place_bet(bet).await {
            Ok(result) => match result.status {
                PlacementStatus::Accepted => {
                    let mut state = self.state.lock().await;
                    let event = BetEvent::PlacementConfirmed {
                        broker_ref: result.broker_ref.unwrap_or_default(),
                    };
                    match state.ledger.record(bet.id, event) {
                        Ok(_) => PlacementDisposition::Placed,
                        Err(e) => {
                            error!(bet_id = %bet.id, %e, "confirmation rejected by ledger");
                            PlacementDisposition::Unknown
                        }
                    }
                }
                PlacementStatus::Rejected => {
                    self.void_proposed(bet, "rejected by broker").await
                }
                PlacementStatus::Pending => {
                    debug!(bet_id = %bet.id, "placement pending, leaving proposed");
                    PlacementDisposition::Unknown
                }
            },
            Err(e) => {
                // The ack is lost. Never retry blindly; the bet stays
                // Proposed until reconciliation confirms or voids it.
                warn!(bet_id = %bet.id, %e, "placement failed, leaving proposed");
                PlacementDisposition::Unknown
            }
        }
    }

    async fn void_proposed(&self, bet: &Bet, reason: &str) -> PlacementDisposition {
        let mut state = self.state.lock().await;
        let event = BetEvent::Voided {
            reason: reason.to_string(),
        };
        match state.ledger.record(bet.id, event) {
            Ok(_) => {
                state.budget.release(bet.stake);
                state.account.release_stake(bet.stake);
                PlacementDisposition::Voided
            }
            Err(e) => {
                error!(bet_id = %bet.id, %e, "void rejected by ledger");
                PlacementDisposition::Unknown
            }
        }
    }

    fn persist(&self, state: &EngineState) {
        let snapshot = state.to_snapshot();
        if let Err(e) = storage::save_snapshot(&snapshot, self.config.state_file.as_deref()) {
            error!(%e, "snapshot save failed");
        }
    }
}

enum PlacementDisposition {
    Placed,
    Voided,
    /// Fate unknown; the bet stays Proposed for reconciliation.
    Unknown,
}

fn noop_report(day: NaiveDate) -> CycleReport {
    CycleReport {
        day,
        timestamp: Utc::now(),
        offerings_fetched: 0,
        edges_found: 0,
        bets_proposed: 0,
        bets_placed: 0,
        bets_voided: 0,
        total_staked: Decimal::ZERO,
        brokers_skipped: Vec::new(),
        already_ran: true,
    }
}

fn timeout_err(broker: &str) -> StakewiseError {
    StakewiseError::Broker {
        broker: broker.to_string(),
        message: "request timed out".to_string(),
    }
}
