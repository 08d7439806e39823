//! Mock sportsbook for integration testing.
//!
//! Provides a deterministic `SportsbookBroker` implementation that
//! serves known offerings, accepts bets, and reports scripted results,
//! all in-memory with no external dependencies.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use stakewise::brokers::SportsbookBroker;
use stakewise::types::{
    Bet, MarketType, Offering, Outcome, PlacementResult, PlacementStatus, Sport, StakewiseError,
};

/// What the mock does when asked to place a bet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementMode {
    /// Accept and return a broker reference.
    Accept,
    /// Reject the bet outright.
    Reject,
    /// Acknowledge as pending, never confirmed.
    Pending,
    /// Fail the request after recording it, as a lost ack would.
    Fail,
}

/// A mock sportsbook for deterministic testing.
///
/// All state is in-memory. Offerings, results, and placement behavior
/// are fully controllable from test code.
pub struct MockBroker {
    name: String,
    supported: Vec<MarketType>,
    offerings: Mutex<Vec<Offering>>,
    outcomes: Mutex<Vec<Outcome>>,
    placements: Mutex<Vec<Bet>>,
    placement_mode: Mutex<PlacementMode>,
    /// Scripted `check_bet_status` answers by bet id.
    statuses: Mutex<HashMap<Uuid, PlacementResult>>,
    /// If set, fetches and placements return this error.
    force_error: Mutex<Option<String>>,
    /// Artificial latency on offering fetches.
    fetch_delay: Mutex<Option<Duration>>,
}

impl MockBroker {
    pub fn new(name: &str, offerings: Vec<Offering>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            supported: vec![MarketType::Moneyline, MarketType::Spread, MarketType::Total],
            offerings: Mutex::new(offerings),
            outcomes: Mutex::new(Vec::new()),
            placements: Mutex::new(Vec::new()),
            placement_mode: Mutex::new(PlacementMode::Accept),
            statuses: Mutex::new(HashMap::new()),
            force_error: Mutex::new(None),
            fetch_delay: Mutex::new(None),
        })
    }

    pub fn set_offerings(&self, offerings: Vec<Offering>) {
        *self.offerings.lock().unwrap() = offerings;
    }

    /// Script the results feed.
    pub fn set_outcomes(&self, outcomes: Vec<Outcome>) {
        *self.outcomes.lock().unwrap() = outcomes;
    }

    pub fn set_placement_mode(&self, mode: PlacementMode) {
        *self.placement_mode.lock().unwrap() = mode;
    }

    /// Script a `check_bet_status` answer for one bet.
    pub fn set_status(&self, bet_id: Uuid, result: PlacementResult) {
        self.statuses.lock().unwrap().insert(bet_id, result);
    }

    /// Force all subsequent fetches and placements to fail.
    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }

    pub fn clear_error(&self) {
        *self.force_error.lock().unwrap() = None;
    }

    pub fn set_fetch_delay(&self, delay: Duration) {
        *self.fetch_delay.lock().unwrap() = Some(delay);
    }

    /// Every bet the broker has seen a placement request for.
    pub fn placed_bets(&self) -> Vec<Bet> {
        self.placements.lock().unwrap().clone()
    }

    fn check_error(&self) -> Result<(), StakewiseError> {
        match self.force_error.lock().unwrap().as_ref() {
            Some(msg) => Err(StakewiseError::Broker {
                broker: self.name.clone(),
                message: msg.clone(),
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl SportsbookBroker for MockBroker {
    async fn fetch_offerings(&self, sports: &[Sport]) -> Result<Vec<Offering>, StakewiseError> {
        let delay = *self.fetch_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check_error()?;
        Ok(self
            .offerings
            .lock()
            .unwrap()
            .iter()
            .filter(|o| sports.contains(&o.sport))
            .cloned()
            .collect())
    }

    async fn place_bet(&self, bet: &Bet) -> Result<PlacementResult, StakewiseError> {
        self.check_error()?;
        let mode = *self.placement_mode.lock().unwrap();
        // A lost ack still lands broker-side.
        if mode != PlacementMode::Reject {
            self.placements.lock().unwrap().push(bet.clone());
        }
        match mode {
            PlacementMode::Accept => Ok(PlacementResult {
                status: PlacementStatus::Accepted,
                broker_ref: Some(format!("mock-{}-{}", self.name, bet.id.simple())),
            }),
            PlacementMode::Reject => Ok(PlacementResult {
                status: PlacementStatus::Rejected,
                broker_ref: None,
            }),
            PlacementMode::Pending => Ok(PlacementResult {
                status: PlacementStatus::Pending,
                broker_ref: None,
            }),
            PlacementMode::Fail => Err(StakewiseError::Broker {
                broker: self.name.clone(),
                message: "connection reset during placement".to_string(),
            }),
        }
    }

    async fn fetch_results(&self, event_ids: &[String]) -> Result<Vec<Outcome>, StakewiseError> {
        self.check_error()?;
        Ok(self
            .outcomes
            .lock()
            .unwrap()
            .iter()
            .filter(|o| event_ids.contains(&o.event_id))
            .cloned()
            .collect())
    }

    async fn check_bet_status(
        &self,
        bet_id: Uuid,
    ) -> Result<Option<PlacementResult>, StakewiseError> {
        self.check_error()?;
        Ok(self.statuses.lock().unwrap().get(&bet_id).cloned())
    }

    fn supports(&self, market: MarketType) -> bool {
        self.supported.contains(&market)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
