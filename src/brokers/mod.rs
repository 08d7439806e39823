//! Sportsbook integrations.
//!
//! Defines the `SportsbookBroker` trait and provides implementations
//! for:
//! - DraftKings: game lines (moneyline, spread, total)
//! - PrizePicks: player prop projections
//!
//! Each broker fetches its raw feed and runs it through the
//! normalizer, so everything downstream sees one offering shape.

pub mod draftkings;
pub mod prizepicks;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::types::{Bet, MarketType, Offering, Outcome, PlacementResult, Sport, StakewiseError};

/// Abstraction over sportsbook venues.
///
/// `place_bet` must be idempotent broker-side on the bet's uuid: the
/// orchestrator never retries a placement whose ack was lost, it asks
/// `check_bet_status` instead.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SportsbookBroker: Send + Sync {
    /// Fetch and normalize the active offerings for the given sports.
    async fn fetch_offerings(&self, sports: &[Sport]) -> Result<Vec<Offering>, StakewiseError>;

    /// Submit a bet. The bet's uuid doubles as the client reference.
    async fn place_bet(&self, bet: &Bet) -> Result<PlacementResult, StakewiseError>;

    /// Confirmed final results for the given events. Unfinished events
    /// are simply absent from the response.
    async fn fetch_results(&self, event_ids: &[String]) -> Result<Vec<Outcome>, StakewiseError>;

    /// Query a previously submitted bet by client reference. `None`
    /// means the broker has no record of it (the submission never
    /// landed).
    async fn check_bet_status(&self, bet_id: Uuid)
        -> Result<Option<PlacementResult>, StakewiseError>;

    /// Market types this venue accepts.
    fn supports(&self, market: MarketType) -> bool;

    /// Broker id used in offering ids and logs.
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Holds the configured brokers and answers routing questions.
#[derive(Default)]
pub struct BrokerRegistry {
    brokers: HashMap<String, Arc<dyn SportsbookBroker>>,
}

impl BrokerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, broker: Arc<dyn SportsbookBroker>) {
        self.brokers.insert(broker.name().to_string(), broker);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn SportsbookBroker>> {
        self.brokers.get(name).cloned()
    }

    /// All brokers in name order, so fetch fan-out and reports are
    /// deterministic.
    pub fn all(&self) -> Vec<Arc<dyn SportsbookBroker>> {
        let mut names: Vec<&String> = self.brokers.keys().collect();
        names.sort();
        names.iter().map(|n| self.brokers[*n].clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.brokers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.brokers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mock_named(name: &'static str, market: MarketType) -> Arc<dyn SportsbookBroker> {
        let mut broker = MockSportsbookBroker::new();
        broker.expect_name().return_const(name.to_string());
        broker.expect_supports().returning(move |m| m == market);
        Arc::new(broker)
    }

    #[test]
    fn test_registry_lookup_and_ordering() {
        let mut registry = BrokerRegistry::new();
        registry.register(mock_named("prizepicks", MarketType::PlayerProp));
        registry.register(mock_named("draftkings", MarketType::Moneyline));

        assert_eq!(registry.len(), 2);
        assert!(registry.get("draftkings").is_some());
        assert!(registry.get("bovada").is_none());

        let names: Vec<String> = registry.all().iter().map(|b| b.name().to_string()).collect();
        assert_eq!(names, vec!["draftkings", "prizepicks"]);
    }

    #[test]
    fn test_market_support_routing() {
        let registry = {
            let mut r = BrokerRegistry::new();
            r.register(mock_named("draftkings", MarketType::Moneyline));
            r.register(mock_named("prizepicks", MarketType::PlayerProp));
            r
        };
        let dk = registry.get("draftkings").unwrap();
        assert!(dk.supports(MarketType::Moneyline));
        assert!(!dk.supports(MarketType::PlayerProp));
    }
}
