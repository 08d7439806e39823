//! Bet resolution.
//!
//! Maps confirmed event results onto placed bets and produces the
//! ledger transitions they imply. The resolver is a pure function over
//! a ledger snapshot; applying the transitions (and the settlement
//! accounting that follows) belongs to the orchestrator.

use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::ledger::LedgerEntry;
use crate::types::{BetEvent, BetOutcome, BetState, MarketType, Outcome, StakewiseError};

/// A ledger transition the resolver wants applied.
#[derive(Debug, Clone)]
pub struct TransitionRequest {
    pub bet_id: Uuid,
    pub event: BetEvent,
}

/// How one leg fared against the confirmed results.
enum LegResult {
    Won,
    Lost,
    Pushed,
    /// No result reported yet for the leg's market.
    Unknown,
}

pub struct ResolutionEngine;

impl ResolutionEngine {
    /// Work out transitions for every placed bet that can be resolved
    /// with the given results.
    ///
    /// Parlay rules: one lost leg loses the whole bet; pushed legs
    /// drop out and the payout is recomputed at the reduced combined
    /// price; a bet whose every leg pushed is itself pushed and the
    /// stake comes back. A bet with any leg still unreported is
    /// deferred untouched.
    ///
    /// A duplicate or conflicting report for one (event, market) makes
    /// the whole batch untrustworthy: `AmbiguousOutcome`, zero
    /// transitions.
    pub fn resolve(
        entries: &[&LedgerEntry],
        outcomes: &[Outcome],
    ) -> Result<Vec<TransitionRequest>, StakewiseError> {
        let results = index_outcomes(outcomes)?;

        let mut placed: Vec<&&LedgerEntry> = entries
            .iter()
            .filter(|e| e.state == BetState::Placed)
            .collect();
        placed.sort_by_key(|e| (e.bet.created_at, e.bet.id));

        let mut transitions = Vec::new();
        for entry in placed {
            match Self::resolve_one(entry, &results) {
                Some((outcome, payout)) => transitions.push(TransitionRequest {
                    bet_id: entry.bet.id,
                    event: BetEvent::ResultConfirmed { outcome, payout },
                }),
                None => {
                    debug!(bet_id = %entry.bet.id, "results incomplete, deferring");
                }
            }
        }
        Ok(transitions)
    }

    /// `None` defers the bet to a later resolution pass.
    fn resolve_one(
        entry: &LedgerEntry,
        results: &HashMap<(String, MarketType), &Outcome>,
    ) -> Option<(BetOutcome, Decimal)> {
        let mut surviving_price = Decimal::ONE;
        let mut won_legs = 0usize;

        for leg in &entry.bet.candidate.legs {
            match leg_result(leg, results) {
                LegResult::Unknown => return None,
                LegResult::Lost => return Some((BetOutcome::Lost, Decimal::ZERO)),
                LegResult::Pushed => {}
                LegResult::Won => {
                    won_legs += 1;
                    surviving_price *= leg.offering.decimal_odds;
                }
            }
        }

        if won_legs == 0 {
            // Every leg pushed: the stake comes straight back.
            return Some((BetOutcome::Pushed, entry.bet.stake));
        }
        let payout = (entry.bet.stake * surviving_price).round_dp(2);
        Some((BetOutcome::Won, payout))
    }
}

fn leg_result(
    leg: &crate::types::EdgeEstimate,
    results: &HashMap<(String, MarketType), &Outcome>,
) -> LegResult {
    let key = (leg.offering.event_id.clone(), leg.offering.market);
    match results.get(&key) {
        None => LegResult::Unknown,
        Some(outcome) => match &outcome.winning_selection {
            None => LegResult::Pushed,
            Some(winner) if *winner == leg.offering.selection => LegResult::Won,
            Some(_) => LegResult::Lost,
        },
    }
}

/// Index results by (event, market), rejecting second reports for any
/// key. Identical duplicates are as suspect as contradictions; both
/// mean the feed cannot be trusted this pass.
fn index_outcomes(
    outcomes: &[Outcome],
) -> Result<HashMap<(String, MarketType), &Outcome>, StakewiseError> {
    let mut results: HashMap<(String, MarketType), &Outcome> = HashMap::new();
    for outcome in outcomes {
        if results.insert(outcome.key(), outcome).is_some() {
            warn!(event = %outcome.event_id, market = %outcome.market, "conflicting result reports");
            return Err(StakewiseError::AmbiguousOutcome {
                event_id: outcome.event_id.clone(),
                market: outcome.market,
            });
        }
    }
    Ok(results)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
