//! Bet lifecycle ledger.
//!
//! The ledger is the single authority on bet state. Every state change
//! goes through [`BetLedger::record`], which validates the transition,
//! appends an immutable audit record, and updates the derived
//! projection. The projection is always reproducible by folding the
//! audit trail from scratch (see [`BetLedger::replay`]).
//!
//! Legal transitions:
//!
//! ```text
//! Proposed -> Placed -> {Won, Lost, Pushed} -> Settled
//! Voided from any state before Settled
//! ```

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::types::{Bet, BetEvent, BetOutcome, BetState, StakewiseError};

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One line of the append-only audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub seq: u64,
    pub bet_id: Uuid,
    pub event: BetEvent,
    pub from: BetState,
    pub to: BetState,
    pub at: DateTime<Utc>,
}

/// Current projection for one bet, derived from the trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub bet: Bet,
    pub state: BetState,
    pub last_transition_at: DateTime<Utc>,
    pub outcome: Option<BetOutcome>,
    /// Gross return owed on resolution (stake included for wins and
    /// pushes). Set by `ResultConfirmed`.
    pub payout: Option<Decimal>,
    pub broker_ref: Option<String>,
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BetLedger {
    entries: HashMap<Uuid, LedgerEntry>,
    trail: Vec<TransitionRecord>,
}

impl BetLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a new bet in `Proposed` state.
    pub fn propose(&mut self, bet: Bet) -> Uuid {
        let id = bet.id;
        debug!(bet_id = %id, broker = %bet.broker, "bet proposed");
        let created_at = bet.created_at;
        self.entries.insert(
            id,
            LedgerEntry {
                bet,
                state: BetState::Proposed,
                last_transition_at: created_at,
                outcome: None,
                payout: None,
                broker_ref: None,
            },
        );
        id
    }

    /// Apply a lifecycle event to a bet, returning the new state.
    ///
    /// Replaying `PlacementConfirmed` on an already-`Placed` bet is an
    /// idempotent no-op and appends nothing to the trail. All other
    /// out-of-order events fail without mutating anything.
    pub fn record(&mut self, bet_id: Uuid, event: BetEvent) -> Result<BetState, StakewiseError> {
        let entry = self
            .entries
            .get_mut(&bet_id)
            .ok_or(StakewiseError::UnknownBet(bet_id))?;
        let from = entry.state;

        let to = match (from, &event) {
            (BetState::Proposed, BetEvent::PlacementConfirmed { broker_ref }) => {
                entry.broker_ref = Some(broker_ref.clone());
                BetState::Placed
            }
            // Lost ack followed by a successful status query replays
            // the confirmation.
            (BetState::Placed, BetEvent::PlacementConfirmed { .. }) => {
                debug!(bet_id = %bet_id, "placement replay ignored");
                return Ok(BetState::Placed);
            }
            (BetState::Placed, BetEvent::ResultConfirmed { outcome, payout }) => {
                entry.outcome = Some(*outcome);
                entry.payout = Some(*payout);
                BetState::from(*outcome)
            }
            (BetState::Proposed, BetEvent::ResultConfirmed { .. }) => {
                return Err(StakewiseError::PrematureResolution(bet_id));
            }
            (BetState::Won | BetState::Lost | BetState::Pushed, BetEvent::SettlementRecorded) => {
                BetState::Settled
            }
            (from, BetEvent::Voided { reason }) if !from.is_terminal() => {
                warn!(bet_id = %bet_id, %from, reason, "bet voided");
                BetState::Voided
            }
            (from, event) => {
                return Err(StakewiseError::IllegalTransition {
                    bet_id,
                    from,
                    event: event.to_string(),
                });
            }
        };

        let at = Utc::now();
        entry.state = to;
        entry.last_transition_at = at;
        self.trail.push(TransitionRecord {
            seq: self.trail.len() as u64,
            bet_id,
            event,
            from,
            to,
            at,
        });
        info!(bet_id = %bet_id, %from, %to, "bet transition");
        Ok(to)
    }

    pub fn get(&self, bet_id: Uuid) -> Option<&LedgerEntry> {
        self.entries.get(&bet_id)
    }

    pub fn entries(&self) -> impl Iterator<Item = &LedgerEntry> {
        self.entries.values()
    }

    pub fn trail(&self) -> &[TransitionRecord] {
        &self.trail
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bets currently in `state`, ordered by creation time for
    /// deterministic processing.
    pub fn in_state(&self, state: BetState) -> Vec<&LedgerEntry> {
        let mut found: Vec<&LedgerEntry> = self
            .entries
            .values()
            .filter(|e| e.state == state)
            .collect();
        found.sort_by_key(|e| (e.bet.created_at, e.bet.id));
        found
    }

    /// Proposed bets created before `cutoff`. These are placements
    /// whose ack never arrived and need reconciliation.
    pub fn proposed_before(&self, cutoff: DateTime<Utc>) -> Vec<Uuid> {
        let mut stale: Vec<Uuid> = self
            .entries
            .values()
            .filter(|e| e.state == BetState::Proposed && e.bet.created_at < cutoff)
            .map(|e| e.bet.id)
            .collect();
        stale.sort_unstable();
        stale
    }

    /// Fold the audit trail from scratch and return the state each bet
    /// lands in. Must agree with the live projection; the invariant is
    /// exercised in tests and on storage reload.
    pub fn replay(&self) -> HashMap<Uuid, BetState> {
        let mut states: HashMap<Uuid, BetState> = self
            .entries
            .keys()
            .map(|id| (*id, BetState::Proposed))
            .collect();
        for record in &self.trail {
            states.insert(record.bet_id, record.to);
        }
        states
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
