//! Parlay construction and portfolio selection.
//!
//! Enumerates single-leg wagers and same-broker parlays from the
//! cycle's scored edges, sizes each candidate with fractional Kelly,
//! ranks them, and picks a conflict-free portfolio that fits the
//! remaining daily budget. Selection is exact (branch and bound) for
//! small pools and greedy in rank order for large ones, so a given
//! input always yields the same portfolio.

use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

use super::kelly::KellyCalculator;
use crate::budget::Budget;
use crate::types::{Bet, EdgeEstimate, MarketType, ParlayCandidate, StakewiseError};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct OptimizerConfig {
    /// Maximum legs per parlay. 1 disables parlays entirely.
    pub max_legs: usize,
    /// Pool size at or below which selection is exact.
    pub exact_candidate_bound: usize,
    /// Hard cap on bets proposed per cycle.
    pub max_bets_per_cycle: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_legs: 3,
            exact_candidate_bound: 20,
            max_bets_per_cycle: 10,
        }
    }
}

// ---------------------------------------------------------------------------
// Optimizer
// ---------------------------------------------------------------------------

pub struct ParlayOptimizer {
    config: OptimizerConfig,
    kelly: KellyCalculator,
}

/// Candidate plus the conflict groups its legs occupy.
struct Sized {
    candidate: ParlayCandidate,
    groups: HashSet<(String, MarketType)>,
}

impl ParlayOptimizer {
    pub fn new(config: OptimizerConfig, kelly: KellyCalculator) -> Self {
        Self { config, kelly }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Build the cycle's bet portfolio from scored edges.
    ///
    /// Returns `BudgetExhausted` only when the budget has nothing left
    /// on entry; an empty portfolio because nothing fits is `Ok(vec![])`.
    pub fn select(
        &self,
        edges: &[EdgeEstimate],
        budget: &Budget,
        bankroll: Decimal,
    ) -> Result<Vec<Bet>, StakewiseError> {
        if budget.remaining() <= Decimal::ZERO {
            return Err(StakewiseError::BudgetExhausted {
                remaining: budget.remaining(),
            });
        }

        let mut pool = self.enumerate(edges, budget, bankroll);
        rank(&mut pool);

        let picked = if pool.len() <= self.config.exact_candidate_bound {
            debug!(pool = pool.len(), "exact portfolio selection");
            self.select_exact(&pool, budget.remaining())
        } else {
            debug!(pool = pool.len(), "greedy portfolio selection");
            self.select_greedy(&pool, budget.remaining())
        };

        let bets: Vec<Bet> = picked
            .into_iter()
            .map(|i| Bet::from_candidate(pool[i].candidate.clone()))
            .collect();
        info!(candidates = pool.len(), selected = bets.len(), "portfolio selected");
        Ok(bets)
    }

    /// Enumerate singles plus 2..=max_legs same-broker parlays with
    /// pairwise-distinct events, Kelly-sized and clamped.
    fn enumerate(&self, edges: &[EdgeEstimate], budget: &Budget, bankroll: Decimal) -> Vec<Sized> {
        let mut pool = Vec::new();

        for edge in edges {
            if let Some(s) = self.size(std::slice::from_ref(edge), budget, bankroll) {
                pool.push(s);
            }
        }

        if self.config.max_legs < 2 {
            return pool;
        }

        // Parlay legs must share a broker.
        let mut by_broker: HashMap<&str, Vec<&EdgeEstimate>> = HashMap::new();
        for edge in edges {
            by_broker
                .entry(edge.offering.broker.as_str())
                .or_default()
                .push(edge);
        }

        for legs in by_broker.into_values() {
            let mut combo: Vec<&EdgeEstimate> = Vec::with_capacity(self.config.max_legs);
            self.combine(&legs, 0, &mut combo, budget, bankroll, &mut pool);
        }
        pool
    }

    fn combine<'a>(
        &self,
        legs: &[&'a EdgeEstimate],
        start: usize,
        combo: &mut Vec<&'a EdgeEstimate>,
        budget: &Budget,
        bankroll: Decimal,
        pool: &mut Vec<Sized>,
    ) {
        for i in start..legs.len() {
            let leg = legs[i];
            // Legs of one parlay come from distinct events. This also
            // keeps conflict groups distinct, since the group key
            // starts with the event id.
            if combo.iter().any(|l| l.offering.event_id == leg.offering.event_id) {
                continue;
            }
            combo.push(leg);
            if combo.len() >= 2 {
                let owned: Vec<EdgeEstimate> = combo.iter().map(|l| (*l).clone()).collect();
                if let Some(s) = self.size(&owned, budget, bankroll) {
                    pool.push(s);
                }
            }
            if combo.len() < self.config.max_legs {
                self.combine(legs, i + 1, combo, budget, bankroll, pool);
            }
            combo.pop();
        }
    }

    /// Price and size a candidate. `None` when the combined price has
    /// no positive expectation or no feasible stake exists.
    fn size(&self, legs: &[EdgeEstimate], budget: &Budget, bankroll: Decimal) -> Option<Sized> {
        let mut combined_probability = Decimal::ONE;
        let mut combined_price = Decimal::ONE;
        for leg in legs {
            combined_probability *= leg.modeled_probability;
            combined_price *= leg.offering.decimal_odds;
        }

        let ev_per_unit = combined_probability * (combined_price - Decimal::ONE)
            - (Decimal::ONE - combined_probability);
        if ev_per_unit <= Decimal::ZERO {
            return None;
        }

        let raw = self
            .kelly
            .stake(combined_probability, combined_price, bankroll)?;

        // The stake must respect every leg's bounds at once.
        let floor = legs
            .iter()
            .map(|l| l.offering.min_stake)
            .max()
            .unwrap_or(Decimal::ZERO);
        let ceiling = legs
            .iter()
            .map(|l| l.offering.max_stake)
            .min()
            .unwrap_or(Decimal::ZERO)
            .min(budget.max_per_bet());

        let stake = raw.min(ceiling);
        if stake < floor || stake <= Decimal::ZERO {
            return None;
        }

        let groups = legs.iter().map(|l| l.offering.conflict_key()).collect();
        Some(Sized {
            candidate: ParlayCandidate {
                legs: legs.to_vec(),
                combined_probability,
                combined_price,
                stake,
                expected_value: stake * ev_per_unit,
            },
            groups,
        })
    }

    /// Depth-first branch and bound maximizing total expected value,
    /// visiting candidates in rank order and trying "include" before
    /// "skip" so that EV ties resolve to the ranking.
    fn select_exact(&self, pool: &[Sized], remaining: Decimal) -> Vec<usize> {
        // suffix_ev[i] = Σ expected_value of pool[i..], the loosest
        // upper bound on what the remaining subtree can add.
        let mut suffix_ev = vec![Decimal::ZERO; pool.len() + 1];
        for i in (0..pool.len()).rev() {
            suffix_ev[i] = suffix_ev[i + 1] + pool[i].candidate.expected_value;
        }

        struct Search<'a> {
            pool: &'a [Sized],
            suffix_ev: &'a [Decimal],
            max_bets: usize,
            best_ev: Decimal,
            best: Vec<usize>,
            chosen: Vec<usize>,
            taken_groups: HashSet<(String, MarketType)>,
        }

        impl Search<'_> {
            fn dfs(&mut self, i: usize, budget_left: Decimal, ev: Decimal) {
                if ev > self.best_ev {
                    self.best_ev = ev;
                    self.best = self.chosen.clone();
                }
                if i == self.pool.len() || self.chosen.len() == self.max_bets {
                    return;
                }
                // Prune when even taking everything left cannot beat
                // the incumbent. <= keeps EV ties resolved in favor of
                // the include-first (rank-order) solution found earlier.
                if ev + self.suffix_ev[i] <= self.best_ev {
                    return;
                }

                let pool = self.pool;
                let c = &pool[i];
                if c.candidate.stake <= budget_left && c.groups.is_disjoint(&self.taken_groups) {
                    self.chosen.push(i);
                    for g in &c.groups {
                        self.taken_groups.insert(g.clone());
                    }
                    self.dfs(
                        i + 1,
                        budget_left - c.candidate.stake,
                        ev + c.candidate.expected_value,
                    );
                    for g in &c.groups {
                        self.taken_groups.remove(g);
                    }
                    self.chosen.pop();
                }
                self.dfs(i + 1, budget_left, ev);
            }
        }

        let mut search = Search {
            pool,
            suffix_ev: &suffix_ev,
            max_bets: self.config.max_bets_per_cycle,
            best_ev: Decimal::ZERO,
            best: Vec::new(),
            chosen: Vec::new(),
            taken_groups: HashSet::new(),
        };
        search.dfs(0, remaining, Decimal::ZERO);
        search.best
    }

    fn select_greedy(&self, pool: &[Sized], mut remaining: Decimal) -> Vec<usize> {
        let mut taken_groups: HashSet<(String, MarketType)> = HashSet::new();
        let mut picked = Vec::new();

        for (i, c) in pool.iter().enumerate() {
            if picked.len() == self.config.max_bets_per_cycle {
                break;
            }
            if c.candidate.stake > remaining {
                continue;
            }
            if !c.groups.is_disjoint(&taken_groups) {
                continue;
            }
            remaining -= c.candidate.stake;
            taken_groups.extend(c.groups.iter().cloned());
            picked.push(i);
        }
        picked
    }
}

/// Rank order: EV per unit descending, then combined probability
/// descending, then fewer legs, then lexical leg-id key.
fn rank(pool: &mut [Sized]) {
    pool.sort_by(|a, b| {
        let ca = &a.candidate;
        let cb = &b.candidate;
        cb.ev_per_unit()
            .cmp(&ca.ev_per_unit())
            .then_with(|| cb.combined_probability.cmp(&ca.combined_probability))
            .then_with(|| ca.leg_count().cmp(&cb.leg_count()))
            .then_with(|| ca.lexical_key().cmp(&cb.lexical_key()))
    });
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
