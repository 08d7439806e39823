//! Pluggable win-probability models.
//!
//! The engine does not generate sport statistics itself; it consumes a
//! modeled probability per offering through the [`ProbabilityModel`]
//! trait and scores edges against it. The default implementation is a
//! cross-book consensus: de-vig each book's market and average the
//! resulting probabilities across books quoting the same selection.

use rust_decimal::Decimal;
use std::collections::HashMap;

use crate::types::{MarketType, Offering};

/// Source of modeled win probabilities. Implementations must return
/// values strictly inside (0, 1), or `None` when they have no view on
/// the offering (the offering is then skipped, not an error).
pub trait ProbabilityModel: Send + Sync {
    fn estimate(&self, offering: &Offering) -> Option<Decimal>;

    /// Model name for logging.
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Cross-book consensus
// ---------------------------------------------------------------------------

/// De-vigged cross-book consensus model.
///
/// A sportsbook's quoted implied probabilities for one market sum to
/// more than 1 (the overround is the book's margin). Dividing each
/// selection's implied probability by the market's overround removes
/// the margin; averaging the de-vigged values across books quoting the
/// same (event, market, selection) gives a consensus estimate. A
/// selection quoted by fewer than `min_books` books gets no estimate.
pub struct ConsensusModel {
    /// (event_id, market, selection) -> consensus probability.
    estimates: HashMap<(String, MarketType, String), Decimal>,
    min_books: usize,
}

impl ConsensusModel {
    /// Build the consensus from one cycle's normalized offerings.
    pub fn from_offerings(offerings: &[Offering]) -> Self {
        Self::with_min_books(offerings, 2)
    }

    pub fn with_min_books(offerings: &[Offering], min_books: usize) -> Self {
        // Overround per (broker, event, market).
        let mut overrounds: HashMap<(String, String, MarketType), Decimal> = HashMap::new();
        for o in offerings {
            *overrounds
                .entry((o.broker.clone(), o.event_id.clone(), o.market))
                .or_insert(Decimal::ZERO) += o.implied_probability;
        }

        // De-vigged probabilities per (event, market, selection), one
        // sample per quoting book.
        let mut samples: HashMap<(String, MarketType, String), Vec<Decimal>> = HashMap::new();
        for o in offerings {
            let overround = overrounds[&(o.broker.clone(), o.event_id.clone(), o.market)];
            if overround <= Decimal::ZERO {
                continue;
            }
            let devigged = o.implied_probability / overround;
            // A book quoting only one side of a market de-vigs to
            // exactly 1, which is no probability at all. Drop the
            // sample rather than poison the average.
            if devigged >= Decimal::ONE {
                continue;
            }
            samples
                .entry((o.event_id.clone(), o.market, o.selection.clone()))
                .or_default()
                .push(devigged);
        }

        let estimates = samples
            .into_iter()
            .filter(|(_, v)| v.len() >= min_books)
            .map(|(k, v)| {
                let sum: Decimal = v.iter().sum();
                (k, sum / Decimal::from(v.len()))
            })
            .collect();

        Self { estimates, min_books }
    }

    pub fn min_books(&self) -> usize {
        self.min_books
    }
}

impl ProbabilityModel for ConsensusModel {
    fn estimate(&self, offering: &Offering) -> Option<Decimal> {
        self.estimates
            .get(&(
                offering.event_id.clone(),
                offering.market,
                offering.selection.clone(),
            ))
            .copied()
    }

    fn name(&self) -> &str {
        "consensus"
    }
}

// ---------------------------------------------------------------------------
// Fixed model
// ---------------------------------------------------------------------------

/// Fixed per-selection probabilities. Used in tests and for manual
/// overrides; selections without an entry get no estimate.
#[derive(Default)]
pub struct FixedModel {
    by_selection: HashMap<String, Decimal>,
}

impl FixedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, event_id: &str, selection: &str, probability: Decimal) -> Self {
        self.by_selection
            .insert(format!("{event_id}:{selection}"), probability);
        self
    }
}

impl ProbabilityModel for FixedModel {
    fn estimate(&self, offering: &Offering) -> Option<Decimal> {
        self.by_selection
            .get(&format!("{}:{}", offering.event_id, offering.selection))
            .copied()
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
