//! Edge scoring.
//!
//! Compares modeled win probabilities against a book's implied
//! probabilities and keeps the offerings whose edge clears the
//! configured thresholds.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{debug, warn};

use crate::model::ProbabilityModel;
use crate::types::{EdgeEstimate, MarketType, Offering, StakewiseError};

// ---------------------------------------------------------------------------
// Configuration (defaults, overridden by config.toml at runtime)
// ---------------------------------------------------------------------------

/// Edge thresholds per market type. Markets where the model is less
/// reliable require a larger edge before a wager is considered.
#[derive(Debug, Clone)]
pub struct EdgeConfig {
    pub moneyline_threshold: Decimal,
    pub spread_threshold: Decimal,
    pub total_threshold: Decimal,
    pub player_prop_threshold: Decimal,
    /// Minimum absolute edge to consider (noise floor).
    pub min_edge: Decimal,
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            moneyline_threshold: dec!(0.03),
            spread_threshold: dec!(0.03),
            total_threshold: dec!(0.04),
            player_prop_threshold: dec!(0.05),
            min_edge: dec!(0.02),
        }
    }
}

impl EdgeConfig {
    pub fn threshold_for(&self, market: MarketType) -> Decimal {
        let t = match market {
            MarketType::Moneyline => self.moneyline_threshold,
            MarketType::Spread => self.spread_threshold,
            MarketType::Total => self.total_threshold,
            MarketType::PlayerProp => self.player_prop_threshold,
        };
        t.max(self.min_edge)
    }
}

// ---------------------------------------------------------------------------
// Edge model
// ---------------------------------------------------------------------------

/// Scores offerings against modeled probabilities.
pub struct EdgeModel {
    config: EdgeConfig,
}

impl EdgeModel {
    pub fn new(config: EdgeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EdgeConfig {
        &self.config
    }

    /// Score one offering against a modeled win probability.
    ///
    /// `ev_per_unit = p * (m - 1) - (1 - p)` where `m` is the decimal
    /// price. The modeled probability must lie strictly inside (0, 1);
    /// the boundaries are rejected because a certain outcome is a data
    /// error, not an edge.
    pub fn score(
        &self,
        offering: &Offering,
        modeled_probability: Decimal,
    ) -> Result<EdgeEstimate, StakewiseError> {
        if modeled_probability <= Decimal::ZERO || modeled_probability >= Decimal::ONE {
            return Err(StakewiseError::InvalidProbability(modeled_probability));
        }

        let m = offering.decimal_odds;
        let p = modeled_probability;
        let ev_per_unit = p * (m - Decimal::ONE) - (Decimal::ONE - p);

        Ok(EdgeEstimate {
            offering: offering.clone(),
            modeled_probability: p,
            implied_probability: offering.implied_probability,
            edge: p - offering.implied_probability,
            ev_per_unit,
        })
    }

    /// Score every active offering the model has a view on, keeping
    /// those whose edge clears the market-type threshold and whose
    /// expected value is positive. Sub-threshold offerings are dropped
    /// silently; an offering whose modeled probability is out of range
    /// is logged and skipped, it never fails the batch. Result is
    /// sorted by EV per unit, best first.
    pub fn filter_edges(
        &self,
        offerings: &[Offering],
        model: &dyn ProbabilityModel,
    ) -> Result<Vec<EdgeEstimate>, StakewiseError> {
        let mut edges = Vec::new();

        for offering in offerings {
            if !offering.is_active() {
                continue;
            }
            let Some(p) = model.estimate(offering) else {
                continue;
            };
            let estimate = match self.score(offering, p) {
                Ok(estimate) => estimate,
                Err(e) => {
                    warn!(offering = %offering.id, %e, "rejected modeled probability, skipping");
                    continue;
                }
            };

            if estimate.edge < self.config.threshold_for(offering.market) {
                continue;
            }
            if estimate.ev_per_unit <= Decimal::ZERO {
                continue;
            }
            debug!(offering = %offering.id, edge = %estimate.edge, "edge found");
            edges.push(estimate);
        }

        edges.sort_by(|a, b| {
            b.ev_per_unit
                .cmp(&a.ev_per_unit)
                .then_with(|| a.offering.id.cmp(&b.offering.id))
        });
        Ok(edges)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
