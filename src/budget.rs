//! Daily stake budget.
//!
//! A fresh budget is cut for each trading day; every placed stake
//! commits against it and voided or reconciled bets release their
//! commitment back. All mutation happens inside the orchestrator's
//! critical section, never from broker tasks.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::StakewiseError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Budget {
    /// Day this budget applies to (UTC).
    pub day: NaiveDate,
    /// Total stake allowed across the day.
    pub max_daily_stake: Decimal,
    /// Stake committed so far today.
    pub committed: Decimal,
    /// Minimum edge an offering must clear to be considered.
    pub min_edge: Decimal,
    /// Per-bet cap as a fraction of `max_daily_stake`.
    pub max_single_bet_fraction: Decimal,
}

impl Budget {
    pub fn new(
        day: NaiveDate,
        max_daily_stake: Decimal,
        min_edge: Decimal,
        max_single_bet_fraction: Decimal,
    ) -> Self {
        Self {
            day,
            max_daily_stake,
            committed: Decimal::ZERO,
            min_edge,
            max_single_bet_fraction,
        }
    }

    /// Stake still available today.
    pub fn remaining(&self) -> Decimal {
        (self.max_daily_stake - self.committed).max(Decimal::ZERO)
    }

    /// Largest stake a single bet may carry.
    pub fn max_per_bet(&self) -> Decimal {
        self.max_single_bet_fraction * self.max_daily_stake
    }

    /// Start a fresh budget for `day`, dropping yesterday's commitments.
    pub fn reset_for(&mut self, day: NaiveDate) {
        if self.day != day {
            debug!(%day, "resetting daily budget");
            self.day = day;
            self.committed = Decimal::ZERO;
        }
    }

    /// Commit `amount` against today's budget.
    pub fn commit(&mut self, amount: Decimal) -> Result<(), StakewiseError> {
        if amount <= Decimal::ZERO || amount > self.remaining() {
            return Err(StakewiseError::BudgetExhausted {
                remaining: self.remaining(),
            });
        }
        self.committed += amount;
        Ok(())
    }

    /// Return `amount` to the budget (voided or reconciled bet).
    pub fn release(&mut self, amount: Decimal) {
        self.committed = (self.committed - amount).max(Decimal::ZERO);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn budget() -> Budget {
        Budget::new(
            NaiveDate::from_ymd_opt(2026, 8, 25).unwrap(),
            dec!(200),
            dec!(0.02),
            dec!(0.25),
        )
    }

    #[test]
    fn test_commit_and_release() {
        let mut b = budget();
        assert_eq!(b.remaining(), dec!(200));
        b.commit(dec!(60)).unwrap();
        assert_eq!(b.remaining(), dec!(140));
        b.release(dec!(60));
        assert_eq!(b.remaining(), dec!(200));
    }

    #[test]
    fn test_commit_over_remaining_rejected() {
        let mut b = budget();
        b.commit(dec!(180)).unwrap();
        let err = b.commit(dec!(30)).unwrap_err();
        assert!(matches!(err, StakewiseError::BudgetExhausted { .. }));
        // Rejected commit leaves the budget untouched.
        assert_eq!(b.remaining(), dec!(20));
    }

    #[test]
    fn test_release_never_goes_negative() {
        let mut b = budget();
        b.commit(dec!(10)).unwrap();
        b.release(dec!(50));
        assert_eq!(b.committed, Decimal::ZERO);
        assert_eq!(b.remaining(), dec!(200));
    }

    #[test]
    fn test_reset_for_new_day() {
        let mut b = budget();
        b.commit(dec!(120)).unwrap();
        let next = NaiveDate::from_ymd_opt(2026, 8, 26).unwrap();
        b.reset_for(next);
        assert_eq!(b.day, next);
        assert_eq!(b.remaining(), dec!(200));
        // Same-day reset is a no-op.
        b.commit(dec!(15)).unwrap();
        b.reset_for(next);
        assert_eq!(b.committed, dec!(15));
    }

    #[test]
    fn test_max_per_bet() {
        assert_eq!(budget().max_per_bet(), dec!(50));
    }
}
