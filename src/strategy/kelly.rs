//! Kelly criterion stake sizing.
//!
//! Fractional Kelly with a configurable multiplier and a bankroll
//! exposure cap. The optimizer applies further clamps (offering stake
//! bounds, per-bet cap, remaining daily budget) on top of this.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::debug;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct KellyConfig {
    /// Fractional Kelly multiplier (0.25 = quarter-Kelly).
    pub multiplier: Decimal,
    /// Maximum stake as a fraction of bankroll.
    pub max_bankroll_fraction: Decimal,
}

impl Default for KellyConfig {
    fn default() -> Self {
        Self {
            multiplier: dec!(0.25),
            max_bankroll_fraction: dec!(0.05),
        }
    }
}

// ---------------------------------------------------------------------------
// Calculator
// ---------------------------------------------------------------------------

pub struct KellyCalculator {
    config: KellyConfig,
}

impl KellyCalculator {
    pub fn new(config: KellyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &KellyConfig {
        &self.config
    }

    /// Raw stake for a wager with win probability `p` at decimal price
    /// `m`, against `bankroll`.
    ///
    /// Kelly: f* = (b*p - q) / b with b = m - 1, q = 1 - p. A zero or
    /// negative Kelly fraction means the price does not justify a
    /// wager and yields `None`. The result is rounded to cents.
    pub fn stake(&self, p: Decimal, m: Decimal, bankroll: Decimal) -> Option<Decimal> {
        if bankroll <= Decimal::ZERO {
            return None;
        }
        let b = m - Decimal::ONE;
        if b <= Decimal::ZERO {
            return None;
        }
        let q = Decimal::ONE - p;
        let kelly = (b * p - q) / b;
        if kelly <= Decimal::ZERO {
            debug!(%p, %m, %kelly, "non-positive Kelly, no stake");
            return None;
        }

        let fraction = (kelly * self.config.multiplier).min(self.config.max_bankroll_fraction);
        Some((fraction * bankroll).round_dp(2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quarter_kelly_even_money() {
        // p=0.55 at even money: f* = (1*0.55 - 0.45) / 1 = 0.10.
        // Quarter-Kelly on $1000 = $25.
        let calc = KellyCalculator::new(KellyConfig::default());
        let stake = calc.stake(dec!(0.55), dec!(2), dec!(1000)).unwrap();
        assert_eq!(stake, dec!(25));
    }

    #[test]
    fn test_exposure_cap_applies() {
        // p=0.8 at even money: f* = 0.6, quarter-Kelly 0.15, capped at
        // 5% of bankroll.
        let calc = KellyCalculator::new(KellyConfig::default());
        let stake = calc.stake(dec!(0.8), dec!(2), dec!(1000)).unwrap();
        assert_eq!(stake, dec!(50));
    }

    #[test]
    fn test_negative_kelly_no_stake() {
        // p=0.4 at even money is a losing wager.
        let calc = KellyCalculator::new(KellyConfig::default());
        assert!(calc.stake(dec!(0.4), dec!(2), dec!(1000)).is_none());
    }

    #[test]
    fn test_zero_bankroll_no_stake() {
        let calc = KellyCalculator::new(KellyConfig::default());
        assert!(calc.stake(dec!(0.6), dec!(2), Decimal::ZERO).is_none());
    }

    #[test]
    fn test_rounds_to_cents() {
        let calc = KellyCalculator::new(KellyConfig {
            multiplier: dec!(0.25),
            max_bankroll_fraction: dec!(1),
        });
        // p=0.5 at +150 (m=2.5): f* = (1.5*0.5 - 0.5)/1.5 = 1/6.
        // Quarter-Kelly on $100 = 4.1666.. -> 4.17.
        let stake = calc.stake(dec!(0.5), dec!(2.5), dec!(100)).unwrap();
        assert_eq!(stake, dec!(4.17));
    }
}
