//! Integer money & percentage primitives.
//!
//! All monetary amounts are carried as signed paise (`i64`); percentages are
//! basis points. Floating point never enters ledger or tax math. Rounding to
//! the nearest rupee happens once, at document level, via [`round_to_rupee`].

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Monetary amount in paise (1/100 rupee). Signed: credit notes and round-off
/// deltas can be negative.
pub type Paise = i64;

/// Percentage expressed in basis points (1% == 100 bp).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Percent(u32);

impl Percent {
    pub const ZERO: Percent = Percent(0);

    pub fn from_basis_points(bp: u32) -> Self {
        Self(bp)
    }

    /// Whole-percent constructor (e.g. `Percent::from_percent(12)` == 12%).
    pub fn from_percent(pct: u32) -> Self {
        Self(pct * 100)
    }

    pub fn basis_points(&self) -> u32 {
        self.0
    }

    /// Apply this percentage to an amount, rounding half away from zero.
    pub fn of(&self, amount: Paise) -> DomainResult<Paise> {
        mul_div_round(amount, self.0 as i64, 10_000)
    }

    /// The complement share: `amount * (1 - self)`.
    pub fn remainder_of(&self, amount: Paise) -> DomainResult<Paise> {
        let keep = 10_000i64
            .checked_sub(self.0 as i64)
            .filter(|v| *v >= 0)
            .ok_or_else(|| DomainError::validation("percentage above 100%"))?;
        mul_div_round(amount, keep, 10_000)
    }
}

/// `amount * num / den` in i128 with half-away-from-zero rounding.
fn mul_div_round(amount: i64, num: i64, den: i64) -> DomainResult<Paise> {
    debug_assert!(den > 0);
    let wide = (amount as i128) * (num as i128);
    let den = den as i128;
    let half = den / 2;
    let rounded = if wide >= 0 {
        (wide + half) / den
    } else {
        (wide - half) / den
    };
    i64::try_from(rounded).map_err(|_| DomainError::integrity("monetary overflow"))
}

/// Multiply a quantity by a unit rate with overflow checking.
pub fn amount(quantity: i64, rate: Paise) -> DomainResult<Paise> {
    let wide = (quantity as i128) * (rate as i128);
    i64::try_from(wide).map_err(|_| DomainError::integrity("monetary overflow"))
}

/// Round a paise total to the nearest whole rupee.
///
/// Returns `(rounded_total, round_off)` where `round_off` is the signed delta
/// applied (`rounded - raw`). Half-rupee rounds away from zero.
pub fn round_to_rupee(raw: Paise) -> (Paise, Paise) {
    let rounded = match mul_div_round(raw, 1, 100) {
        Ok(rupees) => rupees.saturating_mul(100),
        // Unreachable for den=100 with i64 input; keep the raw value.
        Err(_) => raw,
    };
    (rounded, rounded - raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_of_rounds_half_up() {
        // 12% of 200.00 => 24.00
        assert_eq!(Percent::from_percent(12).of(20_000).unwrap(), 2_400);
        // 2.5% of 1.00 => 0.03 (2.5 paise rounds up)
        assert_eq!(Percent::from_basis_points(250).of(100).unwrap(), 3);
    }

    #[test]
    fn remainder_complements() {
        let disc = Percent::from_percent(10);
        assert_eq!(disc.remainder_of(20_000).unwrap(), 18_000);
        assert_eq!(Percent::ZERO.remainder_of(777).unwrap(), 777);
    }

    #[test]
    fn round_off_is_signed_delta_to_nearest_rupee() {
        assert_eq!(round_to_rupee(12_349), (12_300, -49));
        assert_eq!(round_to_rupee(12_350), (12_400, 50));
        assert_eq!(round_to_rupee(12_400), (12_400, 0));
        // Negative totals (credit notes) round symmetrically.
        assert_eq!(round_to_rupee(-12_350), (-12_400, -50));
    }

    #[test]
    fn amount_checks_overflow() {
        assert!(amount(i64::MAX, 2).is_err());
        assert_eq!(amount(3, 150).unwrap(), 450);
    }
}
