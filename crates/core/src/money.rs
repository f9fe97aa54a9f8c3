//! Money in minor currency units.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::value_object::ValueObject;

/// Non-negative amount in the smallest currency unit (e.g. cents).
///
/// Single-currency per tenant; formatting for display is a presentation
/// concern and lives outside this crate.
#[derive(
    Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(u64);

impl ValueObject for Money {}

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_minor(units: u64) -> Self {
        Self(units)
    }

    pub const fn minor_units(self) -> u64 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Money) -> DomainResult<Money> {
        self.0
            .checked_add(other.0)
            .map(Money)
            .ok_or_else(|| DomainError::overflow("money addition"))
    }

    /// Subtraction clamped at zero. Totals are never negative.
    pub fn saturating_sub(self, other: Money) -> Money {
        Money(self.0.saturating_sub(other.0))
    }

    /// Line total: unit price × quantity. `quantity` must be positive.
    pub fn times(self, quantity: i64) -> DomainResult<Money> {
        let qty = u64::try_from(quantity)
            .map_err(|_| DomainError::validation("quantity must be non-negative"))?;
        self.0
            .checked_mul(qty)
            .map(Money)
            .ok_or_else(|| DomainError::overflow("line total"))
    }

    /// `percent`% of this amount, rounded down to the minor unit.
    pub fn percent(self, percent: u32) -> Money {
        let scaled = u128::from(self.0) * u128::from(percent) / 100;
        // percent <= 100 keeps the result within u64; larger inputs saturate.
        Money(u64::try_from(scaled).unwrap_or(u64::MAX))
    }
}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl core::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::ZERO, |acc, m| Money(acc.0.saturating_add(m.0)))
    }
}
