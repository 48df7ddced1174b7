//! Non-negative monetary amounts.
//!
//! Amounts are exact decimals (`rust_decimal`). Computed prices are rounded to
//! two decimal places, half away from zero. Single-currency only.

use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::value_object::ValueObject;

/// Scale used for computed (derived) amounts.
pub const MONEY_DECIMAL_PLACES: u32 = 2;

/// A monetary amount that can never be negative.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    pub fn new(amount: Decimal) -> DomainResult<Self> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(DomainError::validation(format!(
                "monetary amount cannot be negative (got {amount})"
            )));
        }
        Ok(Self(amount))
    }

    /// Build from an integer number of whole currency units.
    pub fn from_units(units: u64) -> Self {
        Self(Decimal::from(units))
    }

    pub fn amount(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// `self × quantity`, exact. Fails instead of overflowing.
    pub fn checked_times(&self, quantity: u32) -> DomainResult<Money> {
        self.0
            .checked_mul(Decimal::from(quantity))
            .map(Money)
            .ok_or_else(|| overflow(format!("{self} x {quantity}")))
    }

    pub fn checked_add(self, rhs: Money) -> DomainResult<Money> {
        self.0
            .checked_add(rhs.0)
            .map(Money)
            .ok_or_else(|| overflow(format!("{self} + {rhs}")))
    }

    /// Sum of `amounts`; zero when empty.
    pub fn total(amounts: impl IntoIterator<Item = Money>) -> DomainResult<Money> {
        amounts
            .into_iter()
            .try_fold(Money::ZERO, |acc, amount| acc.checked_add(amount))
    }

    /// `self − other`, floored at zero.
    pub fn saturating_sub(&self, other: Money) -> Money {
        if other.0 >= self.0 {
            Money::ZERO
        } else {
            Money(self.0 - other.0)
        }
    }

    /// Apply a percentage discount (`percent` in `[0, 100]`), rounded.
    pub fn percent_off(&self, percent: Decimal) -> Money {
        let factor = Decimal::ONE - percent / Decimal::ONE_HUNDRED;
        Money((self.0 * factor).max(Decimal::ZERO)).rounded()
    }

    /// Multiply by a non-negative factor (e.g. `0.10` for tax), rounded.
    pub fn scaled(&self, factor: Decimal) -> DomainResult<Money> {
        self.0
            .checked_mul(factor)
            .map(|amount| Money(amount.max(Decimal::ZERO)).rounded())
            .ok_or_else(|| overflow(format!("{self} x {factor}")))
    }

    pub fn rounded(&self) -> Money {
        Money(
            self.0
                .round_dp_with_strategy(MONEY_DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero),
        )
    }
}

impl ValueObject for Money {}

fn overflow(expr: String) -> DomainError {
    DomainError::validation(format!("monetary amount out of range: {expr}"))
}

impl TryFrom<Decimal> for Money {
    type Error = DomainError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Money::new(value)
    }
}

impl From<Money> for Decimal {
    fn from(value: Money) -> Self {
        value.0
    }
}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}
