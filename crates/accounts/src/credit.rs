use thiserror::Error;

use dualmart_core::{DomainError, Money};

use crate::account::AccountStatus;

/// Why a credit charge was refused. The account is untouched when this is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CreditError {
    #[error("account is {status}, not active")]
    InactiveAccount { status: AccountStatus },

    #[error("insufficient credit: requested {requested}, available {available}")]
    InsufficientCredit { requested: Money, available: Money },

    /// The charge would push the used-credit counter out of range.
    #[error(transparent)]
    Amount(#[from] DomainError),
}

impl CreditError {
    /// Amount missing to cover the charge (zero for non-shortfall errors).
    pub fn shortfall(&self) -> Money {
        match self {
            CreditError::InsufficientCredit {
                requested,
                available,
            } => requested.saturating_sub(*available),
            CreditError::InactiveAccount { .. } | CreditError::Amount(_) => Money::ZERO,
        }
    }
}

/// Outcome of a successful credit charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreditCharge {
    pub amount: Money,
    pub credit_used: Money,
    /// `None` when the account has no enforced limit.
    pub remaining: Option<Money>,
}
