use rust_decimal::Decimal;
use thiserror::Error;

use dualmart_core::DomainError;

pub type CatalogResult<T> = Result<T, CatalogError>;

/// Rejected product pricing configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("minimum order quantity must be at least 1")]
    InvalidMinOrderQuantity,

    #[error("bracket min_qty must be at least 1")]
    InvalidBracketMin,

    #[error("bracket max_qty {max_qty} is below min_qty {min_qty}")]
    EmptyBracketRange { min_qty: u32, max_qty: u32 },

    #[error("percent discount must be within 0..=100 (got {0})")]
    DiscountOutOfRange(Decimal),

    #[error("more than one bracket starts at min_qty {0}")]
    DuplicateBracket(u32),

    #[error("bracket min_qty {next} is listed after {previous}")]
    UnsortedBrackets { previous: u32, next: u32 },
}
