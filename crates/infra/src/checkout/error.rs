use thiserror::Error;

use dualmart_accounts::{AccountStatus, CreditError};
use dualmart_catalog::PricingError;
use dualmart_core::{AccountId, DomainError, Money, ProductId};
use dualmart_inventory::StockError;

use crate::ledger::LedgerError;
use crate::order_number::OrderNumberError;
use crate::store::StoreError;

/// Why a checkout did not produce an order.
///
/// Every variant means the transaction was aborted: no stock or credit change
/// from the failed attempt survives.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CheckoutError {
    /// Malformed or missing request fields; rejected before any transaction.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("product {0} not found")]
    ProductNotFound(ProductId),

    #[error("wholesale account {0} not found")]
    AccountNotFound(AccountId),

    #[error("product {product_id}: {source}")]
    InsufficientStock {
        product_id: ProductId,
        #[source]
        source: StockError,
    },

    #[error("product {product_id}: quantity {quantity} is below the minimum order quantity {min_order_quantity}")]
    MoqViolation {
        product_id: ProductId,
        quantity: u32,
        min_order_quantity: u32,
    },

    #[error("insufficient credit: requested {requested}, available {available}")]
    InsufficientCredit { requested: Money, available: Money },

    #[error("wholesale account is {status}, not active")]
    InactiveAccount { status: AccountStatus },

    #[error("could not allocate a unique order number: {0}")]
    IdentifierCollision(String),

    #[error("transaction conflict after {attempts} attempt(s): {message}")]
    TransactionConflict { attempts: u32, message: String },

    #[error("transaction exceeded its {timeout_ms} ms lifetime")]
    TimedOut { timeout_ms: u64 },

    #[error("store error: {0}")]
    Store(String),
}

impl CheckoutError {
    /// Pure client fault: fix the request, do not retry it as-is.
    pub fn is_client_fault(&self) -> bool {
        matches!(self, CheckoutError::Validation(_))
    }

    /// Business constraint to show the end user verbatim (with its shortfall).
    pub fn is_business_rejection(&self) -> bool {
        matches!(
            self,
            CheckoutError::InsufficientStock { .. }
                | CheckoutError::InsufficientCredit { .. }
                | CheckoutError::MoqViolation { .. }
        )
    }

    /// The caller may resubmit the same request: everything except client
    /// faults and business rejections. A missing product or a suspended account
    /// can be fixed on the catalog or account side without changing the request.
    pub fn is_retryable(&self) -> bool {
        !self.is_client_fault() && !self.is_business_rejection()
    }

    /// Units of stock missing (`InsufficientStock`) or below the minimum (`MoqViolation`).
    pub fn quantity_shortfall(&self) -> Option<u32> {
        match self {
            CheckoutError::InsufficientStock { source, .. } => Some(source.shortfall()),
            CheckoutError::MoqViolation {
                quantity,
                min_order_quantity,
                ..
            } => Some(min_order_quantity.saturating_sub(*quantity)),
            _ => None,
        }
    }

    /// Amount of credit missing (`InsufficientCredit`).
    pub fn credit_shortfall(&self) -> Option<Money> {
        match self {
            CheckoutError::InsufficientCredit {
                requested,
                available,
            } => Some(requested.saturating_sub(*available)),
            _ => None,
        }
    }

    /// Kind label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            CheckoutError::Validation(_) => "validation",
            CheckoutError::ProductNotFound(_) => "product_not_found",
            CheckoutError::AccountNotFound(_) => "account_not_found",
            CheckoutError::InsufficientStock { .. } => "insufficient_stock",
            CheckoutError::MoqViolation { .. } => "moq_violation",
            CheckoutError::InsufficientCredit { .. } => "insufficient_credit",
            CheckoutError::InactiveAccount { .. } => "inactive_account",
            CheckoutError::IdentifierCollision(_) => "identifier_collision",
            CheckoutError::TransactionConflict { .. } => "transaction_conflict",
            CheckoutError::TimedOut { .. } => "timed_out",
            CheckoutError::Store(_) => "store",
        }
    }
}

impl From<StoreError> for CheckoutError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Conflict(message) => CheckoutError::TransactionConflict {
                attempts: 1,
                message,
            },
            StoreError::UniqueViolation(msg) => CheckoutError::IdentifierCollision(msg),
            StoreError::Corrupt(msg) | StoreError::Backend(msg) => CheckoutError::Store(msg),
        }
    }
}

impl From<CreditError> for CheckoutError {
    fn from(value: CreditError) -> Self {
        match value {
            CreditError::InactiveAccount { status } => CheckoutError::InactiveAccount { status },
            CreditError::InsufficientCredit {
                requested,
                available,
            } => CheckoutError::InsufficientCredit {
                requested,
                available,
            },
            CreditError::Amount(e) => e.into(),
        }
    }
}

impl From<LedgerError> for CheckoutError {
    fn from(value: LedgerError) -> Self {
        match value {
            LedgerError::ProductNotFound(id) => CheckoutError::ProductNotFound(id),
            LedgerError::AccountNotFound(id) => CheckoutError::AccountNotFound(id),
            LedgerError::Stock { product_id, source } => {
                CheckoutError::InsufficientStock { product_id, source }
            }
            LedgerError::Credit { source, .. } => source.into(),
            LedgerError::Store(e) => e.into(),
        }
    }
}

impl From<OrderNumberError> for CheckoutError {
    fn from(value: OrderNumberError) -> Self {
        match value {
            OrderNumberError::Exhausted { probes } => {
                CheckoutError::IdentifierCollision(format!("no free order number after {probes} probes"))
            }
            OrderNumberError::Store(e) => e.into(),
        }
    }
}

impl From<DomainError> for CheckoutError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => CheckoutError::Validation(msg),
            DomainError::Conflict(message) => CheckoutError::TransactionConflict {
                attempts: 1,
                message,
            },
            DomainError::NotFound(msg) | DomainError::InvariantViolation(msg) => CheckoutError::Store(msg),
        }
    }
}

impl From<PricingError> for CheckoutError {
    fn from(value: PricingError) -> Self {
        CheckoutError::Validation(value.to_string())
    }
}
