//! Ledger operations: the only code paths that mutate stock and credit.
//!
//! Each operation loads a document through the caller's transaction, applies
//! the pure domain mutation (which validates before touching any counter) and
//! writes the document back through the same transaction. Isolation comes
//! entirely from that transaction.

pub mod credit;
pub mod inventory;

use thiserror::Error;

use dualmart_accounts::CreditError;
use dualmart_core::{AccountId, ProductId};
use dualmart_inventory::StockError;

use crate::store::StoreError;

pub use credit::charge_credit;
pub use inventory::reserve_stock;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("product {0} not found")]
    ProductNotFound(ProductId),

    #[error("wholesale account {0} not found")]
    AccountNotFound(AccountId),

    #[error("product {product_id}: {source}")]
    Stock {
        product_id: ProductId,
        #[source]
        source: StockError,
    },

    #[error("account {account_id}: {source}")]
    Credit {
        account_id: AccountId,
        #[source]
        source: CreditError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}
