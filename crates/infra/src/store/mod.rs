//! Transactional document store boundary.
//!
//! Every stock and credit mutation goes through a [`CommerceTx`]: a unit of
//! work opened by [`CommerceStore::begin`] that exposes the catalog, account
//! and order collections and is either committed as a whole or discarded.
//!
//! ## Semantics
//!
//! - Reads inside a transaction see that transaction's own writes.
//! - `save_*` writes with optimistic concurrency: the document's `version()`
//!   is the revision it was read at (0 = brand-new document). A stale revision
//!   surfaces as [`StoreError::Conflict`], at write time or at commit time
//!   depending on the backend.
//! - `insert_order` is guarded by a uniqueness constraint on the order number;
//!   a duplicate surfaces as [`StoreError::UniqueViolation`].
//! - Dropping a transaction without committing discards it.

pub mod in_memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use dualmart_accounts::WholesaleAccount;
use dualmart_catalog::Product;
use dualmart_core::{AccountId, ProductId};
use dualmart_orders::{Order, OrderNumber};

pub use in_memory::{InMemoryCommerceStore, InMemoryTx};
pub use postgres::{PostgresCommerceStore, PostgresTx};

/// Store operation error.
///
/// Infrastructure failures only; business rule failures never come from here.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Concurrent writers touched the same document; the transaction must be retried.
    #[error("transaction conflict: {0}")]
    Conflict(String),

    /// A uniqueness constraint rejected the write (order number already taken).
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    /// A stored document could not be decoded.
    #[error("corrupt document: {0}")]
    Corrupt(String),

    /// The backend failed (connection, pool, IO).
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

/// Catalog collection, scoped to a transaction.
#[async_trait]
pub trait CatalogStore: Send {
    async fn load_product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError>;

    async fn save_product(&mut self, product: &Product) -> Result<(), StoreError>;
}

/// Wholesale account collection, scoped to a transaction.
#[async_trait]
pub trait AccountStore: Send {
    async fn load_account(&mut self, id: AccountId) -> Result<Option<WholesaleAccount>, StoreError>;

    async fn save_account(&mut self, account: &WholesaleAccount) -> Result<(), StoreError>;
}

/// Order collection, scoped to a transaction: insert plus a uniqueness probe.
#[async_trait]
pub trait OrderStore: Send {
    async fn order_number_exists(&mut self, number: &OrderNumber) -> Result<bool, StoreError>;

    async fn insert_order(&mut self, order: &Order) -> Result<(), StoreError>;
}

/// A unit of work over all three collections.
#[async_trait]
pub trait CommerceTx: CatalogStore + AccountStore + OrderStore + Sized {
    async fn commit(self) -> Result<(), StoreError>;

    async fn rollback(self) -> Result<(), StoreError>;
}

/// Opens transactions.
#[async_trait]
pub trait CommerceStore: Send + Sync {
    type Tx: CommerceTx + 'static;

    async fn begin(&self) -> Result<Self::Tx, StoreError>;
}

#[async_trait]
impl<S> CommerceStore for Arc<S>
where
    S: CommerceStore + ?Sized,
{
    type Tx = S::Tx;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        (**self).begin().await
    }
}
