//! Postgres-backed document store.
//!
//! Documents are JSONB rows with a separate `version` column. Reads inside a
//! transaction take row locks (`SELECT ... FOR UPDATE`), so concurrent
//! checkouts touching the same product or account serialize on the row.
//! Writes are guarded by the version column as a second line of defence.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database (unique violation) | `23505` | `UniqueViolation` | Order number already taken |
//! | Database (serialization failure) | `40001` | `Conflict` | Concurrent transaction won |
//! | Database (deadlock detected) | `40P01` | `Conflict` | Lock cycle between checkouts |
//! | Database (other) | Any other | `Backend` | Other database errors |
//! | PoolClosed / PoolTimedOut | N/A | `Backend` | Connection pool unavailable |
//! | Other | N/A | `Backend` | Network errors, connection failures, etc. |

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{debug, instrument};
use uuid::Uuid;

use dualmart_accounts::WholesaleAccount;
use dualmart_catalog::Product;
use dualmart_core::{AccountId, Document, ProductId};
use dualmart_orders::{Order, OrderNumber};

use super::{AccountStore, CatalogStore, CommerceStore, CommerceTx, OrderStore, StoreError};
use crate::config::{CheckoutConfig, ENV_DATABASE_URL};

/// DDL for the three collections. Idempotent.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS products (
    id UUID PRIMARY KEY,
    version BIGINT NOT NULL CHECK (version > 0),
    doc JSONB NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS wholesale_accounts (
    id UUID PRIMARY KEY,
    version BIGINT NOT NULL CHECK (version > 0),
    doc JSONB NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS orders (
    id UUID PRIMARY KEY,
    order_number TEXT NOT NULL,
    account_id UUID NULL,
    version BIGINT NOT NULL CHECK (version > 0),
    doc JSONB NOT NULL,
    placed_at TIMESTAMPTZ NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS orders_order_number_key ON orders (order_number);
CREATE INDEX IF NOT EXISTS orders_account_id_idx ON orders (account_id);
"#;

/// Postgres-backed [`CommerceStore`].
#[derive(Debug, Clone)]
pub struct PostgresCommerceStore {
    pool: Arc<PgPool>,
}

impl PostgresCommerceStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Connect to the configured `DATABASE_URL`.
    pub async fn connect_configured(config: &CheckoutConfig) -> Result<Self, StoreError> {
        let url = config
            .database_url
            .as_deref()
            .ok_or_else(|| StoreError::Backend(format!("{ENV_DATABASE_URL} is not set")))?;
        Self::connect(url).await
    }

    /// Create tables and indexes if missing.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }

    /// Committed order by number (read path, outside any transaction).
    #[instrument(skip(self), fields(order_number = %number), err)]
    pub async fn order_by_number(&self, number: &OrderNumber) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query("SELECT doc, version FROM orders WHERE order_number = $1")
            .bind(number.as_str())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("order_by_number", e))?;
        row.map(|r| decode_row::<Order>(&r)).transpose()
    }
}

#[async_trait]
impl CommerceStore for PostgresCommerceStore {
    type Tx = PostgresTx;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        Ok(PostgresTx { tx })
    }
}

/// Transaction over [`PostgresCommerceStore`]. Rolled back on drop unless committed.
pub struct PostgresTx {
    tx: Transaction<'static, Postgres>,
}

impl core::fmt::Debug for PostgresTx {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PostgresTx").finish_non_exhaustive()
    }
}

impl PostgresTx {
    async fn load_locked<D>(&mut self, table: &'static str, id: Uuid) -> Result<Option<D>, StoreError>
    where
        D: Document + DeserializeOwned,
    {
        let sql = format!("SELECT doc, version FROM {table} WHERE id = $1 FOR UPDATE");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("load_document", e))?;
        row.map(|r| decode_row::<D>(&r)).transpose()
    }

    /// Insert (revision 0) or compare-and-swap update (revision n → n+1).
    async fn save_versioned<D>(&mut self, table: &'static str, id: Uuid, doc: &D) -> Result<(), StoreError>
    where
        D: Document + Serialize,
    {
        let payload = encode(doc)?;
        let expected = doc.version() as i64;

        let affected = if expected == 0 {
            let sql = format!("INSERT INTO {table} (id, version, doc) VALUES ($1, 1, $2)");
            sqlx::query(&sql)
                .bind(id)
                .bind(&payload)
                .execute(&mut *self.tx)
                .await
                .map_err(|e| match map_sqlx_error("insert_document", e) {
                    // A concurrent insert of the same document is a conflict, not a business duplicate.
                    StoreError::UniqueViolation(msg) => StoreError::Conflict(msg),
                    other => other,
                })?
                .rows_affected()
        } else {
            let sql = format!(
                "UPDATE {table} SET doc = $2, version = version + 1, updated_at = NOW() \
                 WHERE id = $1 AND version = $3"
            );
            sqlx::query(&sql)
                .bind(id)
                .bind(&payload)
                .bind(expected)
                .execute(&mut *self.tx)
                .await
                .map_err(|e| map_sqlx_error("update_document", e))?
                .rows_affected()
        };

        if affected == 0 {
            return Err(StoreError::Conflict(format!(
                "{} {id}: expected revision {expected} not found",
                D::collection()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for PostgresTx {
    #[instrument(skip(self), fields(product_id = %id), err)]
    async fn load_product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError> {
        self.load_locked("products", *id.as_uuid()).await
    }

    #[instrument(skip(self, product), fields(product_id = %product.id_typed()), err)]
    async fn save_product(&mut self, product: &Product) -> Result<(), StoreError> {
        self.save_versioned("products", *product.id_typed().as_uuid(), product)
            .await
    }
}

#[async_trait]
impl AccountStore for PostgresTx {
    #[instrument(skip(self), fields(account_id = %id), err)]
    async fn load_account(&mut self, id: AccountId) -> Result<Option<WholesaleAccount>, StoreError> {
        self.load_locked("wholesale_accounts", *id.as_uuid()).await
    }

    #[instrument(skip(self, account), fields(account_id = %account.id_typed()), err)]
    async fn save_account(&mut self, account: &WholesaleAccount) -> Result<(), StoreError> {
        self.save_versioned("wholesale_accounts", *account.id_typed().as_uuid(), account)
            .await
    }
}

#[async_trait]
impl OrderStore for PostgresTx {
    async fn order_number_exists(&mut self, number: &OrderNumber) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT EXISTS (SELECT 1 FROM orders WHERE order_number = $1) AS taken")
            .bind(number.as_str())
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("order_number_exists", e))?;
        row.try_get::<bool, _>("taken")
            .map_err(|e| StoreError::Corrupt(format!("order_number_exists: {e}")))
    }

    #[instrument(skip(self, order), fields(order_number = %order.order_number()), err)]
    async fn insert_order(&mut self, order: &Order) -> Result<(), StoreError> {
        let payload = encode(order)?;
        sqlx::query(
            r#"
            INSERT INTO orders (id, order_number, account_id, version, doc, placed_at)
            VALUES ($1, $2, $3, 1, $4, $5)
            "#,
        )
        .bind(order.id_typed().as_uuid())
        .bind(order.order_number().as_str())
        .bind(order.account_id().map(|a| *a.as_uuid()))
        .bind(&payload)
        .bind(order.placed_at())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_order", e))?;
        Ok(())
    }
}

#[async_trait]
impl CommerceTx for PostgresTx {
    async fn commit(self) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        debug!("postgres transaction committed");
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

fn encode<D: Serialize>(doc: &D) -> Result<JsonValue, StoreError> {
    serde_json::to_value(doc).map_err(|e| StoreError::Corrupt(format!("failed to encode document: {e}")))
}

fn decode_row<D>(row: &sqlx::postgres::PgRow) -> Result<D, StoreError>
where
    D: Document + DeserializeOwned,
{
    let doc: JsonValue = row
        .try_get("doc")
        .map_err(|e| StoreError::Corrupt(format!("{}: missing doc column: {e}", D::collection())))?;
    let version: i64 = row
        .try_get("version")
        .map_err(|e| StoreError::Corrupt(format!("{}: missing version column: {e}", D::collection())))?;
    let mut decoded: D = serde_json::from_value(doc)
        .map_err(|e| StoreError::Corrupt(format!("{}: {e}", D::collection())))?;
    decoded.set_version(version as u64);
    Ok(decoded)
}

/// Map a SQLSTATE to the store error it stands for.
pub(crate) fn classify_sqlstate(code: &str, msg: String) -> StoreError {
    match code {
        "23505" => StoreError::UniqueViolation(msg),
        "40001" | "40P01" => StoreError::Conflict(msg),
        _ => StoreError::Backend(msg),
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code() {
                Some(code) => classify_sqlstate(code.as_ref(), msg),
                None => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {operation}"))
        }
        sqlx::Error::PoolTimedOut => {
            StoreError::Backend(format!("connection pool timed out in {operation}"))
        }
        _ => StoreError::Backend(format!("sqlx error in {operation}: {err}")),
    }
}
