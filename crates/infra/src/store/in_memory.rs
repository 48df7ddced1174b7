use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tracing::debug;

use dualmart_accounts::WholesaleAccount;
use dualmart_catalog::Product;
use dualmart_core::{AccountId, Document, Entity, ExpectedVersion, OrderId, ProductId};
use dualmart_orders::{Order, OrderNumber};

use super::{AccountStore, CatalogStore, CommerceStore, CommerceTx, OrderStore, StoreError};

#[derive(Debug, Default)]
struct State {
    products: HashMap<ProductId, Product>,
    accounts: HashMap<AccountId, WholesaleAccount>,
    orders: HashMap<OrderId, Order>,
    order_numbers: HashSet<OrderNumber>,
}

/// In-memory document store with optimistic transactions.
///
/// Intended for tests/dev. A transaction stages its writes privately and
/// validates every written document's revision at commit; the first committer
/// wins and later ones get [`StoreError::Conflict`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryCommerceStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryCommerceStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, State>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    pub fn product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        Ok(self.read()?.products.get(&id).cloned())
    }

    pub fn account(&self, id: AccountId) -> Result<Option<WholesaleAccount>, StoreError> {
        Ok(self.read()?.accounts.get(&id).cloned())
    }

    pub fn order_by_number(&self, number: &OrderNumber) -> Result<Option<Order>, StoreError> {
        Ok(self
            .read()?
            .orders
            .values()
            .find(|o| o.order_number() == number)
            .cloned())
    }

    pub fn order_count(&self) -> Result<usize, StoreError> {
        Ok(self.read()?.orders.len())
    }

    /// All stored orders, oldest placement first.
    pub fn orders(&self) -> Result<Vec<Order>, StoreError> {
        let mut orders: Vec<Order> = self.read()?.orders.values().cloned().collect();
        orders.sort_by(|a, b| {
            a.placed_at()
                .cmp(&b.placed_at())
                .then_with(|| a.order_number().cmp(b.order_number()))
        });
        Ok(orders)
    }
}

#[async_trait]
impl CommerceStore for InMemoryCommerceStore {
    type Tx = InMemoryTx;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        Ok(InMemoryTx {
            state: Arc::clone(&self.state),
            products: HashMap::new(),
            accounts: HashMap::new(),
            orders: Vec::new(),
        })
    }
}

/// A staged write plus the revision it must find at commit.
#[derive(Debug)]
struct Staged<D> {
    doc: D,
    expected: ExpectedVersion,
}

/// Transaction over [`InMemoryCommerceStore`].
#[derive(Debug)]
pub struct InMemoryTx {
    state: Arc<RwLock<State>>,
    products: HashMap<ProductId, Staged<Product>>,
    accounts: HashMap<AccountId, Staged<WholesaleAccount>>,
    orders: Vec<Order>,
}

impl InMemoryTx {
    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, State>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    /// Stage `doc`; a document already staged keeps its original expectation.
    fn stage<D: Document + Clone>(
        staged: &mut HashMap<D::Id, Staged<D>>,
        doc: &D,
    ) where
        D::Id: Copy,
    {
        let id = *doc.id();
        match staged.get_mut(&id) {
            Some(existing) => existing.doc = doc.clone(),
            None => {
                staged.insert(
                    id,
                    Staged {
                        doc: doc.clone(),
                        expected: ExpectedVersion::Exact(doc.version()),
                    },
                );
            }
        }
    }

    fn check_versions<D: Document>(
        staged: &HashMap<D::Id, Staged<D>>,
        stored: &HashMap<D::Id, D>,
    ) -> Result<(), StoreError> {
        for (id, s) in staged {
            let actual = stored.get(id).map(Document::version).unwrap_or(0);
            s.expected.check(actual).map_err(|e| {
                StoreError::Conflict(format!("{} {id:?}: {e}", D::collection()))
            })?;
        }
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for InMemoryTx {
    async fn load_product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError> {
        if let Some(staged) = self.products.get(&id) {
            return Ok(Some(staged.doc.clone()));
        }
        Ok(self.read()?.products.get(&id).cloned())
    }

    async fn save_product(&mut self, product: &Product) -> Result<(), StoreError> {
        Self::stage(&mut self.products, product);
        Ok(())
    }
}

#[async_trait]
impl AccountStore for InMemoryTx {
    async fn load_account(&mut self, id: AccountId) -> Result<Option<WholesaleAccount>, StoreError> {
        if let Some(staged) = self.accounts.get(&id) {
            return Ok(Some(staged.doc.clone()));
        }
        Ok(self.read()?.accounts.get(&id).cloned())
    }

    async fn save_account(&mut self, account: &WholesaleAccount) -> Result<(), StoreError> {
        Self::stage(&mut self.accounts, account);
        Ok(())
    }
}

#[async_trait]
impl OrderStore for InMemoryTx {
    async fn order_number_exists(&mut self, number: &OrderNumber) -> Result<bool, StoreError> {
        if self.orders.iter().any(|o| o.order_number() == number) {
            return Ok(true);
        }
        Ok(self.read()?.order_numbers.contains(number))
    }

    async fn insert_order(&mut self, order: &Order) -> Result<(), StoreError> {
        if self.orders.iter().any(|o| o.order_number() == order.order_number()) {
            return Err(StoreError::UniqueViolation(format!(
                "order_number {}",
                order.order_number()
            )));
        }
        self.orders.push(order.clone());
        Ok(())
    }
}

#[async_trait]
impl CommerceTx for InMemoryTx {
    async fn commit(self) -> Result<(), StoreError> {
        debug!(
            products = self.products.len(),
            accounts = self.accounts.len(),
            orders = self.orders.len(),
            "committing in-memory transaction"
        );
        let mut state = self
            .state
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;

        // Validate everything before applying anything.
        Self::check_versions(&self.products, &state.products)?;
        Self::check_versions(&self.accounts, &state.accounts)?;
        for order in &self.orders {
            if state.order_numbers.contains(order.order_number()) {
                return Err(StoreError::UniqueViolation(format!(
                    "order_number {}",
                    order.order_number()
                )));
            }
            if state.orders.contains_key(&order.id_typed()) {
                return Err(StoreError::UniqueViolation(format!("order id {}", order.id_typed())));
            }
        }

        for (id, mut s) in self.products {
            s.doc.set_version(s.doc.version() + 1);
            state.products.insert(id, s.doc);
        }
        for (id, mut s) in self.accounts {
            s.doc.set_version(s.doc.version() + 1);
            state.accounts.insert(id, s.doc);
        }
        for mut order in self.orders {
            order.set_version(1);
            state.order_numbers.insert(order.order_number().clone());
            state.orders.insert(order.id_typed(), order);
        }
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        Ok(())
    }
}
