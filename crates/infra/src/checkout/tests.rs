use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use rust_decimal_macros::dec;
use serde_json::Value as JsonValue;

use dualmart_accounts::{AccountStatus, ApprovalPolicy, PaymentTerms, WholesaleAccount};
use dualmart_catalog::{PriceBracket, PriceSource, Product};
use dualmart_core::{AccountId, Money, PricingTier, ProductId};
use dualmart_events::{EventBus, EventEnvelope, InMemoryEventBus};
use dualmart_inventory::StockLevel;
use dualmart_orders::{FulfillmentStatus, Order, OrderNumber, PaymentType, ShippingAddress};

use super::*;
use crate::cache::ReadCache;
use crate::config::CheckoutConfig;
use crate::side_effects::{BusNotificationDispatcher, PostCommitEffects};
use crate::store::{
    AccountStore, CatalogStore, CommerceStore, CommerceTx, InMemoryCommerceStore, InMemoryTx,
    OrderStore, StoreError,
};

/// Knobs for [`FaultyStore`]; all off by default.
#[derive(Debug, Default)]
struct Faults {
    /// `insert_order` fails with a backend error (after stock and credit moved).
    fail_insert: AtomicBool,
    /// Next N inserts fail with a unique violation.
    duplicate_inserts: AtomicU32,
    /// Every order number probe reports "taken".
    numbers_taken: AtomicBool,
    /// Next N commits fail with a conflict.
    conflicting_commits: AtomicU32,
    /// Sleep this long on every product load.
    load_delay_ms: AtomicU64,
    begins: AtomicU32,
}

fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// In-memory store with injectable failures.
#[derive(Debug, Clone, Default)]
struct FaultyStore {
    inner: InMemoryCommerceStore,
    faults: Arc<Faults>,
}

struct FaultyTx {
    inner: InMemoryTx,
    faults: Arc<Faults>,
}

#[async_trait]
impl CommerceStore for FaultyStore {
    type Tx = FaultyTx;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        self.faults.begins.fetch_add(1, Ordering::SeqCst);
        Ok(FaultyTx {
            inner: self.inner.begin().await?,
            faults: Arc::clone(&self.faults),
        })
    }
}

#[async_trait]
impl CatalogStore for FaultyTx {
    async fn load_product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let delay = self.faults.load_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.inner.load_product(id).await
    }

    async fn save_product(&mut self, product: &Product) -> Result<(), StoreError> {
        self.inner.save_product(product).await
    }
}

#[async_trait]
impl AccountStore for FaultyTx {
    async fn load_account(&mut self, id: AccountId) -> Result<Option<WholesaleAccount>, StoreError> {
        self.inner.load_account(id).await
    }

    async fn save_account(&mut self, account: &WholesaleAccount) -> Result<(), StoreError> {
        self.inner.save_account(account).await
    }
}

#[async_trait]
impl OrderStore for FaultyTx {
    async fn order_number_exists(&mut self, number: &OrderNumber) -> Result<bool, StoreError> {
        if self.faults.numbers_taken.load(Ordering::SeqCst) {
            return Ok(true);
        }
        self.inner.order_number_exists(number).await
    }

    async fn insert_order(&mut self, order: &Order) -> Result<(), StoreError> {
        if self.faults.fail_insert.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("disk full".into()));
        }
        if take_one(&self.faults.duplicate_inserts) {
            return Err(StoreError::UniqueViolation(format!(
                "order_number {}",
                order.order_number()
            )));
        }
        self.inner.insert_order(order).await
    }
}

#[async_trait]
impl CommerceTx for FaultyTx {
    async fn commit(self) -> Result<(), StoreError> {
        if take_one(&self.faults.conflicting_commits) {
            return Err(StoreError::Conflict("serialization failure".into()));
        }
        self.inner.commit().await
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.inner.rollback().await
    }
}

fn config() -> CheckoutConfig {
    CheckoutConfig {
        retry_base_delay: Duration::from_millis(1),
        retry_max_delay: Duration::from_millis(4),
        ..CheckoutConfig::default()
    }
}

fn money(amount: rust_decimal::Decimal) -> Money {
    Money::new(amount).unwrap()
}

fn tee(price: Money, stock: u32) -> Product {
    Product::new(ProductId::new(), "Tee", price)
        .unwrap()
        .with_stock(StockLevel::new(stock))
}

fn active_account(limit: Money, used: Money) -> WholesaleAccount {
    let mut account = WholesaleAccount::register(
        AccountId::new(),
        "Acme Retail",
        PricingTier::Wholesaler,
        PaymentTerms::Net30,
        limit,
    )
    .unwrap()
    .with_credit_used(used)
    .unwrap();
    account.approve().unwrap();
    account
}

async fn seed(store: &FaultyStore, products: &[&Product], accounts: &[&WholesaleAccount]) {
    let mut tx = store.inner.begin().await.unwrap();
    for p in products {
        tx.save_product(p).await.unwrap();
    }
    for a in accounts {
        tx.save_account(a).await.unwrap();
    }
    tx.commit().await.unwrap();
}

fn retail(lines: Vec<CheckoutLine>) -> CheckoutRequest {
    CheckoutRequest {
        lines,
        contact_email: "buyer@example.com".into(),
        contact_phone: Some("+1 555 0100".into()),
        shipping: ShippingAddress {
            line1: "1 Market St".into(),
            city: "Springfield".into(),
            ..ShippingAddress::default()
        },
        payment_type: "cash-on-delivery".into(),
        total_amount: Some(Money::ZERO),
        account_id: None,
    }
}

fn wholesale(lines: Vec<CheckoutLine>, account: &WholesaleAccount, payment: &str) -> CheckoutRequest {
    CheckoutRequest {
        payment_type: payment.into(),
        account_id: Some(account.id_typed()),
        ..retail(lines)
    }
}

fn on_hand(store: &FaultyStore, id: ProductId) -> u32 {
    store.inner.product(id).unwrap().unwrap().stock().on_hand()
}

fn credit_used(store: &FaultyStore, id: AccountId) -> Money {
    store.inner.account(id).unwrap().unwrap().credit_used()
}

fn orchestrator(store: &FaultyStore) -> CheckoutOrchestrator<FaultyStore> {
    CheckoutOrchestrator::new(store.clone(), config())
}

#[tokio::test]
async fn retail_order_is_priced_server_side() {
    let store = FaultyStore::default();
    let product = tee(Money::from_units(20), 10);
    seed(&store, &[&product], &[]).await;

    let request = retail(vec![
        CheckoutLine::new(product.id_typed(), 2).quoted_at(Money::from_units(1)),
    ]);
    let placed = orchestrator(&store).place_order(&request).await.unwrap();
    let order = &placed.order;

    assert_eq!(placed.attempts, 1);
    assert_eq!(order.lines()[0].unit_price, Money::from_units(20));
    assert_eq!(order.subtotal(), Money::from_units(40));
    assert_eq!(order.tax(), Money::ZERO);
    assert_eq!(order.total(), Money::from_units(40));
    assert_eq!(order.payment_type(), PaymentType::CashOnDelivery);
    assert_eq!(order.fulfillment_status(), FulfillmentStatus::Pending);
    assert!(order.due_date().is_none());
    assert!(!order.is_wholesale());
    assert_eq!(order.order_number().prefix(), "ORD");
    assert_eq!(order.timeline().latest().note, "Order placed (cash on delivery)");

    assert_eq!(on_hand(&store, product.id_typed()), 8);
    let stored = store.inner.order_by_number(order.order_number()).unwrap().unwrap();
    assert_eq!(stored.total(), order.total());
}

#[tokio::test]
async fn wholesale_bracket_overrides_tier_and_charges_credit_with_tax() {
    let store = FaultyStore::default();
    let product = Product::new(ProductId::new(), "Runner", Money::from_units(2000))
        .unwrap()
        .with_tier_price(PricingTier::Wholesaler, Money::from_units(1600))
        .with_brackets([PriceBracket::fixed(50, None, Money::from_units(1400)).unwrap()])
        .unwrap()
        .with_stock(StockLevel::new(100));
    let account = active_account(Money::ZERO, Money::ZERO);
    seed(&store, &[&product], &[&account]).await;

    let request = wholesale(vec![CheckoutLine::new(product.id_typed(), 60)], &account, "invoice");
    let order = orchestrator(&store).place_order(&request).await.unwrap().order;

    assert_eq!(order.lines()[0].unit_price, Money::from_units(1400));
    assert_eq!(order.subtotal(), Money::from_units(84_000));
    assert_eq!(order.tax(), Money::from_units(8_400));
    assert_eq!(order.total(), Money::from_units(92_400));
    assert_eq!(order.account_id(), Some(account.id_typed()));
    assert_eq!(order.due_date(), Some(order.placed_at() + ChronoDuration::days(30)));
    assert_eq!(order.timeline().latest().note, "Order placed (invoice)");

    assert_eq!(credit_used(&store, account.id_typed()), Money::from_units(92_400));
    assert_eq!(on_hand(&store, product.id_typed()), 40);
}

#[tokio::test]
async fn line_sum_plus_tax_equals_total() {
    let store = FaultyStore::default();
    let a = tee(money(dec!(19.99)), 50);
    let b = Product::new(ProductId::new(), "Cap", money(dec!(7.45)))
        .unwrap()
        .with_brackets([PriceBracket::percent_off(10, None, dec!(15)).unwrap()])
        .unwrap()
        .with_stock(StockLevel::new(50));
    let account = active_account(Money::ZERO, Money::ZERO);
    seed(&store, &[&a, &b], &[&account]).await;

    let request = wholesale(
        vec![
            CheckoutLine::new(a.id_typed(), 3),
            CheckoutLine::new(b.id_typed(), 12),
        ],
        &account,
        "credit",
    );
    let order = orchestrator(&store).place_order(&request).await.unwrap().order;

    let line_sum = Money::total(
        order
            .lines()
            .iter()
            .map(|l| l.unit_price.checked_times(l.quantity).unwrap()),
    )
    .unwrap();
    assert_eq!(order.subtotal(), line_sum);
    assert_eq!(order.total(), line_sum.checked_add(order.tax()).unwrap());
    assert_eq!(order.tax(), line_sum.scaled(dec!(0.10)).unwrap());
}

#[tokio::test]
async fn credit_shortfall_is_reported_and_nothing_moves() {
    let store = FaultyStore::default();
    let product = tee(money(dec!(1090.91)), 10);
    let account = active_account(Money::from_units(10_000), Money::from_units(9_000));
    seed(&store, &[&product], &[&account]).await;

    let request = wholesale(vec![CheckoutLine::new(product.id_typed(), 1)], &account, "credit");
    let err = orchestrator(&store).place_order(&request).await.unwrap_err();

    assert_eq!(
        err,
        CheckoutError::InsufficientCredit {
            requested: Money::from_units(1_200),
            available: Money::from_units(1_000),
        }
    );
    assert_eq!(err.credit_shortfall(), Some(Money::from_units(200)));
    assert!(err.is_business_rejection());
    assert_eq!(on_hand(&store, product.id_typed()), 10);
    assert_eq!(credit_used(&store, account.id_typed()), Money::from_units(9_000));
    assert_eq!(store.inner.order_count().unwrap(), 0);
}

#[tokio::test]
async fn charge_equal_to_available_credit_succeeds_one_unit_over_fails() {
    let store = FaultyStore::default();
    let product = tee(Money::from_units(1_000), 10);
    let exact = active_account(Money::from_units(1_100), Money::ZERO);
    let short = active_account(Money::from_units(1_099), Money::ZERO);
    seed(&store, &[&product], &[&exact, &short]).await;
    let checkout = orchestrator(&store);

    let lines = vec![CheckoutLine::new(product.id_typed(), 1)];
    checkout
        .place_order(&wholesale(lines.clone(), &exact, "credit"))
        .await
        .unwrap();
    assert_eq!(
        store.inner.account(exact.id_typed()).unwrap().unwrap().available_credit(),
        Money::ZERO
    );

    let err = checkout
        .place_order(&wholesale(lines, &short, "credit"))
        .await
        .unwrap_err();
    assert_eq!(err.credit_shortfall(), Some(Money::from_units(1)));
}

#[tokio::test]
async fn per_size_shortfall_leaves_aggregate_untouched() {
    let store = FaultyStore::default();
    let product = Product::new(ProductId::new(), "Runner", Money::from_units(80))
        .unwrap()
        .with_stock(StockLevel::with_sizes(5, [("9", 2), ("10", 3)]));
    seed(&store, &[&product], &[]).await;

    let request = retail(vec![CheckoutLine::new(product.id_typed(), 3).sized("9")]);
    let err = orchestrator(&store).place_order(&request).await.unwrap_err();

    assert!(matches!(err, CheckoutError::InsufficientStock { product_id, .. } if product_id == product.id_typed()));
    assert_eq!(err.quantity_shortfall(), Some(1));
    let stored = store.inner.product(product.id_typed()).unwrap().unwrap();
    assert_eq!(stored.stock().on_hand(), 5);
    assert_eq!(stored.stock().for_size("9"), Some(2));
}

#[tokio::test]
async fn later_line_failure_undoes_earlier_reservations() {
    let store = FaultyStore::default();
    let plenty = tee(Money::from_units(10), 10);
    let scarce = tee(Money::from_units(10), 1);
    seed(&store, &[&plenty, &scarce], &[]).await;

    let request = retail(vec![
        CheckoutLine::new(plenty.id_typed(), 4),
        CheckoutLine::new(scarce.id_typed(), 2),
    ]);
    let err = orchestrator(&store).place_order(&request).await.unwrap_err();

    assert!(matches!(err, CheckoutError::InsufficientStock { .. }));
    assert_eq!(on_hand(&store, plenty.id_typed()), 10);
    assert_eq!(on_hand(&store, scarce.id_typed()), 1);
}

#[tokio::test]
async fn failure_after_charge_rolls_back_stock_and_credit() {
    let store = FaultyStore::default();
    let product = tee(Money::from_units(100), 10);
    let account = active_account(Money::from_units(5_000), Money::from_units(250));
    seed(&store, &[&product], &[&account]).await;
    let before_product = store.inner.product(product.id_typed()).unwrap().unwrap();
    let before_account = store.inner.account(account.id_typed()).unwrap().unwrap();
    store.faults.fail_insert.store(true, Ordering::SeqCst);

    let request = wholesale(vec![CheckoutLine::new(product.id_typed(), 3)], &account, "invoice");
    let err = orchestrator(&store).place_order(&request).await.unwrap_err();

    assert!(matches!(err, CheckoutError::Store(_)), "{err:?}");
    assert!(err.is_retryable());
    assert_eq!(store.inner.product(product.id_typed()).unwrap().unwrap(), before_product);
    assert_eq!(store.inner.account(account.id_typed()).unwrap().unwrap(), before_account);
    assert_eq!(store.inner.order_count().unwrap(), 0);
    // Backend failures are not retried by the orchestrator.
    assert_eq!(store.faults.begins.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn commit_conflicts_are_retried_then_succeed() {
    let store = FaultyStore::default();
    let product = tee(Money::from_units(10), 10);
    seed(&store, &[&product], &[]).await;
    store.faults.conflicting_commits.store(2, Ordering::SeqCst);

    let request = retail(vec![CheckoutLine::new(product.id_typed(), 1)]);
    let placed = orchestrator(&store).place_order(&request).await.unwrap();

    assert_eq!(placed.attempts, 3);
    assert_eq!(on_hand(&store, product.id_typed()), 9);
    assert_eq!(store.inner.order_count().unwrap(), 1);
}

#[tokio::test]
async fn persistent_conflict_surfaces_after_bounded_attempts() {
    let store = FaultyStore::default();
    let product = tee(Money::from_units(10), 10);
    seed(&store, &[&product], &[]).await;
    store.faults.conflicting_commits.store(100, Ordering::SeqCst);

    let request = retail(vec![CheckoutLine::new(product.id_typed(), 1)]);
    let err = orchestrator(&store).place_order(&request).await.unwrap_err();

    assert!(
        matches!(err, CheckoutError::TransactionConflict { attempts: 3, .. }),
        "{err:?}"
    );
    assert!(err.is_retryable());
    assert_eq!(store.faults.begins.load(Ordering::SeqCst), 3);
    assert_eq!(on_hand(&store, product.id_typed()), 10);
}

#[tokio::test]
async fn exhausted_order_numbers_surface_identifier_collision() {
    let store = FaultyStore::default();
    let product = tee(Money::from_units(10), 10);
    seed(&store, &[&product], &[]).await;
    store.faults.numbers_taken.store(true, Ordering::SeqCst);

    let request = retail(vec![CheckoutLine::new(product.id_typed(), 1)]);
    let err = orchestrator(&store).place_order(&request).await.unwrap_err();

    assert!(matches!(err, CheckoutError::IdentifierCollision(_)), "{err:?}");
    assert!(err.is_retryable());
    assert!(!err.is_client_fault());
    assert_eq!(store.faults.begins.load(Ordering::SeqCst), 3);
    assert_eq!(on_hand(&store, product.id_typed()), 10);
}

#[tokio::test]
async fn unique_violation_on_insert_retries_whole_attempt() {
    let store = FaultyStore::default();
    let product = tee(Money::from_units(10), 10);
    seed(&store, &[&product], &[]).await;
    store.faults.duplicate_inserts.store(1, Ordering::SeqCst);

    let request = retail(vec![CheckoutLine::new(product.id_typed(), 2)]);
    let placed = orchestrator(&store).place_order(&request).await.unwrap();

    assert_eq!(placed.attempts, 2);
    assert_eq!(on_hand(&store, product.id_typed()), 8);
}

#[tokio::test]
async fn slow_attempt_times_out_without_side_effects() {
    let store = FaultyStore::default();
    let product = tee(Money::from_units(10), 10);
    seed(&store, &[&product], &[]).await;
    store.faults.load_delay_ms.store(200, Ordering::SeqCst);

    let checkout = CheckoutOrchestrator::new(
        store.clone(),
        CheckoutConfig {
            tx_timeout: Duration::from_millis(20),
            ..config()
        },
    );
    let request = retail(vec![CheckoutLine::new(product.id_typed(), 1)]);
    let err = checkout.place_order(&request).await.unwrap_err();

    assert_eq!(err, CheckoutError::TimedOut { timeout_ms: 20 });
    assert_eq!(on_hand(&store, product.id_typed()), 10);
    assert_eq!(store.inner.order_count().unwrap(), 0);
}

#[tokio::test]
async fn wholesale_moq_rejects_before_any_mutation() {
    let store = FaultyStore::default();
    let fine = tee(Money::from_units(10), 100);
    let bulk = tee(Money::from_units(10), 100).with_min_order_quantity(12).unwrap();
    let account = active_account(Money::ZERO, Money::ZERO);
    seed(&store, &[&fine, &bulk], &[&account]).await;

    let lines = vec![
        CheckoutLine::new(fine.id_typed(), 5),
        CheckoutLine::new(bulk.id_typed(), 5),
    ];
    let err = orchestrator(&store)
        .place_order(&wholesale(lines.clone(), &account, "online"))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        CheckoutError::MoqViolation {
            product_id: bulk.id_typed(),
            quantity: 5,
            min_order_quantity: 12,
        }
    );
    assert_eq!(err.quantity_shortfall(), Some(7));
    assert_eq!(on_hand(&store, fine.id_typed()), 100);

    // Retail orders are not subject to wholesale minimums.
    orchestrator(&store).place_order(&retail(lines)).await.unwrap();
    assert_eq!(on_hand(&store, bulk.id_typed()), 95);
}

#[tokio::test]
async fn inactive_or_missing_account_is_rejected() {
    let store = FaultyStore::default();
    let product = tee(Money::from_units(10), 10);
    let pending = WholesaleAccount::register(
        AccountId::new(),
        "Pending Co",
        PricingTier::Retailer,
        PaymentTerms::Net15,
        Money::ZERO,
    )
    .unwrap();
    let mut suspended = active_account(Money::ZERO, Money::ZERO);
    suspended.suspend().unwrap();
    seed(&store, &[&product], &[&pending, &suspended]).await;
    let checkout = orchestrator(&store);
    let lines = vec![CheckoutLine::new(product.id_typed(), 1)];

    let err = checkout
        .place_order(&wholesale(lines.clone(), &pending, "online"))
        .await
        .unwrap_err();
    assert_eq!(err, CheckoutError::InactiveAccount { status: AccountStatus::Pending });

    let err = checkout
        .place_order(&wholesale(lines.clone(), &suspended, "credit"))
        .await
        .unwrap_err();
    assert_eq!(err, CheckoutError::InactiveAccount { status: AccountStatus::Suspended });

    let ghost = active_account(Money::ZERO, Money::ZERO);
    let err = checkout
        .place_order(&wholesale(lines, &ghost, "credit"))
        .await
        .unwrap_err();
    assert_eq!(err, CheckoutError::AccountNotFound(ghost.id_typed()));
    assert_eq!(on_hand(&store, product.id_typed()), 10);
}

#[tokio::test]
async fn unknown_product_aborts() {
    let store = FaultyStore::default();
    let product = tee(Money::from_units(10), 10);
    seed(&store, &[&product], &[]).await;
    let missing = ProductId::new();

    let request = retail(vec![
        CheckoutLine::new(product.id_typed(), 1),
        CheckoutLine::new(missing, 1),
    ]);
    let err = orchestrator(&store).place_order(&request).await.unwrap_err();

    assert_eq!(err, CheckoutError::ProductNotFound(missing));
    assert_eq!(on_hand(&store, product.id_typed()), 10);
}

#[tokio::test]
async fn invalid_requests_never_open_a_transaction() {
    let store = FaultyStore::default();
    let product = tee(Money::from_units(10), 10);
    seed(&store, &[&product], &[]).await;
    let checkout = orchestrator(&store);
    let line = CheckoutLine::new(product.id_typed(), 1);

    let bad = [
        retail(vec![]),
        CheckoutRequest { contact_email: "nobody".into(), ..retail(vec![line.clone()]) },
        CheckoutRequest { total_amount: None, ..retail(vec![line.clone()]) },
        CheckoutRequest { payment_type: "bitcoin".into(), ..retail(vec![line.clone()]) },
        CheckoutRequest { payment_type: "invoice".into(), ..retail(vec![line]) },
    ];
    for request in &bad {
        let err = checkout.place_order(request).await.unwrap_err();
        assert!(err.is_client_fault(), "{err:?}");
    }
    assert_eq!(store.faults.begins.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn large_wholesale_order_awaits_approval() {
    let store = FaultyStore::default();
    let product = tee(Money::from_units(100), 100);
    let account = active_account(Money::ZERO, Money::ZERO)
        .with_approval_policy(ApprovalPolicy::above(Money::from_units(1_000)));
    seed(&store, &[&product], &[&account]).await;
    let checkout = orchestrator(&store);

    let small = checkout
        .place_order(&wholesale(vec![CheckoutLine::new(product.id_typed(), 5)], &account, "online"))
        .await
        .unwrap()
        .order;
    assert_eq!(small.fulfillment_status(), FulfillmentStatus::Pending);
    assert!(small.due_date().is_none());

    let large = checkout
        .place_order(&wholesale(vec![CheckoutLine::new(product.id_typed(), 10)], &account, "invoice"))
        .await
        .unwrap()
        .order;
    assert_eq!(large.fulfillment_status(), FulfillmentStatus::AwaitingApproval);
    assert_eq!(large.total(), Money::from_units(1_100));
    assert_eq!(large.timeline().latest().note, "Order placed (invoice); awaiting approval");
}

#[tokio::test]
async fn client_total_is_replaced_by_resolved_total() {
    let store = FaultyStore::default();
    let product = tee(Money::from_units(15), 10);
    seed(&store, &[&product], &[]).await;

    let request = CheckoutRequest {
        total_amount: Some(Money::from_units(1)),
        payment_type: "online".into(),
        ..retail(vec![CheckoutLine::new(product.id_typed(), 2)])
    };
    let order = orchestrator(&store).place_order(&request).await.unwrap().order;
    assert_eq!(order.total(), Money::from_units(30));
}

async fn eventually<F: Fn() -> bool>(check: F) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}

#[tokio::test]
async fn commit_publishes_events_and_invalidates_order_cache() {
    let store = FaultyStore::default();
    let product = tee(Money::from_units(100), 100);
    let account = active_account(Money::ZERO, Money::ZERO)
        .with_approval_policy(ApprovalPolicy::above(Money::from_units(500)));
    seed(&store, &[&product], &[&account]).await;

    let bus: Arc<InMemoryEventBus<EventEnvelope<JsonValue>>> = Arc::new(InMemoryEventBus::new());
    let sub = bus.subscribe();
    let cache = Arc::new(ReadCache::new());
    cache.put("orders", "recent", serde_json::json!(["older"])).unwrap();
    let effects = PostCommitEffects::new(
        Arc::new(BusNotificationDispatcher::new(Arc::clone(&bus))),
        cache.clone(),
        "orders",
    );
    let checkout = orchestrator(&store).with_side_effects(effects);

    let order = checkout
        .place_order(&wholesale(vec![CheckoutLine::new(product.id_typed(), 6)], &account, "online"))
        .await
        .unwrap()
        .order;

    let received = std::sync::Mutex::new(Vec::new());
    assert!(
        eventually(|| {
            let mut got = received.lock().unwrap();
            while let Ok(env) = sub.try_recv() {
                got.push(env);
            }
            got.len() == 2 && cache.get("orders", "recent").unwrap().is_none()
        })
        .await
    );
    let got = received.into_inner().unwrap();
    let types: Vec<&str> = got.iter().map(|e| e.event_type()).collect();
    assert_eq!(types, vec!["orders.order.placed", "orders.order.awaiting_approval"]);
    assert!(got.iter().all(|e| e.subject_id() == *order.id_typed().as_uuid()));
}

#[tokio::test]
async fn failed_checkout_emits_nothing() {
    let store = FaultyStore::default();
    let product = tee(Money::from_units(100), 1);
    seed(&store, &[&product], &[]).await;

    let bus: Arc<InMemoryEventBus<EventEnvelope<JsonValue>>> = Arc::new(InMemoryEventBus::new());
    let sub = bus.subscribe();
    let effects = PostCommitEffects::new(
        Arc::new(BusNotificationDispatcher::new(Arc::clone(&bus))),
        Arc::new(ReadCache::new()),
        "orders",
    );
    let checkout = orchestrator(&store).with_side_effects(effects);

    let request = retail(vec![CheckoutLine::new(product.id_typed(), 2)]);
    checkout.place_order(&request).await.unwrap_err();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(sub.try_recv().is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_checkouts_conserve_stock_and_numbers() {
    let store = FaultyStore::default();
    let product = tee(Money::from_units(10), 20);
    let account = active_account(Money::from_units(150), Money::ZERO);
    seed(&store, &[&product], &[&account]).await;

    let checkout = Arc::new(
        CheckoutOrchestrator::new(
            store.clone(),
            CheckoutConfig {
                max_attempts: 100,
                ..config()
            },
        ),
    );

    let mut handles = Vec::new();
    for i in 0..40 {
        let checkout = Arc::clone(&checkout);
        let request = if i % 2 == 0 {
            wholesale(vec![CheckoutLine::new(product.id_typed(), 1)], &account, "credit")
        } else {
            retail(vec![CheckoutLine::new(product.id_typed(), 1)])
        };
        handles.push(tokio::spawn(async move { checkout.place_order(&request).await }));
    }

    let mut placed = Vec::new();
    for handle in handles {
        match handle.await.unwrap() {
            Ok(p) => placed.push(p.order),
            Err(err) => assert!(
                matches!(
                    err,
                    CheckoutError::InsufficientStock { .. }
                        | CheckoutError::InsufficientCredit { .. }
                        | CheckoutError::TransactionConflict { .. }
                ),
                "{err:?}"
            ),
        }
    }

    let sold: u32 = placed.iter().map(|o| o.lines()[0].quantity).sum();
    assert_eq!(sold + on_hand(&store, product.id_typed()), 20);
    assert_eq!(store.inner.order_count().unwrap(), placed.len());

    let charged = Money::total(
        placed
            .iter()
            .filter(|o| o.payment_type().uses_credit())
            .map(Order::total),
    )
    .unwrap();
    let used = credit_used(&store, account.id_typed());
    assert_eq!(used, charged);
    assert!(used <= Money::from_units(150));

    let numbers: HashSet<_> = placed.iter().map(|o| o.order_number().clone()).collect();
    assert_eq!(numbers.len(), placed.len());
}

#[tokio::test]
async fn preview_quotes_without_mutating() {
    let store = FaultyStore::default();
    let product = Product::new(ProductId::new(), "Runner", Money::from_units(2000))
        .unwrap()
        .with_tier_price(PricingTier::Wholesaler, Money::from_units(1600))
        .with_brackets([PriceBracket::fixed(50, None, Money::from_units(1400)).unwrap()])
        .unwrap()
        .with_min_order_quantity(10)
        .unwrap()
        .with_stock(StockLevel::new(55));
    let account = active_account(Money::from_units(100_000), Money::ZERO)
        .with_approval_policy(ApprovalPolicy::above(Money::from_units(50_000)));
    seed(&store, &[&product], &[&account]).await;
    let checkout = orchestrator(&store);

    let preview = checkout
        .preview(&wholesale(vec![CheckoutLine::new(product.id_typed(), 60)], &account, "credit"))
        .await
        .unwrap();
    let line = &preview.lines[0];
    assert_eq!(line.quote.unit_price, Money::from_units(1400));
    assert_eq!(line.quote.source, PriceSource::Bracket { min_qty: 50 });
    assert!(!line.in_stock);
    assert!(!line.below_min_order);
    assert_eq!(preview.subtotal, Money::from_units(84_000));
    assert_eq!(preview.tax, Money::from_units(8_400));
    assert_eq!(preview.total, Money::from_units(92_400));
    assert!(preview.wholesale);
    assert!(preview.requires_approval);
    assert_eq!(preview.available_credit, Some(Money::from_units(100_000)));
    assert!(!preview.is_fulfillable());

    let preview = checkout
        .preview(&wholesale(vec![CheckoutLine::new(product.id_typed(), 5)], &account, "online"))
        .await
        .unwrap();
    assert_eq!(preview.lines[0].quote.source, PriceSource::Tier { tier: PricingTier::Wholesaler });
    assert!(preview.lines[0].below_min_order);
    assert_eq!(preview.tax, Money::ZERO);

    assert_eq!(on_hand(&store, product.id_typed()), 55);
    assert_eq!(store.inner.order_count().unwrap(), 0);
}

#[tokio::test]
async fn preview_counts_repeated_product_lines_against_stock() {
    let store = FaultyStore::default();
    let product = Product::new(ProductId::new(), "Runner", Money::from_units(20))
        .unwrap()
        .with_stock(StockLevel::with_sizes(5, [("9", 3), ("10", 2)]));
    seed(&store, &[&product], &[]).await;
    let checkout = orchestrator(&store);

    let preview = checkout
        .preview(&retail(vec![
            CheckoutLine::new(product.id_typed(), 2).sized("9"),
            CheckoutLine::new(product.id_typed(), 2).sized("9"),
        ]))
        .await
        .unwrap();
    assert!(preview.lines[0].in_stock);
    assert!(!preview.lines[1].in_stock);
    assert!(!preview.is_fulfillable());

    // Each size fits on its own; together they exceed the aggregate counter.
    let preview = checkout
        .preview(&retail(vec![
            CheckoutLine::new(product.id_typed(), 3).sized("9"),
            CheckoutLine::new(product.id_typed(), 3),
        ]))
        .await
        .unwrap();
    assert!(preview.lines[0].in_stock);
    assert!(!preview.lines[1].in_stock);

    let preview = checkout
        .preview(&retail(vec![
            CheckoutLine::new(product.id_typed(), 3).sized("9"),
            CheckoutLine::new(product.id_typed(), 2).sized("10"),
        ]))
        .await
        .unwrap();
    assert!(preview.is_fulfillable());

    let err = checkout
        .place_order(&retail(vec![
            CheckoutLine::new(product.id_typed(), 2).sized("9"),
            CheckoutLine::new(product.id_typed(), 2).sized("9"),
        ]))
        .await
        .unwrap_err();
    assert!(matches!(err, CheckoutError::InsufficientStock { .. }));
    assert_eq!(on_hand(&store, product.id_typed()), 5);
}
