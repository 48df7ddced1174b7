use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use dualmart_catalog::{PriceQuote, Product, quote};
use dualmart_core::{AccountId, Money, OrderId, ProductId};
use dualmart_orders::{FulfillmentStatus, NewOrder, Order, OrderLine, PaymentType};

use super::error::CheckoutError;
use super::request::{
    CheckoutLine, CheckoutRequest, PricingModel, ValidatedCheckout, parse_payment_type,
    validate_lines,
};
use super::stage::CheckoutStage;
use crate::config::CheckoutConfig;
use crate::ledger;
use crate::order_number::OrderNumberGenerator;
use crate::retry::RetryPolicy;
use crate::side_effects::PostCommitEffects;
use crate::store::{AccountStore, CatalogStore, CommerceStore, CommerceTx, OrderStore};

/// A committed order and how many attempts it took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedOrder {
    pub order: Order,
    pub attempts: u32,
}

/// One priced line of a preview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewLine {
    pub name: String,
    pub size: Option<String>,
    pub quote: PriceQuote,
    /// Stock covers this line plus every earlier line for the same product.
    pub in_stock: bool,
    pub below_min_order: bool,
}

/// Advisory pricing of a cart. Nothing is reserved or charged; checkout
/// re-resolves every price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutPreview {
    pub lines: Vec<PreviewLine>,
    pub subtotal: Money,
    pub tax: Money,
    pub total: Money,
    pub payment_type: PaymentType,
    pub wholesale: bool,
    pub requires_approval: bool,
    pub available_credit: Option<Money>,
}

impl CheckoutPreview {
    /// True when checkout would pass the stock and minimum-order checks.
    pub fn is_fulfillable(&self) -> bool {
        self.lines.iter().all(|l| l.in_stock && !l.below_min_order)
    }
}

/// Amounts for an attempt, computed from server-resolved prices only.
struct Totals {
    subtotal: Money,
    tax: Money,
    total: Money,
}

/// Places orders: one store transaction per attempt, bounded retries, bounded
/// attempt lifetime, side effects after commit.
#[derive(Debug)]
pub struct CheckoutOrchestrator<S> {
    store: S,
    config: CheckoutConfig,
    retry: RetryPolicy,
    numbers: OrderNumberGenerator,
    effects: PostCommitEffects,
}

impl<S> CheckoutOrchestrator<S>
where
    S: CommerceStore,
{
    /// Orchestrator with side effects disabled.
    pub fn new(store: S, config: CheckoutConfig) -> Self {
        let retry = config.retry_policy();
        let numbers =
            OrderNumberGenerator::new(config.order_id_prefix.clone(), config.order_id_max_probes);
        Self {
            store,
            config,
            retry,
            numbers,
            effects: PostCommitEffects::disabled(),
        }
    }

    pub fn with_side_effects(mut self, effects: PostCommitEffects) -> Self {
        self.effects = effects;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &CheckoutConfig {
        &self.config
    }

    /// Validate, then run whole-transaction attempts until one commits, a
    /// non-transient error occurs, or the attempt budget is spent.
    #[instrument(
        skip_all,
        fields(lines = request.lines.len(), account_id = ?request.account_id, payment_type = %request.payment_type)
    )]
    pub async fn place_order(&self, request: &CheckoutRequest) -> Result<PlacedOrder, CheckoutError> {
        debug!(stage = %CheckoutStage::Validating, "checkout stage");
        let checkout = request.validate().map_err(|err| {
            warn!(stage = %CheckoutStage::Aborted, kind = err.kind(), error = %err, "checkout rejected");
            err
        })?;

        let timeout_ms = u64::try_from(self.config.tx_timeout.as_millis()).unwrap_or(u64::MAX);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = match tokio::time::timeout(
                self.config.tx_timeout,
                self.attempt(&checkout, attempt),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(CheckoutError::TimedOut { timeout_ms }),
            };

            match result {
                Ok(order) => {
                    info!(
                        stage = %CheckoutStage::Committed,
                        attempt,
                        order_id = %order.id_typed(),
                        order_number = %order.order_number(),
                        total = %order.total(),
                        fulfillment = ?order.fulfillment_status(),
                        "order committed"
                    );
                    drop(self.effects.spawn(&order));
                    return Ok(PlacedOrder {
                        order,
                        attempts: attempt,
                    });
                }
                Err(err) if restarts_attempt(&err) && self.retry.should_retry(attempt) => {
                    let delay = self.retry.delay_after(attempt);
                    warn!(
                        attempt,
                        kind = err.kind(),
                        error = %err,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "checkout attempt failed; retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    let err = match err {
                        CheckoutError::TransactionConflict { message, .. } => {
                            CheckoutError::TransactionConflict {
                                attempts: attempt,
                                message,
                            }
                        }
                        other => other,
                    };
                    warn!(
                        stage = %CheckoutStage::Aborted,
                        attempt,
                        kind = err.kind(),
                        error = %err,
                        "checkout aborted"
                    );
                    return Err(err);
                }
            }
        }
    }

    /// Price a cart without reserving or charging anything.
    #[instrument(skip_all, fields(lines = request.lines.len(), account_id = ?request.account_id))]
    pub async fn preview(&self, request: &CheckoutRequest) -> Result<CheckoutPreview, CheckoutError> {
        validate_lines(&request.lines)?;
        let payment_type = parse_payment_type(&request.payment_type)?;

        let mut tx = self.store.begin().await?;
        let result = self
            .price_preview(&mut tx, &request.lines, request.account_id, payment_type)
            .await;
        if let Err(err) = tx.rollback().await {
            warn!(error = %err, "preview rollback failed");
        }
        result
    }

    async fn price_preview(
        &self,
        tx: &mut S::Tx,
        lines: &[CheckoutLine],
        account_id: Option<AccountId>,
        payment_type: PaymentType,
    ) -> Result<CheckoutPreview, CheckoutError> {
        let model = pricing_model(tx, account_id).await?;

        let mut priced = Vec::with_capacity(lines.len());
        let mut demand: HashMap<ProductId, u32> = HashMap::new();
        let mut sized_demand: HashMap<(ProductId, Option<&str>), u32> = HashMap::new();
        for line in lines {
            let (product, quote) = price_line(tx, &model, line).await?;
            let total = demand.entry(line.product_id).or_default();
            *total = total.saturating_add(line.quantity);
            let sized = sized_demand
                .entry((line.product_id, line.size.as_deref()))
                .or_default();
            *sized = sized.saturating_add(line.quantity);
            let stock = product.stock();
            priced.push(PreviewLine {
                name: product.name().to_string(),
                size: line.size.clone(),
                in_stock: stock.check(line.size.as_deref(), *sized).is_ok()
                    && stock.check(None, *total).is_ok(),
                below_min_order: model.is_wholesale()
                    && product.violates_min_order(line.quantity),
                quote,
            });
        }

        let totals = self.totals(
            &model,
            payment_type,
            Money::total(priced.iter().map(|l| l.quote.line_total))?,
        )?;
        let account = model.account();
        Ok(CheckoutPreview {
            lines: priced,
            subtotal: totals.subtotal,
            tax: totals.tax,
            total: totals.total,
            payment_type,
            wholesale: model.is_wholesale(),
            requires_approval: account.is_some_and(|a| a.requires_approval(totals.total)),
            available_credit: account
                .filter(|a| a.has_credit_limit())
                .map(|a| a.available_credit()),
        })
    }

    /// One transaction: commit on success, roll back on any failure.
    async fn attempt(&self, checkout: &ValidatedCheckout, attempt: u32) -> Result<Order, CheckoutError> {
        let mut stage = CheckoutStage::Started;
        let mut tx = self.store.begin().await?;

        match self.run(&mut tx, checkout, attempt, &mut stage).await {
            Ok(order) => {
                tx.commit().await?;
                Ok(order)
            }
            Err(err) => {
                debug!(
                    attempt,
                    failed_at = %stage,
                    mutated = stage.has_mutated(),
                    kind = err.kind(),
                    "rolling back checkout attempt"
                );
                if let Err(rollback) = tx.rollback().await {
                    warn!(attempt, error = %rollback, "rollback failed");
                }
                Err(err)
            }
        }
    }

    async fn run(
        &self,
        tx: &mut S::Tx,
        checkout: &ValidatedCheckout,
        attempt: u32,
        stage: &mut CheckoutStage,
    ) -> Result<Order, CheckoutError> {
        enter(stage, CheckoutStage::Pricing, attempt);
        let model = pricing_model(tx, checkout.account_id).await?;

        let mut lines = Vec::with_capacity(checkout.lines.len());
        for line in &checkout.lines {
            let (product, quote) = price_line(tx, &model, line).await?;
            if model.is_wholesale() && product.violates_min_order(line.quantity) {
                return Err(CheckoutError::MoqViolation {
                    product_id: product.id_typed(),
                    quantity: line.quantity,
                    min_order_quantity: product.min_order_quantity(),
                });
            }
            if let Some(client_price) = line.unit_price.filter(|p| *p != quote.unit_price) {
                debug!(
                    product_id = %product.id_typed(),
                    client_price = %client_price,
                    resolved_price = %quote.unit_price,
                    "client price replaced by resolved price"
                );
            }
            lines.push(OrderLine {
                product_id: product.id_typed(),
                name: product.name().to_string(),
                unit_price: quote.unit_price,
                quantity: line.quantity,
                size: line.size.clone(),
            });
        }

        let subtotal = lines
            .iter()
            .try_fold(Money::ZERO, |acc, line| acc.checked_add(line.line_total()?))?;
        let totals = self.totals(&model, checkout.payment_type, subtotal)?;
        let total = totals.total;
        if checkout.client_total != total {
            warn!(
                client_total = %checkout.client_total,
                total = %total,
                "client total disagrees with resolved total; using resolved total"
            );
        }

        enter(stage, CheckoutStage::Reserving, attempt);
        for line in &checkout.lines {
            ledger::reserve_stock(tx, line.product_id, line.size.as_deref(), line.quantity).await?;
        }

        enter(stage, CheckoutStage::Charging, attempt);
        let charged_account = match &model {
            PricingModel::Wholesale(account) if checkout.payment_type.uses_credit() => {
                let charge = ledger::charge_credit(tx, account.id_typed(), total).await?;
                debug!(credit_used = %charge.credit_used, "credit charged");
                Some(account)
            }
            _ => None,
        };

        enter(stage, CheckoutStage::Persisting, attempt);
        let order_number = self.numbers.generate(tx).await?;
        let placed_at = Utc::now();
        let awaiting_approval = model.account().is_some_and(|a| a.requires_approval(total));
        let (fulfillment_status, note) = if awaiting_approval {
            (
                FulfillmentStatus::AwaitingApproval,
                format!("Order placed ({}); awaiting approval", checkout.payment_type.describe()),
            )
        } else {
            (
                FulfillmentStatus::Pending,
                format!("Order placed ({})", checkout.payment_type.describe()),
            )
        };

        let order = Order::place(NewOrder {
            id: OrderId::new(),
            order_number,
            lines,
            shipping: checkout.shipping.clone(),
            contact: checkout.contact.clone(),
            tax: totals.tax,
            payment_type: checkout.payment_type,
            fulfillment_status,
            account_id: model.account().map(|a| a.id_typed()),
            due_date: charged_account.map(|a| a.payment_terms().due_date(placed_at)),
            placed_at,
            note,
        })?;
        tx.insert_order(&order).await?;
        Ok(order)
    }

    /// Tax applies to wholesale orders drawn on credit only.
    fn totals(
        &self,
        model: &PricingModel,
        payment_type: PaymentType,
        subtotal: Money,
    ) -> Result<Totals, CheckoutError> {
        let tax = if model.is_wholesale() && payment_type.uses_credit() {
            subtotal.scaled(self.config.wholesale_tax_rate)?
        } else {
            Money::ZERO
        };
        Ok(Totals {
            subtotal,
            tax,
            total: subtotal.checked_add(tax)?,
        })
    }
}

fn enter(stage: &mut CheckoutStage, next: CheckoutStage, attempt: u32) {
    *stage = next;
    debug!(attempt, stage = %next, "checkout stage");
}

/// Errors after which a fresh attempt can succeed with the same request.
fn restarts_attempt(err: &CheckoutError) -> bool {
    matches!(
        err,
        CheckoutError::TransactionConflict { .. } | CheckoutError::IdentifierCollision(_)
    )
}

async fn pricing_model<T>(tx: &mut T, account_id: Option<AccountId>) -> Result<PricingModel, CheckoutError>
where
    T: AccountStore + ?Sized,
{
    let Some(id) = account_id else {
        return Ok(PricingModel::Standard);
    };
    let account = tx
        .load_account(id)
        .await?
        .ok_or(CheckoutError::AccountNotFound(id))?;
    account.ensure_active()?;
    Ok(PricingModel::Wholesale(account))
}

async fn price_line<T>(
    tx: &mut T,
    model: &PricingModel,
    line: &CheckoutLine,
) -> Result<(Product, PriceQuote), CheckoutError>
where
    T: CatalogStore + ?Sized,
{
    let product = tx
        .load_product(line.product_id)
        .await?
        .ok_or(CheckoutError::ProductNotFound(line.product_id))?;
    let quote = quote(&product, model.tier(), line.quantity)?;
    Ok((product, quote))
}
