use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use dualmart_core::{
    AccountId, Document, DomainError, DomainResult, Entity, Money, OrderId, ProductId,
};

use crate::number::OrderNumber;
use crate::timeline::{StatusTimeline, TimelineEntry};

/// Closed set of payment types accepted at checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    CashOnDelivery,
    Online,
    Credit,
    Invoice,
}

impl PaymentType {
    pub const ALL: [PaymentType; 4] = [
        PaymentType::CashOnDelivery,
        PaymentType::Online,
        PaymentType::Credit,
        PaymentType::Invoice,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentType::CashOnDelivery => "cash_on_delivery",
            PaymentType::Online => "online",
            PaymentType::Credit => "credit",
            PaymentType::Invoice => "invoice",
        }
    }

    /// Credit and invoice orders draw on the account's credit line.
    pub fn uses_credit(&self) -> bool {
        matches!(self, PaymentType::Credit | PaymentType::Invoice)
    }

    pub fn describe(&self) -> &'static str {
        match self {
            PaymentType::CashOnDelivery => "cash on delivery",
            PaymentType::Online => "online payment",
            PaymentType::Credit => "credit account",
            PaymentType::Invoice => "invoice",
        }
    }
}

impl core::fmt::Display for PaymentType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for PaymentType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "cash_on_delivery" | "cod" => Ok(PaymentType::CashOnDelivery),
            "online" => Ok(PaymentType::Online),
            "credit" => Ok(PaymentType::Credit),
            "invoice" => Ok(PaymentType::Invoice),
            _ => Err(DomainError::validation(format!("unknown payment type '{s}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Failed,
    Refunded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentStatus {
    #[default]
    Pending,
    AwaitingApproval,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

/// One line as persisted: the price is the resolved unit price, never the
/// client's.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub name: String,
    pub unit_price: Money,
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
}

impl OrderLine {
    pub fn line_total(&self) -> DomainResult<Money> {
        self.unit_price.checked_times(self.quantity)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub recipient: String,
    pub line1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line2: Option<String>,
    pub city: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    pub postal_code: String,
    pub country: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    phone: Option<String>,
}

impl ContactInfo {
    pub fn new(email: impl Into<String>, phone: Option<String>) -> DomainResult<Self> {
        let email = email.into().trim().to_string();
        if !is_plausible_email(&email) {
            return Err(DomainError::validation(format!("invalid contact email '{email}'")));
        }
        let phone = phone.map(|p| p.trim().to_string()).filter(|p| !p.is_empty());
        Ok(Self { email, phone })
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn phone(&self) -> Option<&str> {
        self.phone.as_deref()
    }
}

fn is_plausible_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace)
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty() && !tld.ends_with('.'))
}

/// Everything checkout decided, ready to become an [`Order`].
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub id: OrderId,
    pub order_number: OrderNumber,
    pub lines: Vec<OrderLine>,
    pub shipping: ShippingAddress,
    pub contact: ContactInfo,
    pub tax: Money,
    pub payment_type: PaymentType,
    pub fulfillment_status: FulfillmentStatus,
    pub account_id: Option<AccountId>,
    pub due_date: Option<DateTime<Utc>>,
    pub placed_at: DateTime<Utc>,
    pub note: String,
}

/// Persisted order document.
///
/// `total == subtotal + tax` and `subtotal == Σ unit_price × quantity` hold for
/// every order built by [`Order::place`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    order_number: OrderNumber,
    lines: Vec<OrderLine>,
    shipping: ShippingAddress,
    contact: ContactInfo,
    subtotal: Money,
    tax: Money,
    total: Money,
    payment_type: PaymentType,
    payment_status: PaymentStatus,
    fulfillment_status: FulfillmentStatus,
    timeline: StatusTimeline,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    account_id: Option<AccountId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    due_date: Option<DateTime<Utc>>,
    placed_at: DateTime<Utc>,
    #[serde(default)]
    version: u64,
}

impl Order {
    pub fn place(new: NewOrder) -> DomainResult<Self> {
        if new.lines.is_empty() {
            return Err(DomainError::validation("order must contain at least one line"));
        }
        if let Some(line) = new.lines.iter().find(|l| l.quantity == 0) {
            return Err(DomainError::validation(format!(
                "line for product {} has zero quantity",
                line.product_id
            )));
        }
        if new.due_date.is_some_and(|due| due < new.placed_at) {
            return Err(DomainError::invariant("due date precedes placement"));
        }

        let subtotal = new
            .lines
            .iter()
            .try_fold(Money::ZERO, |acc, line| acc.checked_add(line.line_total()?))?;
        let total = subtotal.checked_add(new.tax)?;
        let timeline = StatusTimeline::start(TimelineEntry::new(
            new.fulfillment_status,
            new.placed_at,
            new.note,
        ));

        Ok(Self {
            id: new.id,
            order_number: new.order_number,
            lines: new.lines,
            shipping: new.shipping,
            contact: new.contact,
            subtotal,
            tax: new.tax,
            total,
            payment_type: new.payment_type,
            payment_status: PaymentStatus::Pending,
            fulfillment_status: new.fulfillment_status,
            timeline,
            account_id: new.account_id,
            due_date: new.due_date,
            placed_at: new.placed_at,
            version: 0,
        })
    }

    pub fn id_typed(&self) -> OrderId {
        self.id
    }

    pub fn order_number(&self) -> &OrderNumber {
        &self.order_number
    }

    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    pub fn shipping(&self) -> &ShippingAddress {
        &self.shipping
    }

    pub fn contact(&self) -> &ContactInfo {
        &self.contact
    }

    pub fn subtotal(&self) -> Money {
        self.subtotal
    }

    pub fn tax(&self) -> Money {
        self.tax
    }

    pub fn total(&self) -> Money {
        self.total
    }

    pub fn payment_type(&self) -> PaymentType {
        self.payment_type
    }

    pub fn payment_status(&self) -> PaymentStatus {
        self.payment_status
    }

    pub fn fulfillment_status(&self) -> FulfillmentStatus {
        self.fulfillment_status
    }

    pub fn timeline(&self) -> &StatusTimeline {
        &self.timeline
    }

    pub fn account_id(&self) -> Option<AccountId> {
        self.account_id
    }

    pub fn due_date(&self) -> Option<DateTime<Utc>> {
        self.due_date
    }

    pub fn placed_at(&self) -> DateTime<Utc> {
        self.placed_at
    }

    pub fn is_wholesale(&self) -> bool {
        self.account_id.is_some()
    }
}

impl Entity for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Document for Order {
    fn collection() -> &'static str {
        "orders.order"
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn set_version(&mut self, version: u64) {
        self.version = version;
    }
}
