use serde::{Deserialize, Serialize};

use dualmart_accounts::WholesaleAccount;
use dualmart_core::{AccountId, Money, PricingTier, ProductId};
use dualmart_orders::{ContactInfo, PaymentType, ShippingAddress};

use super::error::CheckoutError;

/// One requested line. `unit_price` is whatever the client displayed; it is
/// never charged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutLine {
    pub product_id: ProductId,
    pub quantity: u32,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub unit_price: Option<Money>,
}

impl CheckoutLine {
    pub fn new(product_id: ProductId, quantity: u32) -> Self {
        Self {
            product_id,
            quantity,
            size: None,
            unit_price: None,
        }
    }

    pub fn sized(mut self, size: impl Into<String>) -> Self {
        self.size = Some(size.into());
        self
    }

    pub fn quoted_at(mut self, unit_price: Money) -> Self {
        self.unit_price = Some(unit_price);
        self
    }
}

/// A checkout as submitted by a caller (cart + contact + payment choice).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub lines: Vec<CheckoutLine>,
    pub contact_email: String,
    #[serde(default)]
    pub contact_phone: Option<String>,
    #[serde(default)]
    pub shipping: ShippingAddress,
    pub payment_type: String,
    /// Total the client computed; required, but replaced by the server's.
    pub total_amount: Option<Money>,
    #[serde(default)]
    pub account_id: Option<AccountId>,
}

/// A request that passed validation.
#[derive(Debug, Clone)]
pub(crate) struct ValidatedCheckout {
    pub lines: Vec<CheckoutLine>,
    pub contact: ContactInfo,
    pub shipping: ShippingAddress,
    pub payment_type: PaymentType,
    pub client_total: Money,
    pub account_id: Option<AccountId>,
}

impl CheckoutRequest {
    pub(crate) fn validate(&self) -> Result<ValidatedCheckout, CheckoutError> {
        validate_lines(&self.lines)?;
        let payment_type = parse_payment_type(&self.payment_type)?;
        let contact = ContactInfo::new(self.contact_email.as_str(), self.contact_phone.clone())?;
        let client_total = self
            .total_amount
            .ok_or_else(|| CheckoutError::Validation("total amount is required".to_string()))?;
        if payment_type.uses_credit() && self.account_id.is_none() {
            return Err(CheckoutError::Validation(format!(
                "payment type '{payment_type}' requires a wholesale account"
            )));
        }

        Ok(ValidatedCheckout {
            lines: self.lines.clone(),
            contact,
            shipping: self.shipping.clone(),
            payment_type,
            client_total,
            account_id: self.account_id,
        })
    }
}

pub(crate) fn validate_lines(lines: &[CheckoutLine]) -> Result<(), CheckoutError> {
    if lines.is_empty() {
        return Err(CheckoutError::Validation(
            "order must contain at least one line".to_string(),
        ));
    }
    if let Some(line) = lines.iter().find(|l| l.quantity == 0) {
        return Err(CheckoutError::Validation(format!(
            "quantity for product {} must be at least 1",
            line.product_id
        )));
    }
    Ok(())
}

pub(crate) fn parse_payment_type(raw: &str) -> Result<PaymentType, CheckoutError> {
    raw.parse::<PaymentType>().map_err(CheckoutError::from)
}

/// How an order is priced and paid: retail, or against a wholesale account.
#[derive(Debug, Clone)]
pub enum PricingModel {
    Standard,
    Wholesale(WholesaleAccount),
}

impl PricingModel {
    pub fn tier(&self) -> Option<PricingTier> {
        match self {
            PricingModel::Standard => None,
            PricingModel::Wholesale(account) => Some(account.tier()),
        }
    }

    pub fn account(&self) -> Option<&WholesaleAccount> {
        match self {
            PricingModel::Standard => None,
            PricingModel::Wholesale(account) => Some(account),
        }
    }

    pub fn is_wholesale(&self) -> bool {
        matches!(self, PricingModel::Wholesale(_))
    }
}
