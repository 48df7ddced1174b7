//! Pricing resolver.
//!
//! `resolve_price` is the single algorithm behind both price previews and the
//! price charged at checkout:
//!
//! 1. start from the product's base price;
//! 2. an exact tier match in the product's tier price list overrides it;
//! 3. the applicable bracket with the highest `min_qty` (respecting `max_qty`)
//!    either replaces the price or takes a percentage off the step-2 price.
//!
//! Deterministic, side-effect free, never negative.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use dualmart_core::{DomainError, Money, PricingTier, ProductId};

use crate::product::{BracketAdjustment, Product};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PricingError {
    #[error("quantity must be at least 1")]
    InvalidQuantity,

    #[error(transparent)]
    Amount(#[from] DomainError),
}

/// Which rule produced a unit price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PriceSource {
    Base,
    Tier { tier: PricingTier },
    Bracket { min_qty: u32 },
}

/// A resolved price with its explanation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
    pub line_total: Money,
    pub source: PriceSource,
}

pub fn resolve_price(
    product: &Product,
    tier: Option<PricingTier>,
    quantity: u32,
) -> Result<Money, PricingError> {
    resolve(product, tier, quantity).map(|(price, _)| price)
}

pub fn quote(
    product: &Product,
    tier: Option<PricingTier>,
    quantity: u32,
) -> Result<PriceQuote, PricingError> {
    let (unit_price, source) = resolve(product, tier, quantity)?;
    Ok(PriceQuote {
        product_id: product.id_typed(),
        quantity,
        unit_price,
        line_total: unit_price.checked_times(quantity)?,
        source,
    })
}

fn resolve(
    product: &Product,
    tier: Option<PricingTier>,
    quantity: u32,
) -> Result<(Money, PriceSource), PricingError> {
    if quantity == 0 {
        return Err(PricingError::InvalidQuantity);
    }

    let (mut price, mut source) = (product.base_price(), PriceSource::Base);
    if let Some((tier, tier_price)) = tier.and_then(|t| product.tier_price(t).map(|p| (t, p))) {
        price = tier_price;
        source = PriceSource::Tier { tier };
    }

    // Highest applicable min_qty wins, whatever order the brackets were stored in.
    if let Some(bracket) = product
        .brackets()
        .iter()
        .filter(|b| b.contains(quantity))
        .max_by_key(|b| b.min_qty)
    {
        price = match bracket.adjustment {
            BracketAdjustment::FixedPrice(fixed) => fixed,
            BracketAdjustment::PercentOff(percent) => price.percent_off(percent),
        };
        source = PriceSource::Bracket {
            min_qty: bracket.min_qty,
        };
    }

    Ok((price, source))
}
