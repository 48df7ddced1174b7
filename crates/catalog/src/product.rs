use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use dualmart_core::{Document, DomainError, Entity, Money, PricingTier, ProductId};
use dualmart_inventory::{Reservation, SizeDrift, StockError, StockLevel};

use crate::error::{CatalogError, CatalogResult};

/// What a matching quantity bracket does to the unit price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum BracketAdjustment {
    /// Replace the unit price outright.
    FixedPrice(Money),
    /// Take a percentage (0..=100) off the tier-or-base price.
    PercentOff(Decimal),
}

/// A quantity bracket: `min_qty ..= max_qty` (open-ended when `max_qty` is `None`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBracket {
    pub min_qty: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_qty: Option<u32>,
    pub adjustment: BracketAdjustment,
}

impl PriceBracket {
    pub fn fixed(min_qty: u32, max_qty: Option<u32>, price: Money) -> CatalogResult<Self> {
        let bracket = Self {
            min_qty,
            max_qty,
            adjustment: BracketAdjustment::FixedPrice(price),
        };
        bracket.validate()?;
        Ok(bracket)
    }

    pub fn percent_off(min_qty: u32, max_qty: Option<u32>, percent: Decimal) -> CatalogResult<Self> {
        let bracket = Self {
            min_qty,
            max_qty,
            adjustment: BracketAdjustment::PercentOff(percent),
        };
        bracket.validate()?;
        Ok(bracket)
    }

    pub fn contains(&self, quantity: u32) -> bool {
        quantity >= self.min_qty && self.max_qty.is_none_or(|max| quantity <= max)
    }

    pub fn validate(&self) -> CatalogResult<()> {
        if self.min_qty == 0 {
            return Err(CatalogError::InvalidBracketMin);
        }
        if let Some(max_qty) = self.max_qty {
            if max_qty < self.min_qty {
                return Err(CatalogError::EmptyBracketRange {
                    min_qty: self.min_qty,
                    max_qty,
                });
            }
        }
        if let BracketAdjustment::PercentOff(percent) = self.adjustment {
            if percent < Decimal::ZERO || percent > Decimal::ONE_HUNDRED {
                return Err(CatalogError::DiscountOutOfRange(percent));
            }
        }
        Ok(())
    }
}

/// Catalog document: pricing configuration plus stock counters.
///
/// Brackets are kept sorted by ascending `min_qty`. Only stock is mutated by
/// checkout; everything else belongs to catalog management.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    id: ProductId,
    name: String,
    base_price: Money,
    #[serde(default)]
    tier_prices: BTreeMap<PricingTier, Money>,
    #[serde(default)]
    brackets: Vec<PriceBracket>,
    min_order_quantity: u32,
    stock: StockLevel,
    #[serde(default)]
    version: u64,
}

impl Product {
    pub fn new(id: ProductId, name: impl Into<String>, base_price: Money) -> CatalogResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("product name cannot be empty").into());
        }
        Ok(Self {
            id,
            name,
            base_price,
            tier_prices: BTreeMap::new(),
            brackets: Vec::new(),
            min_order_quantity: 1,
            stock: StockLevel::default(),
            version: 0,
        })
    }

    pub fn with_tier_price(mut self, tier: PricingTier, price: Money) -> Self {
        self.tier_prices.insert(tier, price);
        self
    }

    pub fn with_brackets(mut self, brackets: impl IntoIterator<Item = PriceBracket>) -> CatalogResult<Self> {
        let mut brackets: Vec<PriceBracket> = brackets.into_iter().collect();
        brackets.sort_by_key(|b| b.min_qty);
        validate_brackets(&brackets)?;
        self.brackets = brackets;
        Ok(self)
    }

    pub fn with_min_order_quantity(mut self, moq: u32) -> CatalogResult<Self> {
        if moq == 0 {
            return Err(CatalogError::InvalidMinOrderQuantity);
        }
        self.min_order_quantity = moq;
        Ok(self)
    }

    pub fn with_stock(mut self, stock: StockLevel) -> Self {
        self.stock = stock;
        self
    }

    pub fn id_typed(&self) -> ProductId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_price(&self) -> Money {
        self.base_price
    }

    pub fn tier_price(&self, tier: PricingTier) -> Option<Money> {
        self.tier_prices.get(&tier).copied()
    }

    /// Brackets in ascending `min_qty` order.
    pub fn brackets(&self) -> &[PriceBracket] {
        &self.brackets
    }

    pub fn min_order_quantity(&self) -> u32 {
        self.min_order_quantity
    }

    /// True when `quantity` is below an enforced (`> 1`) minimum.
    pub fn violates_min_order(&self, quantity: u32) -> bool {
        self.min_order_quantity > 1 && quantity < self.min_order_quantity
    }

    pub fn stock(&self) -> &StockLevel {
        &self.stock
    }

    pub fn reserve(&mut self, size: Option<&str>, quantity: u32) -> Result<Reservation, StockError> {
        self.stock.reserve(size, quantity)
    }

    pub fn restock(&mut self, size: Option<&str>, quantity: u32) -> Result<(), StockError> {
        self.stock.restock(size, quantity)
    }

    /// Per-size stock summing above the aggregate counter, if any.
    pub fn size_stock_drift(&self) -> Option<SizeDrift> {
        self.stock.size_drift()
    }

    /// Re-check invariants on a document that did not come through the builders
    /// (e.g. deserialized from a store).
    pub fn validate(&self) -> CatalogResult<()> {
        if self.min_order_quantity == 0 {
            return Err(CatalogError::InvalidMinOrderQuantity);
        }
        validate_brackets(&self.brackets)
    }
}

fn validate_brackets(sorted: &[PriceBracket]) -> CatalogResult<()> {
    for bracket in sorted {
        bracket.validate()?;
    }
    for pair in sorted.windows(2) {
        if pair[0].min_qty == pair[1].min_qty {
            return Err(CatalogError::DuplicateBracket(pair[0].min_qty));
        }
        if pair[0].min_qty > pair[1].min_qty {
            return Err(CatalogError::UnsortedBrackets {
                previous: pair[0].min_qty,
                next: pair[1].min_qty,
            });
        }
    }
    Ok(())
}

impl Entity for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Document for Product {
    fn collection() -> &'static str {
        "catalog.product"
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn set_version(&mut self, version: u64) {
        self.version = version;
    }
}
