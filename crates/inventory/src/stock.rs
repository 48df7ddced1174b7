use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a stock mutation was refused. Counters are untouched when this is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StockError {
    #[error("quantity must be at least 1")]
    InvalidQuantity,

    #[error("insufficient stock for size '{size}': requested {requested}, available {available}")]
    InsufficientSizeStock {
        size: String,
        requested: u32,
        available: u32,
    },

    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { requested: u32, available: u32 },

    #[error("stock counter overflow")]
    Overflow,
}

impl StockError {
    /// Units missing to satisfy the request (0 for non-shortfall errors).
    pub fn shortfall(&self) -> u32 {
        match self {
            StockError::InsufficientSizeStock {
                requested,
                available,
                ..
            }
            | StockError::InsufficientStock {
                requested,
                available,
            } => requested.saturating_sub(*available),
            StockError::InvalidQuantity | StockError::Overflow => 0,
        }
    }
}

/// Outcome of a successful reservation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub size: Option<String>,
    pub quantity: u32,
    pub remaining_on_hand: u32,
    pub remaining_for_size: Option<u32>,
}

/// Per-size counters summing to more than the aggregate counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeDrift {
    pub sized_total: u64,
    pub on_hand: u32,
}

/// Stock held for one product.
///
/// `on_hand` is the aggregate counter. `by_size` is present only for products
/// sold in sizes. The two are maintained independently: a sized reservation
/// decrements both, and nothing keeps their totals in agreement.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StockLevel {
    on_hand: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    by_size: Option<BTreeMap<String, u32>>,
}

impl StockLevel {
    pub fn new(on_hand: u32) -> Self {
        Self {
            on_hand,
            by_size: None,
        }
    }

    pub fn with_sizes<S: Into<String>>(
        on_hand: u32,
        sizes: impl IntoIterator<Item = (S, u32)>,
    ) -> Self {
        Self {
            on_hand,
            by_size: Some(sizes.into_iter().map(|(s, q)| (s.into(), q)).collect()),
        }
    }

    pub fn on_hand(&self) -> u32 {
        self.on_hand
    }

    pub fn tracks_sizes(&self) -> bool {
        self.by_size.is_some()
    }

    /// Stock for a size; `None` when sizes are not tracked at all.
    pub fn for_size(&self, size: &str) -> Option<u32> {
        self.by_size
            .as_ref()
            .map(|m| m.get(size).copied().unwrap_or(0))
    }

    pub fn sizes(&self) -> impl Iterator<Item = (&str, u32)> {
        self.by_size
            .iter()
            .flat_map(|m| m.iter().map(|(k, v)| (k.as_str(), *v)))
    }

    /// Check that `quantity` could be reserved, without mutating anything.
    ///
    /// A size is only checked when the product tracks sizes; an unknown size on
    /// a sized product has zero stock.
    pub fn check(&self, size: Option<&str>, quantity: u32) -> Result<(), StockError> {
        if quantity == 0 {
            return Err(StockError::InvalidQuantity);
        }

        if let (Some(size), Some(_)) = (size, &self.by_size) {
            let available = self.for_size(size).unwrap_or(0);
            if available < quantity {
                return Err(StockError::InsufficientSizeStock {
                    size: size.to_string(),
                    requested: quantity,
                    available,
                });
            }
        }

        if self.on_hand < quantity {
            return Err(StockError::InsufficientStock {
                requested: quantity,
                available: self.on_hand,
            });
        }

        Ok(())
    }

    /// Decrement the size counter (if tracked) and the aggregate counter.
    ///
    /// All-or-nothing: on error neither counter has changed.
    pub fn reserve(&mut self, size: Option<&str>, quantity: u32) -> Result<Reservation, StockError> {
        self.check(size, quantity)?;

        let mut remaining_for_size = None;
        if let (Some(size), Some(by_size)) = (size, self.by_size.as_mut()) {
            let slot = by_size.entry(size.to_string()).or_insert(0);
            *slot -= quantity;
            remaining_for_size = Some(*slot);
        }
        self.on_hand -= quantity;

        Ok(Reservation {
            size: size.map(str::to_string),
            quantity,
            remaining_on_hand: self.on_hand,
            remaining_for_size,
        })
    }

    /// Add stock back (catalog management / returns). Starts size tracking if needed.
    pub fn restock(&mut self, size: Option<&str>, quantity: u32) -> Result<(), StockError> {
        if quantity == 0 {
            return Err(StockError::InvalidQuantity);
        }
        let on_hand = self
            .on_hand
            .checked_add(quantity)
            .ok_or(StockError::Overflow)?;

        if let Some(size) = size {
            let slot = self
                .by_size
                .get_or_insert_with(BTreeMap::new)
                .entry(size.to_string())
                .or_insert(0);
            *slot = slot.checked_add(quantity).ok_or(StockError::Overflow)?;
        }
        self.on_hand = on_hand;
        Ok(())
    }

    /// Report per-size totals exceeding the aggregate counter. Not enforced.
    pub fn size_drift(&self) -> Option<SizeDrift> {
        let sized_total: u64 = self.sizes().map(|(_, q)| u64::from(q)).sum();
        if self.tracks_sizes() && sized_total > u64::from(self.on_hand) {
            Some(SizeDrift {
                sized_total,
                on_hand: self.on_hand,
            })
        } else {
            None
        }
    }
}
