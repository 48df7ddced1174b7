//! Collision-checked order number generation.
//!
//! Candidates are probed against the order store through the caller's
//! transaction, a bounded number of times. The probe is only an optimisation:
//! the store's unique constraint on insert is the authoritative guard.

use thiserror::Error;
use tracing::{debug, instrument};

use dualmart_orders::OrderNumber;

use crate::store::{OrderStore, StoreError};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OrderNumberError {
    #[error("no free order number after {probes} probes")]
    Exhausted { probes: u32 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderNumberGenerator {
    prefix: String,
    max_probes: u32,
}

impl OrderNumberGenerator {
    /// `prefix` must already be valid (see [`OrderNumber::validate_prefix`]).
    pub fn new(prefix: impl Into<String>, max_probes: u32) -> Self {
        Self {
            prefix: prefix.into(),
            max_probes: max_probes.max(1),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    #[instrument(skip(self, tx), fields(prefix = %self.prefix), err)]
    pub async fn generate<T>(&self, tx: &mut T) -> Result<OrderNumber, OrderNumberError>
    where
        T: OrderStore + ?Sized,
    {
        for probe in 1..=self.max_probes {
            let candidate = OrderNumber::generate(&self.prefix);
            if !tx.order_number_exists(&candidate).await? {
                return Ok(candidate);
            }
            debug!(probe, candidate = %candidate, "order number already taken");
        }
        Err(OrderNumberError::Exhausted {
            probes: self.max_probes,
        })
    }
}
