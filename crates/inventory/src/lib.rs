//! Inventory domain module.
//!
//! Stock counters for a product, implemented purely as deterministic domain
//! logic (no IO, no storage). Persisting a mutated counter and isolating it from
//! concurrent writers is the caller's transaction's job.

pub mod stock;

pub use stock::{Reservation, SizeDrift, StockError, StockLevel};
