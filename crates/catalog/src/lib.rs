//! Catalog domain module.
//!
//! Products with their pricing configuration (tier price list, quantity
//! brackets, minimum order quantity) and stock, plus the pricing resolver that
//! turns a product, an optional account tier and a quantity into a unit price.
//! Pure domain logic: no IO, no storage.

pub mod error;
pub mod pricing;
pub mod product;

pub use error::{CatalogError, CatalogResult};
pub use pricing::{PriceQuote, PriceSource, PricingError, quote, resolve_price};
pub use product::{BracketAdjustment, PriceBracket, Product};
