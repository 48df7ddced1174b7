//! `dualmart-core`: shared domain vocabulary for the order-fulfillment core.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, money, pricing tiers, document versioning and the domain error type.

pub mod document;
pub mod entity;
pub mod error;
pub mod id;
pub mod money;
pub mod tier;
pub mod value_object;

pub use document::{Document, ExpectedVersion};
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{AccountId, OrderId, ProductId};
pub use money::Money;
pub use tier::PricingTier;
pub use value_object::ValueObject;
