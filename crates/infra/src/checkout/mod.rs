//! Order transaction orchestrator.
//!
//! One checkout attempt is one store transaction:
//!
//! ```text
//! Started → Validating → Pricing → Reserving → Charging → Persisting → Committed
//!                 └──────────┴──────────┴───────────┴───────────┴────→ Aborted
//! ```
//!
//! Validation happens before the transaction opens. Pricing re-resolves every
//! line server-side and checks wholesale minimum order quantities before any
//! ledger mutation. All stock is reserved before credit is charged. The order
//! number is allocated and the order inserted inside the same transaction.
//! Conflicts and order-number collisions retry the whole attempt a bounded
//! number of times; each attempt has a bounded lifetime. Notifications and
//! cache invalidation run only after commit.

pub mod error;
pub mod orchestrator;
pub mod request;
pub mod stage;

#[cfg(test)]
mod tests;

pub use error::CheckoutError;
pub use orchestrator::{CheckoutOrchestrator, CheckoutPreview, PlacedOrder, PreviewLine};
pub use request::{CheckoutLine, CheckoutRequest, PricingModel};
pub use stage::CheckoutStage;
