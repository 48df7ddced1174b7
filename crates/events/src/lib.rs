//! Domain events and the in-process bus used to hand them to collaborators.
//!
//! Events are only published **after** the transaction that produced them has
//! committed; nothing in this crate participates in a transaction.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
