//! Orders domain module.
//!
//! The persisted order document produced by checkout: lines with resolved
//! prices, contact and shipping snapshots, payment/fulfillment status, the
//! append-only status timeline and the human-readable order number.
//! Pure domain logic (no IO, no storage).

pub mod event;
pub mod number;
pub mod order;
pub mod timeline;

pub use event::{OrderAwaitingApproval, OrderEvent, OrderPlaced};
pub use number::OrderNumber;
pub use order::{
    ContactInfo, FulfillmentStatus, NewOrder, Order, OrderLine, PaymentStatus, PaymentType,
    ShippingAddress,
};
pub use timeline::{StatusTimeline, TimelineEntry, TimelineError};
