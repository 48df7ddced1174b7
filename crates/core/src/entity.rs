//! Entity trait: identity that survives state changes.

/// Anything the stores address by identifier (products, accounts, orders).
pub trait Entity {
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    fn id(&self) -> &Self::Id;
}
