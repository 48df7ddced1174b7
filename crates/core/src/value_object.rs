//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value**: two `Money`
/// amounts of 14.00 are the same thing, whereas two products with the same
/// price are still two products.
///
/// ```ignore
/// let a = Money::new(dec!(14.00))?;
/// let b = Money::new(dec!(14))?;
/// assert_eq!(a, b);
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
