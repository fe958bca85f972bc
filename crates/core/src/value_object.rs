//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects have **no identity**: two instances with the same attribute
/// values are the same value. They are immutable; to "modify" one, build a new
/// one.
///
/// ```ignore
/// #[derive(Debug, Clone, PartialEq, Eq)]
/// struct Username(String);
///
/// impl ValueObject for Username {}
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
