//! Value object trait: equality by value, not identity.
//!
//! Value objects are domain objects that have **no identity** - they are defined entirely
//! by their attribute values. Two value objects with the same values are considered equal.

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value**. To "modify" one,
/// build a new one.
///
/// Example:
/// - `Quantity(5)` is a value object
/// - `Article { id: ArticleId("155082"), .. }` is an aggregate (identity matters)
///
/// ```ignore
/// #[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// struct Balance {
///     stock: i64,
///     warranty: i64,
/// }
///
/// impl ValueObject for Balance {}
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
