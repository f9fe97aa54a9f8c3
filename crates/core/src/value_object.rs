//! Value object marker: equality by value, no identity.

/// Marker trait for immutable values compared by their attributes
/// (`Money`, SKUs, discount codes, ...).
///
/// "Changing" a value object means building a new one.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
