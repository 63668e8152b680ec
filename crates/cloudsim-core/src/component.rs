//! Component identifiers.

/// Identifier of simulation component.
pub type Id = u32;
