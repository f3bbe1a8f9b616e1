//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Stored documents (accounts, forms, submissions) implement this so storage
/// adapters can key them generically.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Copy + Eq + core::hash::Hash + core::fmt::Debug + core::fmt::Display;

    /// Returns the entity identifier.
    fn id(&self) -> Self::Id;
}
