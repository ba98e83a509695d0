//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Parts and ledger records are entities: two rows with the same id are the same
/// thing even when every other field differs.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Copy + Eq + Ord + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
