//! Records with a stable identity: categories, events and bookings.

/// A stored record keyed by its own typed id.
///
/// Stores index their tables by `Entity::Id`, so the id must never change
/// after the record is created.
pub trait Entity {
    type Id: Copy + Eq + core::hash::Hash + core::fmt::Debug;

    fn id(&self) -> Self::Id;
}
