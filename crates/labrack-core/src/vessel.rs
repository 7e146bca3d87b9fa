//! What the caches need to know about a vessel.

use crate::id::VesselId;

/// A vessel as seen by the component caches.
pub trait Vessel {
    /// Stable identity. Docking merges vessels under one id; undocking
    /// splits them again.
    fn id(&self) -> VesselId;

    /// Number of parts. Any structural change (docking, staging,
    /// destruction of parts) changes it.
    fn part_count(&self) -> usize;
}

/// Full scan of a vessel for components of one kind.
///
/// This is the expensive operation the caches avoid repeating.
pub trait FindComponents<C>: Vessel {
    fn find_components(&self) -> Vec<C>;
}
