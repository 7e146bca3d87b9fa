use serde::{Deserialize, Serialize};
use slotmap::new_key_type;
use uuid::Uuid;

new_key_type! {
    /// Identifies a lab in the host's lab arena.
    pub struct LabId;

    /// Identifies an experiment-storage container on a vessel.
    pub struct StorageId;

    /// Identifies a generator registered with a lab's resource host.
    pub struct GeneratorId;
}

/// Identifies a vessel. Survives docking and undocking, and can reappear
/// after the player reverts to an earlier save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VesselId(pub Uuid);

impl VesselId {
    /// A fresh random vessel id.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for VesselId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
