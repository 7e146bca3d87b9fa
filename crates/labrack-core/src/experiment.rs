//! The experiment capability.
//!
//! Experiments are defined outside this crate. Equipment holds one as a
//! `Box<dyn Experiment>` and forwards lifecycle calls to it; the detailed
//! progress state machine lives behind this trait.

use std::any::Any;

use serde::{Deserialize, Serialize};

use crate::equipment_type::EquipmentType;
use crate::host::LabHost;
use crate::id::StorageId;
use crate::node::ConfigNode;
use crate::registry::EquipmentTemplate;

/// Record tag of a persisted experiment.
pub const EXPERIMENT_NODE: &str = "Experiment";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExperimentState {
    #[default]
    Stored,
    Installed,
    Running,
    Paused,
    Finished,
    Finalized,
    Completed,
}

impl ExperimentState {
    pub fn as_str(self) -> &'static str {
        match self {
            ExperimentState::Stored => "STORED",
            ExperimentState::Installed => "INSTALLED",
            ExperimentState::Running => "RUNNING",
            ExperimentState::Paused => "PAUSED",
            ExperimentState::Finished => "FINISHED",
            ExperimentState::Finalized => "FINALIZED",
            ExperimentState::Completed => "COMPLETED",
        }
    }

    pub fn from_name(name: &str) -> Option<ExperimentState> {
        [
            ExperimentState::Stored,
            ExperimentState::Installed,
            ExperimentState::Running,
            ExperimentState::Paused,
            ExperimentState::Finished,
            ExperimentState::Finalized,
            ExperimentState::Completed,
        ]
        .into_iter()
        .find(|s| s.as_str().eq_ignore_ascii_case(name.trim()))
    }
}

impl std::fmt::Display for ExperimentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Experiment trait
// ---------------------------------------------------------------------------

/// A stateful task that runs inside lab equipment.
///
/// Hooks with a default body are optional. `save` must produce a record
/// tagged [`EXPERIMENT_NODE`] that the matching [`ExperimentLoader`] reads
/// back.
pub trait Experiment: std::fmt::Debug {
    fn id(&self) -> &str;

    /// Short name shown next to the slot, e.g. "CCF".
    fn abbreviation(&self) -> &str;

    fn state(&self) -> ExperimentState;

    /// The rack type this experiment runs in.
    fn needed_equipment(&self) -> EquipmentType;

    fn mass(&self) -> f32;

    fn cost(&self) -> f32;

    /// Human-readable progress text.
    fn display_state(&self) -> String {
        self.state().to_string()
    }

    /// Whether the experiment may leave its equipment for a storage on the
    /// vessel right now.
    fn can_move(&self, storage: &dyn ExperimentStorageAccess) -> bool;

    /// Called after the experiment was detached for a move.
    fn on_moved(&mut self) {}

    /// Called when the experiment is attached to equipment of `equipment`.
    fn on_installed(&mut self, equipment: &EquipmentTemplate);

    /// Called when the experiment is rehydrated inside loaded equipment.
    fn on_loaded(&mut self, equipment: &EquipmentTemplate) {
        let _ = equipment;
    }

    fn on_paused(&mut self) {}

    fn on_resumed(&mut self) {}

    fn can_run_action(&self) -> bool {
        false
    }

    /// Label of the player action, empty if there is none.
    fn action_string(&self) -> String {
        String::new()
    }

    fn run_action(&mut self, lab: &mut dyn LabHost) {
        let _ = lab;
    }

    fn is_exposure(&self) -> bool {
        false
    }

    /// Periodic progress check while installed.
    fn update_check(&mut self, lab: &mut dyn LabHost) {
        let _ = lab;
    }

    fn save(&self) -> ConfigNode;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Rebuilds experiments from their records.
pub trait ExperimentLoader {
    /// `None` if the record does not describe a known experiment.
    fn load(&self, node: &ConfigNode) -> Option<Box<dyn Experiment>>;
}

/// Experiment storage reachable from a vessel, used as the destination of
/// experiment moves.
pub trait ExperimentStorageAccess {
    fn has_free_storage(&self, experiment: &dyn Experiment) -> bool;

    /// Place `experiment` in a free storage. Hands it back if none accepts it.
    fn store(&mut self, experiment: Box<dyn Experiment>) -> Result<StorageId, Box<dyn Experiment>>;
}
