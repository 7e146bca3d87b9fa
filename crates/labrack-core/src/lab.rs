//! Generic lab with a fixed slot signature.
//!
//! Every lab model is one [`Lab`] parameterized by a [`LabKind`]: the
//! ordered slot types, optional built-in equipment and an optional
//! lab-time generator of its own. Slot operations dispatch on the equipment
//! type instead of per-model code.

use serde::{Deserialize, Serialize};
use slotmap::SlotMap;
use tracing::{debug, error};

use crate::equipment::Equipment;
use crate::equipment_type::EquipmentType;
use crate::experiment::{Experiment, ExperimentLoader, ExperimentStorageAccess};
use crate::host::{LabHost, LabResources};
use crate::id::{GeneratorId, LabId};
use crate::node::ConfigNode;
use crate::registry::EquipmentTemplate;
use crate::resource::{ELECTRIC_CHARGE, Generator, KEMINI_LAB_TIME, LAB_TIME};
use crate::slot::{EquipmentSlot, RejectReason, SLOT_NODE};

/// Record tag of a persisted lab.
pub const LAB_NODE: &str = "Lab";

const RESEARCH: &str = "doResearch";

// ---------------------------------------------------------------------------
// LabKind
// ---------------------------------------------------------------------------

/// Lab-time production of the lab part itself.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabTimeRate {
    pub lab_time_per_hour: f32,
    pub charge_per_lab_time: f32,
}

/// The static signature of a lab model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabKind {
    pub name: String,
    pub abbreviation: String,
    pub slots: Vec<EquipmentType>,
    /// Equipment installed on start when its slot is empty.
    pub builtin: Option<EquipmentTemplate>,
    pub lab_time: Option<LabTimeRate>,
    /// Run the experiment action immediately after an experiment is
    /// installed.
    pub start_experiment_on_install: bool,
}

impl LabKind {
    /// MSL-1000: CIR, FIR and 3D printer racks.
    pub fn msl() -> Self {
        Self {
            name: "MSL-1000".to_string(),
            abbreviation: "MSL".to_string(),
            slots: vec![EquipmentType::Cir, EquipmentType::Fir, EquipmentType::Printer],
            builtin: None,
            lab_time: None,
            start_experiment_on_install: false,
        }
    }

    /// MPL-600: microgravity glovebox and ultrasound unit.
    pub fn mpl() -> Self {
        Self {
            name: "MPL-600".to_string(),
            abbreviation: "MPL".to_string(),
            slots: vec![EquipmentType::Msg, EquipmentType::Usu],
            builtin: None,
            lab_time: None,
            start_experiment_on_install: false,
        }
    }

    /// Kemini lab: one always-present KEMINI rack.
    pub fn kemini() -> Self {
        Self {
            name: "Kemini Lab".to_string(),
            abbreviation: "KL".to_string(),
            slots: vec![EquipmentType::Kemini],
            builtin: Some(EquipmentTemplate {
                abbreviation: "KL".to_string(),
                name: "Kemini Lab".to_string(),
                equipment_type: EquipmentType::Kemini,
                mass: 0.0,
                cost: 0.0,
                product: KEMINI_LAB_TIME.to_string(),
                product_per_hour: 1.0,
                reactant: ELECTRIC_CHARGE.to_string(),
                reactant_per_product: 10.0,
            }),
            lab_time: None,
            start_experiment_on_install: true,
        }
    }

    pub fn with_lab_time(mut self, rate: LabTimeRate) -> Self {
        self.lab_time = Some(rate);
        self
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum LabError {
    #[error("{lab} has no slot for {equipment_type} equipment")]
    UnsupportedEquipment {
        lab: String,
        equipment_type: EquipmentType,
        equipment: Equipment,
    },
    #[error("{equipment_type} slot already full")]
    SlotOccupied {
        equipment_type: EquipmentType,
        equipment: Equipment,
    },
    #[error("{equipment_type} equipment is still installed in another lab")]
    InstalledElsewhere {
        equipment_type: EquipmentType,
        equipment: Equipment,
    },
    #[error("{equipment_type} equipment cannot take an experiment (installed: {installed}, free: {free})")]
    ExperimentNotAccepted {
        equipment_type: EquipmentType,
        installed: bool,
        free: bool,
        experiment: Box<dyn Experiment>,
    },
}

impl LabError {
    /// The rejected equipment, if this error carries one.
    pub fn into_equipment(self) -> Option<Equipment> {
        match self {
            LabError::UnsupportedEquipment { equipment, .. }
            | LabError::SlotOccupied { equipment, .. }
            | LabError::InstalledElsewhere { equipment, .. } => Some(equipment),
            LabError::ExperimentNotAccepted { .. } => None,
        }
    }

    /// The rejected experiment, if this error carries one.
    pub fn into_experiment(self) -> Option<Box<dyn Experiment>> {
        match self {
            LabError::ExperimentNotAccepted { experiment, .. } => Some(experiment),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Lab
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct Lab {
    id: LabId,
    kind: LabKind,
    slots: Vec<EquipmentSlot>,
    resources: LabResources,
    lab_time_generator: Option<GeneratorId>,
    research_enabled: bool,
    started: bool,
}

impl Lab {
    /// A lab with every slot empty.
    pub fn new(id: LabId, kind: LabKind) -> Self {
        let slots = kind.slots.iter().map(|&t| EquipmentSlot::new(t)).collect();
        let resources = LabResources::new(id, &kind.slots);
        Self {
            id,
            kind,
            slots,
            resources,
            lab_time_generator: None,
            research_enabled: true,
            started: false,
        }
    }

    pub fn id(&self) -> LabId {
        self.id
    }

    pub fn kind(&self) -> &LabKind {
        &self.kind
    }

    pub fn resources(&self) -> &LabResources {
        &self.resources
    }

    /// Host side: record generator flows and tank levels.
    pub fn resources_mut(&mut self) -> &mut LabResources {
        &mut self.resources
    }

    pub fn slots(&self) -> &[EquipmentSlot] {
        &self.slots
    }

    pub fn slot(&self, equipment_type: EquipmentType) -> Option<&EquipmentSlot> {
        self.slots.iter().find(|s| s.slot_type() == equipment_type)
    }

    fn slot_index(&self, equipment_type: EquipmentType) -> Option<usize> {
        if equipment_type.is_none() {
            return None;
        }
        self.slots
            .iter()
            .position(|s| s.slot_type() == equipment_type)
    }

    pub fn lab_time_generator(&self) -> Option<GeneratorId> {
        self.lab_time_generator
    }

    pub fn is_research_enabled(&self) -> bool {
        self.research_enabled
    }

    // -----------------------------------------------------------------------
    // Capacity queries
    // -----------------------------------------------------------------------

    pub fn has_equipment_slot(&self, equipment_type: EquipmentType) -> bool {
        self.slot_index(equipment_type).is_some()
    }

    pub fn has_free_equipment_slot(&self, equipment_type: EquipmentType) -> bool {
        self.slot(equipment_type).is_some_and(|s| !s.is_installed())
    }

    pub fn has_equipment_installed(&self, equipment_type: EquipmentType) -> bool {
        self.slot(equipment_type)
            .is_some_and(EquipmentSlot::is_installed)
    }

    pub fn has_equipment_free_experiment_slot(&self, equipment_type: EquipmentType) -> bool {
        self.slot(equipment_type)
            .is_some_and(EquipmentSlot::experiment_slot_free)
    }

    pub fn is_equipment_running(&self, equipment_type: EquipmentType) -> bool {
        self.slot(equipment_type)
            .is_some_and(|s| s.is_running(&self.resources))
    }

    // -----------------------------------------------------------------------
    // Equipment
    // -----------------------------------------------------------------------

    /// Install a rack into the slot of its type.
    ///
    /// A lab without a slot of that type is a caller error
    /// ([`LabError::UnsupportedEquipment`]). A full slot is logged and the
    /// equipment handed back in [`LabError::SlotOccupied`].
    pub fn install_lab_equipment(&mut self, equipment: Equipment) -> Result<(), LabError> {
        let equipment_type = equipment.equipment_type();
        let Some(idx) = self.slot_index(equipment_type) else {
            error!(
                lab = %self.kind.name,
                equipment = equipment.name(),
                "unsupported equipment"
            );
            return Err(LabError::UnsupportedEquipment {
                lab: self.kind.name.clone(),
                equipment_type,
                equipment,
            });
        };
        if self.slots[idx].is_installed() {
            error!(lab = %self.kind.name, %equipment_type, "slot already full");
            return Err(LabError::SlotOccupied {
                equipment_type,
                equipment,
            });
        }
        match self.slots[idx].install(equipment, &mut self.resources) {
            Ok(_) => {
                debug!(lab = %self.kind.name, %equipment_type, "lab equipment installed");
                Ok(())
            }
            Err(rejected) if rejected.reason == RejectReason::InstalledElsewhere => {
                Err(LabError::InstalledElsewhere {
                    equipment_type,
                    equipment: rejected.equipment,
                })
            }
            // The slot was found by type, so a mismatch is only reachable
            // through a slot record loaded with a different type.
            Err(rejected) => Err(LabError::SlotOccupied {
                equipment_type,
                equipment: rejected.equipment,
            }),
        }
    }

    /// Take a rack out of its slot, stored and unregistered.
    pub fn remove_lab_equipment(&mut self, equipment_type: EquipmentType) -> Option<Equipment> {
        let idx = self.slot_index(equipment_type)?;
        self.slots[idx].remove(&mut self.resources)
    }

    // -----------------------------------------------------------------------
    // Experiments
    // -----------------------------------------------------------------------

    /// Attach an experiment to the rack it needs, if that rack is installed
    /// and free.
    pub fn install_experiment(&mut self, experiment: Box<dyn Experiment>) -> Result<(), LabError> {
        let equipment_type = experiment.needed_equipment();
        let idx = match self.slot_index(equipment_type) {
            Some(idx)
                if self.slots[idx].is_installed() && self.slots[idx].experiment_slot_free() =>
            {
                idx
            }
            other => {
                let slot = other.map(|idx| &self.slots[idx]);
                let installed = slot.is_some_and(EquipmentSlot::is_installed);
                let free = slot.is_some_and(EquipmentSlot::experiment_slot_free);
                error!(
                    lab = %self.kind.name,
                    experiment = experiment.abbreviation(),
                    installed,
                    free,
                    "cannot install experiment"
                );
                return Err(LabError::ExperimentNotAccepted {
                    equipment_type,
                    installed,
                    free,
                    experiment,
                });
            }
        };
        self.slots[idx]
            .install_experiment(experiment, &mut self.resources)
            .map_err(|experiment| LabError::ExperimentNotAccepted {
                equipment_type,
                installed: false,
                free: false,
                experiment,
            })?;
        if self.kind.start_experiment_on_install {
            self.slots[idx].experiment_action(&mut self.resources);
        }
        Ok(())
    }

    pub fn experiment(&self, equipment_type: EquipmentType) -> Option<&dyn Experiment> {
        self.slot(equipment_type).and_then(EquipmentSlot::experiment)
    }

    pub fn remove_experiment(&mut self, equipment_type: EquipmentType) -> Option<Box<dyn Experiment>> {
        let idx = self.slot_index(equipment_type)?;
        self.slots[idx].remove_experiment(&mut self.resources)
    }

    pub fn can_experiment_move(
        &self,
        equipment_type: EquipmentType,
        storage: &dyn ExperimentStorageAccess,
    ) -> bool {
        self.slot(equipment_type)
            .is_some_and(|s| s.can_experiment_move(storage))
    }

    /// Move the experiment in the `equipment_type` rack to vessel storage.
    ///
    /// On success the caller notifies its storage cache that an experiment
    /// moved.
    pub fn move_experiment(
        &mut self,
        equipment_type: EquipmentType,
        storage: &mut dyn ExperimentStorageAccess,
    ) -> bool {
        match self.slot_index(equipment_type) {
            Some(idx) => self.slots[idx].move_experiment(&mut self.resources, storage),
            None => false,
        }
    }

    pub fn experiment_action(&mut self, equipment_type: EquipmentType) {
        if let Some(idx) = self.slot_index(equipment_type) {
            self.slots[idx].experiment_action(&mut self.resources);
        }
    }

    /// Periodic progress check of every attached experiment.
    pub fn update_check(&mut self) {
        for slot in &mut self.slots {
            slot.update_check(&mut self.resources);
        }
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Register loaded equipment, install built-in equipment and the lab's
    /// own lab-time generator. Runs once; later calls do nothing.
    pub fn on_start(&mut self) {
        if self.started {
            return;
        }
        self.started = true;

        for slot in &mut self.slots {
            slot.on_start(&mut self.resources);
        }

        if let Some(template) = self.kind.builtin.clone() {
            if !self.has_equipment_installed(template.equipment_type) {
                if let Err(err) = self.install_lab_equipment(Equipment::new(template)) {
                    error!(lab = %self.kind.name, %err, "built-in equipment not installed");
                }
            }
        }

        if let Some(rate) = self.kind.lab_time {
            let generator = Generator::conversion(
                LAB_TIME,
                f64::from(rate.lab_time_per_hour),
                ELECTRIC_CHARGE,
                f64::from(rate.charge_per_lab_time),
            );
            self.lab_time_generator = Some(self.resources.add_generator(generator));
        }
        debug!(lab = %self.kind.name, "lab started");
    }

    /// Stop research. Returns `false` if it was already paused.
    pub fn pause(&mut self) -> bool {
        if !self.research_enabled {
            return false;
        }
        self.research_enabled = false;
        for experiment in self.experiments_mut() {
            experiment.on_paused();
        }
        true
    }

    /// Resume research. Returns `false` if it was already running.
    pub fn resume(&mut self) -> bool {
        if self.research_enabled {
            return false;
        }
        self.research_enabled = true;
        for experiment in self.experiments_mut() {
            experiment.on_resumed();
        }
        true
    }

    fn experiments_mut(&mut self) -> impl Iterator<Item = &mut (dyn Experiment + 'static)> {
        self.slots
            .iter_mut()
            .filter_map(|s| s.equipment_mut())
            .filter_map(Equipment::experiment_mut)
    }

    /// "ABB: state" for every rack holding an experiment.
    pub fn status_lines(&self) -> Vec<String> {
        self.slots
            .iter()
            .filter_map(EquipmentSlot::experiment)
            .map(|e| format!("{}: {}", e.abbreviation(), e.display_state()))
            .collect()
    }

    /// Mass of installed equipment and experiments.
    pub fn mass(&self) -> f32 {
        self.slots.iter().map(EquipmentSlot::mass).sum()
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    pub fn save(&self) -> ConfigNode {
        let mut node = ConfigNode::new(LAB_NODE);
        node.add_value(RESEARCH, self.research_enabled);
        for slot in &self.slots {
            node.add_node(slot.save());
        }
        node
    }

    /// Rebuild a lab of `kind` from its record.
    ///
    /// Each signature slot takes the first slot record of its type; a
    /// missing record leaves that slot empty. Loaded equipment is not
    /// registered until [`on_start`](Self::on_start).
    pub fn load(
        id: LabId,
        kind: LabKind,
        node: &ConfigNode,
        loader: &dyn ExperimentLoader,
    ) -> Lab {
        let mut lab = Lab::new(id, kind);
        if node.name != LAB_NODE {
            error!(tag = %node.name, "invalid lab record");
            return lab;
        }
        lab.research_enabled = node.value(RESEARCH).is_none_or(|v| v != "false");

        let mut records: Vec<Option<EquipmentSlot>> = node
            .nodes_named(SLOT_NODE)
            .map(|record| Some(EquipmentSlot::load(record, loader)))
            .collect();
        for slot in &mut lab.slots {
            let slot_type = slot.slot_type();
            let found = records
                .iter_mut()
                .find(|r| matches!(r, Some(s) if s.slot_type() == slot_type))
                .and_then(Option::take);
            match found {
                Some(loaded) => *slot = loaded,
                None => debug!(%slot_type, "no slot record, starting empty"),
            }
        }
        lab
    }
}

// ---------------------------------------------------------------------------
// Lab lookup
// ---------------------------------------------------------------------------

/// Resolves lab ids to labs.
pub trait LabDirectory {
    fn lab(&self, id: LabId) -> Option<&Lab>;
}

impl LabDirectory for SlotMap<LabId, Lab> {
    fn lab(&self, id: LabId) -> Option<&Lab> {
        self.get(id)
    }
}
