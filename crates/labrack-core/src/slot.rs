//! A fixed-type equipment receptacle.

use tracing::{debug, error};

use crate::equipment::{EQUIPMENT_NODE, Equipment};
use crate::equipment_type::EquipmentType;
use crate::experiment::{Experiment, ExperimentLoader, ExperimentStorageAccess};
use crate::host::{LabHost, RateSource};
use crate::node::ConfigNode;

/// Record tag of a persisted slot.
pub const SLOT_NODE: &str = "EquipmentSlot";

const TYPE: &str = "type";

/// Why a slot refused equipment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RejectReason {
    #[error("type mismatch")]
    TypeMismatch,
    #[error("still installed in another lab")]
    InstalledElsewhere,
}

/// A slot refused equipment. The equipment is handed back untouched.
#[derive(Debug, thiserror::Error)]
#[error("slot for {expected} cannot take {found} equipment: {reason}")]
pub struct InstallRejected {
    pub expected: EquipmentType,
    pub found: EquipmentType,
    pub reason: RejectReason,
    pub equipment: Equipment,
}

/// Holds at most one rack of exactly `slot_type`.
#[derive(Debug)]
pub struct EquipmentSlot {
    slot_type: EquipmentType,
    equipment: Option<Equipment>,
}

impl EquipmentSlot {
    pub fn new(slot_type: EquipmentType) -> Self {
        Self {
            slot_type,
            equipment: None,
        }
    }

    /// A slot pre-filled with `equipment`. Equipment of another type is
    /// dropped with an error and the slot starts empty.
    pub fn with_equipment(slot_type: EquipmentType, equipment: Option<Equipment>) -> Self {
        let equipment = match equipment {
            Some(eq) if eq.equipment_type() != slot_type => {
                error!(
                    %slot_type,
                    found = %eq.equipment_type(),
                    "slot record holds equipment of another type"
                );
                None
            }
            other => other,
        };
        Self {
            slot_type,
            equipment,
        }
    }

    pub fn slot_type(&self) -> EquipmentType {
        self.slot_type
    }

    pub fn is_installed(&self) -> bool {
        self.equipment.is_some()
    }

    pub fn is_running(&self, rates: &dyn RateSource) -> bool {
        self.equipment.as_ref().is_some_and(|eq| eq.is_running(rates))
    }

    pub fn equipment(&self) -> Option<&Equipment> {
        self.equipment.as_ref()
    }

    pub fn equipment_mut(&mut self) -> Option<&mut Equipment> {
        self.equipment.as_mut()
    }

    /// Installed equipment and experiment mass, 0.0 when empty.
    pub fn mass(&self) -> f32 {
        self.equipment.as_ref().map_or(0.0, Equipment::mass)
    }

    /// Place `equipment` in the slot and register it with `lab`.
    ///
    /// On a type mismatch, or for a rack still installed in another lab,
    /// nothing changes and the equipment comes back in the error. Installing
    /// over an occupied slot uninstalls the previous rack and returns it.
    pub fn install(
        &mut self,
        mut equipment: Equipment,
        lab: &mut dyn LabHost,
    ) -> Result<Option<Equipment>, InstallRejected> {
        if equipment.equipment_type() != self.slot_type {
            error!(
                slot_type = %self.slot_type,
                found = %equipment.equipment_type(),
                "equipment type does not match slot"
            );
            return Err(InstallRejected {
                expected: self.slot_type,
                found: equipment.equipment_type(),
                reason: RejectReason::TypeMismatch,
                equipment,
            });
        }
        if equipment
            .installation()
            .is_some_and(|i| i.lab != lab.lab_id())
        {
            error!(slot_type = %self.slot_type, "equipment still installed in another lab");
            return Err(InstallRejected {
                expected: self.slot_type,
                found: equipment.equipment_type(),
                reason: RejectReason::InstalledElsewhere,
                equipment,
            });
        }
        let displaced = self.remove(lab);
        equipment.install(lab);
        self.equipment = Some(equipment);
        Ok(displaced)
    }

    /// Take the equipment out, withdrawing its registration. A carried
    /// experiment leaves the lab with it.
    pub fn remove(&mut self, lab: &mut dyn LabHost) -> Option<Equipment> {
        let mut equipment = self.equipment.take()?;
        if !equipment.is_experiment_slot_free() {
            lab.experiment_will_be_removed(self.slot_type);
        }
        equipment.uninstall(lab);
        debug!(slot_type = %self.slot_type, "equipment removed from slot");
        Some(equipment)
    }

    /// Register loaded equipment with `lab`. Called once after load.
    pub fn on_start(&mut self, lab: &mut dyn LabHost) {
        if let Some(equipment) = self.equipment.as_mut() {
            if !equipment.install(lab) {
                return;
            }
            if !equipment.is_experiment_slot_free() {
                lab.experiment_installed(self.slot_type);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Experiment forwarding
    // -----------------------------------------------------------------------

    /// False when no equipment is installed.
    pub fn experiment_slot_free(&self) -> bool {
        self.equipment
            .as_ref()
            .is_some_and(Equipment::is_experiment_slot_free)
    }

    /// Attach an experiment to the installed equipment. An empty slot hands
    /// the experiment back.
    pub fn install_experiment(
        &mut self,
        experiment: Box<dyn Experiment>,
        lab: &mut dyn LabHost,
    ) -> Result<(), Box<dyn Experiment>> {
        match self.equipment.as_mut() {
            Some(equipment) => {
                equipment.install_experiment(experiment);
                lab.experiment_installed(self.slot_type);
                Ok(())
            }
            None => Err(experiment),
        }
    }

    pub fn experiment(&self) -> Option<&dyn Experiment> {
        self.equipment.as_ref().and_then(Equipment::experiment)
    }

    pub fn remove_experiment(&mut self, lab: &mut dyn LabHost) -> Option<Box<dyn Experiment>> {
        self.equipment.as_mut()?.remove_experiment_data(lab)
    }

    pub fn can_experiment_move(&self, storage: &dyn ExperimentStorageAccess) -> bool {
        self.equipment
            .as_ref()
            .is_some_and(|eq| eq.can_experiment_move(storage))
    }

    pub fn move_experiment(
        &mut self,
        lab: &mut dyn LabHost,
        storage: &mut dyn ExperimentStorageAccess,
    ) -> bool {
        match self.equipment.as_mut() {
            Some(equipment) => equipment.try_move_experiment(lab, storage),
            None => false,
        }
    }

    pub fn experiment_action(&mut self, lab: &mut dyn LabHost) {
        if let Some(equipment) = self.equipment.as_mut() {
            equipment.experiment_action(lab);
        }
    }

    pub fn action_string(&self) -> String {
        self.equipment
            .as_ref()
            .map(Equipment::action_string)
            .unwrap_or_default()
    }

    pub fn can_action_run(&self) -> bool {
        self.equipment
            .as_ref()
            .is_some_and(Equipment::can_run_experiment_action)
    }

    pub fn is_exposure_action(&self) -> bool {
        self.equipment
            .as_ref()
            .is_some_and(Equipment::is_exposure_action)
    }

    pub fn update_check(&mut self, lab: &mut dyn LabHost) {
        if let Some(equipment) = self.equipment.as_mut() {
            equipment.update_check(lab);
        }
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    pub fn save(&self) -> ConfigNode {
        let mut node = ConfigNode::new(SLOT_NODE);
        node.add_value(TYPE, self.slot_type);
        if let Some(equipment) = &self.equipment {
            node.add_node(equipment.save());
        }
        node
    }

    /// Rebuild a slot from its record. A record with the wrong tag yields an
    /// empty NONE-typed slot.
    pub fn load(node: &ConfigNode, loader: &dyn ExperimentLoader) -> EquipmentSlot {
        if node.name != SLOT_NODE {
            error!(tag = %node.name, "invalid equipment slot record");
            return EquipmentSlot::new(EquipmentType::None);
        }
        let slot_type = EquipmentType::from_name(node.str_value(TYPE));
        let equipment = node
            .node(EQUIPMENT_NODE)
            .and_then(|record| Equipment::load(record, loader));
        EquipmentSlot::with_equipment(slot_type, equipment)
    }
}
