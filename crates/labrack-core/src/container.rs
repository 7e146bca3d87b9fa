//! Transport container for one equipment rack.
//!
//! Racks are ferried to a lab inside a container part. In the editor the
//! player picks which rack the container carries; in flight the rack is
//! installed into a lab on the same vessel.

use tracing::{debug, error};

use crate::cache::VesselCaches;
use crate::equipment::Equipment;
use crate::equipment_type::EquipmentType;
use crate::experiment::ExperimentLoader;
use crate::id::LabId;
use crate::lab::{Lab, LabDirectory, LabError};
use crate::node::ConfigNode;
use crate::registry::EquipmentTemplate;
use crate::vessel::FindComponents;

#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    #[error("container is empty")]
    Empty,
    #[error("{lab} has no slot for {equipment_type} equipment")]
    Unsupported {
        lab: String,
        equipment_type: EquipmentType,
    },
    #[error("{equipment_type} slot of {lab} already full")]
    SlotOccupied {
        lab: String,
        equipment_type: EquipmentType,
    },
    #[error("carried {equipment_type} rack is still installed in another lab")]
    InstalledElsewhere { equipment_type: EquipmentType },
}

#[derive(Debug, Default)]
pub struct EquipmentContainer {
    equipment: Option<Equipment>,
}

impl EquipmentContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_equipment(equipment: Equipment) -> Self {
        Self {
            equipment: Some(equipment),
        }
    }

    pub fn equipment(&self) -> Option<&Equipment> {
        self.equipment.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.equipment.is_none()
    }

    /// Type of the carried rack, NONE when empty.
    pub fn rack_type(&self) -> EquipmentType {
        self.equipment
            .as_ref()
            .map_or(EquipmentType::None, Equipment::equipment_type)
    }

    /// Part status line: the carried rack's name.
    pub fn status(&self) -> &str {
        self.equipment.as_ref().map_or("", Equipment::name)
    }

    pub fn mass(&self) -> f32 {
        self.equipment.as_ref().map_or(0.0, Equipment::mass)
    }

    pub fn cost(&self) -> f32 {
        self.equipment.as_ref().map_or(0.0, Equipment::cost)
    }

    /// Editor choice of the carried rack. Replaces whatever was loaded.
    pub fn choose(&mut self, template: EquipmentTemplate) {
        debug!(equipment = %template.name, "container loaded");
        self.equipment = Some(Equipment::new(template));
    }

    pub fn clear(&mut self) {
        self.equipment = None;
    }

    pub fn take(&mut self) -> Option<Equipment> {
        self.equipment.take()
    }

    // -----------------------------------------------------------------------
    // Installation
    // -----------------------------------------------------------------------

    /// Labs on `vessel` with a free slot for the carried rack.
    pub fn install_targets<V>(
        &self,
        vessel: &V,
        now: f64,
        caches: &mut VesselCaches,
        labs: &dyn LabDirectory,
    ) -> Vec<LabId>
    where
        V: FindComponents<LabId> + ?Sized,
    {
        let rack_type = self.rack_type();
        if rack_type.is_none() {
            return Vec::new();
        }
        caches.labs_with_free_slot(vessel, now, labs, rack_type)
    }

    /// Move the carried rack into `lab`.
    ///
    /// The lab checks its slot again since it may have filled up after the
    /// targets were listed. On any failure the rack stays in the container.
    pub fn install_into(&mut self, lab: &mut Lab) -> Result<(), ContainerError> {
        let Some(equipment) = self.equipment.take() else {
            return Err(ContainerError::Empty);
        };
        let equipment_type = equipment.equipment_type();
        match lab.install_lab_equipment(equipment) {
            Ok(()) => {
                debug!(lab = %lab.kind().name, "container emptied into lab");
                Ok(())
            }
            Err(LabError::UnsupportedEquipment {
                lab: name,
                equipment,
                ..
            }) => {
                self.equipment = Some(equipment);
                Err(ContainerError::Unsupported {
                    lab: name,
                    equipment_type,
                })
            }
            Err(LabError::SlotOccupied { equipment, .. }) => {
                self.equipment = Some(equipment);
                Err(ContainerError::SlotOccupied {
                    lab: lab.kind().name.clone(),
                    equipment_type,
                })
            }
            Err(LabError::InstalledElsewhere { equipment, .. }) => {
                self.equipment = Some(equipment);
                Err(ContainerError::InstalledElsewhere { equipment_type })
            }
            Err(err @ LabError::ExperimentNotAccepted { .. }) => {
                error!(%err, "unexpected experiment error while installing equipment");
                Err(ContainerError::Unsupported {
                    lab: lab.kind().name.clone(),
                    equipment_type,
                })
            }
        }
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// An equipment record; the NONE record when empty.
    pub fn save(&self) -> ConfigNode {
        self.equipment
            .as_ref()
            .map_or_else(Equipment::null_record, Equipment::save)
    }

    /// A NONE-typed or unreadable record gives an empty container.
    pub fn load(node: &ConfigNode, loader: &dyn ExperimentLoader) -> Self {
        Self {
            equipment: Equipment::load(node, loader),
        }
    }
}

// ---------------------------------------------------------------------------
// Container skins
// ---------------------------------------------------------------------------

const MULTI_PURPOSE_DIR: &str = "NehemiahInc/MultiPurposeParts/Parts/LabEquipmentContainer/";
const OMS_DIR: &str = "NehemiahInc/OMS/Parts/LabEquipmentContainer/";
const LIFE_SCIENCE_DIR: &str = "NehemiahInc/KerbalLifeScience/Parts/LabEquipmentContainer/";

/// Texture of a container carrying one rack type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerSkin {
    pub dir: &'static str,
    pub texture: &'static str,
}

const fn skin(dir: &'static str, texture: &'static str) -> ContainerSkin {
    ContainerSkin { dir, texture }
}

impl ContainerSkin {
    /// The empty container.
    pub const NONE: ContainerSkin = ContainerSkin {
        dir: MULTI_PURPOSE_DIR,
        texture: "ContainerTexture",
    };

    pub fn path(&self) -> String {
        format!("{}{}", self.dir, self.texture)
    }
}

/// Skin for a container carrying `equipment_type`.
///
/// Types without a skin of their own get the empty container's, with an
/// error logged.
pub fn texture_for(equipment_type: EquipmentType) -> ContainerSkin {
    match equipment_type {
        EquipmentType::None | EquipmentType::Exposure => ContainerSkin::NONE,
        EquipmentType::Printer => skin(OMS_DIR, "Container3PR_Texture"),
        EquipmentType::Cir => skin(OMS_DIR, "ContainerCIR_Texture"),
        EquipmentType::Fir => skin(OMS_DIR, "ContainerFIR_Texture"),
        EquipmentType::Msg => skin(OMS_DIR, "ContainerMSG_Texture"),
        EquipmentType::Usu => skin(LIFE_SCIENCE_DIR, "ContainerUSU_Texture"),
        other => {
            error!(equipment_type = %other, "no container texture, using empty container");
            ContainerSkin::NONE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lab::LabKind;
    use crate::test_utils::*;
    use slotmap::SlotMap;

    fn station() -> (SlotMap<LabId, Lab>, LabId, LabId, TestVessel) {
        let mut labs = SlotMap::with_key();
        let msl = labs.insert_with_key(|id| Lab::new(id, LabKind::msl()));
        let mpl = labs.insert_with_key(|id| Lab::new(id, LabKind::mpl()));
        let mut vessel = TestVessel::new();
        vessel.add_lab_part(msl);
        vessel.add_plain_part();
        vessel.add_lab_part(mpl);
        (labs, msl, mpl, vessel)
    }

    #[test]
    fn empty_container() {
        let container = EquipmentContainer::new();
        assert_eq!(container.rack_type(), EquipmentType::None);
        assert_eq!(container.status(), "");
        assert_eq!(container.mass(), 0.0);
        assert_eq!(container.cost(), 0.0);
    }

    #[test]
    fn chosen_rack_drives_modifiers() {
        let mut container = EquipmentContainer::new();
        container.choose(usu_template());
        assert_eq!(container.rack_type(), EquipmentType::Usu);
        assert_eq!(container.status(), "Ultrasound Unit");
        assert_eq!(container.mass(), usu_template().mass);
        assert_eq!(container.cost(), usu_template().cost);
        container.clear();
        assert!(container.is_empty());
    }

    #[test]
    fn targets_are_labs_with_free_slot() {
        let (labs, msl, mpl, vessel) = station();
        let mut caches = VesselCaches::default();
        let mut container = EquipmentContainer::new();
        assert!(container.install_targets(&vessel, 0.0, &mut caches, &labs).is_empty());

        container.choose(fir_template());
        assert_eq!(
            container.install_targets(&vessel, 0.0, &mut caches, &labs),
            vec![msl]
        );
        container.choose(msg_template());
        assert_eq!(
            container.install_targets(&vessel, 1.0, &mut caches, &labs),
            vec![mpl]
        );
        assert_eq!(vessel.scans(), 1);
    }

    #[test]
    fn install_empties_container() {
        let (mut labs, msl, _, _) = station();
        let mut container = EquipmentContainer::with_equipment(Equipment::new(fir_template()));
        container.install_into(&mut labs[msl]).unwrap();
        assert!(container.is_empty());
        assert!(labs[msl].has_equipment_installed(EquipmentType::Fir));
    }

    #[test]
    fn failed_install_keeps_rack() {
        let (mut labs, msl, mpl, _) = station();
        labs[msl]
            .install_lab_equipment(Equipment::new(fir_template()))
            .unwrap();

        let mut container = EquipmentContainer::with_equipment(Equipment::new(fir_template()));
        let err = container.install_into(&mut labs[msl]).unwrap_err();
        assert!(matches!(err, ContainerError::SlotOccupied { .. }));
        assert_eq!(container.rack_type(), EquipmentType::Fir);

        let err = container.install_into(&mut labs[mpl]).unwrap_err();
        assert!(matches!(err, ContainerError::Unsupported { .. }));
        assert_eq!(container.rack_type(), EquipmentType::Fir);
        assert!(container.equipment().unwrap().installation().is_none());
    }

    #[test]
    fn rack_registered_elsewhere_stays_in_container() {
        let (mut labs, msl, _, _) = station();
        let mut eq = Equipment::new(fir_template());
        let other = labs.insert_with_key(|id| Lab::new(id, LabKind::msl()));
        eq.install(labs[other].resources_mut());

        let mut container = EquipmentContainer::with_equipment(eq);
        let err = container.install_into(&mut labs[msl]).unwrap_err();
        assert!(matches!(err, ContainerError::InstalledElsewhere { .. }));
        assert!(container.equipment().unwrap().is_installed_in(other));
        assert!(labs[msl].has_free_equipment_slot(EquipmentType::Fir));
    }

    #[test]
    fn installing_from_empty_container_is_an_error() {
        let (mut labs, msl, _, _) = station();
        let mut container = EquipmentContainer::new();
        assert!(matches!(
            container.install_into(&mut labs[msl]),
            Err(ContainerError::Empty)
        ));
    }

    #[test]
    fn record_round_trip() {
        let mut container = EquipmentContainer::new();
        container.choose(cir_template());
        let back = EquipmentContainer::load(&container.save(), &TestExperimentLoader);
        assert_eq!(back.equipment().unwrap().template(), &cir_template());
    }

    #[test]
    fn empty_container_writes_null_record() {
        let node = EquipmentContainer::new().save();
        assert_eq!(node.name, crate::equipment::EQUIPMENT_NODE);
        assert_eq!(node.value("type"), Some("NONE"));
        assert!(EquipmentContainer::load(&node, &TestExperimentLoader).is_empty());
    }

    #[test]
    fn malformed_record_gives_empty_container() {
        let node = ConfigNode::new("Garbage");
        assert!(EquipmentContainer::load(&node, &TestExperimentLoader).is_empty());
    }

    #[test]
    fn skins() {
        assert_eq!(texture_for(EquipmentType::None), ContainerSkin::NONE);
        assert_eq!(texture_for(EquipmentType::Exposure), ContainerSkin::NONE);
        assert_eq!(
            texture_for(EquipmentType::Printer).path(),
            "NehemiahInc/OMS/Parts/LabEquipmentContainer/Container3PR_Texture"
        );
        assert_eq!(texture_for(EquipmentType::Usu).texture, "ContainerUSU_Texture");
        assert_eq!(texture_for(EquipmentType::Kemini), ContainerSkin::NONE);
    }
}
