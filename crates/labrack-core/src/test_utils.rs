//! Shared test helpers for unit tests, integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available in unit tests, integration tests, and benchmarks (via the
//! `test-utils` feature).

use std::any::Any;
use std::cell::Cell;

use slotmap::SlotMap;

use crate::equipment_type::EquipmentType;
use crate::experiment::{
    EXPERIMENT_NODE, Experiment, ExperimentLoader, ExperimentState, ExperimentStorageAccess,
};
use crate::host::{LabHost, LabResources};
use crate::id::{LabId, StorageId, VesselId};
use crate::migration::{STEP_NODE, STEP_RESOURCE};
use crate::node::ConfigNode;
use crate::registry::{EquipmentTemplate, Registry, RegistryBuilder};
use crate::resource::{ELECTRIC_CHARGE, EXPOSURE_TIME, KEMINI_LAB_TIME, LAB_TIME};
use crate::vessel::{FindComponents, Vessel};

// ===========================================================================
// Equipment templates
// ===========================================================================

fn template(
    abbreviation: &str,
    name: &str,
    equipment_type: EquipmentType,
    mass: f32,
    cost: f32,
    product: &str,
    reactant_per_product: f32,
) -> EquipmentTemplate {
    EquipmentTemplate {
        abbreviation: abbreviation.to_string(),
        name: name.to_string(),
        equipment_type,
        mass,
        cost,
        product: product.to_string(),
        product_per_hour: 1.0,
        reactant: ELECTRIC_CHARGE.to_string(),
        reactant_per_product,
    }
}

pub fn printer_template() -> EquipmentTemplate {
    template("3PR", "3D Printer", EquipmentType::Printer, 0.2, 10_000.0, LAB_TIME, 10.0)
}

pub fn cir_template() -> EquipmentTemplate {
    template(
        "CIR",
        "Combustion Integrated Rack",
        EquipmentType::Cir,
        0.35,
        20_000.0,
        LAB_TIME,
        12.0,
    )
}

pub fn fir_template() -> EquipmentTemplate {
    template(
        "FIR",
        "Fluids Integrated Rack",
        EquipmentType::Fir,
        0.3,
        20_000.0,
        LAB_TIME,
        10.0,
    )
}

pub fn msg_template() -> EquipmentTemplate {
    template(
        "MSG",
        "Microgravity Science Glovebox",
        EquipmentType::Msg,
        0.25,
        15_000.0,
        LAB_TIME,
        8.0,
    )
}

pub fn usu_template() -> EquipmentTemplate {
    template("USU", "Ultrasound Unit", EquipmentType::Usu, 0.2, 15_000.0, LAB_TIME, 8.0)
}

pub fn exposure_template() -> EquipmentTemplate {
    template(
        "MEP",
        "Material Exposure Platform",
        EquipmentType::Exposure,
        0.1,
        5_000.0,
        EXPOSURE_TIME,
        5.0,
    )
}

pub fn kemini_template() -> EquipmentTemplate {
    template("KL", "Kemini Lab", EquipmentType::Kemini, 0.0, 0.0, KEMINI_LAB_TIME, 10.0)
}

/// Template of every rack type, keyed by catalog part name.
pub fn all_templates() -> Vec<(&'static str, EquipmentTemplate)> {
    vec![
        ("NE.3PR", printer_template()),
        ("NE.CIR", cir_template()),
        ("NE.FIR", fir_template()),
        ("NE.MSG", msg_template()),
        ("NE.USU", usu_template()),
        ("MEP", exposure_template()),
        ("NE.KEMINI", kemini_template()),
    ]
}

/// Registry holding every rack type.
pub fn test_registry() -> Registry {
    let mut builder = RegistryBuilder::new();
    for (part, template) in all_templates() {
        builder
            .register(part, template)
            .expect("test templates are distinct");
    }
    builder.build()
}

/// Template for `equipment_type`, `None` for NONE.
pub fn template_for(equipment_type: EquipmentType) -> Option<EquipmentTemplate> {
    all_templates()
        .into_iter()
        .map(|(_, t)| t)
        .find(|t| t.equipment_type == equipment_type)
}

// ===========================================================================
// Lab host
// ===========================================================================

/// A resource host supporting `supported`, with the arena its id came from.
pub fn test_host(supported: &[EquipmentType]) -> (SlotMap<LabId, ()>, LabResources) {
    let mut labs = SlotMap::with_key();
    let id = labs.insert(());
    (labs, LabResources::new(id, supported))
}

// ===========================================================================
// TestExperiment
// ===========================================================================

pub const TEST_EXPERIMENT_MASS: f32 = 0.05;
pub const TEST_EXPERIMENT_COST: f32 = 750.0;

const ID: &str = "id";
const TYPE: &str = "type";
const STATE: &str = "state";

/// Minimal experiment: Stored -> Installed on attach, Installed -> Running
/// by its action, Running -> Finished once a unit of its step resource is
/// in the lab.
#[derive(Debug, Clone)]
pub struct TestExperiment {
    id: String,
    needed: EquipmentType,
    state: ExperimentState,
    step_resource: String,
}

impl TestExperiment {
    pub fn new(id: &str, needed: EquipmentType) -> Self {
        let step_resource = match needed {
            EquipmentType::Kemini => KEMINI_LAB_TIME,
            EquipmentType::Exposure => EXPOSURE_TIME,
            _ => LAB_TIME,
        };
        Self {
            id: id.to_string(),
            needed,
            state: ExperimentState::Stored,
            step_resource: step_resource.to_string(),
        }
    }

    pub fn set_state(&mut self, state: ExperimentState) {
        self.state = state;
    }

    pub fn step_resource(&self) -> &str {
        &self.step_resource
    }
}

impl Experiment for TestExperiment {
    fn id(&self) -> &str {
        &self.id
    }

    fn abbreviation(&self) -> &str {
        "TST"
    }

    fn state(&self) -> ExperimentState {
        self.state
    }

    fn needed_equipment(&self) -> EquipmentType {
        self.needed
    }

    fn mass(&self) -> f32 {
        TEST_EXPERIMENT_MASS
    }

    fn cost(&self) -> f32 {
        TEST_EXPERIMENT_COST
    }

    fn can_move(&self, storage: &dyn ExperimentStorageAccess) -> bool {
        self.state == ExperimentState::Finished && storage.has_free_storage(self)
    }

    fn on_installed(&mut self, _equipment: &EquipmentTemplate) {
        if self.state == ExperimentState::Stored {
            self.state = ExperimentState::Installed;
        }
    }

    fn on_paused(&mut self) {
        if self.state == ExperimentState::Running {
            self.state = ExperimentState::Paused;
        }
    }

    fn on_resumed(&mut self) {
        if self.state == ExperimentState::Paused {
            self.state = ExperimentState::Running;
        }
    }

    fn can_run_action(&self) -> bool {
        self.state == ExperimentState::Installed
    }

    fn action_string(&self) -> String {
        if self.can_run_action() {
            "Start TST".to_string()
        } else {
            String::new()
        }
    }

    fn run_action(&mut self, _lab: &mut dyn LabHost) {
        if self.state == ExperimentState::Installed {
            self.state = ExperimentState::Running;
        }
    }

    fn is_exposure(&self) -> bool {
        self.needed == EquipmentType::Exposure
    }

    fn update_check(&mut self, lab: &mut dyn LabHost) {
        if self.state == ExperimentState::Running && lab.resource_amount(&self.step_resource) >= 1.0
        {
            self.state = ExperimentState::Finished;
        }
    }

    fn save(&self) -> ConfigNode {
        let mut node = ConfigNode::new(EXPERIMENT_NODE);
        node.add_value(ID, &self.id);
        node.add_value(TYPE, self.needed);
        node.add_value(STATE, self.state);
        let mut step = ConfigNode::new(STEP_NODE);
        step.add_value(STEP_RESOURCE, &self.step_resource);
        step.add_value("amount", 1);
        node.add_node(step);
        node
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Reads records written by [`TestExperiment`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TestExperimentLoader;

impl ExperimentLoader for TestExperimentLoader {
    fn load(&self, node: &ConfigNode) -> Option<Box<dyn Experiment>> {
        let id = node.value(ID)?;
        let mut experiment =
            TestExperiment::new(id, EquipmentType::from_name(node.str_value(TYPE)));
        experiment.state = ExperimentState::from_name(node.str_value(STATE)).unwrap_or_default();
        if let Some(resource) = node.node(STEP_NODE).and_then(|s| s.value(STEP_RESOURCE)) {
            experiment.step_resource = resource.to_string();
        }
        Some(Box::new(experiment))
    }
}

// ===========================================================================
// Storage
// ===========================================================================

/// Fixed number of storage places, not bound to a vessel.
#[derive(Debug, Default)]
pub struct TestStorageBay {
    free: usize,
    stored: SlotMap<StorageId, Box<dyn Experiment>>,
    /// Report free storage but refuse every store.
    pub reject_stores: bool,
}

impl TestStorageBay {
    pub fn with_free(free: usize) -> Self {
        Self {
            free,
            ..Self::default()
        }
    }

    pub fn stored_ids(&self) -> Vec<String> {
        self.stored.values().map(|e| e.id().to_string()).collect()
    }
}

impl ExperimentStorageAccess for TestStorageBay {
    fn has_free_storage(&self, _experiment: &dyn Experiment) -> bool {
        self.free > 0
    }

    fn store(&mut self, experiment: Box<dyn Experiment>) -> Result<StorageId, Box<dyn Experiment>> {
        if self.reject_stores || self.free == 0 {
            return Err(experiment);
        }
        self.free -= 1;
        Ok(self.stored.insert(experiment))
    }
}

// ===========================================================================
// TestVessel
// ===========================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestPart {
    Lab(LabId),
    Storage(StorageId),
    /// Structure with no component the caches look for.
    Plain,
}

/// A vessel of parts. Lab parts refer to labs held elsewhere; storage parts
/// own their experiment storage. Counts full scans.
#[derive(Debug)]
pub struct TestVessel {
    id: VesselId,
    parts: Vec<TestPart>,
    lab_ids: SlotMap<LabId, ()>,
    storages: SlotMap<StorageId, Option<Box<dyn Experiment>>>,
    scans: Cell<usize>,
}

impl Default for TestVessel {
    fn default() -> Self {
        Self::new()
    }
}

impl TestVessel {
    pub fn new() -> Self {
        Self {
            id: VesselId::random(),
            parts: Vec::new(),
            lab_ids: SlotMap::with_key(),
            storages: SlotMap::with_key(),
            scans: Cell::new(0),
        }
    }

    /// `n` lab parts with ids from the vessel's own arena.
    pub fn with_labs(n: usize) -> Self {
        let mut vessel = Self::new();
        for _ in 0..n {
            vessel.add_lab();
        }
        vessel
    }

    pub fn with_storages(n: usize) -> Self {
        let mut vessel = Self::new();
        for _ in 0..n {
            vessel.add_storage();
        }
        vessel
    }

    pub fn add_lab(&mut self) -> LabId {
        let id = self.lab_ids.insert(());
        self.parts.push(TestPart::Lab(id));
        id
    }

    /// A lab part for a lab living in an external arena.
    pub fn add_lab_part(&mut self, id: LabId) {
        self.parts.push(TestPart::Lab(id));
    }

    pub fn add_storage(&mut self) -> StorageId {
        let id = self.storages.insert(None);
        self.parts.push(TestPart::Storage(id));
        id
    }

    pub fn add_plain_part(&mut self) {
        self.parts.push(TestPart::Plain);
    }

    pub fn parts(&self) -> &[TestPart] {
        &self.parts
    }

    /// Full scans run so far.
    pub fn scans(&self) -> usize {
        self.scans.get()
    }

    pub fn storage_ids(&self) -> Vec<StorageId> {
        self.parts
            .iter()
            .filter_map(|p| match p {
                TestPart::Storage(id) => Some(*id),
                _ => None,
            })
            .collect()
    }

    pub fn is_storage_free(&self, id: StorageId) -> bool {
        self.storages.get(id).is_some_and(Option::is_none)
    }

    pub fn stored(&self, id: StorageId) -> Option<&dyn Experiment> {
        self.storages.get(id).and_then(|s| s.as_deref())
    }

    /// Take an experiment back out of a storage.
    pub fn unload(&mut self, id: StorageId) -> Option<Box<dyn Experiment>> {
        self.storages.get_mut(id).and_then(Option::take)
    }

    /// Merge `other` into this vessel. The merged vessel keeps this id.
    pub fn dock(&mut self, mut other: TestVessel) {
        for part in other.parts.drain(..) {
            match part {
                TestPart::Storage(id) => {
                    let content = other.storages.remove(id).flatten();
                    let new_id = self.storages.insert(content);
                    self.parts.push(TestPart::Storage(new_id));
                }
                part => self.parts.push(part),
            }
        }
    }

    /// Split off the last `count` parts as a new vessel with a fresh id.
    pub fn undock(&mut self, count: usize) -> TestVessel {
        let split = self.parts.len().saturating_sub(count);
        let mut other = TestVessel::new();
        for part in self.parts.split_off(split) {
            match part {
                TestPart::Storage(id) => {
                    let content = self.storages.remove(id).flatten();
                    let new_id = other.storages.insert(content);
                    other.parts.push(TestPart::Storage(new_id));
                }
                part => other.parts.push(part),
            }
        }
        other
    }

    fn first_free_storage(&self) -> Option<StorageId> {
        self.storage_ids()
            .into_iter()
            .find(|&id| self.is_storage_free(id))
    }
}

impl Vessel for TestVessel {
    fn id(&self) -> VesselId {
        self.id
    }

    fn part_count(&self) -> usize {
        self.parts.len()
    }
}

impl FindComponents<LabId> for TestVessel {
    fn find_components(&self) -> Vec<LabId> {
        self.scans.set(self.scans.get() + 1);
        self.parts
            .iter()
            .filter_map(|p| match p {
                TestPart::Lab(id) => Some(*id),
                _ => None,
            })
            .collect()
    }
}

impl FindComponents<StorageId> for TestVessel {
    fn find_components(&self) -> Vec<StorageId> {
        self.scans.set(self.scans.get() + 1);
        self.storage_ids()
    }
}

impl ExperimentStorageAccess for TestVessel {
    fn has_free_storage(&self, _experiment: &dyn Experiment) -> bool {
        self.first_free_storage().is_some()
    }

    fn store(&mut self, experiment: Box<dyn Experiment>) -> Result<StorageId, Box<dyn Experiment>> {
        let Some(id) = self.first_free_storage() else {
            return Err(experiment);
        };
        match self.storages.get_mut(id) {
            Some(slot) => {
                *slot = Some(experiment);
                Ok(id)
            }
            None => Err(experiment),
        }
    }
}
