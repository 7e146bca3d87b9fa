//! One physical equipment rack.
//!
//! Equipment is either *stored* (in a container, no installation) or
//! *installed* in a lab. The installation pairs the lab with the generator
//! registered there, so a registration can never outlive its lab relation.
//!
//! Experiment calls are forwarded when an experiment is attached; without
//! one every query gives the conservative answer.

use tracing::{debug, error, warn};

use crate::equipment_type::EquipmentType;
use crate::experiment::{EXPERIMENT_NODE, Experiment, ExperimentLoader, ExperimentStorageAccess};
use crate::host::{LabHost, RateSource};
use crate::id::{GeneratorId, LabId};
use crate::migration;
use crate::node::ConfigNode;
use crate::registry::EquipmentTemplate;

/// Record tag of a persisted rack.
pub const EQUIPMENT_NODE: &str = "Equipment";

const ABBREVIATION: &str = "abbreviation";
const NAME: &str = "name";
const MASS: &str = "mass";
const COST: &str = "cost";
const TYPE: &str = "type";
const PRODUCT: &str = "product";
const PRODUCT_PER_HOUR: &str = "productPerHour";
const REACTANT: &str = "reactant";
const REACTANT_PER_PRODUCT: &str = "reactantPerProduct";

/// Where a rack is installed and which generator it registered there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Installation {
    pub lab: LabId,
    pub generator: GeneratorId,
}

#[derive(Debug)]
pub struct Equipment {
    template: EquipmentTemplate,
    installation: Option<Installation>,
    experiment: Option<Box<dyn Experiment>>,
}

impl Equipment {
    /// Stored equipment built from catalog data.
    pub fn new(template: EquipmentTemplate) -> Self {
        Self {
            template,
            installation: None,
            experiment: None,
        }
    }

    // -----------------------------------------------------------------------
    // Identity
    // -----------------------------------------------------------------------

    pub fn template(&self) -> &EquipmentTemplate {
        &self.template
    }

    pub fn abbreviation(&self) -> &str {
        &self.template.abbreviation
    }

    pub fn name(&self) -> &str {
        &self.template.name
    }

    pub fn equipment_type(&self) -> EquipmentType {
        self.template.equipment_type
    }

    pub fn product(&self) -> &str {
        &self.template.product
    }

    pub fn reactant(&self) -> &str {
        &self.template.reactant
    }

    /// Mass including the attached experiment.
    pub fn mass(&self) -> f32 {
        self.template.mass + self.experiment.as_ref().map_or(0.0, |e| e.mass())
    }

    /// Cost including the attached experiment.
    pub fn cost(&self) -> f32 {
        self.template.cost + self.experiment.as_ref().map_or(0.0, |e| e.cost())
    }

    /// Tooltip text: "name (abb)" and the lab model it is built for.
    pub fn description(&self) -> String {
        let mut desc = format!("{} ({})", self.template.name, self.template.abbreviation);
        if let Some(lab) = self.template.equipment_type.host_lab() {
            desc.push_str("\nFor ");
            desc.push_str(lab);
        }
        desc
    }

    // -----------------------------------------------------------------------
    // Installation
    // -----------------------------------------------------------------------

    pub fn installation(&self) -> Option<Installation> {
        self.installation
    }

    pub fn is_installed_in(&self, lab: LabId) -> bool {
        self.installation.is_some_and(|i| i.lab == lab)
    }

    /// Whether the last evaluation of this rack's generator produced output.
    pub fn is_running(&self, rates: &dyn RateSource) -> bool {
        self.installation
            .and_then(|i| rates.generator(i.generator))
            .is_some_and(|g| g.is_producing(&self.template.product))
    }

    /// Register this rack's generator with `lab`.
    ///
    /// A registration from an earlier install in the same lab is replaced.
    /// A rack still installed in another lab is refused and keeps that
    /// registration; returns `false` in that case.
    pub fn install(&mut self, lab: &mut dyn LabHost) -> bool {
        let lab_id = lab.lab_id();
        if let Some(previous) = self.installation {
            if previous.lab != lab_id {
                error!(
                    equipment = %self.template.abbreviation,
                    "equipment still installed in another lab"
                );
                return false;
            }
            lab.remove_generator(previous.generator);
        }
        let generator = lab.add_generator(self.template.generator());
        self.installation = Some(Installation {
            lab: lab_id,
            generator,
        });
        debug!(equipment = %self.template.abbreviation, "equipment installed");
        true
    }

    /// Withdraw the registration from `lab` and return to the stored state.
    ///
    /// Returns `false` if the rack is not installed in `lab`.
    pub fn uninstall(&mut self, lab: &mut dyn LabHost) -> bool {
        match self.installation {
            Some(installation) if installation.lab == lab.lab_id() => {
                lab.remove_generator(installation.generator);
                self.installation = None;
                debug!(equipment = %self.template.abbreviation, "equipment uninstalled");
                true
            }
            Some(_) => {
                error!(
                    equipment = %self.template.abbreviation,
                    "uninstall requested by a lab the equipment is not installed in"
                );
                false
            }
            None => false,
        }
    }

    /// Resize a tank of the lab this rack is installed in.
    pub fn set_resource_capacity(
        &self,
        lab: &mut dyn LabHost,
        resource: &str,
        capacity: f64,
    ) -> bool {
        if !self.is_installed_in(lab.lab_id()) {
            error!(
                equipment = %self.template.abbreviation,
                resource, "resource capacity change for equipment not installed in this lab"
            );
            return false;
        }
        lab.set_resource_capacity(resource, capacity);
        true
    }

    /// Amount of `resource` in the lab, 0.0 when not installed there.
    pub fn resource_amount(&self, lab: &dyn LabHost, resource: &str) -> f64 {
        if self.is_installed_in(lab.lab_id()) {
            lab.resource_amount(resource)
        } else {
            0.0
        }
    }

    // -----------------------------------------------------------------------
    // Experiment
    // -----------------------------------------------------------------------

    pub fn is_experiment_slot_free(&self) -> bool {
        self.experiment.is_none()
    }

    /// Attach `experiment`, replacing any attached one. Callers check
    /// [`is_experiment_slot_free`](Self::is_experiment_slot_free) first.
    pub fn install_experiment(&mut self, mut experiment: Box<dyn Experiment>) {
        experiment.on_installed(&self.template);
        if let Some(replaced) = self.experiment.replace(experiment) {
            warn!(
                equipment = %self.template.abbreviation,
                replaced = replaced.abbreviation(),
                "experiment overwritten"
            );
        }
    }

    pub fn experiment(&self) -> Option<&dyn Experiment> {
        self.experiment.as_deref()
    }

    pub fn experiment_mut(&mut self) -> Option<&mut (dyn Experiment + 'static)> {
        self.experiment.as_deref_mut()
    }

    /// Detach the experiment, notifying `lab` first.
    ///
    /// Returns `None` if nothing is attached or the lab refuses the removal.
    pub fn remove_experiment_data(&mut self, lab: &mut dyn LabHost) -> Option<Box<dyn Experiment>> {
        self.experiment.as_ref()?;
        if !lab.experiment_will_be_removed(self.template.equipment_type) {
            error!(
                equipment = %self.template.abbreviation,
                "lab refused experiment removal"
            );
            return None;
        }
        self.experiment.take()
    }

    pub fn can_experiment_move(&self, storage: &dyn ExperimentStorageAccess) -> bool {
        self.experiment
            .as_ref()
            .is_some_and(|e| e.can_move(storage))
    }

    /// Move the experiment into free storage on the vessel.
    ///
    /// If no storage accepts it, the experiment is reattached and `false`
    /// is returned.
    pub fn try_move_experiment(
        &mut self,
        lab: &mut dyn LabHost,
        storage: &mut dyn ExperimentStorageAccess,
    ) -> bool {
        if !self.can_experiment_move(storage) {
            return false;
        }
        let Some(mut experiment) = self.remove_experiment_data(lab) else {
            return false;
        };
        experiment.on_moved();
        match storage.store(experiment) {
            Ok(destination) => {
                debug!(
                    equipment = %self.template.abbreviation,
                    ?destination,
                    "experiment moved to storage"
                );
                true
            }
            Err(mut experiment) => {
                error!(
                    equipment = %self.template.abbreviation,
                    experiment = experiment.abbreviation(),
                    "no storage accepted the experiment, reattaching"
                );
                experiment.on_installed(&self.template);
                self.experiment = Some(experiment);
                lab.experiment_installed(self.template.equipment_type);
                false
            }
        }
    }

    pub fn experiment_action(&mut self, lab: &mut dyn LabHost) {
        if let Some(experiment) = self.experiment.as_mut() {
            experiment.run_action(lab);
        }
    }

    pub fn action_string(&self) -> String {
        self.experiment
            .as_ref()
            .map(|e| e.action_string())
            .unwrap_or_default()
    }

    pub fn can_run_experiment_action(&self) -> bool {
        self.experiment.as_ref().is_some_and(|e| e.can_run_action())
    }

    pub fn is_exposure_action(&self) -> bool {
        self.experiment.as_ref().is_some_and(|e| e.is_exposure())
    }

    pub fn update_check(&mut self, lab: &mut dyn LabHost) {
        if let Some(experiment) = self.experiment.as_mut() {
            experiment.update_check(lab);
        }
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    pub fn save(&self) -> ConfigNode {
        let mut node = write_template(&self.template);
        if let Some(experiment) = &self.experiment {
            node.add_node(experiment.save());
        }
        node
    }

    /// The record written in place of missing equipment.
    pub fn null_record() -> ConfigNode {
        write_template(&EquipmentTemplate {
            abbreviation: "empty".to_string(),
            name: "empty".to_string(),
            equipment_type: EquipmentType::None,
            mass: 0.0,
            cost: 0.0,
            product: String::new(),
            product_per_hour: 0.0,
            reactant: String::new(),
            reactant_per_product: 0.0,
        })
    }

    /// Rebuild stored equipment from a record.
    ///
    /// Returns `None` for a record with the wrong tag (logged) and for the
    /// NONE-typed record of missing equipment. Legacy resource names are
    /// remapped. An experiment record the loader does not recognize is
    /// dropped with an error.
    pub fn load(node: &ConfigNode, loader: &dyn ExperimentLoader) -> Option<Equipment> {
        if node.name != EQUIPMENT_NODE {
            error!(tag = %node.name, "invalid equipment record");
            return None;
        }
        let equipment_type = EquipmentType::from_name(node.str_value(TYPE));
        if equipment_type.is_none() {
            debug!(raw = node.str_value(TYPE), "equipment record without equipment");
            return None;
        }

        let template = EquipmentTemplate {
            abbreviation: node.str_value(ABBREVIATION).to_string(),
            name: node.str_value(NAME).to_string(),
            equipment_type,
            mass: node.f32_value(MASS),
            cost: node.f32_value(COST),
            product: migration::remap_product(equipment_type, node.str_value(PRODUCT)),
            product_per_hour: node.f32_value(PRODUCT_PER_HOUR),
            reactant: node.str_value(REACTANT).to_string(),
            reactant_per_product: node.f32_value(REACTANT_PER_PRODUCT),
        };

        let mut equipment = Equipment::new(template);
        if let Some(record) = node.node(EXPERIMENT_NODE) {
            let mut record = record.clone();
            migration::remap_experiment_record(equipment_type, &mut record);
            match loader.load(&record) {
                Some(mut experiment) => {
                    experiment.on_loaded(&equipment.template);
                    equipment.experiment = Some(experiment);
                }
                None => error!(
                    equipment = %equipment.template.abbreviation,
                    "unreadable experiment record dropped"
                ),
            }
        }
        Some(equipment)
    }
}

fn write_template(template: &EquipmentTemplate) -> ConfigNode {
    let mut node = ConfigNode::new(EQUIPMENT_NODE);
    node.add_value(ABBREVIATION, &template.abbreviation);
    node.add_value(NAME, &template.name);
    node.add_value(MASS, template.mass);
    node.add_value(COST, template.cost);
    node.add_value(TYPE, template.equipment_type);
    node.add_value(PRODUCT, &template.product);
    node.add_value(PRODUCT_PER_HOUR, template.product_per_hour);
    node.add_value(REACTANT, &template.reactant);
    node.add_value(REACTANT_PER_PRODUCT, template.reactant_per_product);
    node
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::ExperimentState;
    use crate::resource::{KEMINI_LAB_TIME, LAB_TIME};
    use crate::test_utils::*;

    #[test]
    fn mass_and_cost_include_experiment() {
        let mut eq = Equipment::new(fir_template());
        let base_mass = eq.mass();
        let base_cost = eq.cost();

        eq.install_experiment(Box::new(TestExperiment::new("ccf", EquipmentType::Fir)));
        assert_eq!(eq.mass(), base_mass + TEST_EXPERIMENT_MASS);
        assert_eq!(eq.cost(), base_cost + TEST_EXPERIMENT_COST);
    }

    #[test]
    fn install_registers_generator() {
        let (_labs, mut host) = test_host(&[EquipmentType::Fir]);
        let mut eq = Equipment::new(fir_template());
        eq.install(&mut host);

        let installation = eq.installation().unwrap();
        assert_eq!(installation.lab, host.lab_id());
        let generator = host.generator(installation.generator).unwrap();
        assert_eq!(generator.rate(LAB_TIME).unwrap().ratio, -1.0);
        assert!(!eq.is_running(&host));
    }

    #[test]
    fn reinstall_replaces_registration() {
        let (_labs, mut host) = test_host(&[EquipmentType::Fir]);
        let mut eq = Equipment::new(fir_template());
        eq.install(&mut host);
        let first = eq.installation().unwrap().generator;
        eq.install(&mut host);
        assert_eq!(host.generator_count(), 1);
        assert!(host.generator(first).is_none());
    }

    #[test]
    fn running_follows_recorded_flow() {
        let (_labs, mut host) = test_host(&[EquipmentType::Fir]);
        let mut eq = Equipment::new(fir_template());
        eq.install(&mut host);
        let id = eq.installation().unwrap().generator;

        host.generator_mut(id).unwrap().record_produced(LAB_TIME, -0.25);
        assert!(eq.is_running(&host));
        host.generator_mut(id).unwrap().record_produced(LAB_TIME, 0.0);
        assert!(!eq.is_running(&host));
    }

    #[test]
    fn install_elsewhere_is_refused() {
        let (mut labs, mut first) = test_host(&[EquipmentType::Fir]);
        let mut second = crate::host::LabResources::new(labs.insert(()), &[EquipmentType::Fir]);
        let mut eq = Equipment::new(fir_template());
        assert!(eq.install(&mut first));
        let generator = eq.installation().unwrap().generator;

        assert!(!eq.install(&mut second));
        assert_eq!(second.generator_count(), 0);
        assert_eq!(first.generator_count(), 1);
        assert!(eq.is_installed_in(first.lab_id()));
        assert_eq!(eq.installation().unwrap().generator, generator);

        // Moving is uninstall then install.
        assert!(eq.uninstall(&mut first));
        assert!(eq.install(&mut second));
        assert_eq!(first.generator_count(), 0);
        assert!(eq.is_installed_in(second.lab_id()));
    }

    #[test]
    fn uninstall_withdraws_registration() {
        let (_labs, mut host) = test_host(&[EquipmentType::Fir]);
        let mut eq = Equipment::new(fir_template());
        eq.install(&mut host);
        assert!(eq.uninstall(&mut host));
        assert!(eq.installation().is_none());
        assert_eq!(host.generator_count(), 0);
        assert!(!eq.is_running(&host));
        assert!(!eq.uninstall(&mut host));
    }

    #[test]
    fn uninstall_from_wrong_lab_is_refused() {
        let (mut labs, mut host) = test_host(&[EquipmentType::Fir]);
        let mut other = crate::host::LabResources::new(labs.insert(()), &[EquipmentType::Fir]);
        let mut eq = Equipment::new(fir_template());
        eq.install(&mut host);
        assert!(!eq.uninstall(&mut other));
        assert!(eq.is_installed_in(host.lab_id()));
    }

    #[test]
    fn removing_experiment_calls_hook_first() {
        let (_labs, mut host) = test_host(&[EquipmentType::Fir]);
        let mut eq = Equipment::new(fir_template());
        eq.install(&mut host);
        eq.install_experiment(Box::new(TestExperiment::new("ccf", EquipmentType::Fir)));
        host.experiment_installed(EquipmentType::Fir);

        let exp = eq.remove_experiment_data(&mut host).unwrap();
        assert_eq!(exp.id(), "ccf");
        assert!(eq.is_experiment_slot_free());
        assert!(!host.experiment_present(EquipmentType::Fir));
        assert!(eq.remove_experiment_data(&mut host).is_none());
    }

    #[test]
    fn refused_removal_keeps_experiment() {
        let (_labs, mut host) = test_host(&[EquipmentType::Msg]);
        let mut eq = Equipment::new(fir_template());
        eq.install_experiment(Box::new(TestExperiment::new("ccf", EquipmentType::Fir)));
        assert!(eq.remove_experiment_data(&mut host).is_none());
        assert!(!eq.is_experiment_slot_free());
    }

    #[test]
    fn forwarding_without_experiment_is_conservative() {
        let (_labs, mut host) = test_host(&[EquipmentType::Fir]);
        let mut eq = Equipment::new(fir_template());
        let storage = TestStorageBay::with_free(1);
        assert!(!eq.can_experiment_move(&storage));
        assert!(!eq.can_run_experiment_action());
        assert!(!eq.is_exposure_action());
        assert_eq!(eq.action_string(), "");
        eq.experiment_action(&mut host);
        eq.update_check(&mut host);
        assert!(eq.experiment().is_none());
    }

    #[test]
    fn move_into_free_storage() {
        let (_labs, mut host) = test_host(&[EquipmentType::Fir]);
        let mut eq = Equipment::new(fir_template());
        eq.install(&mut host);
        let mut exp = TestExperiment::new("ccf", EquipmentType::Fir);
        exp.set_state(ExperimentState::Finished);
        eq.install_experiment(Box::new(exp));
        let mut storage = TestStorageBay::with_free(1);

        assert!(eq.can_experiment_move(&storage));
        assert!(eq.try_move_experiment(&mut host, &mut storage));
        assert!(eq.is_experiment_slot_free());
        assert_eq!(storage.stored_ids(), vec!["ccf".to_string()]);
    }

    #[test]
    fn failed_store_reattaches_experiment() {
        let (_labs, mut host) = test_host(&[EquipmentType::Fir]);
        let mut eq = Equipment::new(fir_template());
        eq.install(&mut host);
        let mut exp = TestExperiment::new("ccf", EquipmentType::Fir);
        exp.set_state(ExperimentState::Finished);
        eq.install_experiment(Box::new(exp));

        // Reports free storage but rejects the store.
        let mut storage = TestStorageBay::with_free(1);
        storage.reject_stores = true;
        assert!(!eq.try_move_experiment(&mut host, &mut storage));
        assert_eq!(eq.experiment().unwrap().id(), "ccf");
        assert!(host.experiment_present(EquipmentType::Fir));
    }

    #[test]
    fn resource_access_requires_installation() {
        let (_labs, mut host) = test_host(&[EquipmentType::Fir]);
        let mut eq = Equipment::new(fir_template());
        assert!(!eq.set_resource_capacity(&mut host, LAB_TIME, 10.0));
        assert_eq!(eq.resource_amount(&host, LAB_TIME), 0.0);

        eq.install(&mut host);
        assert!(eq.set_resource_capacity(&mut host, LAB_TIME, 10.0));
        host.set_resource_amount(LAB_TIME, 4.0);
        assert_eq!(eq.resource_amount(&host, LAB_TIME), 4.0);
    }

    #[test]
    fn description_names_host_lab() {
        assert_eq!(
            Equipment::new(fir_template()).description(),
            "Fluids Integrated Rack (FIR)\nFor MSL-1000"
        );
        assert_eq!(
            Equipment::new(usu_template()).description(),
            "Ultrasound Unit (USU)\nFor MPL-600"
        );
        assert_eq!(
            Equipment::new(kemini_template()).description(),
            "Kemini Lab (KL)"
        );
    }

    #[test]
    fn record_round_trip() {
        let mut eq = Equipment::new(msg_template());
        eq.install_experiment(Box::new(TestExperiment::new("msg-1", EquipmentType::Msg)));
        let node = eq.save();
        assert_eq!(node.name, EQUIPMENT_NODE);

        let back = Equipment::load(&node, &TestExperimentLoader).unwrap();
        assert_eq!(back.template(), eq.template());
        assert_eq!(back.experiment().unwrap().id(), "msg-1");
        assert!(back.installation().is_none());
    }

    #[test]
    fn wrong_tag_loads_nothing() {
        let mut node = Equipment::new(fir_template()).save();
        node.name = "NE_LabEquipment".to_string();
        assert!(Equipment::load(&node, &TestExperimentLoader).is_none());
    }

    #[test]
    fn null_record_loads_nothing() {
        let node = Equipment::null_record();
        assert_eq!(node.value("type"), Some("NONE"));
        assert_eq!(node.value("name"), Some("empty"));
        assert!(Equipment::load(&node, &TestExperimentLoader).is_none());
    }

    #[test]
    fn legacy_kemini_product_is_remapped_on_load() {
        let mut node = Equipment::new(kemini_template()).save();
        node.set_value("product", LAB_TIME);
        let eq = Equipment::load(&node, &TestExperimentLoader).unwrap();
        assert_eq!(eq.product(), KEMINI_LAB_TIME);
    }

    #[test]
    fn unknown_experiment_record_is_dropped() {
        let mut node = Equipment::new(fir_template()).save();
        node.add_node(ConfigNode::new(EXPERIMENT_NODE));
        let eq = Equipment::load(&node, &TestExperimentLoader).unwrap();
        assert!(eq.is_experiment_slot_free());
    }
}
