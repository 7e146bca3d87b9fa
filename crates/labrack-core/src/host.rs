//! The lab side of an installation: generator registrations, resource tanks
//! and the experiment-removal hook.
//!
//! Equipment never owns its lab. It talks to the lab through [`LabHost`],
//! which the concrete [`LabResources`] implements. Tests and alternative
//! hosts can provide their own implementation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use slotmap::SlotMap;
use tracing::{debug, error};

use crate::equipment_type::EquipmentType;
use crate::id::{GeneratorId, LabId};
use crate::resource::Generator;

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Read access to registered generators, used by running-state queries.
pub trait RateSource {
    fn generator(&self, id: GeneratorId) -> Option<&Generator>;
}

/// Everything installed equipment needs from the lab it sits in.
pub trait LabHost: RateSource {
    fn lab_id(&self) -> LabId;

    /// Register a generator. The host evaluates it every tick from now on.
    fn add_generator(&mut self, generator: Generator) -> GeneratorId;

    /// Withdraw a registration. Returns the generator if it was registered.
    fn remove_generator(&mut self, id: GeneratorId) -> Option<Generator>;

    /// Set the capacity of a resource tank.
    ///
    /// A positive capacity creates the tank (empty) or resizes it; a
    /// capacity of zero or less removes it.
    fn set_resource_capacity(&mut self, resource: &str, capacity: f64);

    /// Amount held in a tank, 0.0 if the lab has no such tank.
    fn resource_amount(&self, resource: &str) -> f64;

    /// Called after an experiment was attached to equipment of
    /// `equipment_type` installed here.
    fn experiment_installed(&mut self, equipment_type: EquipmentType) {
        let _ = equipment_type;
    }

    /// Called before an experiment is detached from equipment of
    /// `equipment_type`. Returning `false` refuses the removal.
    fn experiment_will_be_removed(&mut self, equipment_type: EquipmentType) -> bool;
}

// ---------------------------------------------------------------------------
// LabResources
// ---------------------------------------------------------------------------

/// A resource tank held by a lab part.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Tank {
    pub amount: f64,
    pub capacity: f64,
}

/// The concrete resource host owned by every [`Lab`](crate::lab::Lab).
#[derive(Debug, Clone)]
pub struct LabResources {
    lab: LabId,
    supported: Vec<EquipmentType>,
    generators: SlotMap<GeneratorId, Generator>,
    tanks: BTreeMap<String, Tank>,
    experiment_present: BTreeMap<EquipmentType, bool>,
}

impl LabResources {
    /// Host for lab `lab` accepting equipment of the `supported` types.
    pub fn new(lab: LabId, supported: &[EquipmentType]) -> Self {
        Self {
            lab,
            supported: supported.to_vec(),
            generators: SlotMap::with_key(),
            tanks: BTreeMap::new(),
            experiment_present: supported.iter().map(|&t| (t, false)).collect(),
        }
    }

    pub fn supports(&self, equipment_type: EquipmentType) -> bool {
        self.supported.contains(&equipment_type)
    }

    pub fn generators(&self) -> impl Iterator<Item = (GeneratorId, &Generator)> {
        self.generators.iter()
    }

    pub fn generator_count(&self) -> usize {
        self.generators.len()
    }

    /// Host side: mutable access for recording evaluated flows.
    pub fn generator_mut(&mut self, id: GeneratorId) -> Option<&mut Generator> {
        self.generators.get_mut(id)
    }

    pub fn tank(&self, resource: &str) -> Option<&Tank> {
        self.tanks.get(resource)
    }

    /// Set the amount in an existing tank, clamped to its capacity.
    /// Returns `false` if there is no such tank.
    pub fn set_resource_amount(&mut self, resource: &str, amount: f64) -> bool {
        match self.tanks.get_mut(resource) {
            Some(tank) => {
                tank.amount = amount.clamp(0.0, tank.capacity);
                true
            }
            None => false,
        }
    }

    pub fn experiment_present(&self, equipment_type: EquipmentType) -> bool {
        self.experiment_present
            .get(&equipment_type)
            .copied()
            .unwrap_or(false)
    }
}

impl RateSource for LabResources {
    fn generator(&self, id: GeneratorId) -> Option<&Generator> {
        self.generators.get(id)
    }
}

impl LabHost for LabResources {
    fn lab_id(&self) -> LabId {
        self.lab
    }

    fn add_generator(&mut self, generator: Generator) -> GeneratorId {
        self.generators.insert(generator)
    }

    fn remove_generator(&mut self, id: GeneratorId) -> Option<Generator> {
        self.generators.remove(id)
    }

    fn set_resource_capacity(&mut self, resource: &str, capacity: f64) {
        if capacity > 0.0 {
            let tank = self.tanks.entry(resource.to_string()).or_default();
            tank.capacity = capacity;
            tank.amount = tank.amount.min(capacity);
            debug!(resource, capacity, "tank capacity set");
        } else if self.tanks.remove(resource).is_some() {
            debug!(resource, "tank removed");
        }
    }

    fn resource_amount(&self, resource: &str) -> f64 {
        self.tanks.get(resource).map_or(0.0, |t| t.amount)
    }

    fn experiment_installed(&mut self, equipment_type: EquipmentType) {
        if let Some(present) = self.experiment_present.get_mut(&equipment_type) {
            *present = true;
        }
    }

    fn experiment_will_be_removed(&mut self, equipment_type: EquipmentType) -> bool {
        match self.experiment_present.get_mut(&equipment_type) {
            Some(present) => {
                *present = false;
                true
            }
            None => {
                error!(
                    %equipment_type,
                    "experiment removal requested for equipment this lab cannot host"
                );
                false
            }
        }
    }
}
