use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::equipment::Equipment;
use crate::equipment_type::EquipmentType;
use crate::resource::Generator;

/// Static data of one rack type, read from its catalog part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquipmentTemplate {
    pub abbreviation: String,
    pub name: String,
    pub equipment_type: EquipmentType,
    pub mass: f32,
    pub cost: f32,
    pub product: String,
    pub product_per_hour: f32,
    pub reactant: String,
    pub reactant_per_product: f32,
}

impl EquipmentTemplate {
    /// The generator this rack registers with a lab when installed.
    pub fn generator(&self) -> Generator {
        Generator::conversion(
            &self.product,
            f64::from(self.product_per_hour),
            &self.reactant,
            f64::from(self.reactant_per_product),
        )
    }
}

/// Decides which catalog parts the player has unlocked.
pub trait Progression {
    fn is_part_purchased(&self, part_name: &str) -> bool;
}

/// Progression with every part unlocked (sandbox games).
#[derive(Debug, Clone, Copy, Default)]
pub struct Unrestricted;

impl Progression for Unrestricted {
    fn is_part_purchased(&self, _part_name: &str) -> bool {
        true
    }
}

impl Progression for std::collections::HashSet<String> {
    fn is_part_purchased(&self, part_name: &str) -> bool {
        self.contains(part_name)
    }
}

#[derive(Debug, Clone)]
struct Entry {
    part_name: String,
    template: EquipmentTemplate,
}

/// Builder for the immutable equipment [`Registry`].
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    entries: Vec<Entry>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the template discovered from catalog part `part_name`.
    pub fn register(
        &mut self,
        part_name: &str,
        template: EquipmentTemplate,
    ) -> Result<(), RegistryError> {
        let equipment_type = template.equipment_type;
        if equipment_type.is_none() {
            return Err(RegistryError::NoneType(part_name.to_string()));
        }
        if self
            .entries
            .iter()
            .any(|e| e.template.equipment_type == equipment_type)
        {
            return Err(RegistryError::DuplicateType(equipment_type));
        }
        if self.entries.iter().any(|e| e.part_name == part_name) {
            return Err(RegistryError::DuplicatePart(part_name.to_string()));
        }
        self.entries.push(Entry {
            part_name: part_name.to_string(),
            template,
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn build(self) -> Registry {
        let by_type = self
            .entries
            .iter()
            .enumerate()
            .map(|(idx, e)| (e.template.equipment_type, idx))
            .collect();
        Registry {
            entries: self.entries,
            by_type,
        }
    }
}

/// Frozen mapping from rack type to its template.
#[derive(Debug, Clone)]
pub struct Registry {
    entries: Vec<Entry>,
    by_type: HashMap<EquipmentType, usize>,
}

impl Registry {
    pub fn template(&self, equipment_type: EquipmentType) -> Option<&EquipmentTemplate> {
        self.by_type
            .get(&equipment_type)
            .map(|&idx| &self.entries[idx].template)
    }

    pub fn part_name(&self, equipment_type: EquipmentType) -> Option<&str> {
        self.by_type
            .get(&equipment_type)
            .map(|&idx| self.entries[idx].part_name.as_str())
    }

    /// Fresh, uninstalled equipment of `equipment_type`.
    pub fn lookup(&self, equipment_type: EquipmentType) -> Option<Equipment> {
        match self.template(equipment_type) {
            Some(template) => Some(Equipment::new(template.clone())),
            None => {
                error!(%equipment_type, "no catalog entry for equipment type");
                None
            }
        }
    }

    /// Equipment whose part the player has unlocked, in registration order.
    pub fn available_equipment(&self, progression: &dyn Progression) -> Vec<Equipment> {
        self.entries
            .iter()
            .filter(|e| progression.is_part_purchased(&e.part_name))
            .map(|e| Equipment::new(e.template.clone()))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &EquipmentTemplate)> {
        self.entries
            .iter()
            .map(|e| (e.part_name.as_str(), &e.template))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("equipment type {0} registered twice")]
    DuplicateType(EquipmentType),
    #[error("part '{0}' registered twice")]
    DuplicatePart(String),
    #[error("part '{0}' declares no equipment type")]
    NoneType(String),
}
