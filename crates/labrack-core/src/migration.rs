//! Load-time remapping of legacy save records.
//!
//! Older saves stored Kemini rack output as plain `LabTime`. Kemini racks
//! now produce `KeminiLabTime`, and both the equipment record and the step
//! records of its experiment are remapped when read. Every remap is
//! idempotent: current records pass through unchanged.

use tracing::debug;

use crate::equipment_type::EquipmentType;
use crate::node::ConfigNode;
use crate::resource::{KEMINI_LAB_TIME, LAB_TIME};

/// Name of an experiment step child record.
pub const STEP_NODE: &str = "Step";

/// Resource key inside a step record.
pub const STEP_RESOURCE: &str = "Res";

/// A resource identifier renamed for one equipment type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegacyResource {
    pub equipment_type: EquipmentType,
    pub legacy: &'static str,
    pub current: &'static str,
}

/// All known resource renames.
pub const LEGACY_RESOURCES: &[LegacyResource] = &[LegacyResource {
    equipment_type: EquipmentType::Kemini,
    legacy: LAB_TIME,
    current: KEMINI_LAB_TIME,
}];

fn current_name(equipment_type: EquipmentType, resource: &str) -> Option<&'static str> {
    LEGACY_RESOURCES
        .iter()
        .find(|r| r.equipment_type == equipment_type && r.legacy == resource)
        .map(|r| r.current)
}

/// The current name of `product` for equipment of `equipment_type`.
pub fn remap_product(equipment_type: EquipmentType, product: &str) -> String {
    match current_name(equipment_type, product) {
        Some(current) => {
            debug!(%equipment_type, legacy = product, current, "remapped legacy product");
            current.to_string()
        }
        None => product.to_string(),
    }
}

/// Rewrite legacy step resources in an experiment record held by
/// equipment of `equipment_type`. Returns the number of values changed.
pub fn remap_experiment_record(equipment_type: EquipmentType, record: &mut ConfigNode) -> usize {
    let mut changed = 0;
    for step in record.nodes_named_mut(STEP_NODE) {
        let Some(resource) = step.value(STEP_RESOURCE) else {
            continue;
        };
        if let Some(current) = current_name(equipment_type, resource) {
            step.set_value(STEP_RESOURCE, current);
            changed += 1;
        }
    }
    if changed > 0 {
        debug!(%equipment_type, changed, "remapped legacy experiment steps");
    }
    changed
}
