//! Serde data file structs for the equipment catalog and runtime settings.
//!
//! These structs define the on-disk format of `equipment.*` and
//! `settings.*`. They are deserialized from RON, JSON, or TOML data files
//! and then resolved into core types by the loader.

use labrack_core::cache::{CacheConfig, Retention};
use serde::{Deserialize, Serialize};

use crate::logging::LogFormat;

// ===========================================================================
// Equipment catalog
// ===========================================================================

/// One rack type as discovered from its catalog part.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EquipmentData {
    /// Catalog part name, used for progression checks.
    pub part: String,
    /// Rack type name, e.g. `"FIR"`. Matched case-insensitively.
    #[serde(rename = "type")]
    pub equipment_type: String,
    pub abbreviation: String,
    pub name: String,
    #[serde(default)]
    pub mass: f32,
    #[serde(default)]
    pub cost: f32,
    pub product: String,
    pub product_per_hour: f32,
    #[serde(default)]
    pub reactant: String,
    #[serde(default)]
    pub reactant_per_product: f32,
}

// ===========================================================================
// Settings
// ===========================================================================

/// Runtime settings. Every field is optional in the file.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SettingsData {
    /// Log at `debug` instead of `info`.
    pub debug: bool,
    pub log_format: LogFormat,
    pub lab_cache: CacheSettings,
    pub storage_cache: CacheSettings,
    /// Own lab-time production of lab models, by lab abbreviation.
    pub lab_time: Vec<LabTimeData>,
}

/// Overrides for one cache. Unset fields keep the cache's preset.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheSettings {
    pub retention: Option<Retention>,
    pub revert_guard: Option<bool>,
}

impl CacheSettings {
    pub fn apply(&self, preset: CacheConfig) -> CacheConfig {
        CacheConfig {
            retention: self.retention.unwrap_or(preset.retention),
            revert_guard: self.revert_guard.unwrap_or(preset.revert_guard),
        }
    }
}

/// Lab-time generator of a lab part.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LabTimeData {
    /// Lab abbreviation: `"MSL"`, `"MPL"` or `"KL"`.
    pub lab: String,
    pub lab_time_per_hour: f32,
    pub charge_per_lab_time: f32,
}
