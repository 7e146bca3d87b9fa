//! Resolution pipeline: reads data files, resolves type names, builds the
//! equipment registry and lab kinds.
//!
//! Provides format detection (RON/JSON/TOML), file discovery, and
//! deserialization helpers used by [`load_lab_data`].

use std::path::{Path, PathBuf};
use std::str::FromStr;

use labrack_core::cache::CacheConfig;
use labrack_core::equipment_type::EquipmentType;
use labrack_core::lab::{LabKind, LabTimeRate};
use labrack_core::registry::{EquipmentTemplate, Registry, RegistryBuilder, RegistryError};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::logging::LoggingConfig;
use crate::schema::{EquipmentData, SettingsData};

/// Base name of the required equipment catalog file.
pub const EQUIPMENT_FILE: &str = "equipment";

/// Base name of the optional settings file.
pub const SETTINGS_FILE: &str = "settings";

// ===========================================================================
// Errors
// ===========================================================================

/// Errors that can occur during data loading.
#[derive(Debug, thiserror::Error)]
pub enum DataLoadError {
    /// A required data file was not found in the given directory.
    #[error("required file '{file}' not found in {dir}")]
    MissingRequired { file: String, dir: PathBuf },

    /// The file has an extension we don't support.
    #[error("unsupported format for file: {file}")]
    UnsupportedFormat { file: PathBuf },

    /// Two files with the same base name but different formats exist.
    #[error("conflicting formats: {a} and {b}")]
    ConflictingFormats { a: PathBuf, b: PathBuf },

    /// A deserialization error occurred.
    #[error("parse error in {file}: {detail}")]
    Parse { file: PathBuf, detail: String },

    /// A name reference could not be resolved.
    #[error("unresolved {expected_kind} reference '{name}' in {file}")]
    UnresolvedRef {
        file: PathBuf,
        name: String,
        expected_kind: &'static str,
    },

    /// A duplicate name was found.
    #[error("duplicate name '{name}' in {file}")]
    DuplicateName { file: PathBuf, name: String },

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ===========================================================================
// Format detection
// ===========================================================================

/// Supported data file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Ron,
    Toml,
    Json,
}

/// Detect the format of a file based on its extension.
pub fn detect_format(path: &Path) -> Result<Format, DataLoadError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("ron") => Ok(Format::Ron),
        Some("toml") => Ok(Format::Toml),
        Some("json") => Ok(Format::Json),
        _ => Err(DataLoadError::UnsupportedFormat {
            file: path.to_path_buf(),
        }),
    }
}

// ===========================================================================
// File discovery
// ===========================================================================

/// Scan a directory for a data file with the given base name (without extension).
///
/// Looks for `{base_name}.ron`, `{base_name}.toml`, and `{base_name}.json`.
/// Returns `Ok(None)` if no file is found, or `Err(ConflictingFormats)` if
/// multiple formats exist for the same base name.
pub fn find_data_file(dir: &Path, base_name: &str) -> Result<Option<PathBuf>, DataLoadError> {
    let mut found: Option<PathBuf> = None;

    for ext in ["ron", "toml", "json"] {
        let candidate = dir.join(format!("{base_name}.{ext}"));
        if candidate.exists() {
            if let Some(existing) = found {
                return Err(DataLoadError::ConflictingFormats {
                    a: existing,
                    b: candidate,
                });
            }
            found = Some(candidate);
        }
    }

    Ok(found)
}

/// Like [`find_data_file`], but returns an error if no file is found.
pub fn require_data_file(dir: &Path, base_name: &str) -> Result<PathBuf, DataLoadError> {
    find_data_file(dir, base_name)?.ok_or_else(|| DataLoadError::MissingRequired {
        file: base_name.to_string(),
        dir: dir.to_path_buf(),
    })
}

// ===========================================================================
// Deserialization
// ===========================================================================

fn parse_error(path: &Path, detail: impl ToString) -> DataLoadError {
    DataLoadError::Parse {
        file: path.to_path_buf(),
        detail: detail.to_string(),
    }
}

/// Read a file and deserialize it according to its format (detected from extension).
pub fn deserialize_file<T: DeserializeOwned>(path: &Path) -> Result<T, DataLoadError> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;

    match format {
        Format::Ron => ron::from_str(&content).map_err(|e| parse_error(path, e)),
        Format::Json => serde_json::from_str(&content).map_err(|e| parse_error(path, e)),
        Format::Toml => toml::from_str(&content).map_err(|e| parse_error(path, e)),
    }
}

/// Deserialize a list from a file. For TOML files, extracts the array at the
/// given `toml_key` from a top-level table. For RON and JSON, deserializes
/// directly as `Vec<T>`.
pub fn deserialize_list<T: DeserializeOwned>(
    path: &Path,
    toml_key: &str,
) -> Result<Vec<T>, DataLoadError> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;

    match format {
        Format::Ron => ron::from_str(&content).map_err(|e| parse_error(path, e)),
        Format::Json => serde_json::from_str(&content).map_err(|e| parse_error(path, e)),
        Format::Toml => {
            let table: toml::Value = toml::from_str(&content).map_err(|e| parse_error(path, e))?;
            let array = table
                .get(toml_key)
                .ok_or_else(|| parse_error(path, format!("missing key '{toml_key}' in TOML file")))?
                .clone();
            array
                .try_into()
                .map_err(|e: toml::de::Error| parse_error(path, e))
        }
    }
}

// ===========================================================================
// Resolution
// ===========================================================================

/// Resolve catalog entries into a frozen registry.
///
/// Unknown or NONE type names are unresolved references; a second entry for
/// a type or part is a duplicate.
pub fn build_registry(entries: Vec<EquipmentData>, file: &Path) -> Result<Registry, DataLoadError> {
    let mut builder = RegistryBuilder::new();
    for entry in entries {
        let equipment_type = EquipmentType::from_str(&entry.equipment_type)
            .ok()
            .filter(|t| !t.is_none())
            .ok_or_else(|| DataLoadError::UnresolvedRef {
                file: file.to_path_buf(),
                name: entry.equipment_type.clone(),
                expected_kind: "equipment type",
            })?;
        let template = EquipmentTemplate {
            abbreviation: entry.abbreviation,
            name: entry.name,
            equipment_type,
            mass: entry.mass,
            cost: entry.cost,
            product: entry.product,
            product_per_hour: entry.product_per_hour,
            reactant: entry.reactant,
            reactant_per_product: entry.reactant_per_product,
        };
        builder
            .register(&entry.part, template)
            .map_err(|err| match err {
                RegistryError::DuplicateType(t) => DataLoadError::DuplicateName {
                    file: file.to_path_buf(),
                    name: t.to_string(),
                },
                RegistryError::DuplicatePart(name) => DataLoadError::DuplicateName {
                    file: file.to_path_buf(),
                    name,
                },
                RegistryError::NoneType(name) => DataLoadError::UnresolvedRef {
                    file: file.to_path_buf(),
                    name,
                    expected_kind: "equipment type",
                },
            })?;
        debug!(part = %entry.part, %equipment_type, "equipment registered");
    }
    Ok(builder.build())
}

/// The built-in lab kinds with lab-time generators from `settings` applied.
pub fn lab_kinds(settings: &SettingsData, file: &Path) -> Result<Vec<LabKind>, DataLoadError> {
    let mut kinds = vec![LabKind::msl(), LabKind::mpl(), LabKind::kemini()];
    for entry in &settings.lab_time {
        let kind = kinds
            .iter_mut()
            .find(|k| k.abbreviation.eq_ignore_ascii_case(&entry.lab))
            .ok_or_else(|| DataLoadError::UnresolvedRef {
                file: file.to_path_buf(),
                name: entry.lab.clone(),
                expected_kind: "lab",
            })?;
        kind.lab_time = Some(LabTimeRate {
            lab_time_per_hour: entry.lab_time_per_hour,
            charge_per_lab_time: entry.charge_per_lab_time,
        });
    }
    Ok(kinds)
}

// ===========================================================================
// Top-level loading
// ===========================================================================

/// Everything read from a data directory.
#[derive(Debug)]
pub struct LabData {
    pub registry: Registry,
    pub lab_kinds: Vec<LabKind>,
    pub settings: SettingsData,
}

impl LabData {
    pub fn lab_kind(&self, abbreviation: &str) -> Option<&LabKind> {
        self.lab_kinds
            .iter()
            .find(|k| k.abbreviation.eq_ignore_ascii_case(abbreviation))
    }

    pub fn lab_cache_config(&self) -> CacheConfig {
        self.settings.lab_cache.apply(CacheConfig::LABS)
    }

    pub fn storage_cache_config(&self) -> CacheConfig {
        self.settings.storage_cache.apply(CacheConfig::STORAGE)
    }

    pub fn logging_config(&self) -> LoggingConfig {
        LoggingConfig::from_settings(&self.settings)
    }
}

/// Load the equipment catalog (required) and settings (optional) from `dir`.
pub fn load_lab_data(dir: &Path) -> Result<LabData, DataLoadError> {
    let equipment_path = require_data_file(dir, EQUIPMENT_FILE)?;
    let entries: Vec<EquipmentData> = deserialize_list(&equipment_path, "equipment")?;
    let registry = build_registry(entries, &equipment_path)?;

    let (settings, settings_path) = match find_data_file(dir, SETTINGS_FILE)? {
        Some(path) => (deserialize_file::<SettingsData>(&path)?, path),
        None => (SettingsData::default(), dir.join(SETTINGS_FILE)),
    };
    let lab_kinds = lab_kinds(&settings, &settings_path)?;

    info!(
        dir = %dir.display(),
        equipment = registry.len(),
        "lab data loaded"
    );
    Ok(LabData {
        registry,
        lab_kinds,
        settings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    /// Create a temporary directory with a unique name for test isolation.
    fn make_test_dir(suffix: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "labrack_data_test_{suffix}_{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    /// Clean up a test directory.
    fn cleanup(dir: &Path) {
        let _ = fs::remove_dir_all(dir);
    }

    const FIR_RON: &str = r#"[
        (
            part: "NE.FIR",
            type: "FIR",
            abbreviation: "FIR",
            name: "Fluids Integrated Rack",
            mass: 0.3,
            cost: 20000.0,
            product: "LabTime",
            product_per_hour: 1.0,
            reactant: "ElectricCharge",
            reactant_per_product: 10.0,
        ),
    ]"#;

    // -----------------------------------------------------------------------
    // detect_format / discovery
    // -----------------------------------------------------------------------

    #[test]
    fn detect_formats() {
        assert_eq!(detect_format(Path::new("a.ron")).unwrap(), Format::Ron);
        assert_eq!(detect_format(Path::new("a.toml")).unwrap(), Format::Toml);
        assert_eq!(detect_format(Path::new("a.json")).unwrap(), Format::Json);
        assert!(matches!(
            detect_format(Path::new("a.yaml")),
            Err(DataLoadError::UnsupportedFormat { .. })
        ));
        assert!(detect_format(Path::new("equipment")).is_err());
    }

    #[test]
    fn find_data_file_missing() {
        let dir = make_test_dir("find_missing");
        assert!(find_data_file(&dir, "equipment").unwrap().is_none());
        let err = require_data_file(&dir, "equipment").unwrap_err();
        assert!(matches!(err, DataLoadError::MissingRequired { ref file, .. } if file == "equipment"));
        cleanup(&dir);
    }

    #[test]
    fn find_data_file_conflict() {
        let dir = make_test_dir("find_conflict");
        fs::write(dir.join("settings.ron"), "()").unwrap();
        fs::write(dir.join("settings.json"), "{}").unwrap();
        assert!(matches!(
            find_data_file(&dir, "settings"),
            Err(DataLoadError::ConflictingFormats { .. })
        ));
        cleanup(&dir);
    }

    // -----------------------------------------------------------------------
    // deserialize_list
    // -----------------------------------------------------------------------

    #[test]
    fn deserialize_list_toml() {
        let dir = make_test_dir("list_toml");
        let path = dir.join("equipment.toml");
        fs::write(
            &path,
            r#"
[[equipment]]
part = "NE.MSG"
type = "msg"
abbreviation = "MSG"
name = "Microgravity Science Glovebox"
product = "LabTime"
product_per_hour = 1.0
"#,
        )
        .unwrap();
        let list: Vec<EquipmentData> = deserialize_list(&path, "equipment").unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].part, "NE.MSG");
        cleanup(&dir);
    }

    #[test]
    fn deserialize_list_toml_missing_key() {
        let dir = make_test_dir("list_toml_key");
        let path = dir.join("equipment.toml");
        fs::write(&path, "other = 1\n").unwrap();
        let err = deserialize_list::<EquipmentData>(&path, "equipment").unwrap_err();
        assert!(err.to_string().contains("missing key 'equipment'"));
        cleanup(&dir);
    }

    #[test]
    fn deserialize_file_parse_error() {
        let dir = make_test_dir("parse_error");
        let path = dir.join("settings.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            deserialize_file::<SettingsData>(&path),
            Err(DataLoadError::Parse { .. })
        ));
        cleanup(&dir);
    }

    // -----------------------------------------------------------------------
    // Resolution
    // -----------------------------------------------------------------------

    fn entry(part: &str, equipment_type: &str) -> EquipmentData {
        EquipmentData {
            part: part.to_string(),
            equipment_type: equipment_type.to_string(),
            abbreviation: equipment_type.to_uppercase(),
            name: part.to_string(),
            mass: 0.1,
            cost: 1.0,
            product: "LabTime".to_string(),
            product_per_hour: 1.0,
            reactant: String::new(),
            reactant_per_product: 0.0,
        }
    }

    #[test]
    fn registry_from_entries() {
        let file = Path::new("equipment.ron");
        let registry =
            build_registry(vec![entry("NE.FIR", "fir"), entry("NE.USU", "USU")], file).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.part_name(EquipmentType::Usu), Some("NE.USU"));
    }

    #[test]
    fn unknown_type_is_unresolved() {
        let file = Path::new("equipment.ron");
        let err = build_registry(vec![entry("NE.XYZ", "XYZ")], file).unwrap_err();
        assert!(matches!(
            err,
            DataLoadError::UnresolvedRef { expected_kind: "equipment type", .. }
        ));
        let err = build_registry(vec![entry("NE.EMPTY", "none")], file).unwrap_err();
        assert!(matches!(err, DataLoadError::UnresolvedRef { .. }));
    }

    #[test]
    fn duplicate_type_is_rejected() {
        let file = Path::new("equipment.ron");
        let err =
            build_registry(vec![entry("NE.FIR", "FIR"), entry("NE.FIR2", "FIR")], file).unwrap_err();
        assert!(matches!(err, DataLoadError::DuplicateName { ref name, .. } if name == "FIR"));
    }

    #[test]
    fn lab_time_applies_to_named_lab() {
        let mut settings = SettingsData::default();
        settings.lab_time.push(crate::schema::LabTimeData {
            lab: "msl".to_string(),
            lab_time_per_hour: 2.0,
            charge_per_lab_time: 5.0,
        });
        let kinds = lab_kinds(&settings, Path::new("settings.ron")).unwrap();
        assert_eq!(kinds[0].lab_time.unwrap().lab_time_per_hour, 2.0);
        assert!(kinds[1].lab_time.is_none());

        settings.lab_time[0].lab = "ISS".to_string();
        assert!(lab_kinds(&settings, Path::new("settings.ron")).is_err());
    }

    // -----------------------------------------------------------------------
    // load_lab_data
    // -----------------------------------------------------------------------

    #[test]
    fn load_without_settings_uses_defaults() {
        let dir = make_test_dir("load_defaults");
        fs::write(dir.join("equipment.ron"), FIR_RON).unwrap();
        let data = load_lab_data(&dir).unwrap();
        assert_eq!(data.registry.len(), 1);
        assert_eq!(data.lab_kinds.len(), 3);
        assert_eq!(data.lab_cache_config(), CacheConfig::LABS);
        assert_eq!(data.storage_cache_config(), CacheConfig::STORAGE);
        assert_eq!(data.logging_config().level, "info");
        cleanup(&dir);
    }

    #[test]
    fn load_with_json_settings() {
        let dir = make_test_dir("load_settings");
        fs::write(dir.join("equipment.ron"), FIR_RON).unwrap();
        fs::write(
            dir.join("settings.json"),
            r#"{"debug": true, "lab_cache": {"revert_guard": false},
                "lab_time": [{"lab": "MPL", "lab_time_per_hour": 1.5, "charge_per_lab_time": 4.0}]}"#,
        )
        .unwrap();
        let data = load_lab_data(&dir).unwrap();
        assert!(!data.lab_cache_config().revert_guard);
        assert_eq!(data.logging_config().level, "debug");
        assert!(data.lab_kind("MPL").unwrap().lab_time.is_some());
        cleanup(&dir);
    }

    #[test]
    fn load_requires_equipment() {
        let dir = make_test_dir("load_missing");
        assert!(matches!(
            load_lab_data(&dir),
            Err(DataLoadError::MissingRequired { .. })
        ));
        cleanup(&dir);
    }

    #[test]
    fn error_display_messages() {
        let err = DataLoadError::UnresolvedRef {
            file: PathBuf::from("equipment.ron"),
            name: "XYZ".to_string(),
            expected_kind: "equipment type",
        };
        assert_eq!(
            err.to_string(),
            "unresolved equipment type reference 'XYZ' in equipment.ron"
        );
    }
}
