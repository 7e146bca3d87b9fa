use serde::{Deserialize, Serialize};

/// The kinds of lab equipment racks.
///
/// `None` is the sentinel for "empty slot / no equipment". It is never a
/// catalog entry and never the type of an installable rack.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum EquipmentType {
    Cir,
    Fir,
    Printer,
    Exposure,
    Msg,
    Usu,
    Kemini,
    #[default]
    None,
}

/// Returned by [`EquipmentType::from_str`] for names outside the closed set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown equipment type '{0}'")]
pub struct UnknownEquipmentType(pub String);

impl EquipmentType {
    /// Every installable rack type, in declaration order. Excludes `None`.
    pub const RACKS: [EquipmentType; 7] = [
        EquipmentType::Cir,
        EquipmentType::Fir,
        EquipmentType::Printer,
        EquipmentType::Exposure,
        EquipmentType::Msg,
        EquipmentType::Usu,
        EquipmentType::Kemini,
    ];

    /// The persisted name of this type.
    pub fn as_str(self) -> &'static str {
        match self {
            EquipmentType::Cir => "CIR",
            EquipmentType::Fir => "FIR",
            EquipmentType::Printer => "PRINTER",
            EquipmentType::Exposure => "EXPOSURE",
            EquipmentType::Msg => "MSG",
            EquipmentType::Usu => "USU",
            EquipmentType::Kemini => "KEMINI",
            EquipmentType::None => "NONE",
        }
    }

    /// Lenient parse used when reading saves: case-insensitive, and any
    /// unknown name maps to `None`.
    pub fn from_name(name: &str) -> EquipmentType {
        name.parse().unwrap_or(EquipmentType::None)
    }

    pub fn is_none(self) -> bool {
        self == EquipmentType::None
    }

    /// Name of the catalog part this rack type is discovered from.
    pub fn part_name(self) -> Option<&'static str> {
        match self {
            EquipmentType::Printer => Some("NE.3PR"),
            EquipmentType::Cir => Some("NE.CIR"),
            EquipmentType::Fir => Some("NE.FIR"),
            EquipmentType::Msg => Some("NE.MSG"),
            EquipmentType::Usu => Some("NE.USU"),
            EquipmentType::Exposure => Some("MEP"),
            EquipmentType::Kemini => Some("NE.KEMINI"),
            EquipmentType::None => None,
        }
    }

    /// The lab model a rack of this type is built for, if it is installable
    /// by the player at all.
    pub fn host_lab(self) -> Option<&'static str> {
        match self {
            EquipmentType::Cir | EquipmentType::Fir | EquipmentType::Printer => Some("MSL-1000"),
            EquipmentType::Msg | EquipmentType::Usu => Some("MPL-600"),
            EquipmentType::Exposure | EquipmentType::Kemini | EquipmentType::None => None,
        }
    }
}

impl std::str::FromStr for EquipmentType {
    type Err = UnknownEquipmentType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        EquipmentType::RACKS
            .iter()
            .chain(std::iter::once(&EquipmentType::None))
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| UnknownEquipmentType(s.to_string()))
    }
}

impl std::fmt::Display for EquipmentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
