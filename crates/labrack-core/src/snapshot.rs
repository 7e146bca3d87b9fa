//! Binary snapshots of save records.
//!
//! Record trees are encoded with `bitcode` behind a versioned header so a
//! host can stash lab state in a compact blob (quicksave, undo buffer) and
//! reject blobs written by an incompatible build.

use serde::{Deserialize, Serialize};

use crate::node::ConfigNode;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Magic number identifying a labrack record snapshot.
pub const SNAPSHOT_MAGIC: u32 = 0x1AB5_0001;

/// Current format version. Increment when breaking the wire format.
pub const FORMAT_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SerializeError {
    #[error("bitcode encoding failed: {0}")]
    Encode(String),
    #[error("too many records for one snapshot: {0}")]
    TooManyRecords(usize),
}

#[derive(Debug, thiserror::Error)]
pub enum DeserializeError {
    #[error("invalid magic number: expected 0x{:08X}, got 0x{:08X}", SNAPSHOT_MAGIC, .0)]
    InvalidMagic(u32),
    #[error("unsupported format version: expected {}, got {}", FORMAT_VERSION, .0)]
    UnsupportedVersion(u32),
    #[error("snapshot from future version {0} (this build supports up to {FORMAT_VERSION})")]
    FutureVersion(u32),
    #[error("bitcode decoding failed: {0}")]
    Decode(String),
}

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotHeader {
    pub magic: u32,
    pub version: u32,
    /// Number of top-level records in the payload.
    pub records: u32,
}

impl SnapshotHeader {
    pub fn new(records: u32) -> Self {
        Self {
            magic: SNAPSHOT_MAGIC,
            version: FORMAT_VERSION,
            records,
        }
    }

    pub fn validate(&self) -> Result<(), DeserializeError> {
        if self.magic != SNAPSHOT_MAGIC {
            return Err(DeserializeError::InvalidMagic(self.magic));
        }
        if self.version > FORMAT_VERSION {
            return Err(DeserializeError::FutureVersion(self.version));
        }
        if self.version < FORMAT_VERSION {
            return Err(DeserializeError::UnsupportedVersion(self.version));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct RecordSnapshot {
    header: SnapshotHeader,
    records: Vec<ConfigNode>,
}

// ---------------------------------------------------------------------------
// Encode / decode
// ---------------------------------------------------------------------------

/// Encode a list of top-level records.
pub fn encode_records(records: &[ConfigNode]) -> Result<Vec<u8>, SerializeError> {
    let snapshot = RecordSnapshot {
        header: SnapshotHeader::new(record_count(records.len())?),
        records: records.to_vec(),
    };
    bitcode::serialize(&snapshot).map_err(|e| SerializeError::Encode(e.to_string()))
}

fn record_count(len: usize) -> Result<u32, SerializeError> {
    u32::try_from(len).map_err(|_| SerializeError::TooManyRecords(len))
}

/// Decode records written by [`encode_records`], validating the header.
pub fn decode_records(data: &[u8]) -> Result<Vec<ConfigNode>, DeserializeError> {
    let snapshot: RecordSnapshot =
        bitcode::deserialize(data).map_err(|e| DeserializeError::Decode(e.to_string()))?;
    snapshot.header.validate()?;
    Ok(snapshot.records)
}

/// Read the header of a snapshot without validating it.
pub fn read_snapshot_header(data: &[u8]) -> Result<SnapshotHeader, DeserializeError> {
    // bitcode has no partial decode, so this decodes the whole blob.
    let snapshot: RecordSnapshot =
        bitcode::deserialize(data).map_err(|e| DeserializeError::Decode(e.to_string()))?;
    Ok(snapshot.header)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<ConfigNode> {
        let mut slot = ConfigNode::new("EquipmentSlot");
        slot.add_value("type", "FIR");
        let mut eq = ConfigNode::new("Equipment");
        eq.add_value("abbreviation", "FIR");
        eq.add_value("mass", 1.25);
        slot.add_node(eq);
        vec![slot, ConfigNode::new("EquipmentSlot")]
    }

    #[test]
    fn records_survive_encoding() {
        let records = sample();
        let bytes = encode_records(&records).unwrap();
        assert_eq!(decode_records(&bytes).unwrap(), records);
    }

    #[test]
    fn header_reports_record_count() {
        let bytes = encode_records(&sample()).unwrap();
        let header = read_snapshot_header(&bytes).unwrap();
        assert_eq!(header.records, 2);
        assert_eq!(header.version, FORMAT_VERSION);
    }

    #[test]
    fn record_count_must_fit_header() {
        assert_eq!(record_count(2).unwrap(), 2);
        assert_eq!(record_count(u32::MAX as usize).unwrap(), u32::MAX);
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn oversized_record_count_is_an_error() {
        let len = u32::MAX as usize + 1;
        assert!(matches!(
            record_count(len),
            Err(SerializeError::TooManyRecords(n)) if n == len
        ));
    }

    #[test]
    fn garbage_fails_to_decode() {
        let err = decode_records(&[0xde, 0xad]).unwrap_err();
        assert!(matches!(err, DeserializeError::Decode(_)));
    }

    #[test]
    fn header_validation() {
        assert!(SnapshotHeader::new(0).validate().is_ok());

        let mut bad_magic = SnapshotHeader::new(0);
        bad_magic.magic = 0;
        assert!(matches!(
            bad_magic.validate(),
            Err(DeserializeError::InvalidMagic(0))
        ));

        let mut future = SnapshotHeader::new(0);
        future.version = FORMAT_VERSION + 1;
        assert!(matches!(
            future.validate(),
            Err(DeserializeError::FutureVersion(_))
        ));

        let mut old = SnapshotHeader::new(0);
        old.version = 0;
        assert!(matches!(
            old.validate(),
            Err(DeserializeError::UnsupportedVersion(0))
        ));
    }

    #[test]
    fn foreign_snapshot_is_rejected() {
        let foreign = RecordSnapshot {
            header: SnapshotHeader {
                magic: 0xFAC7_0001,
                version: FORMAT_VERSION,
                records: 0,
            },
            records: Vec::new(),
        };
        let bytes = bitcode::serialize(&foreign).unwrap();
        assert!(matches!(
            decode_records(&bytes),
            Err(DeserializeError::InvalidMagic(0xFAC7_0001))
        ));
    }
}
