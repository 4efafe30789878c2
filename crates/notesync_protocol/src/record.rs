//! Durable per-item outcome records and their on-disk encoding.
//!
//! Records are framed as `magic (4) | version (2, LE) | CBOR body`. The
//! frame lets a reader reject truncated or foreign files instead of
//! misreading them.

use crate::error::{ProtocolError, ProtocolResult};
use crate::types::{Guid, Usn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Magic bytes of a persisted record.
pub const RECORD_MAGIC: [u8; 4] = *b"NSRC";

/// Current record format version.
pub const RECORD_VERSION: u16 = 1;

const HEADER_LEN: usize = 6;

/// An item durably known to be applied at a USN.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedRecord {
    /// Remote identifier.
    pub guid: Guid,
    /// USN the item was applied at.
    pub usn: Usn,
}

impl ProcessedRecord {
    /// Creates a record.
    pub fn new(guid: impl Into<Guid>, usn: Usn) -> Self {
        Self {
            guid: guid.into(),
            usn,
        }
    }
}

/// Why an item did not get applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    /// Its payload could not be downloaded.
    FailedToDownload,
    /// Writing it to local storage failed.
    FailedToProcess,
    /// Processing was cancelled before it was applied.
    Cancelled,
}

impl FailureKind {
    /// All failure categories.
    pub const ALL: [FailureKind; 3] = [
        FailureKind::FailedToDownload,
        FailureKind::FailedToProcess,
        FailureKind::Cancelled,
    ];

    /// Directory name holding records of this category.
    pub fn dir_name(&self) -> &'static str {
        match self {
            FailureKind::FailedToDownload => "failed_to_download",
            FailureKind::FailedToProcess => "failed_to_process",
            FailureKind::Cancelled => "cancelled",
        }
    }

    /// Parses a name produced by [`FailureKind::dir_name`].
    pub fn from_dir_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.dir_name() == name)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// A full entity that was not applied, with the reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord<E> {
    /// Failure category.
    pub kind: FailureKind,
    /// The entity as it arrived.
    pub entity: E,
    /// Error description, if any.
    pub error: Option<String>,
}

impl<E> FailureRecord<E> {
    /// Creates a record.
    pub fn new(kind: FailureKind, entity: E, error: Option<String>) -> Self {
        Self {
            kind,
            entity,
            error,
        }
    }
}

/// Encodes a value into a framed record.
pub fn encode_record<T: Serialize>(value: &T) -> ProtocolResult<Vec<u8>> {
    let mut buf = Vec::with_capacity(64);
    buf.extend_from_slice(&RECORD_MAGIC);
    buf.extend_from_slice(&RECORD_VERSION.to_le_bytes());
    ciborium::into_writer(value, &mut buf).map_err(|e| ProtocolError::Encode(e.to_string()))?;
    Ok(buf)
}

/// Decodes a framed record.
pub fn decode_record<T: DeserializeOwned>(bytes: &[u8]) -> ProtocolResult<T> {
    if bytes.len() < HEADER_LEN || bytes[0..4] != RECORD_MAGIC {
        return Err(ProtocolError::invalid_record("invalid record magic"));
    }
    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version > RECORD_VERSION {
        return Err(ProtocolError::invalid_record(format!(
            "unsupported record version: {version}"
        )));
    }
    ciborium::from_reader(&bytes[HEADER_LEN..]).map_err(|e| ProtocolError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Note;

    #[test]
    fn failure_record_roundtrip() {
        let record = FailureRecord::new(
            FailureKind::FailedToDownload,
            Note::new("n").with_guid("g1", 12),
            Some("timeout".into()),
        );
        let bytes = encode_record(&record).unwrap();
        let decoded: FailureRecord<Note> = decode_record(&bytes).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn truncated_record_rejected() {
        let bytes = encode_record(&ProcessedRecord::new("g", 3)).unwrap();
        assert!(decode_record::<ProcessedRecord>(&bytes[..3]).is_err());
        assert!(decode_record::<ProcessedRecord>(&bytes[..bytes.len() - 1]).is_err());
    }

    #[test]
    fn foreign_magic_rejected() {
        let mut bytes = encode_record(&ProcessedRecord::new("g", 3)).unwrap();
        bytes[0] = b'X';
        let err = decode_record::<ProcessedRecord>(&bytes).unwrap_err();
        assert!(err.to_string().contains("magic"));
    }

    #[test]
    fn newer_version_rejected() {
        let mut bytes = encode_record(&ProcessedRecord::new("g", 3)).unwrap();
        bytes[4] = 0xFF;
        assert!(decode_record::<ProcessedRecord>(&bytes).is_err());
    }

    #[test]
    fn failure_kind_dir_names() {
        for kind in FailureKind::ALL {
            assert_eq!(FailureKind::from_dir_name(kind.dir_name()), Some(kind));
        }
    }
}
