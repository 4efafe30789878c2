//! # notesync protocol
//!
//! Data model for the notesync synchronization core.
//!
//! This crate provides:
//! - Identifier and scope types (`Guid`, `LocalId`, `Usn`, `SyncScope`)
//! - The five synchronized entity kinds and the `SyncEntity` trait
//! - `SyncChunk`, the ordered batch the remote service delivers
//! - `ConflictResolution`, the decision a conflict resolver returns
//! - Durable outcome records and their framed CBOR encoding
//!
//! This is a pure data crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod chunk;
mod conflict;
mod entity;
mod error;
mod record;
mod types;

pub use chunk::{ChunkContents, SyncChunk};
pub use conflict::ConflictResolution;
pub use entity::{Note, Notebook, Resource, SavedSearch, SyncEntity, Tag};
pub use error::{ProtocolError, ProtocolResult};
pub use record::{
    decode_record, encode_record, FailureKind, FailureRecord, ProcessedRecord, RECORD_MAGIC,
    RECORD_VERSION,
};
pub use types::{EntityKind, Guid, LocalId, SyncScope, Usn};
