//! # notesync Engine
//!
//! Download-side synchronization core for notesync.
//!
//! This crate provides:
//! - `SyncChunkCache`, a durable per-scope store of downloaded sync chunks
//! - `EntityProcessor`, which applies chunk contents to local storage for
//!   one entity kind, consulting a `ConflictResolver` on collisions
//! - `DurableProcessor`, which records item outcomes so an interrupted
//!   sync resumes where it stopped
//! - `StaleDataExpunger`, which removes local items a full sync no longer
//!   reports
//! - `MemoryLocalStorage`, an in-memory `LocalStorage` for tests and tools
//!
//! ## Architecture
//!
//! A sync pass for one scope runs in this order:
//! 1. Download chunks and `put` them into the cache
//! 2. Process notebooks, tags, saved searches, notes, then resources
//! 3. After a full sync, expunge stale data
//! 4. Clean up the durable records
//!
//! ## Key Invariants
//!
//! - Cached chunks of a scope cover a contiguous USN range
//! - Each guid is resolved at most once per processing run
//! - Parent tags are written before their children
//! - A recorded outcome is never applied twice

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod callback;
mod chunk_cache;
mod config;
mod download;
mod durable;
mod error;
mod expunger;
mod fs_util;
mod memory;
mod processor;
mod resolver;
mod storage;

pub use callback::{ProcessingCallback, ProcessingProgress};
pub use chunk_cache::SyncChunkCache;
pub use config::{ProcessingConfig, SyncPaths};
pub use download::{NoteDataDownloader, ResourceDataDownloader};
pub use durable::{DurableProcessor, DurableRecords};
pub use error::{DownloadError, StorageError, StorageResult, SyncError, SyncResult};
pub use expunger::{ExpungeReport, ExpungerState, LocalIndex, StaleDataExpunger, SyncedGuids};
pub use memory::{MemoryLocalStorage, StoredKind, WriteEvent, WriteOp};
pub use processor::{
    EntityProcessor, ItemFailure, NoteKind, NoteProcessor, NotebookKind, NotebookProcessor,
    PrepareError, ProcessStatus, ProcessorKind, ResourceKind, ResourceProcessor, SavedSearchKind,
    SavedSearchProcessor, TagKind, TagProcessor,
};
pub use resolver::{ConflictResolver, SimpleConflictResolver};
pub use storage::LocalStorage;
