//! Error types for the sync engine.

use notesync_protocol::{ProtocolError, SyncScope};
use std::io;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Result type for local storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The local storage collaborator failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Reading or writing sync state on disk failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A persisted record could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] ProtocolError),

    /// A chunk cache put violated USN contiguity.
    #[error("rejected sync chunks for {scope}: {message}")]
    ChunkRange {
        /// Scope of the rejected put.
        scope: SyncScope,
        /// What was wrong with the ranges.
        message: String,
    },

    /// A scope cannot be mapped onto the on-disk layout.
    #[error("invalid scope: {0}")]
    InvalidScope(SyncScope),

    /// A conflict resolver returned a resolution the processor cannot apply.
    #[error("invalid conflict resolution: {0}")]
    InvalidResolution(String),

    /// A conflict resolver failed.
    #[error("conflict resolver failed: {0}")]
    Resolver(String),

    /// Processing was cancelled.
    #[error("sync cancelled")]
    Cancelled,

    /// Invalid state transition.
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        /// Current state.
        from: String,
        /// Attempted target state.
        to: String,
    },
}

impl SyncError {
    /// Creates a chunk range error.
    pub fn chunk_range(scope: &SyncScope, message: impl Into<String>) -> Self {
        Self::ChunkRange {
            scope: scope.clone(),
            message: message.into(),
        }
    }

    /// Returns true if a later invocation may succeed where this one failed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Storage(e) => e.is_transient(),
            SyncError::Io(_) => true,
            SyncError::Cancelled => true,
            _ => false,
        }
    }
}

/// Errors reported by the local storage collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The backing store failed.
    #[error("backend failure: {0}")]
    Backend(String),

    /// A write violated a storage constraint.
    #[error("constraint violated: {0}")]
    Constraint(String),

    /// The store is temporarily unavailable.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    /// Creates a backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }

    /// Creates a constraint error.
    pub fn constraint(message: impl Into<String>) -> Self {
        Self::Constraint(message.into())
    }

    /// Returns true if retrying later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Unavailable(_) | StorageError::Backend(_))
    }
}

/// Error returned by a payload download collaborator.
///
/// Download failures never fail a processing run; they are recorded as a
/// failed-to-download outcome for the item.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("download of {guid} failed: {message}")]
pub struct DownloadError {
    /// Guid of the item whose payload was requested.
    pub guid: String,
    /// Error description.
    pub message: String,
}

impl DownloadError {
    /// Creates a download error.
    pub fn new(guid: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            guid: guid.into(),
            message: message.into(),
        }
    }
}
