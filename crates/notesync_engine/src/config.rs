//! Configuration for the sync engine.

use notesync_protocol::{EntityKind, SyncScope};
use std::path::{Path, PathBuf};

const SYNC_CHUNKS_DIR: &str = "sync_chunks";
const DURABLE_DIR: &str = "durable";

/// Configuration for processing runs.
#[derive(Debug, Clone)]
pub struct ProcessingConfig {
    /// Maximum number of items looked up and written concurrently in one run.
    pub max_in_flight_items: usize,
    /// Maximum number of expunges issued concurrently in one run.
    pub max_in_flight_expunges: usize,
    /// Whether durable writes sync files and directories to disk.
    pub fsync: bool,
}

impl ProcessingConfig {
    /// Creates a configuration with default limits.
    pub fn new() -> Self {
        Self {
            max_in_flight_items: 8,
            max_in_flight_expunges: 8,
            fsync: true,
        }
    }

    /// Sets the item concurrency limit (at least 1).
    pub fn with_max_in_flight_items(mut self, limit: usize) -> Self {
        self.max_in_flight_items = limit.max(1);
        self
    }

    /// Sets the expunge concurrency limit (at least 1).
    pub fn with_max_in_flight_expunges(mut self, limit: usize) -> Self {
        self.max_in_flight_expunges = limit.max(1);
        self
    }

    /// Enables or disables fsync of durable writes.
    pub fn with_fsync(mut self, fsync: bool) -> Self {
        self.fsync = fsync;
        self
    }
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Standard on-disk layout below one persistent root:
///
/// ```text
/// <root>/
/// ├─ sync_chunks/<scope>/<low>_<high>
/// └─ durable/<scope>/<kind>/
///    ├─ processed/<guid>
///    ├─ expunged/<guid>
///    ├─ failed_to_download/<guid>
///    ├─ failed_to_process/<guid>
///    └─ cancelled/<guid>
/// ```
#[derive(Debug, Clone)]
pub struct SyncPaths {
    root: PathBuf,
}

impl SyncPaths {
    /// Creates the layout rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the persistent root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Root directory of the sync chunk cache.
    pub fn sync_chunks_dir(&self) -> PathBuf {
        self.root.join(SYNC_CHUNKS_DIR)
    }

    /// Root directory of all durable processing records.
    pub fn durable_dir(&self) -> PathBuf {
        self.root.join(DURABLE_DIR)
    }

    /// Directory of one scope's durable records for one entity kind.
    ///
    /// Returns `None` for scopes that cannot be mapped to a directory.
    pub fn durable_kind_dir(&self, scope: &SyncScope, kind: EntityKind) -> Option<PathBuf> {
        let scope_dir = scope.dir_name()?;
        Some(self.durable_dir().join(scope_dir).join(kind.as_str()))
    }
}
