//! Test fixtures and storage helpers.
//!
//! Provides temporary sync roots, chunk builders and processor
//! constructors wired to in-memory storage.

use notesync_engine::{
    ConflictResolver, DurableProcessor, EntityProcessor, MemoryLocalStorage, ProcessingConfig,
    ProcessorKind, SyncChunkCache, SyncPaths,
};
use notesync_protocol::{
    Guid, Note, Notebook, Resource, SavedSearch, SyncChunk, SyncScope, Tag, Usn,
};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// A persistent sync root in a temporary directory.
pub struct TestSyncRoot {
    paths: SyncPaths,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: TempDir,
}

impl TestSyncRoot {
    /// Creates an empty sync root.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        Self {
            paths: SyncPaths::new(temp_dir.path()),
            _temp_dir: temp_dir,
        }
    }

    /// Returns the directory layout.
    pub fn paths(&self) -> &SyncPaths {
        &self.paths
    }

    /// Returns the root directory.
    pub fn path(&self) -> &Path {
        self.paths.root()
    }

    /// Opens the chunk cache of this root without fsync.
    pub fn open_cache(&self) -> SyncChunkCache {
        SyncChunkCache::open(self.paths.sync_chunks_dir(), false)
            .expect("Failed to open sync chunk cache")
    }
}

impl Default for TestSyncRoot {
    fn default() -> Self {
        Self::new()
    }
}

/// Creates empty in-memory storage.
pub fn memory_storage() -> Arc<MemoryLocalStorage> {
    Arc::new(MemoryLocalStorage::new())
}

/// Processing configuration for tests: no fsync, small windows.
pub fn test_config() -> ProcessingConfig {
    ProcessingConfig::new()
        .with_max_in_flight_items(4)
        .with_max_in_flight_expunges(4)
        .with_fsync(false)
}

/// Creates a processor over `storage` using [`test_config`].
pub fn processor<K: ProcessorKind>(
    kind: K,
    storage: &Arc<MemoryLocalStorage>,
    resolver: Arc<dyn ConflictResolver>,
) -> EntityProcessor<K> {
    EntityProcessor::new(kind, storage.clone(), resolver).with_config(test_config())
}

/// Creates a durable processor keeping its records below `root`.
pub fn durable_processor<K: ProcessorKind>(
    kind: K,
    storage: &Arc<MemoryLocalStorage>,
    resolver: Arc<dyn ConflictResolver>,
    root: &TestSyncRoot,
    scope: &SyncScope,
) -> DurableProcessor<K> {
    DurableProcessor::for_scope(processor(kind, storage, resolver), root.paths(), scope)
        .expect("Scope has no durable directory")
}

/// Builds a [`SyncChunk`] item by item.
#[derive(Debug, Clone)]
pub struct ChunkBuilder {
    chunk: SyncChunk,
}

impl ChunkBuilder {
    /// Starts a chunk covering `low..=high`.
    pub fn new(low: Usn, high: Usn) -> Self {
        Self {
            chunk: SyncChunk::new(low, high),
        }
    }

    /// Adds a notebook.
    pub fn notebook(mut self, notebook: Notebook) -> Self {
        self.chunk.notebooks.push(notebook);
        self
    }

    /// Adds a tag.
    pub fn tag(mut self, tag: Tag) -> Self {
        self.chunk.tags.push(tag);
        self
    }

    /// Adds a saved search.
    pub fn saved_search(mut self, search: SavedSearch) -> Self {
        self.chunk.saved_searches.push(search);
        self
    }

    /// Adds a note.
    pub fn note(mut self, note: Note) -> Self {
        self.chunk.notes.push(note);
        self
    }

    /// Adds an attachment.
    pub fn resource(mut self, resource: Resource) -> Self {
        self.chunk.resources.push(resource);
        self
    }

    /// Adds an expunged notebook guid.
    pub fn expunged_notebook(mut self, guid: impl Into<Guid>) -> Self {
        self.chunk.expunged_notebooks.push(guid.into());
        self
    }

    /// Adds an expunged tag guid.
    pub fn expunged_tag(mut self, guid: impl Into<Guid>) -> Self {
        self.chunk.expunged_tags.push(guid.into());
        self
    }

    /// Adds an expunged note guid.
    pub fn expunged_note(mut self, guid: impl Into<Guid>) -> Self {
        self.chunk.expunged_notes.push(guid.into());
        self
    }

    /// Returns the chunk.
    pub fn build(self) -> SyncChunk {
        self.chunk
    }
}

/// A clean synced notebook named after its guid.
pub fn synced_notebook(guid: &str, usn: Usn) -> Notebook {
    Notebook::new(format!("notebook {guid}")).with_guid(guid, usn)
}

/// A clean synced tag named after its guid.
pub fn synced_tag(guid: &str, usn: Usn) -> Tag {
    Tag::new(format!("tag {guid}")).with_guid(guid, usn)
}

/// A clean synced note titled after its guid.
pub fn synced_note(guid: &str, usn: Usn, notebook_guid: &str) -> Note {
    Note::new(format!("note {guid}"))
        .with_guid(guid, usn)
        .in_notebook(notebook_guid)
}

/// Contiguous empty chunks starting at USN 1, one per entry of `sizes`.
pub fn contiguous_chunks(sizes: &[Usn]) -> Vec<SyncChunk> {
    let mut low = 1;
    sizes
        .iter()
        .map(|&size| {
            let high = low + size.max(1) - 1;
            let chunk = SyncChunk::new(low, high);
            low = high + 1;
            chunk
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contiguous_chunks_cover_consecutive_ranges() {
        let ranges: Vec<_> = contiguous_chunks(&[3, 1, 0, 5])
            .iter()
            .map(SyncChunk::usn_range)
            .collect();
        assert_eq!(ranges, vec![(1, 3), (4, 4), (5, 5), (6, 10)]);
    }

    #[test]
    fn sync_root_opens_empty_cache() {
        let root = TestSyncRoot::new();
        let cache = root.open_cache();
        assert!(cache.fetch_usn_ranges(&SyncScope::UserOwn).unwrap().is_empty());
        assert!(cache.root().starts_with(root.path()));
    }
}
