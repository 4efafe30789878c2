//! Per-kind storage bindings for the generic entity processor.

use crate::download::{NoteDataDownloader, ResourceDataDownloader};
use crate::error::{DownloadError, StorageError, StorageResult, SyncResult};
use crate::resolver::ConflictResolver;
use crate::storage::LocalStorage;
use async_trait::async_trait;
use notesync_protocol::{
    ChunkContents, ConflictResolution, Note, Notebook, Resource, SavedSearch, Tag,
};
use std::sync::Arc;

/// Why an item could not be prepared for writing.
#[derive(Debug)]
pub enum PrepareError {
    /// Downloading the item's payload failed.
    Download(DownloadError),
    /// Looking up related items failed.
    Storage(StorageError),
}

impl From<StorageError> for PrepareError {
    fn from(e: StorageError) -> Self {
        PrepareError::Storage(e)
    }
}

/// Binds one entity kind to its storage, resolver and payload calls.
#[async_trait]
pub trait ProcessorKind: Send + Sync + 'static {
    /// Entity processed by this kind.
    type Entity: ChunkContents;

    /// Parents must be written before children.
    const HIERARCHICAL: bool = false;

    /// A storage failure on one item is recorded as failed-to-process
    /// instead of failing the whole run.
    const ROUTES_STORAGE_FAILURES: bool = false;

    /// Looks up a local item by guid.
    async fn find_by_guid(
        &self,
        storage: &dyn LocalStorage,
        guid: &str,
    ) -> StorageResult<Option<Self::Entity>>;

    /// Looks up a local item colliding with `entity` by name.
    async fn find_by_name(
        &self,
        _storage: &dyn LocalStorage,
        _entity: &Self::Entity,
    ) -> StorageResult<Option<Self::Entity>> {
        Ok(None)
    }

    /// Inserts or replaces an item.
    async fn put(&self, storage: &dyn LocalStorage, entity: Self::Entity) -> StorageResult<()>;

    /// Removes an item by guid.
    async fn expunge(&self, storage: &dyn LocalStorage, guid: &str) -> StorageResult<()>;

    /// Asks the resolver about a conflicting pair.
    async fn resolve_conflict(
        &self,
        resolver: &dyn ConflictResolver,
        theirs: &Self::Entity,
        mine: &Self::Entity,
    ) -> SyncResult<ConflictResolution<Self::Entity>>;

    /// Completes a remote item before it is written: links local ids of
    /// related items and downloads the payload.
    async fn prepare(
        &self,
        _storage: &dyn LocalStorage,
        entity: Self::Entity,
    ) -> Result<Self::Entity, PrepareError> {
        Ok(entity)
    }
}

/// Notebooks.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotebookKind;

#[async_trait]
impl ProcessorKind for NotebookKind {
    type Entity = Notebook;

    async fn find_by_guid(
        &self,
        storage: &dyn LocalStorage,
        guid: &str,
    ) -> StorageResult<Option<Notebook>> {
        storage.find_notebook_by_guid(guid).await
    }

    async fn find_by_name(
        &self,
        storage: &dyn LocalStorage,
        entity: &Notebook,
    ) -> StorageResult<Option<Notebook>> {
        storage
            .find_notebook_by_name(&entity.name, entity.linked_notebook_guid.as_deref())
            .await
    }

    async fn put(&self, storage: &dyn LocalStorage, entity: Notebook) -> StorageResult<()> {
        storage.put_notebook(entity).await
    }

    async fn expunge(&self, storage: &dyn LocalStorage, guid: &str) -> StorageResult<()> {
        storage.expunge_notebook_by_guid(guid).await
    }

    async fn resolve_conflict(
        &self,
        resolver: &dyn ConflictResolver,
        theirs: &Notebook,
        mine: &Notebook,
    ) -> SyncResult<ConflictResolution<Notebook>> {
        resolver.resolve_notebook_conflict(theirs, mine).await
    }
}

/// Tags; written parents first.
#[derive(Debug, Clone, Copy, Default)]
pub struct TagKind;

#[async_trait]
impl ProcessorKind for TagKind {
    type Entity = Tag;

    const HIERARCHICAL: bool = true;

    async fn find_by_guid(
        &self,
        storage: &dyn LocalStorage,
        guid: &str,
    ) -> StorageResult<Option<Tag>> {
        storage.find_tag_by_guid(guid).await
    }

    async fn find_by_name(
        &self,
        storage: &dyn LocalStorage,
        entity: &Tag,
    ) -> StorageResult<Option<Tag>> {
        storage
            .find_tag_by_name(&entity.name, entity.linked_notebook_guid.as_deref())
            .await
    }

    async fn put(&self, storage: &dyn LocalStorage, entity: Tag) -> StorageResult<()> {
        storage.put_tag(entity).await
    }

    async fn expunge(&self, storage: &dyn LocalStorage, guid: &str) -> StorageResult<()> {
        storage.expunge_tag_by_guid(guid).await
    }

    async fn resolve_conflict(
        &self,
        resolver: &dyn ConflictResolver,
        theirs: &Tag,
        mine: &Tag,
    ) -> SyncResult<ConflictResolution<Tag>> {
        resolver.resolve_tag_conflict(theirs, mine).await
    }

    async fn prepare(
        &self,
        storage: &dyn LocalStorage,
        mut entity: Tag,
    ) -> Result<Tag, PrepareError> {
        if let Some(parent_guid) = entity.parent_guid.as_deref() {
            if let Some(parent) = storage.find_tag_by_guid(parent_guid).await? {
                entity.parent_local_id = parent.local_id;
            }
        }
        Ok(entity)
    }
}

/// Saved searches.
#[derive(Debug, Clone, Copy, Default)]
pub struct SavedSearchKind;

#[async_trait]
impl ProcessorKind for SavedSearchKind {
    type Entity = SavedSearch;

    async fn find_by_guid(
        &self,
        storage: &dyn LocalStorage,
        guid: &str,
    ) -> StorageResult<Option<SavedSearch>> {
        storage.find_saved_search_by_guid(guid).await
    }

    async fn find_by_name(
        &self,
        storage: &dyn LocalStorage,
        entity: &SavedSearch,
    ) -> StorageResult<Option<SavedSearch>> {
        storage.find_saved_search_by_name(&entity.name).await
    }

    async fn put(&self, storage: &dyn LocalStorage, entity: SavedSearch) -> StorageResult<()> {
        storage.put_saved_search(entity).await
    }

    async fn expunge(&self, storage: &dyn LocalStorage, guid: &str) -> StorageResult<()> {
        storage.expunge_saved_search_by_guid(guid).await
    }

    async fn resolve_conflict(
        &self,
        resolver: &dyn ConflictResolver,
        theirs: &SavedSearch,
        mine: &SavedSearch,
    ) -> SyncResult<ConflictResolution<SavedSearch>> {
        resolver.resolve_saved_search_conflict(theirs, mine).await
    }
}

/// Notes, optionally completed with their full data before writing.
#[derive(Clone, Default)]
pub struct NoteKind {
    downloader: Option<Arc<dyn NoteDataDownloader>>,
}

impl NoteKind {
    /// Writes notes as they appear in the chunks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Downloads each note's full data before writing it.
    pub fn with_downloader(downloader: Arc<dyn NoteDataDownloader>) -> Self {
        Self {
            downloader: Some(downloader),
        }
    }
}

#[async_trait]
impl ProcessorKind for NoteKind {
    type Entity = Note;

    const ROUTES_STORAGE_FAILURES: bool = true;

    async fn find_by_guid(
        &self,
        storage: &dyn LocalStorage,
        guid: &str,
    ) -> StorageResult<Option<Note>> {
        storage.find_note_by_guid(guid).await
    }

    async fn put(&self, storage: &dyn LocalStorage, entity: Note) -> StorageResult<()> {
        storage.put_note(entity).await
    }

    async fn expunge(&self, storage: &dyn LocalStorage, guid: &str) -> StorageResult<()> {
        storage.expunge_note_by_guid(guid).await
    }

    async fn resolve_conflict(
        &self,
        resolver: &dyn ConflictResolver,
        theirs: &Note,
        mine: &Note,
    ) -> SyncResult<ConflictResolution<Note>> {
        resolver.resolve_note_conflict(theirs, mine).await
    }

    async fn prepare(
        &self,
        storage: &dyn LocalStorage,
        mut entity: Note,
    ) -> Result<Note, PrepareError> {
        if let Some(notebook_guid) = entity.notebook_guid.as_deref() {
            if let Some(notebook) = storage.find_notebook_by_guid(notebook_guid).await? {
                entity.notebook_local_id = notebook.local_id;
            }
        }
        match &self.downloader {
            Some(downloader) => downloader
                .download_note(entity)
                .await
                .map_err(PrepareError::Download),
            None => Ok(entity),
        }
    }
}

/// Attachments, optionally completed with their body before writing.
#[derive(Clone, Default)]
pub struct ResourceKind {
    downloader: Option<Arc<dyn ResourceDataDownloader>>,
}

impl ResourceKind {
    /// Writes attachments as they appear in the chunks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Downloads each attachment's body before writing it.
    pub fn with_downloader(downloader: Arc<dyn ResourceDataDownloader>) -> Self {
        Self {
            downloader: Some(downloader),
        }
    }
}

#[async_trait]
impl ProcessorKind for ResourceKind {
    type Entity = Resource;

    const ROUTES_STORAGE_FAILURES: bool = true;

    async fn find_by_guid(
        &self,
        storage: &dyn LocalStorage,
        guid: &str,
    ) -> StorageResult<Option<Resource>> {
        storage.find_resource_by_guid(guid).await
    }

    async fn put(&self, storage: &dyn LocalStorage, entity: Resource) -> StorageResult<()> {
        storage.put_resource(entity).await
    }

    // Attachments are removed with their note; chunks carry no attachment expunges.
    async fn expunge(&self, _storage: &dyn LocalStorage, _guid: &str) -> StorageResult<()> {
        Ok(())
    }

    async fn resolve_conflict(
        &self,
        resolver: &dyn ConflictResolver,
        theirs: &Resource,
        mine: &Resource,
    ) -> SyncResult<ConflictResolution<Resource>> {
        resolver.resolve_resource_conflict(theirs, mine).await
    }

    async fn prepare(
        &self,
        storage: &dyn LocalStorage,
        mut entity: Resource,
    ) -> Result<Resource, PrepareError> {
        if let Some(note_guid) = entity.note_guid.as_deref() {
            if let Some(note) = storage.find_note_by_guid(note_guid).await? {
                entity.note_local_id = note.local_id;
            }
        }
        match &self.downloader {
            Some(downloader) => downloader
                .download_resource(entity)
                .await
                .map_err(PrepareError::Download),
            None => Ok(entity),
        }
    }
}
