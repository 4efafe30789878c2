//! Local storage collaborator.
//!
//! The persistent store itself lives outside the sync core; the core talks
//! to it only through this CRUD-style interface.

use crate::error::StorageResult;
use async_trait::async_trait;
use notesync_protocol::{Note, Notebook, Resource, SavedSearch, Tag};

/// Asynchronous access to locally stored entities.
///
/// `put_*` is an upsert keyed by the entity's local id, which must be set.
/// `expunge_*_by_guid` of an unknown guid succeeds; cascading removal of
/// dependent items (notes of a notebook, child tags, attachments of a note)
/// is the store's responsibility. Name lookups are case-insensitive and
/// scoped to the user's own content (`None`) or one linked notebook.
#[async_trait]
pub trait LocalStorage: Send + Sync {
    /// Finds a notebook by guid.
    async fn find_notebook_by_guid(&self, guid: &str) -> StorageResult<Option<Notebook>>;

    /// Finds a notebook by name within a scope.
    async fn find_notebook_by_name(
        &self,
        name: &str,
        linked_notebook_guid: Option<&str>,
    ) -> StorageResult<Option<Notebook>>;

    /// Inserts or replaces a notebook.
    async fn put_notebook(&self, notebook: Notebook) -> StorageResult<()>;

    /// Removes a notebook by guid.
    async fn expunge_notebook_by_guid(&self, guid: &str) -> StorageResult<()>;

    /// Lists the notebooks of a scope.
    async fn list_notebooks(&self, linked_notebook_guid: Option<&str>)
        -> StorageResult<Vec<Notebook>>;

    /// Finds a tag by guid.
    async fn find_tag_by_guid(&self, guid: &str) -> StorageResult<Option<Tag>>;

    /// Finds a tag by name within a scope.
    async fn find_tag_by_name(
        &self,
        name: &str,
        linked_notebook_guid: Option<&str>,
    ) -> StorageResult<Option<Tag>>;

    /// Inserts or replaces a tag.
    async fn put_tag(&self, tag: Tag) -> StorageResult<()>;

    /// Removes a tag by guid.
    async fn expunge_tag_by_guid(&self, guid: &str) -> StorageResult<()>;

    /// Lists the tags of a scope.
    async fn list_tags(&self, linked_notebook_guid: Option<&str>) -> StorageResult<Vec<Tag>>;

    /// Finds a saved search by guid.
    async fn find_saved_search_by_guid(&self, guid: &str) -> StorageResult<Option<SavedSearch>>;

    /// Finds a saved search by name.
    async fn find_saved_search_by_name(&self, name: &str) -> StorageResult<Option<SavedSearch>>;

    /// Inserts or replaces a saved search.
    async fn put_saved_search(&self, search: SavedSearch) -> StorageResult<()>;

    /// Removes a saved search by guid.
    async fn expunge_saved_search_by_guid(&self, guid: &str) -> StorageResult<()>;

    /// Lists all saved searches.
    async fn list_saved_searches(&self) -> StorageResult<Vec<SavedSearch>>;

    /// Finds a note by guid.
    async fn find_note_by_guid(&self, guid: &str) -> StorageResult<Option<Note>>;

    /// Inserts or replaces a note.
    async fn put_note(&self, note: Note) -> StorageResult<()>;

    /// Removes a note by guid.
    async fn expunge_note_by_guid(&self, guid: &str) -> StorageResult<()>;

    /// Lists the notes whose notebook belongs to a scope.
    async fn list_notes(&self, linked_notebook_guid: Option<&str>) -> StorageResult<Vec<Note>>;

    /// Finds an attachment by guid.
    async fn find_resource_by_guid(&self, guid: &str) -> StorageResult<Option<Resource>>;

    /// Inserts or replaces an attachment.
    async fn put_resource(&self, resource: Resource) -> StorageResult<()>;
}
