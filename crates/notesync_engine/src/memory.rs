//! In-memory local storage.

use crate::error::{StorageError, StorageResult};
use crate::storage::LocalStorage;
use async_trait::async_trait;
use notesync_protocol::{
    EntityKind, Guid, LocalId, Note, Notebook, Resource, SavedSearch, SyncEntity, Tag,
};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashSet};

/// Kind of write recorded in the [`MemoryLocalStorage`] log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOp {
    /// An upsert issued by a caller.
    Put,
    /// An expunge issued by a caller.
    Expunge,
    /// A removal performed as a cascade of another expunge.
    Cascade,
}

/// One write recorded in the [`MemoryLocalStorage`] log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteEvent {
    /// Entity kind written.
    pub kind: EntityKind,
    /// Kind of write.
    pub op: WriteOp,
    /// Local id of the written item, if known.
    pub local_id: Option<LocalId>,
    /// Guid of the written item, if any.
    pub guid: Option<Guid>,
}

/// Rows of one kind keyed by local id.
pub struct Table<E> {
    rows: BTreeMap<LocalId, E>,
}

impl<E> Default for Table<E> {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
        }
    }
}

impl<E: SyncEntity> Table<E> {
    fn by_guid(&self, guid: &str) -> Option<&E> {
        self.rows.values().find(|e| e.guid() == Some(guid))
    }

    fn by_name(&self, name: &str, linked_notebook_guid: Option<&str>) -> Option<&E> {
        let name = name.to_lowercase();
        self.rows.values().find(|e| {
            e.linked_notebook_guid() == linked_notebook_guid
                && e.unique_name().is_some_and(|n| n.to_lowercase() == name)
        })
    }

    fn put(&mut self, entity: E) -> StorageResult<()> {
        let local_id = entity
            .local_id()
            .ok_or_else(|| StorageError::constraint(format!("{} without local id", E::KIND)))?
            .to_string();
        if let Some(guid) = entity.guid() {
            if let Some(other) = self.by_guid(guid) {
                if other.local_id() != Some(local_id.as_str()) {
                    return Err(StorageError::constraint(format!(
                        "duplicate {} guid {guid}",
                        E::KIND
                    )));
                }
            }
        }
        self.rows.insert(local_id, entity);
        Ok(())
    }

    fn remove_by_guid(&mut self, guid: &str) -> Option<E> {
        let local_id = self.by_guid(guid)?.local_id()?.to_string();
        self.rows.remove(&local_id)
    }

    fn remove_where<F: Fn(&E) -> bool>(&mut self, pred: F) -> Vec<E> {
        let doomed: Vec<LocalId> = self
            .rows
            .iter()
            .filter(|(_, e)| pred(e))
            .map(|(id, _)| id.clone())
            .collect();
        doomed
            .into_iter()
            .filter_map(|id| self.rows.remove(&id))
            .collect()
    }
}

/// All tables plus the write log and injected failures.
#[derive(Default)]
pub struct State {
    notebooks: Table<Notebook>,
    tags: Table<Tag>,
    saved_searches: Table<SavedSearch>,
    notes: Table<Note>,
    resources: Table<Resource>,
    log: Vec<WriteEvent>,
    failing_puts: HashSet<Guid>,
    failing_expunges: HashSet<Guid>,
}

impl State {
    fn record<E: SyncEntity>(&mut self, op: WriteOp, entity: &E) {
        self.log.push(WriteEvent {
            kind: E::KIND,
            op,
            local_id: entity.local_id().map(str::to_string),
            guid: entity.guid().map(str::to_string),
        });
    }

    fn check_put<E: SyncEntity>(&self, entity: &E) -> StorageResult<()> {
        match entity.guid() {
            Some(guid) if self.failing_puts.contains(guid) => Err(StorageError::backend(format!(
                "injected put failure for {} {guid}",
                E::KIND
            ))),
            _ => Ok(()),
        }
    }

    fn check_expunge(&self, kind: EntityKind, guid: &str) -> StorageResult<()> {
        if self.failing_expunges.contains(guid) {
            return Err(StorageError::backend(format!(
                "injected expunge failure for {kind} {guid}"
            )));
        }
        Ok(())
    }

    fn put<E: StoredKind>(&mut self, entity: E) -> StorageResult<()> {
        self.check_put(&entity)?;
        self.record(WriteOp::Put, &entity);
        E::table(self).put(entity)
    }

    fn cascade_note(&mut self, note: &Note) {
        let removed = self.resources.remove_where(|r| {
            (note.local_id.is_some() && r.note_local_id == note.local_id)
                || (note.guid.is_some() && r.note_guid == note.guid)
        });
        for resource in &removed {
            self.record(WriteOp::Cascade, resource);
        }
    }

    fn cascade_notebook(&mut self, notebook: &Notebook) {
        let removed = self.notes.remove_where(|n| {
            (notebook.local_id.is_some() && n.notebook_local_id == notebook.local_id)
                || (notebook.guid.is_some() && n.notebook_guid == notebook.guid)
        });
        for note in &removed {
            self.record(WriteOp::Cascade, note);
            self.cascade_note(note);
        }
    }

    fn cascade_tag(&mut self, tag: &Tag) {
        let children = self.tags.remove_where(|t| {
            (tag.local_id.is_some() && t.parent_local_id == tag.local_id)
                || (tag.guid.is_some() && t.parent_guid == tag.guid)
        });
        if let Some(guid) = &tag.guid {
            for note in self.notes.rows.values_mut() {
                note.tag_guids.retain(|g| g != guid);
            }
        }
        for child in &children {
            self.record(WriteOp::Cascade, child);
            self.cascade_tag(child);
        }
    }

    fn notebook_scope_of(&self, note: &Note) -> Option<Option<&str>> {
        let notebook = note
            .notebook_local_id
            .as_deref()
            .and_then(|id| self.notebooks.rows.get(id))
            .or_else(|| {
                note.notebook_guid
                    .as_deref()
                    .and_then(|guid| self.notebooks.by_guid(guid))
            })?;
        Some(notebook.linked_notebook_guid.as_deref())
    }
}

/// Maps an entity type onto its table in [`MemoryLocalStorage`].
pub trait StoredKind: SyncEntity {
    #[doc(hidden)]
    fn table(state: &mut State) -> &mut Table<Self>;
    #[doc(hidden)]
    fn table_ref(state: &State) -> &Table<Self>;
}

macro_rules! stored_kind {
    ($ty:ty, $field:ident) => {
        impl StoredKind for $ty {
            fn table(state: &mut State) -> &mut Table<Self> {
                &mut state.$field
            }

            fn table_ref(state: &State) -> &Table<Self> {
                &state.$field
            }
        }
    };
}

stored_kind!(Notebook, notebooks);
stored_kind!(Tag, tags);
stored_kind!(SavedSearch, saved_searches);
stored_kind!(Note, notes);
stored_kind!(Resource, resources);

/// A [`LocalStorage`] kept entirely in memory.
///
/// Records every caller-issued write in order, which lets tests assert on
/// write ordering, and supports injecting failures per guid.
#[derive(Default)]
pub struct MemoryLocalStorage {
    state: RwLock<State>,
}

impl MemoryLocalStorage {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an item without recording it in the write log.
    ///
    /// Items without a local id get one derived from their guid or name.
    pub fn seed<E: StoredKind>(&self, mut entity: E) {
        if entity.local_id().is_none() {
            let id = entity
                .guid()
                .or(entity.unique_name())
                .map(|key| format!("seed-{}-{key}", E::KIND))
                .unwrap_or_else(|| format!("seed-{}-{}", E::KIND, uuid::Uuid::new_v4()));
            entity.set_local_id(id);
        }
        let mut state = self.state.write();
        if let Some(local_id) = entity.local_id().map(str::to_string) {
            E::table(&mut state).rows.insert(local_id, entity);
        }
    }

    /// Returns all items of a kind, ordered by local id.
    pub fn all<E: StoredKind>(&self) -> Vec<E> {
        E::table_ref(&self.state.read()).rows.values().cloned().collect()
    }

    /// Returns the item with the given local id.
    pub fn get<E: StoredKind>(&self, local_id: &str) -> Option<E> {
        E::table_ref(&self.state.read()).rows.get(local_id).cloned()
    }

    /// Returns the item with the given guid.
    pub fn get_by_guid<E: StoredKind>(&self, guid: &str) -> Option<E> {
        E::table_ref(&self.state.read()).by_guid(guid).cloned()
    }

    /// Returns the number of items of a kind.
    pub fn count<E: StoredKind>(&self) -> usize {
        E::table_ref(&self.state.read()).rows.len()
    }

    /// Returns a copy of the write log.
    pub fn write_log(&self) -> Vec<WriteEvent> {
        self.state.read().log.clone()
    }

    /// Clears the write log.
    pub fn clear_write_log(&self) {
        self.state.write().log.clear();
    }

    /// Makes every put of an item with this guid fail.
    pub fn fail_puts_of(&self, guid: impl Into<Guid>) {
        self.state.write().failing_puts.insert(guid.into());
    }

    /// Makes every expunge of this guid fail.
    pub fn fail_expunges_of(&self, guid: impl Into<Guid>) {
        self.state.write().failing_expunges.insert(guid.into());
    }

    /// Removes all injected failures.
    pub fn clear_failures(&self) {
        let mut state = self.state.write();
        state.failing_puts.clear();
        state.failing_expunges.clear();
    }
}

#[async_trait]
impl LocalStorage for MemoryLocalStorage {
    async fn find_notebook_by_guid(&self, guid: &str) -> StorageResult<Option<Notebook>> {
        Ok(self.state.read().notebooks.by_guid(guid).cloned())
    }

    async fn find_notebook_by_name(
        &self,
        name: &str,
        linked_notebook_guid: Option<&str>,
    ) -> StorageResult<Option<Notebook>> {
        Ok(self
            .state
            .read()
            .notebooks
            .by_name(name, linked_notebook_guid)
            .cloned())
    }

    async fn put_notebook(&self, notebook: Notebook) -> StorageResult<()> {
        self.state.write().put(notebook)
    }

    async fn expunge_notebook_by_guid(&self, guid: &str) -> StorageResult<()> {
        let mut state = self.state.write();
        state.check_expunge(EntityKind::Notebook, guid)?;
        if let Some(notebook) = state.notebooks.remove_by_guid(guid) {
            state.record(WriteOp::Expunge, &notebook);
            state.cascade_notebook(&notebook);
        }
        Ok(())
    }

    async fn list_notebooks(
        &self,
        linked_notebook_guid: Option<&str>,
    ) -> StorageResult<Vec<Notebook>> {
        Ok(self
            .state
            .read()
            .notebooks
            .rows
            .values()
            .filter(|n| n.linked_notebook_guid.as_deref() == linked_notebook_guid)
            .cloned()
            .collect())
    }

    async fn find_tag_by_guid(&self, guid: &str) -> StorageResult<Option<Tag>> {
        Ok(self.state.read().tags.by_guid(guid).cloned())
    }

    async fn find_tag_by_name(
        &self,
        name: &str,
        linked_notebook_guid: Option<&str>,
    ) -> StorageResult<Option<Tag>> {
        Ok(self
            .state
            .read()
            .tags
            .by_name(name, linked_notebook_guid)
            .cloned())
    }

    async fn put_tag(&self, tag: Tag) -> StorageResult<()> {
        self.state.write().put(tag)
    }

    async fn expunge_tag_by_guid(&self, guid: &str) -> StorageResult<()> {
        let mut state = self.state.write();
        state.check_expunge(EntityKind::Tag, guid)?;
        if let Some(tag) = state.tags.remove_by_guid(guid) {
            state.record(WriteOp::Expunge, &tag);
            state.cascade_tag(&tag);
        }
        Ok(())
    }

    async fn list_tags(&self, linked_notebook_guid: Option<&str>) -> StorageResult<Vec<Tag>> {
        Ok(self
            .state
            .read()
            .tags
            .rows
            .values()
            .filter(|t| t.linked_notebook_guid.as_deref() == linked_notebook_guid)
            .cloned()
            .collect())
    }

    async fn find_saved_search_by_guid(&self, guid: &str) -> StorageResult<Option<SavedSearch>> {
        Ok(self.state.read().saved_searches.by_guid(guid).cloned())
    }

    async fn find_saved_search_by_name(&self, name: &str) -> StorageResult<Option<SavedSearch>> {
        Ok(self
            .state
            .read()
            .saved_searches
            .by_name(name, None)
            .cloned())
    }

    async fn put_saved_search(&self, search: SavedSearch) -> StorageResult<()> {
        self.state.write().put(search)
    }

    async fn expunge_saved_search_by_guid(&self, guid: &str) -> StorageResult<()> {
        let mut state = self.state.write();
        state.check_expunge(EntityKind::SavedSearch, guid)?;
        if let Some(search) = state.saved_searches.remove_by_guid(guid) {
            state.record(WriteOp::Expunge, &search);
        }
        Ok(())
    }

    async fn list_saved_searches(&self) -> StorageResult<Vec<SavedSearch>> {
        Ok(self
            .state
            .read()
            .saved_searches
            .rows
            .values()
            .cloned()
            .collect())
    }

    async fn find_note_by_guid(&self, guid: &str) -> StorageResult<Option<Note>> {
        Ok(self.state.read().notes.by_guid(guid).cloned())
    }

    async fn put_note(&self, note: Note) -> StorageResult<()> {
        self.state.write().put(note)
    }

    async fn expunge_note_by_guid(&self, guid: &str) -> StorageResult<()> {
        let mut state = self.state.write();
        state.check_expunge(EntityKind::Note, guid)?;
        if let Some(note) = state.notes.remove_by_guid(guid) {
            state.record(WriteOp::Expunge, &note);
            state.cascade_note(&note);
        }
        Ok(())
    }

    async fn list_notes(&self, linked_notebook_guid: Option<&str>) -> StorageResult<Vec<Note>> {
        let state = self.state.read();
        Ok(state
            .notes
            .rows
            .values()
            .filter(|note| {
                state.notebook_scope_of(note).unwrap_or(None) == linked_notebook_guid
            })
            .cloned()
            .collect())
    }

    async fn find_resource_by_guid(&self, guid: &str) -> StorageResult<Option<Resource>> {
        Ok(self.state.read().resources.by_guid(guid).cloned())
    }

    async fn put_resource(&self, resource: Resource) -> StorageResult<()> {
        self.state.write().put(resource)
    }
}
