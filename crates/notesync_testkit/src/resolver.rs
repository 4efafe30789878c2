//! Scripted conflict resolvers.

use async_trait::async_trait;
use notesync_engine::{ConflictResolver, SyncError, SyncResult};
use notesync_protocol::{
    ConflictResolution, EntityKind, Guid, LocalId, Note, Notebook, Resource, SavedSearch,
    SyncEntity, Tag,
};
use parking_lot::Mutex;
use std::collections::HashMap;

/// One recorded resolver invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverCall {
    /// Kind of the conflicting items.
    pub kind: EntityKind,
    /// Guid of the remote item.
    pub theirs_guid: Option<Guid>,
    /// Local id of the local item.
    pub mine_local_id: Option<LocalId>,
}

struct Script<E> {
    by_guid: Mutex<HashMap<Guid, ConflictResolution<E>>>,
}

impl<E: Clone> Script<E> {
    fn new() -> Self {
        Self {
            by_guid: Mutex::new(HashMap::new()),
        }
    }

    fn set(&self, guid: Guid, resolution: ConflictResolution<E>) {
        self.by_guid.lock().insert(guid, resolution);
    }

    fn get(&self, guid: Option<&str>) -> Option<ConflictResolution<E>> {
        guid.and_then(|g| self.by_guid.lock().get(g).cloned())
    }
}

/// A resolver returning preset decisions keyed by the remote guid.
///
/// Unscripted conflicts resolve to `UseTheirs`. Every call is logged.
pub struct ScriptedResolver {
    notebooks: Script<Notebook>,
    tags: Script<Tag>,
    saved_searches: Script<SavedSearch>,
    notes: Script<Note>,
    resources: Script<Resource>,
    failing: Mutex<Vec<Guid>>,
    calls: Mutex<Vec<ResolverCall>>,
}

impl ScriptedResolver {
    /// Creates a resolver with no scripted decisions.
    pub fn new() -> Self {
        Self {
            notebooks: Script::new(),
            tags: Script::new(),
            saved_searches: Script::new(),
            notes: Script::new(),
            resources: Script::new(),
            failing: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Scripts the decision for a remote notebook.
    pub fn on_notebook(
        self,
        guid: impl Into<Guid>,
        resolution: ConflictResolution<Notebook>,
    ) -> Self {
        self.notebooks.set(guid.into(), resolution);
        self
    }

    /// Scripts the decision for a remote tag.
    pub fn on_tag(self, guid: impl Into<Guid>, resolution: ConflictResolution<Tag>) -> Self {
        self.tags.set(guid.into(), resolution);
        self
    }

    /// Scripts the decision for a remote saved search.
    pub fn on_saved_search(
        self,
        guid: impl Into<Guid>,
        resolution: ConflictResolution<SavedSearch>,
    ) -> Self {
        self.saved_searches.set(guid.into(), resolution);
        self
    }

    /// Scripts the decision for a remote note.
    pub fn on_note(self, guid: impl Into<Guid>, resolution: ConflictResolution<Note>) -> Self {
        self.notes.set(guid.into(), resolution);
        self
    }

    /// Scripts the decision for a remote attachment.
    pub fn on_resource(
        self,
        guid: impl Into<Guid>,
        resolution: ConflictResolution<Resource>,
    ) -> Self {
        self.resources.set(guid.into(), resolution);
        self
    }

    /// Makes conflicts on the remote item `guid` fail.
    pub fn failing_on(self, guid: impl Into<Guid>) -> Self {
        self.failing.lock().push(guid.into());
        self
    }

    /// Returns every call so far.
    pub fn calls(&self) -> Vec<ResolverCall> {
        self.calls.lock().clone()
    }

    /// Number of calls for the remote item `guid`.
    pub fn calls_for(&self, guid: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.theirs_guid.as_deref() == Some(guid))
            .count()
    }

    fn resolve<E: SyncEntity>(
        &self,
        script: &Script<E>,
        theirs: &E,
        mine: &E,
    ) -> SyncResult<ConflictResolution<E>> {
        self.calls.lock().push(ResolverCall {
            kind: E::KIND,
            theirs_guid: theirs.guid().map(str::to_string),
            mine_local_id: mine.local_id().map(str::to_string),
        });
        if let Some(guid) = theirs.guid() {
            if self.failing.lock().iter().any(|g| g == guid) {
                return Err(SyncError::Resolver(format!("scripted failure for {guid}")));
            }
        }
        Ok(script
            .get(theirs.guid())
            .unwrap_or(ConflictResolution::UseTheirs))
    }
}

impl Default for ScriptedResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConflictResolver for ScriptedResolver {
    async fn resolve_notebook_conflict(
        &self,
        theirs: &Notebook,
        mine: &Notebook,
    ) -> SyncResult<ConflictResolution<Notebook>> {
        self.resolve(&self.notebooks, theirs, mine)
    }

    async fn resolve_tag_conflict(
        &self,
        theirs: &Tag,
        mine: &Tag,
    ) -> SyncResult<ConflictResolution<Tag>> {
        self.resolve(&self.tags, theirs, mine)
    }

    async fn resolve_saved_search_conflict(
        &self,
        theirs: &SavedSearch,
        mine: &SavedSearch,
    ) -> SyncResult<ConflictResolution<SavedSearch>> {
        self.resolve(&self.saved_searches, theirs, mine)
    }

    async fn resolve_note_conflict(
        &self,
        theirs: &Note,
        mine: &Note,
    ) -> SyncResult<ConflictResolution<Note>> {
        self.resolve(&self.notes, theirs, mine)
    }

    async fn resolve_resource_conflict(
        &self,
        theirs: &Resource,
        mine: &Resource,
    ) -> SyncResult<ConflictResolution<Resource>> {
        self.resolve(&self.resources, theirs, mine)
    }
}
