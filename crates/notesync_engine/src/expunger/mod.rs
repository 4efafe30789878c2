//! Stale data cleanup after a full sync.
//!
//! After a full (non-incremental) sync of one scope, every local item that
//! still carries a guid the remote service did not report is stale. Clean
//! stale items are expunged. Dirty ones are de-synchronized instead: their
//! guid and USN are cleared so the next send pass uploads them as new.
//!
//! ```text
//! Idle → FillingCaches → Analyzing → Rewriting → Expunging → Done
//!                                  ↘ Expunging ↗            ↘ Failed
//! ```
//!
//! Rewrites run before expunges: expunging a notebook or tag cascades in
//! storage, and a rewritten item must be detached first.

mod index;

pub use index::LocalIndex;

use crate::config::ProcessingConfig;
use crate::error::{SyncError, SyncResult};
use crate::storage::LocalStorage;
use futures::stream::{self, StreamExt, TryStreamExt};
use notesync_protocol::{
    EntityKind, Guid, Note, Notebook, SavedSearch, SyncEntity, SyncScope, Tag,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Progress of a [`StaleDataExpunger`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpungerState {
    /// Not started.
    Idle,
    /// Loading the local indexes.
    FillingCaches,
    /// Deciding what to expunge and what to rewrite.
    Analyzing,
    /// Writing de-synchronized copies of dirty stale items.
    Rewriting,
    /// Expunging clean stale items.
    Expunging,
    /// Finished successfully.
    Done,
    /// Finished with an error.
    Failed,
}

impl ExpungerState {
    /// Returns true if `next` may follow this state.
    pub fn can_transition_to(self, next: ExpungerState) -> bool {
        use ExpungerState::*;
        matches!(
            (self, next),
            (Idle, FillingCaches)
                | (FillingCaches, Analyzing)
                | (Analyzing, Rewriting | Expunging | Done)
                | (Rewriting, Expunging | Done)
                | (Expunging, Done)
                | (FillingCaches | Analyzing | Rewriting | Expunging, Failed)
        )
    }

    /// Returns true for `Done` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, ExpungerState::Done | ExpungerState::Failed)
    }
}

impl fmt::Display for ExpungerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExpungerState::Idle => "idle",
            ExpungerState::FillingCaches => "filling-caches",
            ExpungerState::Analyzing => "analyzing",
            ExpungerState::Rewriting => "rewriting",
            ExpungerState::Expunging => "expunging",
            ExpungerState::Done => "done",
            ExpungerState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Guids the remote service reported during a full sync of one scope.
#[derive(Debug, Clone, Default)]
pub struct SyncedGuids {
    /// Notebook guids.
    pub notebooks: HashSet<Guid>,
    /// Tag guids.
    pub tags: HashSet<Guid>,
    /// Saved search guids.
    pub saved_searches: HashSet<Guid>,
    /// Note guids.
    pub notes: HashSet<Guid>,
}

/// What a [`StaleDataExpunger`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpungeReport {
    /// Expunged guids per kind.
    pub expunged: BTreeMap<EntityKind, Vec<Guid>>,
    /// Former guids of rewritten items per kind.
    pub rewritten: BTreeMap<EntityKind, Vec<Guid>>,
}

impl ExpungeReport {
    /// Guids of `kind` that were expunged.
    pub fn expunged(&self, kind: EntityKind) -> &[Guid] {
        self.expunged.get(&kind).map_or(&[], Vec::as_slice)
    }

    /// Former guids of `kind` that were rewritten.
    pub fn rewritten(&self, kind: EntityKind) -> &[Guid] {
        self.rewritten.get(&kind).map_or(&[], Vec::as_slice)
    }

    /// Returns true if nothing was stale.
    pub fn is_empty(&self) -> bool {
        self.expunged.values().all(Vec::is_empty) && self.rewritten.values().all(Vec::is_empty)
    }
}

/// The four filled indexes of one scope.
struct Indexes {
    notebooks: LocalIndex<Notebook>,
    tags: LocalIndex<Tag>,
    saved_searches: LocalIndex<SavedSearch>,
    notes: LocalIndex<Note>,
}

enum Rewrite {
    Notebook(Notebook),
    Tag(Tag),
    SavedSearch(SavedSearch),
    Note(Note),
}

#[derive(Default)]
struct Plan {
    rewrites: Vec<Rewrite>,
    /// Tag expunges, deepest level first.
    tag_levels: Vec<Vec<Guid>>,
    expunges: Vec<(EntityKind, Guid)>,
    report: ExpungeReport,
}

impl Plan {
    fn rewrite<E: SyncEntity>(&mut self, mut entity: E, wrap: fn(E) -> Rewrite) {
        let guid = entity.guid().map(str::to_string).unwrap_or_default();
        entity.clear_sync_identity();
        entity.set_dirty(true);
        self.report.rewritten.entry(E::KIND).or_default().push(guid);
        self.rewrites.push(wrap(entity));
    }

    fn expunge(&mut self, kind: EntityKind, guid: &str) {
        self.report
            .expunged
            .entry(kind)
            .or_default()
            .push(guid.to_string());
        if kind != EntityKind::Tag {
            self.expunges.push((kind, guid.to_string()));
        }
    }
}

/// Removes or de-synchronizes local items of one scope that a full sync
/// did not report.
pub struct StaleDataExpunger {
    storage: Arc<dyn LocalStorage>,
    scope: SyncScope,
    config: ProcessingConfig,
    state: Mutex<ExpungerState>,
}

impl StaleDataExpunger {
    /// Creates an expunger for `scope`.
    pub fn new(storage: Arc<dyn LocalStorage>, scope: SyncScope) -> Self {
        Self {
            storage,
            scope,
            config: ProcessingConfig::default(),
            state: Mutex::new(ExpungerState::Idle),
        }
    }

    /// Sets the configuration; `max_in_flight_expunges` bounds concurrent
    /// storage calls.
    pub fn with_config(mut self, config: ProcessingConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns the scope.
    pub fn scope(&self) -> &SyncScope {
        &self.scope
    }

    /// Returns the current state.
    pub fn state(&self) -> ExpungerState {
        *self.state.lock()
    }

    fn transition(&self, next: ExpungerState) -> SyncResult<()> {
        let mut state = self.state.lock();
        if !state.can_transition_to(next) {
            return Err(SyncError::InvalidStateTransition {
                from: state.to_string(),
                to: next.to_string(),
            });
        }
        debug!(scope = %self.scope, from = %*state, to = %next, "stale data expunger state change");
        *state = next;
        Ok(())
    }

    /// Expunges or rewrites every stale item of the scope.
    ///
    /// Runs once; a second call fails with
    /// [`SyncError::InvalidStateTransition`]. The first failed storage call
    /// fails the whole operation.
    pub async fn expunge(
        &self,
        synced: &SyncedGuids,
        cancel: &CancellationToken,
    ) -> SyncResult<ExpungeReport> {
        self.transition(ExpungerState::FillingCaches)?;
        match self.run(synced, cancel).await {
            Ok(report) => {
                self.transition(ExpungerState::Done)?;
                info!(
                    scope = %self.scope,
                    expunged = report.expunged.values().map(Vec::len).sum::<usize>(),
                    rewritten = report.rewritten.values().map(Vec::len).sum::<usize>(),
                    "stale data expunged"
                );
                Ok(report)
            }
            Err(e) => {
                warn!(scope = %self.scope, error = %e, "stale data expunging failed");
                self.transition(ExpungerState::Failed)?;
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        synced: &SyncedGuids,
        cancel: &CancellationToken,
    ) -> SyncResult<ExpungeReport> {
        let indexes = self.fill_indexes().await?;
        self.transition(ExpungerState::Analyzing)?;
        let plan = analyze(&indexes, synced);

        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        if !plan.rewrites.is_empty() {
            self.transition(ExpungerState::Rewriting)?;
            self.apply_rewrites(plan.rewrites).await?;
        }
        if !plan.expunges.is_empty() || !plan.tag_levels.is_empty() {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            self.transition(ExpungerState::Expunging)?;
            for level in plan.tag_levels {
                let ops = level.into_iter().map(|guid| (EntityKind::Tag, guid));
                self.apply_expunges(ops.collect()).await?;
            }
            self.apply_expunges(plan.expunges).await?;
        }
        Ok(plan.report)
    }

    async fn fill_indexes(&self) -> SyncResult<Indexes> {
        let storage = self.storage.as_ref();
        let linked = self.scope.linked_notebook_guid();
        let (notebooks, tags, saved_searches, notes) = futures::try_join!(
            storage.list_notebooks(linked),
            storage.list_tags(linked),
            async {
                // Saved searches exist only in the user's own scope.
                match linked {
                    None => storage.list_saved_searches().await,
                    Some(_) => Ok(Vec::new()),
                }
            },
            storage.list_notes(linked),
        )?;
        let indexes = Indexes {
            notebooks: LocalIndex::new(notebooks),
            tags: LocalIndex::new(tags),
            saved_searches: LocalIndex::new(saved_searches),
            notes: LocalIndex::new(notes),
        };
        debug!(
            scope = %self.scope,
            notebooks = indexes.notebooks.len(),
            tags = indexes.tags.len(),
            saved_searches = indexes.saved_searches.len(),
            notes = indexes.notes.len(),
            "filled local indexes"
        );
        Ok(indexes)
    }

    async fn apply_rewrites(&self, rewrites: Vec<Rewrite>) -> SyncResult<()> {
        let storage = self.storage.as_ref();
        stream::iter(rewrites)
            .map(|rewrite| async move {
                match rewrite {
                    Rewrite::Notebook(n) => storage.put_notebook(n).await,
                    Rewrite::Tag(t) => storage.put_tag(t).await,
                    Rewrite::SavedSearch(s) => storage.put_saved_search(s).await,
                    Rewrite::Note(n) => storage.put_note(n).await,
                }
            })
            .buffer_unordered(self.config.max_in_flight_expunges)
            .try_collect::<Vec<()>>()
            .await?;
        Ok(())
    }

    async fn apply_expunges(&self, expunges: Vec<(EntityKind, Guid)>) -> SyncResult<()> {
        let storage = self.storage.as_ref();
        stream::iter(expunges)
            .map(|(kind, guid)| async move {
                match kind {
                    EntityKind::Notebook => storage.expunge_notebook_by_guid(&guid).await,
                    EntityKind::Tag => storage.expunge_tag_by_guid(&guid).await,
                    EntityKind::SavedSearch => storage.expunge_saved_search_by_guid(&guid).await,
                    EntityKind::Note => storage.expunge_note_by_guid(&guid).await,
                    EntityKind::Resource => Ok(()),
                }
            })
            .buffer_unordered(self.config.max_in_flight_expunges)
            .try_collect::<Vec<()>>()
            .await?;
        Ok(())
    }
}

/// Decides the fate of every stale item.
fn analyze(indexes: &Indexes, synced: &SyncedGuids) -> Plan {
    let mut plan = Plan::default();

    // Notebooks holding dirty notes are rewritten so the cascade cannot
    // delete unsent edits.
    let mut with_dirty_notes: HashSet<&str> = HashSet::new();
    for (_, note) in indexes.notes.dirty() {
        if let Some(guid) = note.notebook_guid.as_deref() {
            with_dirty_notes.insert(guid);
        }
        if let Some(guid) = note
            .notebook_local_id
            .as_deref()
            .and_then(|id| indexes.notebooks.guid_of(id))
        {
            with_dirty_notes.insert(guid);
        }
    }
    for notebook in indexes.notebooks.stale(&synced.notebooks) {
        let guid = notebook.guid.as_deref().unwrap_or_default();
        if notebook.dirty || with_dirty_notes.contains(guid) {
            plan.rewrite(notebook.clone(), Rewrite::Notebook);
        } else {
            plan.expunge(EntityKind::Notebook, guid);
        }
    }

    analyze_tags(&indexes.tags, &synced.tags, &mut plan);

    for search in indexes.saved_searches.stale(&synced.saved_searches) {
        if search.dirty {
            plan.rewrite(search.clone(), Rewrite::SavedSearch);
        } else {
            plan.expunge(EntityKind::SavedSearch, search.guid.as_deref().unwrap_or_default());
        }
    }

    for note in indexes.notes.stale(&synced.notes) {
        if note.dirty {
            plan.rewrite(note.clone(), Rewrite::Note);
        } else {
            plan.expunge(EntityKind::Note, note.guid.as_deref().unwrap_or_default());
        }
    }

    plan
}

/// Stale tags plus all their descendants. Clean ones are expunged children
/// first; dirty ones are rewritten, detached from a parent that goes away.
fn analyze_tags(tags: &LocalIndex<Tag>, synced: &HashSet<Guid>, plan: &mut Plan) {
    let mut children: HashMap<&str, Vec<&Tag>> = HashMap::new();
    for (_, tag) in tags.iter() {
        if let Some(parent) = tag.parent_guid.as_deref() {
            children.entry(parent).or_default().push(tag);
        }
    }

    let mut affected: BTreeSet<&str> = BTreeSet::new();
    let mut pending: Vec<&str> = tags
        .stale(synced)
        .filter_map(|t| t.guid.as_deref())
        .collect();
    while let Some(guid) = pending.pop() {
        if affected.insert(guid) {
            let kids = children.get(guid).into_iter().flatten();
            pending.extend(kids.filter_map(|t| t.guid.as_deref()));
        }
    }

    // Depth is the number of affected ancestors; the bound stops on cycles.
    let depth: BTreeMap<&str, usize> = affected
        .iter()
        .map(|&guid| {
            let mut depth = 0;
            let mut current = guid;
            while let Some(parent) = tags.get(current).and_then(|t| t.parent_guid.as_deref()) {
                if !affected.contains(parent) || depth >= affected.len() {
                    break;
                }
                depth += 1;
                current = parent;
            }
            (guid, depth)
        })
        .collect();

    let expunged: HashSet<&str> = depth
        .keys()
        .copied()
        .filter(|guid| !tags.is_dirty(guid))
        .collect();

    let mut levels: BTreeMap<usize, Vec<Guid>> = BTreeMap::new();
    for (&guid, &tag_depth) in &depth {
        let Some(tag) = tags.get(guid) else {
            continue;
        };
        if tag.dirty {
            let mut copy = tag.clone();
            if let Some(parent) = copy.parent_guid.as_deref() {
                if expunged.contains(parent) {
                    copy.parent_local_id = None;
                }
                if affected.contains(parent) {
                    copy.parent_guid = None;
                }
            }
            plan.rewrite(copy, Rewrite::Tag);
        } else {
            plan.expunge(EntityKind::Tag, guid);
            levels.entry(tag_depth).or_default().push(guid.to_string());
        }
    }
    plan.tag_levels = levels.into_values().rev().collect();
}
