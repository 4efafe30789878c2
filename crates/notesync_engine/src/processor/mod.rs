//! Entity processors.
//!
//! An [`EntityProcessor`] turns the sync chunks of one scope into local
//! storage writes for one entity kind:
//!
//! 1. Items and expunged guids are collected across all chunks; an item
//!    whose guid is also expunged is dropped, and only the newest copy of
//!    a repeated guid is kept.
//! 2. Totals are reported, then every expunge is issued.
//! 3. Items are processed in ascending USN order (parents first for
//!    hierarchical kinds). A local match by guid, or else by name, is a
//!    conflict and is handed to the [`ConflictResolver`] exactly once.
//!
//! Storage failures fail the run, except for kinds that route them to the
//! failed-to-process bucket. Retrying across runs is left to
//! [`DurableProcessor`](crate::DurableProcessor).

mod kind;
mod order;
mod status;

pub use kind::{
    NoteKind, NotebookKind, PrepareError, ProcessorKind, ResourceKind, SavedSearchKind, TagKind,
};
pub use status::{ItemFailure, ProcessStatus};

use crate::callback::{CallbackHandle, ProcessingCallback, ProcessingProgress};
use crate::config::ProcessingConfig;
use crate::error::{SyncError, SyncResult};
use crate::resolver::ConflictResolver;
use crate::storage::LocalStorage;
use futures::stream::{self, StreamExt};
use notesync_protocol::{
    ChunkContents, ConflictResolution, EntityKind, Guid, LocalId, SyncChunk, SyncEntity, Usn,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Processor for notebooks.
pub type NotebookProcessor = EntityProcessor<NotebookKind>;
/// Processor for tags.
pub type TagProcessor = EntityProcessor<TagKind>;
/// Processor for saved searches.
pub type SavedSearchProcessor = EntityProcessor<SavedSearchKind>;
/// Processor for notes.
pub type NoteProcessor = EntityProcessor<NoteKind>;
/// Processor for attachments.
pub type ResourceProcessor = EntityProcessor<ResourceKind>;

enum ItemOutcome<E> {
    Added(Guid, Usn),
    Updated(Guid, Usn),
    Skipped,
    FailedToDownload(ItemFailure<E>),
    FailedToProcess(ItemFailure<E>),
    Cancelled(E),
}

/// Guids and names seen during one run.
#[derive(Default)]
struct RunState {
    tried_guids: Mutex<HashSet<Guid>>,
    tried_names: Mutex<HashSet<(Option<Guid>, String)>>,
}

impl RunState {
    fn try_guid(&self, guid: &str) -> bool {
        self.tried_guids.lock().insert(guid.to_string())
    }

    fn track_name<E: SyncEntity>(&self, entity: &E) {
        if let Some(name) = entity.unique_name() {
            self.tried_names.lock().insert(name_key(entity, name));
        }
    }

    /// Claims the name of a replacement; fails if this run already saw it.
    fn claim_replacement_name<E: SyncEntity>(&self, replacement: &E) -> SyncResult<()> {
        let Some(name) = replacement.unique_name() else {
            return Ok(());
        };
        if !self.tried_names.lock().insert(name_key(replacement, name)) {
            return Err(SyncError::InvalidResolution(format!(
                "replacement {} name {name:?} collides with an item of this run",
                E::KIND
            )));
        }
        Ok(())
    }
}

fn name_key<E: SyncEntity>(entity: &E, name: &str) -> (Option<Guid>, String) {
    (
        entity.linked_notebook_guid().map(str::to_string),
        name.to_lowercase(),
    )
}

fn new_local_id() -> LocalId {
    uuid::Uuid::new_v4().to_string()
}

/// Unions the items and expunged guids of `chunks`.
fn collect_input<E: ChunkContents>(chunks: &[SyncChunk]) -> (Vec<E>, Vec<Guid>) {
    let mut expunged = Vec::new();
    let mut expunged_set = HashSet::new();
    for guid in chunks.iter().flat_map(|c| E::expunged(c)) {
        if expunged_set.insert(guid.clone()) {
            expunged.push(guid.clone());
        }
    }

    let mut latest: HashMap<Guid, E> = HashMap::new();
    for item in chunks.iter().flat_map(|c| E::items(c)) {
        let Some((guid, usn)) = item.sync_key() else {
            warn!(
                kind = %E::KIND,
                local_id = ?item.local_id(),
                "skipping sync item without guid or usn"
            );
            continue;
        };
        if expunged_set.contains(guid) {
            debug!(kind = %E::KIND, guid, "item expunged in the same batch");
            continue;
        }
        match latest.get(guid) {
            Some(previous) if previous.usn() >= Some(usn) => {}
            _ => {
                latest.insert(guid.to_string(), item.clone());
            }
        }
    }

    let mut items: Vec<E> = latest.into_values().collect();
    items.sort_by(|a, b| a.usn().cmp(&b.usn()).then_with(|| a.guid().cmp(&b.guid())));
    (items, expunged)
}

/// Applies sync chunks of one entity kind to local storage.
pub struct EntityProcessor<K: ProcessorKind> {
    kind: K,
    storage: Arc<dyn LocalStorage>,
    resolver: Arc<dyn ConflictResolver>,
    config: ProcessingConfig,
}

impl<K: ProcessorKind> EntityProcessor<K> {
    /// Creates a processor with the default configuration.
    pub fn new(
        kind: K,
        storage: Arc<dyn LocalStorage>,
        resolver: Arc<dyn ConflictResolver>,
    ) -> Self {
        Self {
            kind,
            storage,
            resolver,
            config: ProcessingConfig::default(),
        }
    }

    /// Sets the configuration.
    pub fn with_config(mut self, config: ProcessingConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ProcessingConfig {
        &self.config
    }

    /// Returns the entity kind this processor writes.
    pub fn entity_kind(&self) -> EntityKind {
        K::Entity::KIND
    }

    /// Processes `chunks`.
    ///
    /// Completes once every expunge and write has been issued. Items not
    /// started when `cancel` fires are reported as cancelled.
    pub async fn process(
        &self,
        chunks: &[SyncChunk],
        cancel: &CancellationToken,
        callback: Option<Weak<dyn ProcessingCallback<K::Entity>>>,
    ) -> SyncResult<ProcessStatus<K::Entity>> {
        let kind = K::Entity::KIND;
        let callback = CallbackHandle::new(callback);
        let (items, expunged) = collect_input::<K::Entity>(chunks);

        let mut progress = ProcessingProgress {
            total: items.len(),
            total_to_expunge: expunged.len(),
            ..ProcessingProgress::default()
        };
        info!(
            %kind,
            total = progress.total,
            to_expunge = progress.total_to_expunge,
            "processing sync chunks"
        );
        callback.with(|cb| cb.on_progress(progress));

        let mut status = ProcessStatus::default();
        let storage = self.storage.as_ref();

        let mut expunges = stream::iter(expunged)
            .map(|guid| async move {
                if cancel.is_cancelled() {
                    return Ok(None);
                }
                self.kind.expunge(storage, &guid).await.map(|()| Some(guid))
            })
            .buffer_unordered(self.config.max_in_flight_expunges);
        while let Some(result) = expunges.next().await {
            let Some(guid) = result? else {
                continue;
            };
            progress.expunged += 1;
            status.total_expunged += 1;
            callback.with(|cb| {
                cb.on_expunged(&guid);
                cb.on_progress(progress);
            });
            status.expunged.insert(guid);
        }

        let run = RunState::default();
        let generations = if K::HIERARCHICAL {
            order::generations(items)
        } else {
            vec![items]
        };

        for generation in generations {
            let mut outcomes = stream::iter(generation)
                .map(|item| self.process_item(item, cancel, &run))
                .buffered(self.config.max_in_flight_items);
            while let Some(outcome) = outcomes.next().await {
                match outcome? {
                    ItemOutcome::Added(guid, usn) => {
                        progress.added += 1;
                        status.total_new += 1;
                        callback.with(|cb| {
                            cb.on_processed(&guid, usn);
                            cb.on_progress(progress);
                        });
                        status.processed.insert(guid, usn);
                    }
                    ItemOutcome::Updated(guid, usn) => {
                        progress.updated += 1;
                        status.total_updated += 1;
                        callback.with(|cb| {
                            cb.on_processed(&guid, usn);
                            cb.on_progress(progress);
                        });
                        status.processed.insert(guid, usn);
                    }
                    ItemOutcome::Skipped => {}
                    ItemOutcome::FailedToDownload(failure) => {
                        callback
                            .with(|cb| cb.on_failed_to_download(&failure.entity, &failure.error));
                        status.failed_to_download.push(failure);
                    }
                    ItemOutcome::FailedToProcess(failure) => {
                        callback
                            .with(|cb| cb.on_failed_to_process(&failure.entity, &failure.error));
                        status.failed_to_process.push(failure);
                    }
                    ItemOutcome::Cancelled(entity) => {
                        callback.with(|cb| cb.on_cancelled(&entity));
                        status.cancelled.push(entity);
                    }
                }
            }
        }

        info!(
            %kind,
            added = status.total_new,
            updated = status.total_updated,
            expunged = status.total_expunged,
            failed_to_download = status.failed_to_download.len(),
            failed_to_process = status.failed_to_process.len(),
            cancelled = status.cancelled.len(),
            "finished processing sync chunks"
        );
        Ok(status)
    }

    /// Records a failure as an item outcome when this kind routes it, or
    /// fails the run.
    fn route(&self, received: K::Entity, error: SyncError) -> SyncResult<ItemOutcome<K::Entity>> {
        let routable = matches!(error, SyncError::Storage(_) | SyncError::InvalidResolution(_));
        if K::ROUTES_STORAGE_FAILURES && routable {
            warn!(
                kind = %K::Entity::KIND,
                guid = ?received.guid(),
                %error,
                "failed to process sync item"
            );
            return Ok(ItemOutcome::FailedToProcess(ItemFailure {
                entity: received,
                error: error.to_string(),
            }));
        }
        Err(error)
    }

    async fn find_match(&self, theirs: &K::Entity, guid: &str) -> SyncResult<Option<K::Entity>> {
        let storage = self.storage.as_ref();
        if let Some(mine) = self.kind.find_by_guid(storage, guid).await? {
            return Ok(Some(mine));
        }
        Ok(self.kind.find_by_name(storage, theirs).await?)
    }

    async fn process_item(
        &self,
        theirs: K::Entity,
        cancel: &CancellationToken,
        run: &RunState,
    ) -> SyncResult<ItemOutcome<K::Entity>> {
        let kind = K::Entity::KIND;
        if cancel.is_cancelled() {
            return Ok(ItemOutcome::Cancelled(theirs));
        }
        let Some((guid, usn)) = theirs.sync_key().map(|(g, u)| (g.to_string(), u)) else {
            return Ok(ItemOutcome::Skipped);
        };
        if !run.try_guid(&guid) {
            debug!(%kind, %guid, "skipping repeated sync item");
            return Ok(ItemOutcome::Skipped);
        }
        run.track_name(&theirs);

        let mine = match self.find_match(&theirs, &guid).await {
            Ok(mine) => mine,
            Err(e) => return self.route(theirs, e),
        };
        let resolution = match &mine {
            Some(mine) => {
                let resolution = self
                    .kind
                    .resolve_conflict(self.resolver.as_ref(), &theirs, mine)
                    .await?;
                debug!(%kind, %guid, %resolution, "resolved sync conflict");
                Some(resolution)
            }
            None => None,
        };

        if let Some(ConflictResolution::UseMine) = resolution {
            return Ok(ItemOutcome::Added(guid, usn));
        }
        if let Some(ConflictResolution::MoveMine(replacement)) = &resolution {
            if let Err(e) = run.claim_replacement_name(replacement) {
                return self.route(theirs, e);
            }
        }

        let storage = self.storage.as_ref();
        let mut entity = match self.kind.prepare(storage, theirs.clone()).await {
            Ok(entity) => entity,
            Err(PrepareError::Download(e)) => {
                warn!(%kind, %guid, error = %e, "failed to download sync item payload");
                return Ok(ItemOutcome::FailedToDownload(ItemFailure {
                    entity: theirs,
                    error: e.to_string(),
                }));
            }
            Err(PrepareError::Storage(e)) => return self.route(theirs, e.into()),
        };

        let mut replacement = None;
        let updated = match (resolution, mine) {
            (Some(resolution), Some(mine)) => {
                entity.set_local_id(
                    mine.local_id()
                        .map(str::to_string)
                        .unwrap_or_else(new_local_id),
                );
                match resolution {
                    ConflictResolution::UseTheirs => {
                        entity.carry_local_flags(&mine);
                        true
                    }
                    ConflictResolution::IgnoreMine => true,
                    ConflictResolution::MoveMine(mut moved) => {
                        if moved.local_id().is_none() || moved.local_id() == mine.local_id() {
                            moved.set_local_id(new_local_id());
                        }
                        if moved.guid().is_some() && moved.guid() == entity.guid() {
                            moved.clear_sync_identity();
                        }
                        replacement = Some(moved);
                        false
                    }
                    ConflictResolution::UseMine => return Ok(ItemOutcome::Added(guid, usn)),
                }
            }
            _ => {
                entity.set_local_id(new_local_id());
                false
            }
        };

        if let Some(moved) = replacement {
            if let Err(e) = self.kind.put(storage, moved).await {
                return self.route(theirs, e.into());
            }
        }
        if let Err(e) = self.kind.put(storage, entity).await {
            return self.route(theirs, e.into());
        }

        Ok(if updated {
            ItemOutcome::Updated(guid, usn)
        } else {
            ItemOutcome::Added(guid, usn)
        })
    }
}
