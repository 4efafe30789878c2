//! Crash-resumable processing.
//!
//! A [`DurableProcessor`] wraps an [`EntityProcessor`] and records every
//! item outcome on disk as it happens. The next invocation first retries
//! the items that previously failed or were cancelled, then processes the
//! new input minus everything already applied.

mod store;

pub use store::DurableRecords;

use crate::callback::{CallbackHandle, ProcessingCallback, ProcessingProgress};
use crate::config::SyncPaths;
use crate::error::{SyncError, SyncResult};
use crate::processor::{EntityProcessor, ProcessStatus, ProcessorKind};
use notesync_protocol::{
    ChunkContents, FailureKind, FailureRecord, Guid, ProcessedRecord, SyncChunk, SyncEntity,
    SyncScope, Usn,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Persists outcomes as they are reported and forwards them.
///
/// The first write error cancels the rest of the run and is returned by
/// [`DurableProcessor::process`]. Progress of a later pass is reported on
/// top of the final totals of the earlier ones, so the consumer sees one
/// non-decreasing sequence per invocation.
struct RecordingCallback<E> {
    store: DurableRecords,
    outer: CallbackHandle<E>,
    cancel: CancellationToken,
    error: Mutex<Option<SyncError>>,
    progress: Mutex<PassProgress>,
}

#[derive(Default)]
struct PassProgress {
    base: ProcessingProgress,
    last: ProcessingProgress,
}

impl<E: SyncEntity> RecordingCallback<E> {
    fn new(store: DurableRecords, outer: CallbackHandle<E>, cancel: CancellationToken) -> Self {
        Self {
            store,
            outer,
            cancel,
            error: Mutex::new(None),
            progress: Mutex::new(PassProgress::default()),
        }
    }

    /// Starts counting a new pass from the totals reported so far.
    fn next_pass(&self) {
        let mut progress = self.progress.lock();
        progress.base = progress.last;
    }

    fn record(&self, result: SyncResult<()>) {
        if let Err(e) = result {
            error!(kind = %E::KIND, error = %e, "failed to persist processing outcome");
            let mut slot = self.error.lock();
            if slot.is_none() {
                *slot = Some(e);
            }
            self.cancel.cancel();
        }
    }

    fn take_error(&self) -> Option<SyncError> {
        self.error.lock().take()
    }
}

impl<E: SyncEntity> ProcessingCallback<E> for RecordingCallback<E> {
    fn on_progress(&self, progress: ProcessingProgress) {
        let combined = {
            let mut state = self.progress.lock();
            let base = state.base;
            state.last = ProcessingProgress {
                total: base.total + progress.total,
                total_to_expunge: base.total_to_expunge + progress.total_to_expunge,
                added: base.added + progress.added,
                updated: base.updated + progress.updated,
                expunged: base.expunged + progress.expunged,
            };
            state.last
        };
        self.outer.with(|cb| cb.on_progress(combined));
    }

    fn on_processed(&self, guid: &str, usn: Usn) {
        self.record(self.store.write_processed(guid, usn));
        self.outer.with(|cb| cb.on_processed(guid, usn));
    }

    fn on_expunged(&self, guid: &str) {
        self.record(self.store.write_expunged(guid));
        self.outer.with(|cb| cb.on_expunged(guid));
    }

    fn on_failed_to_download(&self, entity: &E, error: &str) {
        let record = FailureRecord::new(
            FailureKind::FailedToDownload,
            entity.clone(),
            Some(error.to_string()),
        );
        self.record(self.store.write_failure(&record));
        self.outer.with(|cb| cb.on_failed_to_download(entity, error));
    }

    fn on_failed_to_process(&self, entity: &E, error: &str) {
        let record = FailureRecord::new(
            FailureKind::FailedToProcess,
            entity.clone(),
            Some(error.to_string()),
        );
        self.record(self.store.write_failure(&record));
        self.outer.with(|cb| cb.on_failed_to_process(entity, error));
    }

    fn on_cancelled(&self, entity: &E) {
        let record = FailureRecord::new(FailureKind::Cancelled, entity.clone(), None);
        self.record(self.store.write_failure(&record));
        self.outer.with(|cb| cb.on_cancelled(entity));
    }
}

/// An [`EntityProcessor`] whose progress survives crashes.
pub struct DurableProcessor<K: ProcessorKind> {
    processor: EntityProcessor<K>,
    store: DurableRecords,
}

impl<K: ProcessorKind> DurableProcessor<K> {
    /// Wraps `processor`, keeping records in `dir`.
    pub fn new(processor: EntityProcessor<K>, dir: impl Into<PathBuf>) -> Self {
        let fsync = processor.config().fsync;
        Self {
            processor,
            store: DurableRecords::new(dir.into(), fsync),
        }
    }

    /// Wraps `processor`, keeping records in the standard directory of
    /// `scope` below `paths`.
    pub fn for_scope(
        processor: EntityProcessor<K>,
        paths: &SyncPaths,
        scope: &SyncScope,
    ) -> SyncResult<Self> {
        let dir = paths
            .durable_kind_dir(scope, K::Entity::KIND)
            .ok_or_else(|| SyncError::InvalidScope(scope.clone()))?;
        Ok(Self::new(processor, dir))
    }

    /// Returns the record directory.
    pub fn dir(&self) -> &Path {
        self.store.dir()
    }

    /// Returns the wrapped processor.
    pub fn processor(&self) -> &EntityProcessor<K> {
        &self.processor
    }

    /// Processes `chunks`, first retrying items that failed or were
    /// cancelled in earlier invocations.
    ///
    /// Items already recorded as processed at an equal or newer USN are not
    /// resubmitted, including items the retry pass just applied at a newer
    /// USN; recorded expunges are not issued again. The callback receives
    /// the events of both passes, with progress counted across both.
    pub async fn process(
        &self,
        chunks: &[SyncChunk],
        cancel: &CancellationToken,
        callback: Option<Weak<dyn ProcessingCallback<K::Entity>>>,
    ) -> SyncResult<ProcessStatus<K::Entity>> {
        let kind = K::Entity::KIND;
        let processed = self.store.processed()?;
        let expunged = self.store.expunged()?;
        let failures = self.store.failures::<K::Entity>()?;

        let retry = retry_set(failures, chunks, &processed);
        info!(
            %kind,
            processed = processed.len(),
            expunged = expunged.len(),
            retry = retry.len(),
            "resuming durable processing"
        );

        let run_cancel = cancel.child_token();
        let recorder = Arc::new(RecordingCallback::new(
            self.store.clone(),
            CallbackHandle::new(callback),
            run_cancel.clone(),
        ));
        let dyn_recorder: Arc<dyn ProcessingCallback<K::Entity>> = recorder.clone();

        let retry_status = if retry.is_empty() {
            ProcessStatus::default()
        } else {
            let chunk = retry_chunk(retry);
            let status = self
                .processor
                .process(&[chunk], &run_cancel, Some(Arc::downgrade(&dyn_recorder)))
                .await?;
            if let Some(e) = recorder.take_error() {
                return Err(e);
            }
            recorder.next_pass();
            status
        };

        // The retry pass may have applied newer copies of input items.
        let mut applied = processed;
        for (guid, &usn) in &retry_status.processed {
            let entry = applied.entry(guid.clone()).or_insert(usn);
            *entry = (*entry).max(usn);
        }
        let input = filter_input::<K::Entity>(chunks, &applied, &expunged);

        let status = self
            .processor
            .process(&input, &run_cancel, Some(Arc::downgrade(&dyn_recorder)))
            .await?;
        if let Some(e) = recorder.take_error() {
            return Err(e);
        }

        Ok(status.merge(retry_status))
    }

    /// Items recorded as processed.
    pub fn processed_records(&self) -> SyncResult<Vec<ProcessedRecord>> {
        Ok(self
            .store
            .processed()?
            .into_iter()
            .map(|(guid, usn)| ProcessedRecord::new(guid, usn))
            .collect())
    }

    /// Guids recorded as expunged.
    pub fn expunged_records(&self) -> SyncResult<Vec<Guid>> {
        Ok(self.store.expunged()?.into_iter().collect())
    }

    /// Items recorded as failed or cancelled.
    pub fn failure_records(&self) -> SyncResult<Vec<FailureRecord<K::Entity>>> {
        self.store.failures()
    }

    /// Deletes every record of this kind.
    ///
    /// Call only after the whole sync succeeded.
    pub fn cleanup(&self) -> SyncResult<()> {
        self.store.clear()?;
        info!(
            kind = %K::Entity::KIND,
            dir = %self.store.dir().display(),
            "cleaned up durable records"
        );
        Ok(())
    }
}

fn superseded(processed: &BTreeMap<Guid, Usn>, guid: &str, usn: Usn) -> bool {
    processed.get(guid).is_some_and(|&done| done >= usn)
}

/// Copies `chunks` without items already applied and expunges already issued.
fn filter_input<E: ChunkContents>(
    chunks: &[SyncChunk],
    processed: &BTreeMap<Guid, Usn>,
    expunged: &BTreeSet<Guid>,
) -> Vec<SyncChunk> {
    chunks
        .iter()
        .map(|chunk| {
            let mut chunk = chunk.clone();
            E::items_mut(&mut chunk).retain(|item| match item.sync_key() {
                Some((guid, usn)) => !superseded(processed, guid, usn),
                None => true,
            });
            E::retain_expunged(&mut chunk, |guid| !expunged.contains(guid));
            chunk
        })
        .collect()
}

/// Previous failures that neither a processed record nor the new input
/// supersedes.
fn retry_set<E: ChunkContents>(
    failures: Vec<FailureRecord<E>>,
    chunks: &[SyncChunk],
    processed: &BTreeMap<Guid, Usn>,
) -> Vec<E> {
    let mut newest_input: HashMap<&str, Usn> = HashMap::new();
    let mut expunged_input: HashSet<&str> = HashSet::new();
    for chunk in chunks {
        for (guid, usn) in E::items(chunk).iter().filter_map(|e| e.sync_key()) {
            let entry = newest_input.entry(guid).or_insert(usn);
            *entry = (*entry).max(usn);
        }
        expunged_input.extend(E::expunged(chunk).iter().map(String::as_str));
    }

    failures
        .into_iter()
        .filter_map(|record| {
            let (guid, usn) = record.entity.sync_key()?;
            if superseded(processed, guid, usn) {
                debug!(guid, usn, "failure already superseded by a processed record");
                return None;
            }
            if newest_input.get(guid).is_some_and(|&newer| newer >= usn)
                || expunged_input.contains(guid)
            {
                debug!(guid, usn, "failure superseded by new input");
                return None;
            }
            Some(record.entity)
        })
        .collect()
}

fn retry_chunk<E: ChunkContents>(items: Vec<E>) -> SyncChunk {
    let usns = items.iter().filter_map(|e| e.usn());
    let low = usns.clone().min().unwrap_or(0);
    let high = usns.max().unwrap_or(0);
    let mut chunk = SyncChunk::new(low, high);
    E::items_mut(&mut chunk).extend(items);
    chunk
}

#[cfg(test)]
mod tests {
    use super::*;
    use notesync_protocol::Note;

    fn note(guid: &str, usn: Usn) -> Note {
        Note::new(guid).with_guid(guid, usn)
    }

    #[test]
    fn retry_set_drops_superseded_failures() {
        let failures = vec![
            FailureRecord::new(FailureKind::Cancelled, note("a", 3), None),
            FailureRecord::new(FailureKind::FailedToProcess, note("b", 4), Some("x".into())),
            FailureRecord::new(FailureKind::FailedToDownload, note("c", 5), None),
            FailureRecord::new(FailureKind::Cancelled, note("d", 6), None),
            FailureRecord::new(FailureKind::Cancelled, note("e", 7), None),
        ];
        let mut processed = BTreeMap::new();
        processed.insert("a".to_string(), 3);
        let mut chunk = SyncChunk::new(8, 9);
        chunk.notes.push(note("b", 9));
        chunk.expunged_notes.push("c".into());

        let retry = retry_set(failures, &[chunk], &processed);
        let guids: Vec<_> = retry.iter().filter_map(|n| n.guid.clone()).collect();
        assert_eq!(guids, vec!["d", "e"]);
    }

    #[test]
    fn filter_input_skips_applied_items() {
        let mut chunk = SyncChunk::new(1, 9);
        chunk.notes.push(note("a", 3));
        chunk.notes.push(note("b", 9));
        chunk.expunged_notes.push("x".into());
        chunk.expunged_notes.push("y".into());
        let mut processed = BTreeMap::new();
        processed.insert("a".to_string(), 3);
        processed.insert("b".to_string(), 2);
        let expunged = ["x".to_string()].into_iter().collect();

        let filtered = filter_input::<Note>(&[chunk], &processed, &expunged);
        let guids: Vec<_> = filtered[0].notes.iter().filter_map(|n| n.guid.clone()).collect();
        assert_eq!(guids, vec!["b"]);
        assert_eq!(filtered[0].expunged_notes, vec!["y".to_string()]);
    }

    #[test]
    fn retry_chunk_spans_failed_usns() {
        let chunk = retry_chunk(vec![note("a", 7), note("b", 3)]);
        assert_eq!(chunk.usn_range(), (3, 7));
        assert_eq!(chunk.notes.len(), 2);
    }
}
