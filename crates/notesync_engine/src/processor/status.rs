//! Aggregate outcome of a processing run.

use notesync_protocol::{Guid, SyncEntity, Usn};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// An item that could not be downloaded or written.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemFailure<E> {
    /// The remote item as received.
    pub entity: E,
    /// Error description.
    pub error: String,
}

/// Outcome of one processing run of one entity kind.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessStatus<E> {
    /// Items counted as added.
    pub total_new: usize,
    /// Items counted as updated.
    pub total_updated: usize,
    /// Guids expunged.
    pub total_expunged: usize,
    /// Items whose payload could not be downloaded.
    pub failed_to_download: Vec<ItemFailure<E>>,
    /// Items that could not be written.
    pub failed_to_process: Vec<ItemFailure<E>>,
    /// Items skipped because the run was cancelled.
    pub cancelled: Vec<E>,
    /// USN at which each item was processed, by guid.
    pub processed: BTreeMap<Guid, Usn>,
    /// Expunged guids.
    pub expunged: BTreeSet<Guid>,
}

impl<E> Default for ProcessStatus<E> {
    fn default() -> Self {
        Self {
            total_new: 0,
            total_updated: 0,
            total_expunged: 0,
            failed_to_download: Vec::new(),
            failed_to_process: Vec::new(),
            cancelled: Vec::new(),
            processed: BTreeMap::new(),
            expunged: BTreeSet::new(),
        }
    }
}

impl<E: SyncEntity> ProcessStatus<E> {
    /// Returns true if no item failed or was cancelled.
    pub fn is_complete(&self) -> bool {
        self.failed_to_download.is_empty()
            && self.failed_to_process.is_empty()
            && self.cancelled.is_empty()
    }

    /// Guids with any recorded outcome.
    fn outcome_guids(&self) -> HashSet<Guid> {
        let failed = self
            .failed_to_download
            .iter()
            .chain(&self.failed_to_process)
            .map(|f| &f.entity)
            .chain(&self.cancelled)
            .filter_map(|e| e.guid().map(str::to_string));
        self.processed
            .keys()
            .cloned()
            .chain(self.expunged.iter().cloned())
            .chain(failed)
            .collect()
    }

    /// Merges the status of an earlier run into this one.
    ///
    /// Counters are summed. Per-guid outcomes of `self` win: an item
    /// `secondary` reports is dropped if `self` reports the same guid.
    pub fn merge(mut self, secondary: ProcessStatus<E>) -> Self {
        let primary = self.outcome_guids();
        let keep = |e: &E| e.guid().is_none_or(|g| !primary.contains(g));

        self.total_new += secondary.total_new;
        self.total_updated += secondary.total_updated;
        self.total_expunged += secondary.total_expunged;
        self.failed_to_download.extend(
            secondary
                .failed_to_download
                .into_iter()
                .filter(|f| keep(&f.entity)),
        );
        self.failed_to_process.extend(
            secondary
                .failed_to_process
                .into_iter()
                .filter(|f| keep(&f.entity)),
        );
        self.cancelled
            .extend(secondary.cancelled.into_iter().filter(|e| keep(e)));
        for (guid, usn) in secondary.processed {
            if !primary.contains(&guid) {
                self.processed.insert(guid, usn);
            }
        }
        self.expunged.extend(secondary.expunged);
        self
    }
}
