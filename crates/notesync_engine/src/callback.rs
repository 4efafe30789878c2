//! Progress and outcome callbacks.

use notesync_protocol::Usn;
use std::sync::Weak;

/// Running totals of one processing run.
///
/// All counters are monotonically non-decreasing within a run; the last
/// reported value reflects the final outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessingProgress {
    /// Number of items to add or update.
    pub total: usize,
    /// Number of guids to expunge.
    pub total_to_expunge: usize,
    /// Items counted as added.
    pub added: usize,
    /// Items counted as updated.
    pub updated: usize,
    /// Guids expunged.
    pub expunged: usize,
}

/// Receives progress and per-item outcomes from an entity processor.
///
/// Processors hold the callback weakly; a dropped consumer simply stops
/// receiving events. Every method has a no-op default.
pub trait ProcessingCallback<E>: Send + Sync {
    /// Called once with the totals and after every completed item.
    fn on_progress(&self, _progress: ProcessingProgress) {}

    /// Called after an item was written (or deliberately left alone).
    fn on_processed(&self, _guid: &str, _usn: Usn) {}

    /// Called after a guid was expunged.
    fn on_expunged(&self, _guid: &str) {}

    /// Called when an item's payload could not be downloaded.
    fn on_failed_to_download(&self, _entity: &E, _error: &str) {}

    /// Called when an item could not be written.
    fn on_failed_to_process(&self, _entity: &E, _error: &str) {}

    /// Called for each item skipped because the run was cancelled.
    fn on_cancelled(&self, _entity: &E) {}
}

/// Weak handle to a callback; upgrades on every event.
pub(crate) struct CallbackHandle<E> {
    inner: Option<Weak<dyn ProcessingCallback<E>>>,
}

impl<E> CallbackHandle<E> {
    pub(crate) fn new(inner: Option<Weak<dyn ProcessingCallback<E>>>) -> Self {
        Self { inner }
    }

    pub(crate) fn with<F: FnOnce(&dyn ProcessingCallback<E>)>(&self, f: F) {
        if let Some(callback) = self.inner.as_ref().and_then(Weak::upgrade) {
            f(callback.as_ref());
        }
    }
}
