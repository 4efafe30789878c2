//! Callbacks that record processing events.

use notesync_engine::{ProcessingCallback, ProcessingProgress};
use notesync_protocol::{Guid, SyncEntity, Usn};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tokio_util::sync::CancellationToken;

/// One event received by a [`RecordingCallback`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackEvent {
    /// A progress report.
    Progress(ProcessingProgress),
    /// An item was processed.
    Processed(Guid, Usn),
    /// A guid was expunged.
    Expunged(Guid),
    /// An item's payload could not be downloaded.
    FailedToDownload(Guid),
    /// An item could not be written.
    FailedToProcess(Guid),
    /// An item was skipped after cancellation.
    Cancelled(Guid),
}

/// Records every event and optionally cancels after a number of items.
pub struct RecordingCallback {
    events: Mutex<Vec<CallbackEvent>>,
    cancel_after: Option<(usize, CancellationToken)>,
    completed: AtomicUsize,
}

impl RecordingCallback {
    /// Creates a callback that only records.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
            cancel_after: None,
            completed: AtomicUsize::new(0),
        })
    }

    /// Creates a callback that cancels `token` once `items` items were
    /// processed or expunged.
    pub fn cancelling_after(items: usize, token: CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
            cancel_after: Some((items, token)),
            completed: AtomicUsize::new(0),
        })
    }

    /// Returns a weak handle suitable for a processor.
    pub fn handle<E: SyncEntity + 'static>(self: &Arc<Self>) -> Weak<dyn ProcessingCallback<E>> {
        let callback: Arc<dyn ProcessingCallback<E>> = self.clone();
        Arc::downgrade(&callback)
    }

    /// Returns every event so far.
    pub fn events(&self) -> Vec<CallbackEvent> {
        self.events.lock().clone()
    }

    /// Returns the last progress report.
    pub fn last_progress(&self) -> Option<ProcessingProgress> {
        self.events.lock().iter().rev().find_map(|e| match e {
            CallbackEvent::Progress(p) => Some(*p),
            _ => None,
        })
    }

    /// Every progress report, in order.
    pub fn progress(&self) -> Vec<ProcessingProgress> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                CallbackEvent::Progress(p) => Some(*p),
                _ => None,
            })
            .collect()
    }

    /// Guids reported as processed, in report order.
    pub fn processed(&self) -> Vec<Guid> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                CallbackEvent::Processed(guid, _) => Some(guid.clone()),
                _ => None,
            })
            .collect()
    }

    /// Guids reported as cancelled.
    pub fn cancelled(&self) -> Vec<Guid> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                CallbackEvent::Cancelled(guid) => Some(guid.clone()),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: CallbackEvent) {
        self.events.lock().push(event);
    }

    fn completed_one(&self) {
        let done = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((limit, token)) = &self.cancel_after {
            if done >= *limit {
                token.cancel();
            }
        }
    }
}

fn guid_of<E: SyncEntity>(entity: &E) -> Guid {
    entity.guid().unwrap_or_default().to_string()
}

impl<E: SyncEntity> ProcessingCallback<E> for RecordingCallback {
    fn on_progress(&self, progress: ProcessingProgress) {
        self.push(CallbackEvent::Progress(progress));
    }

    fn on_processed(&self, guid: &str, usn: Usn) {
        self.push(CallbackEvent::Processed(guid.to_string(), usn));
        self.completed_one();
    }

    fn on_expunged(&self, guid: &str) {
        self.push(CallbackEvent::Expunged(guid.to_string()));
        self.completed_one();
    }

    fn on_failed_to_download(&self, entity: &E, _error: &str) {
        self.push(CallbackEvent::FailedToDownload(guid_of(entity)));
    }

    fn on_failed_to_process(&self, entity: &E, _error: &str) {
        self.push(CallbackEvent::FailedToProcess(guid_of(entity)));
    }

    fn on_cancelled(&self, entity: &E) {
        self.push(CallbackEvent::Cancelled(guid_of(entity)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notesync_protocol::Note;

    #[test]
    fn cancels_after_limit() {
        let token = CancellationToken::new();
        let callback = RecordingCallback::cancelling_after(2, token.clone());
        let dyn_callback: &dyn ProcessingCallback<Note> = &*callback;

        dyn_callback.on_processed("a", 1);
        assert!(!token.is_cancelled());
        dyn_callback.on_expunged("b");
        assert!(token.is_cancelled());
        assert_eq!(callback.processed(), vec!["a".to_string()]);
    }

    #[test]
    fn handle_dies_with_callback() {
        let callback = RecordingCallback::new();
        let handle = callback.handle::<Note>();
        assert!(handle.upgrade().is_some());
        drop(callback);
        assert!(handle.upgrade().is_none());
    }
}
