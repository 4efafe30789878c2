//! Integration tests for crash-resumable processing.

use notesync_engine::{DurableProcessor, NoteKind};
use notesync_protocol::{FailureKind, Note, ProcessedRecord, SyncChunk, SyncScope};
use notesync_testkit::prelude::*;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn ten_notes() -> SyncChunk {
    (1..=10)
        .fold(ChunkBuilder::new(1, 10), |chunk, usn| {
            chunk.note(synced_note(&format!("n{usn}"), usn, "nb1"))
        })
        .build()
}

#[tokio::test]
async fn resumes_after_cancellation() {
    let root = TestSyncRoot::new();
    let storage = memory_storage();
    let processor = processor(NoteKind::new(), &storage, Arc::new(ScriptedResolver::new()))
        .with_config(test_config().with_max_in_flight_items(1));
    let durable =
        DurableProcessor::for_scope(processor, root.paths(), &SyncScope::UserOwn).unwrap();
    let chunk = ten_notes();

    let cancel = CancellationToken::new();
    let callback = RecordingCallback::cancelling_after(4, cancel.clone());
    let first = durable
        .process(&[chunk.clone()], &cancel, Some(callback.handle::<Note>()))
        .await
        .unwrap();

    assert_eq!(first.processed.len(), 4);
    assert_eq!(first.cancelled.len(), 6);
    assert_eq!(durable.processed_records().unwrap().len(), 4);
    let failures = durable.failure_records().unwrap();
    assert_eq!(failures.len(), 6);
    assert!(failures.iter().all(|f| f.kind == FailureKind::Cancelled));

    storage.clear_write_log();
    let second = durable
        .process(&[chunk], &CancellationToken::new(), None)
        .await
        .unwrap();

    assert_eq!(second.processed.len(), 6);
    assert_eq!(second.total_new, 6);
    assert!(second.is_complete());
    assert_eq!(storage.count::<Note>(), 10);
    assert_eq!(storage.write_log().len(), 6);
    assert!(durable.failure_records().unwrap().is_empty());
    assert_eq!(durable.processed_records().unwrap().len(), 10);

    durable.cleanup().unwrap();
    assert!(!durable.dir().exists());
}

#[tokio::test]
async fn retries_failed_downloads_without_new_input() {
    let root = TestSyncRoot::new();
    let storage = memory_storage();
    let downloader = Arc::new(FakeDownloader::new().failing_on("n2"));
    let durable = durable_processor(
        NoteKind::with_downloader(downloader.clone()),
        &storage,
        Arc::new(ScriptedResolver::new()),
        &root,
        &SyncScope::UserOwn,
    );
    let chunk = ChunkBuilder::new(1, 3)
        .note(synced_note("n1", 1, "nb1"))
        .note(synced_note("n2", 2, "nb1"))
        .note(synced_note("n3", 3, "nb1"))
        .build();

    let first = durable
        .process(&[chunk], &CancellationToken::new(), None)
        .await
        .unwrap();
    assert_eq!(first.failed_to_download.len(), 1);
    let failures = durable.failure_records().unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].kind, FailureKind::FailedToDownload);

    downloader.heal("n2");
    let second = durable
        .process(&[], &CancellationToken::new(), None)
        .await
        .unwrap();

    assert_eq!(second.processed.get("n2"), Some(&2));
    assert!(durable.failure_records().unwrap().is_empty());
    let note = storage.get_by_guid::<Note>("n2").unwrap();
    assert_eq!(note.content.as_deref(), Some("<en-note>n2</en-note>"));
}

#[tokio::test]
async fn recorded_items_are_not_resubmitted() {
    let root = TestSyncRoot::new();
    let storage = memory_storage();
    let durable = durable_processor(
        NoteKind::new(),
        &storage,
        Arc::new(ScriptedResolver::new()),
        &root,
        &SyncScope::linked("ln-1"),
    );
    let chunk = ChunkBuilder::new(1, 3)
        .note(synced_note("n1", 1, "nb1"))
        .note(synced_note("n2", 2, "nb1"))
        .expunged_note("n0")
        .build();
    let cancel = CancellationToken::new();

    durable.process(&[chunk.clone()], &cancel, None).await.unwrap();
    storage.clear_write_log();
    let callback = RecordingCallback::new();
    let status = durable
        .process(&[chunk], &cancel, Some(callback.handle::<Note>()))
        .await
        .unwrap();

    assert_eq!(status.processed.len(), 0);
    assert_eq!(status.total_expunged, 0);
    assert!(storage.write_log().is_empty());
    let progress = callback.last_progress().unwrap();
    assert_eq!((progress.total, progress.total_to_expunge), (0, 0));
    assert!(durable
        .dir()
        .starts_with(root.paths().durable_dir().join("linked_notebook_ln-1")));
}

#[tokio::test]
async fn retried_newer_copy_is_not_overwritten_by_older_input() {
    let root = TestSyncRoot::new();
    let storage = memory_storage();
    let downloader = Arc::new(FakeDownloader::new().failing_on("n1"));
    let durable = durable_processor(
        NoteKind::with_downloader(downloader.clone()),
        &storage,
        Arc::new(ScriptedResolver::new()),
        &root,
        &SyncScope::UserOwn,
    );
    let cancel = CancellationToken::new();
    let newer = ChunkBuilder::new(10, 10)
        .note(synced_note("n1", 10, "nb1"))
        .build();
    durable.process(&[newer], &cancel, None).await.unwrap();
    assert_eq!(durable.failure_records().unwrap().len(), 1);

    downloader.heal("n1");
    let older = ChunkBuilder::new(5, 5)
        .note(synced_note("n1", 5, "nb1"))
        .build();
    let status = durable.process(&[older], &cancel, None).await.unwrap();

    assert_eq!(status.processed.get("n1"), Some(&10));
    assert_eq!(status.total_new + status.total_updated, 1);
    assert_eq!(storage.get_by_guid::<Note>("n1").unwrap().usn, Some(10));
    assert_eq!(
        durable.processed_records().unwrap(),
        vec![ProcessedRecord::new("n1", 10)]
    );
    assert!(durable.failure_records().unwrap().is_empty());
}

#[tokio::test]
async fn progress_continues_across_retry_and_main_pass() {
    let root = TestSyncRoot::new();
    let storage = memory_storage();
    let durable = durable_processor(
        NoteKind::new(),
        &storage,
        Arc::new(ScriptedResolver::new()),
        &root,
        &SyncScope::UserOwn,
    );
    let interrupted = ChunkBuilder::new(1, 2)
        .note(synced_note("n1", 1, "nb1"))
        .note(synced_note("n2", 2, "nb1"))
        .build();
    let cancelled = CancellationToken::new();
    cancelled.cancel();
    durable.process(&[interrupted], &cancelled, None).await.unwrap();
    assert_eq!(durable.failure_records().unwrap().len(), 2);

    let fresh = ChunkBuilder::new(3, 5)
        .note(synced_note("n3", 3, "nb1"))
        .note(synced_note("n4", 4, "nb1"))
        .note(synced_note("n5", 5, "nb1"))
        .build();
    let callback = RecordingCallback::new();
    let status = durable
        .process(
            &[fresh],
            &CancellationToken::new(),
            Some(callback.handle::<Note>()),
        )
        .await
        .unwrap();

    assert_eq!(status.total_new, 5);
    let reports = callback.progress();
    for pair in reports.windows(2) {
        let (before, after) = (pair[0], pair[1]);
        assert!(after.total >= before.total);
        assert!(after.added >= before.added);
        assert!(after.updated >= before.updated);
        assert!(after.expunged >= before.expunged);
    }
    let last = callback.last_progress().unwrap();
    assert_eq!(last.total, 5);
    assert_eq!(last.added, status.total_new);
    assert_eq!(last.updated, status.total_updated);
}
