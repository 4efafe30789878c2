//! Integration tests for entity processors over in-memory storage.

use notesync_engine::{
    NoteKind, NotebookKind, ProcessingProgress, SyncError, TagKind, WriteOp,
};
use notesync_protocol::{ConflictResolution, EntityKind, Note, Notebook, Tag};
use notesync_testkit::prelude::*;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn adds_own_and_linked_notebooks() {
    let storage = memory_storage();
    let resolver = Arc::new(ScriptedResolver::new());
    let processor = processor(NotebookKind, &storage, resolver.clone());
    let chunks = vec![
        ChunkBuilder::new(1, 2)
            .notebook(synced_notebook("nb1", 1))
            .notebook(synced_notebook("nb2", 2))
            .build(),
        ChunkBuilder::new(3, 4)
            .notebook(synced_notebook("nb3", 3).with_linked_notebook("ln-1"))
            .notebook(synced_notebook("nb4", 4).with_linked_notebook("ln-1"))
            .build(),
    ];
    let callback = RecordingCallback::new();

    let status = processor
        .process(&chunks, &CancellationToken::new(), Some(callback.handle::<Notebook>()))
        .await
        .unwrap();

    assert_eq!(status.total_new, 4);
    assert_eq!(status.total_updated, 0);
    assert!(status.is_complete());
    assert_eq!(
        callback.last_progress(),
        Some(ProcessingProgress {
            total: 4,
            total_to_expunge: 0,
            added: 4,
            updated: 0,
            expunged: 0,
        })
    );
    assert_eq!(storage.count::<Notebook>(), 4);
    let linked = storage.get_by_guid::<Notebook>("nb4").unwrap();
    assert_eq!(linked.linked_notebook_guid.as_deref(), Some("ln-1"));
    assert!(linked.local_id.is_some());
    assert!(resolver.calls().is_empty());
}

#[tokio::test]
async fn move_mine_keeps_renamed_local_tag() {
    let storage = memory_storage();
    storage.seed(Tag::new("Work").with_local_id("local-work").dirty());
    let renamed = Tag::new("Work - conflicting")
        .with_local_id("local-work")
        .dirty();
    let resolver = Arc::new(
        ScriptedResolver::new().on_tag("t1", ConflictResolution::MoveMine(renamed)),
    );
    let processor = processor(TagKind, &storage, resolver.clone());
    let chunk = ChunkBuilder::new(1, 4)
        .tag(Tag::new("work").with_guid("t1", 1))
        .tag(synced_tag("t2", 2))
        .tag(synced_tag("t3", 3))
        .tag(synced_tag("t4", 4))
        .build();

    let status = processor
        .process(&[chunk], &CancellationToken::new(), None)
        .await
        .unwrap();

    assert_eq!(status.total_new, 4);
    assert_eq!(status.total_updated, 0);
    assert_eq!(resolver.calls().len(), 1);
    assert_eq!(resolver.calls_for("t1"), 1);
    assert_eq!(storage.count::<Tag>(), 5);

    let theirs = storage.get_by_guid::<Tag>("t1").unwrap();
    assert_eq!(theirs.name, "work");
    assert_eq!(theirs.local_id.as_deref(), Some("local-work"));

    let moved: Vec<Tag> = storage
        .all::<Tag>()
        .into_iter()
        .filter(|t| t.name == "Work - conflicting")
        .collect();
    assert_eq!(moved.len(), 1);
    assert_eq!(moved[0].guid, None);
    assert!(moved[0].dirty);
    assert_ne!(moved[0].local_id.as_deref(), Some("local-work"));
}

#[tokio::test]
async fn use_mine_counts_as_added_without_writing() {
    let storage = memory_storage();
    storage.seed(Notebook::new("Inbox").with_guid("nb1", 1).with_local_id("local-inbox"));
    let resolver =
        Arc::new(ScriptedResolver::new().on_notebook("nb1", ConflictResolution::UseMine));
    let processor = processor(NotebookKind, &storage, resolver.clone());
    let chunk = ChunkBuilder::new(2, 2)
        .notebook(Notebook::new("Inbox remote").with_guid("nb1", 2))
        .build();
    let callback = RecordingCallback::new();

    let status = processor
        .process(&[chunk], &CancellationToken::new(), Some(callback.handle::<Notebook>()))
        .await
        .unwrap();

    assert_eq!(status.total_new, 1);
    assert_eq!(status.total_updated, 0);
    assert_eq!(callback.last_progress().map(|p| p.added), Some(1));
    assert!(storage.write_log().is_empty());
    let stored = storage.get_by_guid::<Notebook>("nb1").unwrap();
    assert_eq!(stored.name, "Inbox");
    assert_eq!(stored.usn, Some(1));
}

#[tokio::test]
async fn use_theirs_keeps_local_id_and_client_flags() {
    let storage = memory_storage();
    let mut mine = Notebook::new("Inbox").with_guid("nb1", 1).with_local_id("local-inbox");
    mine.favorited = true;
    mine.local_only = true;
    storage.seed(mine);
    let processor = processor(NotebookKind, &storage, Arc::new(ScriptedResolver::new()));
    let chunk = ChunkBuilder::new(2, 2)
        .notebook(Notebook::new("Inbox 2").with_guid("nb1", 2))
        .build();

    let status = processor
        .process(&[chunk], &CancellationToken::new(), None)
        .await
        .unwrap();

    assert_eq!(status.total_updated, 1);
    let stored = storage.get_by_guid::<Notebook>("nb1").unwrap();
    assert_eq!(stored.name, "Inbox 2");
    assert_eq!(stored.usn, Some(2));
    assert_eq!(stored.local_id.as_deref(), Some("local-inbox"));
    assert!(stored.favorited);
    assert!(stored.local_only);
    assert_eq!(storage.count::<Notebook>(), 1);
}

#[tokio::test]
async fn ignore_mine_drops_client_flags() {
    let storage = memory_storage();
    let mut mine = Tag::new("work").with_guid("t1", 1).with_local_id("local-work");
    mine.favorited = true;
    storage.seed(mine);
    let resolver = Arc::new(ScriptedResolver::new().on_tag("t1", ConflictResolution::IgnoreMine));
    let processor = processor(TagKind, &storage, resolver);
    let chunk = ChunkBuilder::new(2, 2)
        .tag(Tag::new("work").with_guid("t1", 2))
        .build();

    let status = processor
        .process(&[chunk], &CancellationToken::new(), None)
        .await
        .unwrap();

    assert_eq!(status.total_updated, 1);
    let stored = storage.get_by_guid::<Tag>("t1").unwrap();
    assert_eq!(stored.usn, Some(2));
    assert_eq!(stored.local_id.as_deref(), Some("local-work"));
    assert!(!stored.favorited);
}

#[tokio::test]
async fn name_collision_with_local_item_is_a_conflict() {
    let storage = memory_storage();
    storage.seed(Notebook::new("Travel").with_local_id("local-travel").dirty());
    let resolver = Arc::new(ScriptedResolver::new());
    let processor = processor(NotebookKind, &storage, resolver.clone());
    let chunk = ChunkBuilder::new(1, 1)
        .notebook(Notebook::new("travel").with_guid("nb1", 1))
        .build();

    let status = processor
        .process(&[chunk], &CancellationToken::new(), None)
        .await
        .unwrap();

    assert_eq!(resolver.calls_for("nb1"), 1);
    assert_eq!(
        resolver.calls()[0].mine_local_id.as_deref(),
        Some("local-travel")
    );
    assert_eq!(status.total_updated, 1);
    assert_eq!(storage.count::<Notebook>(), 1);
    let stored = storage.get_by_guid::<Notebook>("nb1").unwrap();
    assert_eq!(stored.local_id.as_deref(), Some("local-travel"));
    assert_eq!(stored.name, "travel");
}

#[tokio::test]
async fn replacements_sharing_a_name_fail_the_run() {
    let storage = memory_storage();
    storage.seed(Notebook::new("A").with_guid("nb1", 1).with_local_id("local-a").dirty());
    storage.seed(Notebook::new("B").with_guid("nb2", 2).with_local_id("local-b").dirty());
    let resolver = Arc::new(
        ScriptedResolver::new()
            .on_notebook("nb1", ConflictResolution::MoveMine(Notebook::new("Copy").dirty()))
            .on_notebook("nb2", ConflictResolution::MoveMine(Notebook::new("copy").dirty())),
    );
    let processor = processor(NotebookKind, &storage, resolver);
    let chunk = ChunkBuilder::new(3, 4)
        .notebook(Notebook::new("A").with_guid("nb1", 3))
        .notebook(Notebook::new("B").with_guid("nb2", 4))
        .build();

    let result = processor
        .process(&[chunk], &CancellationToken::new(), None)
        .await;

    assert!(matches!(result, Err(SyncError::InvalidResolution(_))));
    let copies = storage
        .all::<Notebook>()
        .into_iter()
        .filter(|n| n.name.eq_ignore_ascii_case("copy"))
        .count();
    assert!(copies <= 1);
}

#[tokio::test]
async fn reprocessing_is_idempotent() {
    let storage = memory_storage();
    let processor = processor(NotebookKind, &storage, Arc::new(ScriptedResolver::new()));
    let chunk = ChunkBuilder::new(1, 3)
        .notebook(synced_notebook("nb1", 1))
        .notebook(synced_notebook("nb2", 2))
        .notebook(synced_notebook("nb3", 3))
        .build();
    let cancel = CancellationToken::new();

    processor.process(&[chunk.clone()], &cancel, None).await.unwrap();
    let before = storage.all::<Notebook>();
    let status = processor.process(&[chunk], &cancel, None).await.unwrap();

    assert_eq!(status.total_new, 0);
    assert_eq!(status.total_updated, 3);
    assert_eq!(storage.all::<Notebook>(), before);
}

#[tokio::test]
async fn resolver_runs_once_per_guid() {
    let storage = memory_storage();
    storage.seed(Notebook::new("Inbox").with_guid("nb1", 1));
    let resolver = Arc::new(ScriptedResolver::new());
    let processor = processor(NotebookKind, &storage, resolver.clone());
    let chunks = vec![
        ChunkBuilder::new(2, 3)
            .notebook(Notebook::new("Inbox").with_guid("nb1", 2))
            .build(),
        ChunkBuilder::new(4, 5)
            .notebook(Notebook::new("Inbox 2").with_guid("nb1", 5))
            .build(),
    ];

    let status = processor
        .process(&chunks, &CancellationToken::new(), None)
        .await
        .unwrap();

    assert_eq!(resolver.calls_for("nb1"), 1);
    assert_eq!(status.total_updated, 1);
    assert_eq!(status.processed.get("nb1"), Some(&5));
    let stored = storage.get_by_guid::<Notebook>("nb1").unwrap();
    assert_eq!(stored.usn, Some(5));
    assert_eq!(stored.name, "Inbox 2");
}

#[tokio::test]
async fn parent_tags_are_written_first() {
    let storage = memory_storage();
    let processor = processor(TagKind, &storage, Arc::new(ScriptedResolver::new()));
    // Children carry lower USNs than their parents.
    let chunk = ChunkBuilder::new(1, 5)
        .tag(synced_tag("t2", 1).with_parent("t1"))
        .tag(synced_tag("t1", 2).with_parent("t0"))
        .tag(synced_tag("t3", 3).with_parent("t0"))
        .tag(synced_tag("t0", 4))
        .tag(synced_tag("t4", 5))
        .build();

    let status = processor
        .process(&[chunk], &CancellationToken::new(), None)
        .await
        .unwrap();
    assert_eq!(status.total_new, 5);

    let puts: Vec<String> = storage
        .write_log()
        .into_iter()
        .filter(|e| e.kind == EntityKind::Tag && e.op == WriteOp::Put)
        .filter_map(|e| e.guid)
        .collect();
    let position = |guid: &str| puts.iter().position(|g| g == guid).unwrap();
    assert!(position("t0") < position("t1"));
    assert!(position("t1") < position("t2"));
    assert!(position("t0") < position("t3"));

    let parent = storage.get_by_guid::<Tag>("t1").unwrap();
    let child = storage.get_by_guid::<Tag>("t2").unwrap();
    assert_eq!(child.parent_local_id, parent.local_id);
}

#[tokio::test]
async fn note_write_failures_are_reported_per_item() {
    let storage = memory_storage();
    storage.fail_puts_of("n2");
    let processor = processor(NoteKind::new(), &storage, Arc::new(ScriptedResolver::new()));
    let chunk = ChunkBuilder::new(1, 3)
        .note(synced_note("n1", 1, "nb1"))
        .note(synced_note("n2", 2, "nb1"))
        .note(synced_note("n3", 3, "nb1"))
        .build();
    let callback = RecordingCallback::new();

    let status = processor
        .process(&[chunk], &CancellationToken::new(), Some(callback.handle::<Note>()))
        .await
        .unwrap();

    assert_eq!(status.total_new, 2);
    assert_eq!(status.failed_to_process.len(), 1);
    assert_eq!(status.failed_to_process[0].entity.guid.as_deref(), Some("n2"));
    assert!(!status.is_complete());
    assert!(callback
        .events()
        .contains(&CallbackEvent::FailedToProcess("n2".to_string())));
    assert_eq!(storage.count::<Note>(), 2);
}

#[tokio::test]
async fn notebook_write_failure_fails_the_run() {
    let storage = memory_storage();
    storage.fail_puts_of("nb1");
    let processor = processor(NotebookKind, &storage, Arc::new(ScriptedResolver::new()));
    let chunk = ChunkBuilder::new(1, 1)
        .notebook(synced_notebook("nb1", 1))
        .build();

    let result = processor
        .process(&[chunk], &CancellationToken::new(), None)
        .await;

    assert!(matches!(result, Err(SyncError::Storage(_))));
}

#[tokio::test]
async fn expunges_are_applied_and_reported() {
    let storage = memory_storage();
    storage.seed(synced_notebook("nb9", 1));
    storage.seed(synced_note("n9", 2, "nb9"));
    let processor = processor(NotebookKind, &storage, Arc::new(ScriptedResolver::new()));
    let chunk = ChunkBuilder::new(3, 4)
        .expunged_notebook("nb9")
        .expunged_notebook("nb9")
        .build();
    let callback = RecordingCallback::new();

    let status = processor
        .process(&[chunk], &CancellationToken::new(), Some(callback.handle::<Notebook>()))
        .await
        .unwrap();

    assert_eq!(status.total_expunged, 1);
    assert!(status.expunged.contains("nb9"));
    assert_eq!(callback.last_progress().map(|p| p.expunged), Some(1));
    assert_eq!(storage.count::<Notebook>(), 0);
    assert_eq!(storage.count::<Note>(), 0);
}

#[tokio::test]
async fn cancelled_run_writes_nothing() {
    let storage = memory_storage();
    storage.seed(synced_notebook("nb9", 1));
    let processor = processor(NotebookKind, &storage, Arc::new(ScriptedResolver::new()));
    let chunk = ChunkBuilder::new(2, 4)
        .notebook(synced_notebook("nb1", 2))
        .notebook(synced_notebook("nb2", 3))
        .expunged_notebook("nb9")
        .build();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let callback = RecordingCallback::new();

    let status = processor
        .process(&[chunk], &cancel, Some(callback.handle::<Notebook>()))
        .await
        .unwrap();

    assert_eq!(status.cancelled.len(), 2);
    assert_eq!(status.total_expunged, 0);
    assert_eq!(callback.cancelled(), vec!["nb1".to_string(), "nb2".to_string()]);
    assert!(storage.write_log().is_empty());
    assert_eq!(storage.count::<Notebook>(), 1);
}
