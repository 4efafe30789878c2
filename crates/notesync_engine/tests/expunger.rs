//! Integration tests for stale data cleanup.

use notesync_engine::{ExpungerState, StaleDataExpunger, SyncError, SyncedGuids};
use notesync_protocol::{EntityKind, Note, Notebook, SavedSearch, SyncScope, Tag};
use notesync_testkit::prelude::*;
use tokio_util::sync::CancellationToken;

fn guids(items: &[&str]) -> std::collections::HashSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn clean_items_are_expunged_and_dirty_ones_rewritten() {
    let storage = memory_storage();
    storage.seed(synced_notebook("nb1", 1));
    storage.seed(synced_notebook("nb2", 2));
    storage.seed(synced_notebook("nb3", 3).dirty());
    storage.seed(synced_note("n1", 4, "nb1"));
    storage.seed(synced_note("n2", 5, "nb2"));
    storage.seed(synced_note("n3", 6, "nb2").dirty());
    storage.seed(SavedSearch::new("old", "tag:x").with_guid("s1", 7));
    storage.seed(SavedSearch::new("draft", "tag:y").with_guid("s2", 8).dirty());
    storage.seed(Notebook::new("never synced").dirty());

    let synced = SyncedGuids {
        notebooks: guids(&["nb2"]),
        notes: guids(&["n2"]),
        ..SyncedGuids::default()
    };
    let expunger = StaleDataExpunger::new(storage.clone(), SyncScope::UserOwn)
        .with_config(test_config());

    let report = expunger
        .expunge(&synced, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(expunger.state(), ExpungerState::Done);
    assert_eq!(report.expunged(EntityKind::Notebook), ["nb1".to_string()]);
    assert_eq!(report.rewritten(EntityKind::Notebook), ["nb3".to_string()]);
    assert_eq!(report.expunged(EntityKind::SavedSearch), ["s1".to_string()]);
    assert_eq!(report.rewritten(EntityKind::SavedSearch), ["s2".to_string()]);
    assert_eq!(report.rewritten(EntityKind::Note), ["n3".to_string()]);

    assert!(storage.get_by_guid::<Notebook>("nb1").is_none());
    assert!(storage.get_by_guid::<Note>("n1").is_none());
    assert!(storage.get_by_guid::<Notebook>("nb2").is_some());
    assert!(storage.get_by_guid::<Note>("n2").is_some());
    assert!(storage.get_by_guid::<Notebook>("nb3").is_none());
    assert_eq!(storage.count::<Notebook>(), 3);

    let rewritten = storage.get::<Note>("seed-note-n3").unwrap();
    assert_eq!(rewritten.guid, None);
    assert_eq!(rewritten.usn, None);
    assert!(rewritten.dirty);
}

#[tokio::test]
async fn stale_tag_subtree_goes_children_first() {
    let storage = memory_storage();
    storage.seed(synced_tag("t1", 1));
    storage.seed(synced_tag("t2", 2).with_parent("t1"));
    storage.seed(synced_tag("t3", 3).with_parent("t2"));
    storage.seed(synced_tag("t4", 4).with_parent("t1").dirty());
    storage.seed(synced_tag("t5", 5));

    let synced = SyncedGuids {
        tags: guids(&["t5"]),
        ..SyncedGuids::default()
    };
    let report = StaleDataExpunger::new(storage.clone(), SyncScope::UserOwn)
        .expunge(&synced, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.expunged(EntityKind::Tag).len(), 3);
    assert_eq!(report.rewritten(EntityKind::Tag), ["t4".to_string()]);

    let expunged: Vec<String> = storage
        .write_log()
        .into_iter()
        .filter(|e| e.kind == EntityKind::Tag && e.op == notesync_engine::WriteOp::Expunge)
        .filter_map(|e| e.guid)
        .collect();
    assert_eq!(expunged, vec!["t3", "t2", "t1"]);

    let tags = storage.all::<Tag>();
    assert_eq!(tags.len(), 2);
    let detached = storage.get::<Tag>("seed-tag-t4").unwrap();
    assert_eq!(detached.guid, None);
    assert_eq!(detached.parent_guid, None);
}

#[tokio::test]
async fn linked_scope_leaves_other_scopes_alone() {
    let storage = memory_storage();
    storage.seed(synced_notebook("nb1", 1));
    storage.seed(synced_notebook("nb2", 2).with_linked_notebook("ln-1"));
    storage.seed(synced_note("n2", 3, "nb2"));
    storage.seed(SavedSearch::new("s", "q").with_guid("s1", 4));

    let report = StaleDataExpunger::new(storage.clone(), SyncScope::linked("ln-1"))
        .expunge(&SyncedGuids::default(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.expunged(EntityKind::Notebook), ["nb2".to_string()]);
    assert_eq!(report.expunged(EntityKind::Note), ["n2".to_string()]);
    assert!(report.expunged(EntityKind::SavedSearch).is_empty());
    assert!(storage.get_by_guid::<Notebook>("nb1").is_some());
    assert_eq!(storage.count::<SavedSearch>(), 1);
}

#[tokio::test]
async fn storage_failure_fails_the_expunger() {
    let storage = memory_storage();
    storage.seed(synced_notebook("nb1", 1));
    storage.fail_expunges_of("nb1");
    let expunger = StaleDataExpunger::new(storage.clone(), SyncScope::UserOwn);

    let result = expunger
        .expunge(&SyncedGuids::default(), &CancellationToken::new())
        .await;

    assert!(matches!(result, Err(SyncError::Storage(_))));
    assert_eq!(expunger.state(), ExpungerState::Failed);
    let again = expunger
        .expunge(&SyncedGuids::default(), &CancellationToken::new())
        .await;
    assert!(matches!(again, Err(SyncError::InvalidStateTransition { .. })));
}

#[tokio::test]
async fn cancelled_expunger_changes_nothing() {
    let storage = memory_storage();
    storage.seed(synced_notebook("nb1", 1));
    let cancel = CancellationToken::new();
    cancel.cancel();
    let expunger = StaleDataExpunger::new(storage.clone(), SyncScope::UserOwn);

    let result = expunger.expunge(&SyncedGuids::default(), &cancel).await;

    assert!(matches!(result, Err(SyncError::Cancelled)));
    assert_eq!(expunger.state(), ExpungerState::Failed);
    assert_eq!(storage.count::<Notebook>(), 1);
}
