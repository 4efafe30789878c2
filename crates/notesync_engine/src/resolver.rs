//! Conflict resolver contract and a default policy.

use crate::error::{SyncError, SyncResult};
use crate::storage::LocalStorage;
use async_trait::async_trait;
use notesync_protocol::{
    ConflictResolution, Note, Notebook, Resource, SavedSearch, SyncEntity, Tag,
};
use std::sync::Arc;
use tracing::debug;

const CONFLICT_SUFFIX: &str = " - conflicting";
const MAX_RENAME_ATTEMPTS: usize = 1000;

/// Decides how a remote item and a conflicting local item are reconciled.
///
/// `theirs` is the item from the sync chunk, `mine` the local item found by
/// guid or, failing that, by name. Implementations must not rely on being
/// called more than once per pair. A `MoveMine` replacement must carry a
/// name distinct from `theirs` and from every other item the resolver knows
/// about.
#[async_trait]
pub trait ConflictResolver: Send + Sync {
    /// Resolves a notebook conflict.
    async fn resolve_notebook_conflict(
        &self,
        theirs: &Notebook,
        mine: &Notebook,
    ) -> SyncResult<ConflictResolution<Notebook>>;

    /// Resolves a tag conflict.
    async fn resolve_tag_conflict(
        &self,
        theirs: &Tag,
        mine: &Tag,
    ) -> SyncResult<ConflictResolution<Tag>>;

    /// Resolves a saved search conflict.
    async fn resolve_saved_search_conflict(
        &self,
        theirs: &SavedSearch,
        mine: &SavedSearch,
    ) -> SyncResult<ConflictResolution<SavedSearch>>;

    /// Resolves a note conflict.
    async fn resolve_note_conflict(
        &self,
        theirs: &Note,
        mine: &Note,
    ) -> SyncResult<ConflictResolution<Note>>;

    /// Resolves an attachment conflict.
    async fn resolve_resource_conflict(
        &self,
        theirs: &Resource,
        mine: &Resource,
    ) -> SyncResult<ConflictResolution<Resource>>;
}

/// A conflict policy that never loses local edits.
///
/// - same guid, local copy clean: take the remote item
/// - same guid, local copy dirty: keep the local edits as a renamed,
///   guid-less copy and take the remote item
/// - name collision only: rename the local item and take the remote one
/// - attachments: always take the remote item
pub struct SimpleConflictResolver {
    storage: Arc<dyn LocalStorage>,
}

impl SimpleConflictResolver {
    /// Creates a resolver that checks candidate names against `storage`.
    pub fn new(storage: Arc<dyn LocalStorage>) -> Self {
        Self { storage }
    }

    async fn is_taken(&self, namespace: &Namespace<'_>, candidate: &str) -> SyncResult<bool> {
        let found = match namespace {
            Namespace::Notebook(linked) => self
                .storage
                .find_notebook_by_name(candidate, *linked)
                .await?
                .is_some(),
            Namespace::Tag(linked) => self
                .storage
                .find_tag_by_name(candidate, *linked)
                .await?
                .is_some(),
            Namespace::SavedSearch => self
                .storage
                .find_saved_search_by_name(candidate)
                .await?
                .is_some(),
        };
        Ok(found)
    }

    /// Picks `<base> - conflicting`, numbered until it is free.
    async fn free_name(
        &self,
        namespace: Namespace<'_>,
        base: &str,
        theirs_name: &str,
    ) -> SyncResult<String> {
        for attempt in 1..=MAX_RENAME_ATTEMPTS {
            let candidate = if attempt == 1 {
                format!("{base}{CONFLICT_SUFFIX}")
            } else {
                format!("{base}{CONFLICT_SUFFIX} ({attempt})")
            };
            if candidate.to_lowercase() == theirs_name.to_lowercase() {
                continue;
            }
            if !self.is_taken(&namespace, &candidate).await? {
                return Ok(candidate);
            }
        }
        Err(SyncError::Resolver(format!(
            "no free name for conflicting copy of {base}"
        )))
    }
}

enum Namespace<'a> {
    Notebook(Option<&'a str>),
    Tag(Option<&'a str>),
    SavedSearch,
}

fn same_guid(theirs: Option<&str>, mine: Option<&str>) -> bool {
    matches!((theirs, mine), (Some(a), Some(b)) if a == b)
}

#[async_trait]
impl ConflictResolver for SimpleConflictResolver {
    async fn resolve_notebook_conflict(
        &self,
        theirs: &Notebook,
        mine: &Notebook,
    ) -> SyncResult<ConflictResolution<Notebook>> {
        if same_guid(theirs.guid.as_deref(), mine.guid.as_deref()) && !mine.dirty {
            return Ok(ConflictResolution::UseTheirs);
        }
        let namespace = Namespace::Notebook(mine.linked_notebook_guid.as_deref());
        let name = self.free_name(namespace, &mine.name, &theirs.name).await?;
        debug!(from = %mine.name, to = %name, "moving conflicting notebook");
        let mut copy = mine.clone();
        copy.clear_sync_identity();
        copy.name = name;
        copy.dirty = true;
        Ok(ConflictResolution::MoveMine(copy))
    }

    async fn resolve_tag_conflict(
        &self,
        theirs: &Tag,
        mine: &Tag,
    ) -> SyncResult<ConflictResolution<Tag>> {
        if same_guid(theirs.guid.as_deref(), mine.guid.as_deref()) && !mine.dirty {
            return Ok(ConflictResolution::UseTheirs);
        }
        let namespace = Namespace::Tag(mine.linked_notebook_guid.as_deref());
        let name = self.free_name(namespace, &mine.name, &theirs.name).await?;
        debug!(from = %mine.name, to = %name, "moving conflicting tag");
        let mut copy = mine.clone();
        copy.clear_sync_identity();
        copy.name = name;
        copy.dirty = true;
        Ok(ConflictResolution::MoveMine(copy))
    }

    async fn resolve_saved_search_conflict(
        &self,
        theirs: &SavedSearch,
        mine: &SavedSearch,
    ) -> SyncResult<ConflictResolution<SavedSearch>> {
        if same_guid(theirs.guid.as_deref(), mine.guid.as_deref()) && !mine.dirty {
            return Ok(ConflictResolution::UseTheirs);
        }
        let name = self
            .free_name(Namespace::SavedSearch, &mine.name, &theirs.name)
            .await?;
        debug!(from = %mine.name, to = %name, "moving conflicting saved search");
        let mut copy = mine.clone();
        copy.clear_sync_identity();
        copy.name = name;
        copy.dirty = true;
        Ok(ConflictResolution::MoveMine(copy))
    }

    async fn resolve_note_conflict(
        &self,
        _theirs: &Note,
        mine: &Note,
    ) -> SyncResult<ConflictResolution<Note>> {
        if !mine.dirty {
            return Ok(ConflictResolution::UseTheirs);
        }
        let mut copy = mine.clone();
        copy.clear_sync_identity();
        copy.title = format!("{}{CONFLICT_SUFFIX}", mine.title);
        copy.dirty = true;
        Ok(ConflictResolution::MoveMine(copy))
    }

    async fn resolve_resource_conflict(
        &self,
        _theirs: &Resource,
        _mine: &Resource,
    ) -> SyncResult<ConflictResolution<Resource>> {
        Ok(ConflictResolution::UseTheirs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryLocalStorage;

    fn resolver(storage: &Arc<MemoryLocalStorage>) -> SimpleConflictResolver {
        SimpleConflictResolver::new(storage.clone())
    }

    #[tokio::test]
    async fn clean_guid_match_takes_theirs() {
        let storage = Arc::new(MemoryLocalStorage::new());
        let theirs = Notebook::new("Work").with_guid("nb1", 10);
        let mine = Notebook::new("Work").with_guid("nb1", 4).with_local_id("l1");

        let resolution = resolver(&storage)
            .resolve_notebook_conflict(&theirs, &mine)
            .await
            .unwrap();
        assert_eq!(resolution, ConflictResolution::UseTheirs);
    }

    #[tokio::test]
    async fn dirty_guid_match_moves_mine() {
        let storage = Arc::new(MemoryLocalStorage::new());
        let mine = Tag::new("Todo").with_guid("t1", 4).with_local_id("l1").dirty();
        storage.seed(mine.clone());
        let theirs = Tag::new("Todo").with_guid("t1", 10);

        let resolution = resolver(&storage)
            .resolve_tag_conflict(&theirs, &mine)
            .await
            .unwrap();
        match resolution {
            ConflictResolution::MoveMine(copy) => {
                assert_eq!(copy.name, "Todo - conflicting");
                assert_eq!(copy.guid(), None);
                assert_eq!(copy.usn(), None);
                assert!(copy.dirty);
            }
            other => panic!("unexpected resolution {other}"),
        }
    }

    #[tokio::test]
    async fn renamed_copy_avoids_taken_names() {
        let storage = Arc::new(MemoryLocalStorage::new());
        storage.seed(SavedSearch::new("Inbox - conflicting", "q"));
        let mine = SavedSearch::new("Inbox", "q").with_local_id("l1");
        let theirs = SavedSearch::new("inbox", "q2").with_guid("s1", 3);

        let resolution = resolver(&storage)
            .resolve_saved_search_conflict(&theirs, &mine)
            .await
            .unwrap();
        match resolution {
            ConflictResolution::MoveMine(copy) => {
                assert_eq!(copy.name, "Inbox - conflicting (2)")
            }
            other => panic!("unexpected resolution {other}"),
        }
    }

    #[tokio::test]
    async fn renamed_notebook_name_is_scoped() {
        let storage = Arc::new(MemoryLocalStorage::new());
        storage.seed(Notebook::new("Shared - conflicting").with_linked_notebook("ln1"));
        let mine = Notebook::new("Shared").with_local_id("l1");
        let theirs = Notebook::new("Shared").with_guid("nb1", 2);

        let resolution = resolver(&storage)
            .resolve_notebook_conflict(&theirs, &mine)
            .await
            .unwrap();
        assert_eq!(
            resolution.map(|n| n.name),
            ConflictResolution::MoveMine("Shared - conflicting".to_string())
        );
    }

    #[tokio::test]
    async fn notes_and_resources() {
        let storage = Arc::new(MemoryLocalStorage::new());
        let resolver = resolver(&storage);

        let theirs = Note::new("Plan").with_guid("n1", 9);
        let clean = Note::new("Plan").with_guid("n1", 3).with_local_id("l1");
        assert_eq!(
            resolver.resolve_note_conflict(&theirs, &clean).await.unwrap(),
            ConflictResolution::UseTheirs
        );

        let dirty = clean.clone().dirty();
        match resolver.resolve_note_conflict(&theirs, &dirty).await.unwrap() {
            ConflictResolution::MoveMine(copy) => {
                assert_eq!(copy.title, "Plan - conflicting");
                assert!(copy.guid.is_none());
            }
            other => panic!("unexpected resolution {other}"),
        }

        let resource = Resource::new("image/png").with_guid("r1", 2);
        assert_eq!(
            resolver
                .resolve_resource_conflict(&resource, &resource.clone().dirty())
                .await
                .unwrap(),
            ConflictResolution::UseTheirs
        );
    }
}
