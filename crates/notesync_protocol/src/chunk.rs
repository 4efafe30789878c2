//! Sync chunks: the unit of incremental transfer.

use crate::entity::{Note, Notebook, Resource, SavedSearch, SyncEntity, Tag};
use crate::types::{Guid, Usn};
use serde::{Deserialize, Serialize};

/// A batch of entities covering one contiguous USN range.
///
/// `chunk_low_usn..=chunk_high_usn` is the range the chunk covers. The
/// remote service reports only the high bound; the fetcher sets the low
/// bound to one past the USN it requested the chunk after, so consecutive
/// chunks of a scope satisfy `next.chunk_low_usn == prev.chunk_high_usn + 1`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncChunk {
    /// First USN covered by this chunk.
    pub chunk_low_usn: Usn,
    /// Last USN covered by this chunk.
    pub chunk_high_usn: Usn,
    /// Notebooks created or updated in the range.
    pub notebooks: Vec<Notebook>,
    /// Tags created or updated in the range.
    pub tags: Vec<Tag>,
    /// Saved searches created or updated in the range.
    pub saved_searches: Vec<SavedSearch>,
    /// Notes created or updated in the range.
    pub notes: Vec<Note>,
    /// Attachments created or updated in the range.
    pub resources: Vec<Resource>,
    /// Guids of expunged notebooks.
    pub expunged_notebooks: Vec<Guid>,
    /// Guids of expunged tags.
    pub expunged_tags: Vec<Guid>,
    /// Guids of expunged saved searches.
    pub expunged_saved_searches: Vec<Guid>,
    /// Guids of expunged notes.
    pub expunged_notes: Vec<Guid>,
}

impl SyncChunk {
    /// Creates an empty chunk covering `low..=high`.
    pub fn new(chunk_low_usn: Usn, chunk_high_usn: Usn) -> Self {
        Self {
            chunk_low_usn,
            chunk_high_usn,
            ..Self::default()
        }
    }

    /// Returns the covered range as `(low, high)`.
    pub fn usn_range(&self) -> (Usn, Usn) {
        (self.chunk_low_usn, self.chunk_high_usn)
    }

    /// Returns true if the chunk carries no entities and no expunges.
    pub fn is_empty(&self) -> bool {
        self.notebooks.is_empty()
            && self.tags.is_empty()
            && self.saved_searches.is_empty()
            && self.notes.is_empty()
            && self.resources.is_empty()
            && self.expunged_notebooks.is_empty()
            && self.expunged_tags.is_empty()
            && self.expunged_saved_searches.is_empty()
            && self.expunged_notes.is_empty()
    }

    /// Iterates over the USNs of every entity in the chunk.
    pub fn entity_usns(&self) -> impl Iterator<Item = Option<Usn>> + '_ {
        self.notebooks
            .iter()
            .map(SyncEntity::usn)
            .chain(self.tags.iter().map(SyncEntity::usn))
            .chain(self.saved_searches.iter().map(SyncEntity::usn))
            .chain(self.notes.iter().map(SyncEntity::usn))
            .chain(self.resources.iter().map(SyncEntity::usn))
    }

    /// Returns a copy keeping only entities with a USN above `after_usn`.
    ///
    /// Expunged guid lists carry no USN and are kept whole; expunging is
    /// idempotent. The low bound moves up to `after_usn + 1` when the chunk
    /// straddles it.
    pub fn trimmed_after(&self, after_usn: Usn) -> SyncChunk {
        fn keep<E: SyncEntity>(items: &[E], after_usn: Usn) -> Vec<E> {
            items
                .iter()
                .filter(|item| item.usn().is_some_and(|usn| usn > after_usn))
                .cloned()
                .collect()
        }

        SyncChunk {
            chunk_low_usn: self.chunk_low_usn.max(after_usn.saturating_add(1)),
            chunk_high_usn: self.chunk_high_usn,
            notebooks: keep(&self.notebooks, after_usn),
            tags: keep(&self.tags, after_usn),
            saved_searches: keep(&self.saved_searches, after_usn),
            notes: keep(&self.notes, after_usn),
            resources: keep(&self.resources, after_usn),
            expunged_notebooks: self.expunged_notebooks.clone(),
            expunged_tags: self.expunged_tags.clone(),
            expunged_saved_searches: self.expunged_saved_searches.clone(),
            expunged_notes: self.expunged_notes.clone(),
        }
    }
}

/// Access to the per-kind lists of a [`SyncChunk`].
pub trait ChunkContents: SyncEntity {
    /// Entities of this kind in the chunk.
    fn items(chunk: &SyncChunk) -> &[Self];

    /// Mutable entity list of this kind in the chunk.
    fn items_mut(chunk: &mut SyncChunk) -> &mut Vec<Self>;

    /// Expunged guids of this kind in the chunk.
    fn expunged(chunk: &SyncChunk) -> &[Guid];

    /// Keeps only the expunged guids of this kind matching `keep`.
    fn retain_expunged<F: FnMut(&Guid) -> bool>(chunk: &mut SyncChunk, keep: F);
}

macro_rules! chunk_contents {
    ($ty:ty, $items:ident, $expunged:ident) => {
        impl ChunkContents for $ty {
            fn items(chunk: &SyncChunk) -> &[Self] {
                &chunk.$items
            }

            fn items_mut(chunk: &mut SyncChunk) -> &mut Vec<Self> {
                &mut chunk.$items
            }

            fn expunged(chunk: &SyncChunk) -> &[Guid] {
                &chunk.$expunged
            }

            fn retain_expunged<F: FnMut(&Guid) -> bool>(chunk: &mut SyncChunk, keep: F) {
                chunk.$expunged.retain(keep);
            }
        }
    };
}

chunk_contents!(Notebook, notebooks, expunged_notebooks);
chunk_contents!(Tag, tags, expunged_tags);
chunk_contents!(SavedSearch, saved_searches, expunged_saved_searches);
chunk_contents!(Note, notes, expunged_notes);

// Attachments are never expunged on their own; they go with their note.
impl ChunkContents for Resource {
    fn items(chunk: &SyncChunk) -> &[Self] {
        &chunk.resources
    }

    fn items_mut(chunk: &mut SyncChunk) -> &mut Vec<Self> {
        &mut chunk.resources
    }

    fn expunged(_chunk: &SyncChunk) -> &[Guid] {
        &[]
    }

    fn retain_expunged<F: FnMut(&Guid) -> bool>(_chunk: &mut SyncChunk, _keep: F) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn chunk() -> SyncChunk {
        let mut chunk = SyncChunk::new(1, 10);
        chunk.notebooks.push(Notebook::new("a").with_guid("nb1", 2));
        chunk.notebooks.push(Notebook::new("b").with_guid("nb2", 8));
        chunk.tags.push(Tag::new("t").with_guid("t1", 5));
        chunk.expunged_notes.push("gone".into());
        chunk
    }

    #[test]
    fn trimming_keeps_newer_entities() {
        let trimmed = chunk().trimmed_after(5);
        assert_eq!(trimmed.usn_range(), (6, 10));
        assert_eq!(trimmed.notebooks.len(), 1);
        assert_eq!(trimmed.notebooks[0].guid.as_deref(), Some("nb2"));
        assert!(trimmed.tags.is_empty());
        assert_eq!(trimmed.expunged_notes, vec!["gone".to_string()]);
    }

    #[test]
    fn trimming_below_range_is_identity() {
        let original = chunk();
        assert_eq!(original.trimmed_after(0), original);
    }

    #[test]
    fn entity_usns_cover_all_kinds() {
        let usns: Vec<_> = chunk().entity_usns().flatten().collect();
        assert_eq!(usns, vec![2, 8, 5]);
    }

    proptest! {
        #[test]
        fn trimming_partitions_entities_at_the_boundary(
            usns in prop::collection::vec(1u32..=50, 0..20),
            after in 0u32..=60,
        ) {
            let mut chunk = SyncChunk::new(1, 50);
            for (i, usn) in usns.iter().enumerate() {
                chunk.notes.push(Note::new(format!("n{i}")).with_guid(format!("g{i}"), *usn));
            }

            let trimmed = chunk.trimmed_after(after);

            let expected: Vec<_> = usns.iter().copied().filter(|&u| u > after).collect();
            let kept: Vec<_> = trimmed.entity_usns().flatten().collect();
            prop_assert_eq!(kept, expected);
            prop_assert_eq!(trimmed.chunk_low_usn, chunk.chunk_low_usn.max(after + 1));
            prop_assert_eq!(trimmed.chunk_high_usn, 50);
        }
    }

    #[test]
    fn chunk_contents_access() {
        let chunk = chunk();
        assert_eq!(<Notebook as ChunkContents>::items(&chunk).len(), 2);
        assert_eq!(<Note as ChunkContents>::expunged(&chunk).len(), 1);
        assert!(<Resource as ChunkContents>::expunged(&chunk).is_empty());
    }
}
