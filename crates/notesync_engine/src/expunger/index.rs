//! Snapshot of the synced local items of one kind.

use notesync_protocol::{Guid, LocalId, SyncEntity};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Synced local items of one kind, by guid.
///
/// Items without a guid never reached the remote service and cannot be
/// stale, so they are not indexed.
#[derive(Debug, Clone)]
pub struct LocalIndex<E> {
    by_guid: BTreeMap<Guid, E>,
    guid_by_local_id: HashMap<LocalId, Guid>,
}

impl<E> Default for LocalIndex<E> {
    fn default() -> Self {
        Self {
            by_guid: BTreeMap::new(),
            guid_by_local_id: HashMap::new(),
        }
    }
}

impl<E: SyncEntity> LocalIndex<E> {
    /// Indexes the synced items among `items`.
    pub fn new(items: impl IntoIterator<Item = E>) -> Self {
        let mut index = Self::default();
        for item in items {
            let Some(guid) = item.guid().map(str::to_string) else {
                continue;
            };
            if let Some(local_id) = item.local_id() {
                index
                    .guid_by_local_id
                    .insert(local_id.to_string(), guid.clone());
            }
            index.by_guid.insert(guid, item);
        }
        index
    }

    /// Number of indexed items.
    pub fn len(&self) -> usize {
        self.by_guid.len()
    }

    /// Returns true if nothing is indexed.
    pub fn is_empty(&self) -> bool {
        self.by_guid.is_empty()
    }

    /// Returns the item with `guid`.
    pub fn get(&self, guid: &str) -> Option<&E> {
        self.by_guid.get(guid)
    }

    /// Returns the local id of the item with `guid`.
    pub fn local_id_of(&self, guid: &str) -> Option<&str> {
        self.by_guid.get(guid).and_then(|e| e.local_id())
    }

    /// Returns the guid of the item with `local_id`.
    pub fn guid_of(&self, local_id: &str) -> Option<&str> {
        self.guid_by_local_id.get(local_id).map(String::as_str)
    }

    /// All items, in guid order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &E)> {
        self.by_guid.iter().map(|(g, e)| (g.as_str(), e))
    }

    /// Dirty items, by guid.
    pub fn dirty(&self) -> impl Iterator<Item = (&str, &E)> {
        self.by_guid
            .iter()
            .filter(|(_, e)| e.is_dirty())
            .map(|(g, e)| (g.as_str(), e))
    }

    /// Returns true if the item with `guid` is dirty.
    pub fn is_dirty(&self, guid: &str) -> bool {
        self.by_guid.get(guid).is_some_and(SyncEntity::is_dirty)
    }

    /// Items whose guid is not in `synced`, in guid order.
    pub fn stale<'a>(&'a self, synced: &'a HashSet<Guid>) -> impl Iterator<Item = &'a E> + 'a {
        self.by_guid
            .iter()
            .filter(move |(g, _)| !synced.contains(*g))
            .map(|(_, e)| e)
    }
}
