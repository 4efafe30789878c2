//! Identifier and scope types shared by every entity kind.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Update sequence number assigned by the remote service.
///
/// USNs increase monotonically within one [`SyncScope`] and are the
/// checkpoint unit of incremental sync.
pub type Usn = u32;

/// Remote-assigned unique identifier.
pub type Guid = String;

/// Client-assigned permanent identifier; never sent to the remote service.
pub type LocalId = String;

/// The independently numbered USN space an item belongs to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SyncScope {
    /// The user's own content.
    UserOwn,
    /// One linked collection (shared notebook), identified by its guid.
    LinkedNotebook(Guid),
}

const USER_OWN_DIR: &str = "user_own";
const LINKED_NOTEBOOK_DIR_PREFIX: &str = "linked_notebook_";

impl SyncScope {
    /// Creates the scope of a linked notebook.
    pub fn linked(guid: impl Into<Guid>) -> Self {
        SyncScope::LinkedNotebook(guid.into())
    }

    /// Returns the linked notebook guid, or `None` for the user's own scope.
    pub fn linked_notebook_guid(&self) -> Option<&str> {
        match self {
            SyncScope::UserOwn => None,
            SyncScope::LinkedNotebook(guid) => Some(guid),
        }
    }

    /// Builds the scope from an optional linked notebook guid.
    pub fn from_linked_notebook_guid(guid: Option<&str>) -> Self {
        match guid {
            None => SyncScope::UserOwn,
            Some(guid) => SyncScope::LinkedNotebook(guid.to_string()),
        }
    }

    /// Returns the directory name used for this scope in on-disk layouts.
    ///
    /// Returns `None` when the linked notebook guid contains characters
    /// that cannot appear in a single path component.
    pub fn dir_name(&self) -> Option<String> {
        match self {
            SyncScope::UserOwn => Some(USER_OWN_DIR.to_string()),
            SyncScope::LinkedNotebook(guid) => {
                let valid = !guid.is_empty()
                    && guid
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
                valid.then(|| format!("{LINKED_NOTEBOOK_DIR_PREFIX}{guid}"))
            }
        }
    }

    /// Parses a directory name produced by [`SyncScope::dir_name`].
    pub fn from_dir_name(name: &str) -> Option<Self> {
        if name == USER_OWN_DIR {
            return Some(SyncScope::UserOwn);
        }
        name.strip_prefix(LINKED_NOTEBOOK_DIR_PREFIX)
            .filter(|guid| !guid.is_empty())
            .map(|guid| SyncScope::LinkedNotebook(guid.to_string()))
    }
}

impl fmt::Display for SyncScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncScope::UserOwn => write!(f, "user-own"),
            SyncScope::LinkedNotebook(guid) => write!(f, "linked-notebook:{guid}"),
        }
    }
}

/// The five synchronized entity kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    /// Notebooks.
    Notebook,
    /// Hierarchical tags.
    Tag,
    /// Saved searches.
    SavedSearch,
    /// Notes.
    Note,
    /// Note attachments.
    Resource,
}

impl EntityKind {
    /// All kinds, in processing order.
    pub const ALL: [EntityKind; 5] = [
        EntityKind::Notebook,
        EntityKind::Tag,
        EntityKind::SavedSearch,
        EntityKind::Note,
        EntityKind::Resource,
    ];

    /// Returns the stable lowercase name used in paths and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Notebook => "notebook",
            EntityKind::Tag => "tag",
            EntityKind::SavedSearch => "saved_search",
            EntityKind::Note => "note",
            EntityKind::Resource => "resource",
        }
    }

    /// Parses a name produced by [`EntityKind::as_str`].
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_dir_names() {
        assert_eq!(SyncScope::UserOwn.dir_name().as_deref(), Some("user_own"));
        assert_eq!(
            SyncScope::linked("ab-12").dir_name().as_deref(),
            Some("linked_notebook_ab-12")
        );
        assert_eq!(SyncScope::linked("../etc").dir_name(), None);
        assert_eq!(SyncScope::linked("").dir_name(), None);
    }

    #[test]
    fn scope_dir_name_parse() {
        for scope in [SyncScope::UserOwn, SyncScope::linked("x1")] {
            let name = scope.dir_name().unwrap();
            assert_eq!(SyncScope::from_dir_name(&name), Some(scope));
        }
        assert_eq!(SyncScope::from_dir_name("linked_notebook_"), None);
        assert_eq!(SyncScope::from_dir_name("other"), None);
    }

    #[test]
    fn kind_names() {
        for kind in EntityKind::ALL {
            assert_eq!(EntityKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(EntityKind::parse("linked_notebook"), None);
    }
}
