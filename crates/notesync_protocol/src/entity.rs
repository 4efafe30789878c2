//! Synchronized entity kinds.
//!
//! Every kind shares the same sync identity: a client-assigned `local_id`,
//! a remote-assigned `guid` with its `usn` (present together or not at
//! all), and a `dirty` flag for unsent local edits. Notebooks, tags and
//! saved searches additionally carry a name that is unique within their
//! scope.

use crate::types::{EntityKind, Guid, LocalId, Usn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Common behavior of every synchronized entity kind.
pub trait SyncEntity:
    Clone + Debug + PartialEq + Send + Sync + Serialize + DeserializeOwned + 'static
{
    /// The kind tag of this entity type.
    const KIND: EntityKind;

    /// Client-assigned identifier, `None` for items straight from a chunk.
    fn local_id(&self) -> Option<&str>;

    /// Assigns the client identifier.
    fn set_local_id(&mut self, local_id: LocalId);

    /// Remote identifier, absent for never-synced items.
    fn guid(&self) -> Option<&str>;

    /// Update sequence number, present iff the guid is.
    fn usn(&self) -> Option<Usn>;

    /// Name unique within the entity's scope, for kinds that have one.
    fn unique_name(&self) -> Option<&str> {
        None
    }

    /// Guid of the linked notebook whose scope holds this entity.
    fn linked_notebook_guid(&self) -> Option<&str> {
        None
    }

    /// Guid of the parent entity, for hierarchical kinds.
    fn parent_guid(&self) -> Option<&str> {
        None
    }

    /// Whether a local modification is waiting to be sent.
    fn is_dirty(&self) -> bool;

    /// Sets the dirty flag.
    fn set_dirty(&mut self, dirty: bool);

    /// Drops the remote identity so the item re-uploads as new.
    fn clear_sync_identity(&mut self);

    /// Copies flags that exist only on the client from `mine`.
    fn carry_local_flags(&mut self, mine: &Self);

    /// Returns `(guid, usn)` when both are present.
    fn sync_key(&self) -> Option<(&str, Usn)> {
        Some((self.guid()?, self.usn()?))
    }
}

macro_rules! sync_identity {
    () => {
        fn local_id(&self) -> Option<&str> {
            self.local_id.as_deref()
        }

        fn set_local_id(&mut self, local_id: LocalId) {
            self.local_id = Some(local_id);
        }

        fn guid(&self) -> Option<&str> {
            self.guid.as_deref()
        }

        fn usn(&self) -> Option<Usn> {
            self.usn
        }

        fn is_dirty(&self) -> bool {
            self.dirty
        }

        fn set_dirty(&mut self, dirty: bool) {
            self.dirty = dirty;
        }
    };
}

/// A notebook.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notebook {
    /// Client identifier.
    pub local_id: Option<LocalId>,
    /// Remote identifier.
    pub guid: Option<Guid>,
    /// Update sequence number.
    pub usn: Option<Usn>,
    /// Name, unique within the scope.
    pub name: String,
    /// Owning linked notebook, `None` for the user's own notebooks.
    pub linked_notebook_guid: Option<Guid>,
    /// Stack the notebook is filed under.
    pub stack: Option<String>,
    /// Whether this is the user's default notebook.
    pub default_notebook: bool,
    /// Unsent local modification.
    pub dirty: bool,
    /// Never to be synchronized.
    pub local_only: bool,
    /// Client-only favorite mark.
    pub favorited: bool,
}

impl Notebook {
    /// Creates a notebook with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets the remote identity.
    pub fn with_guid(mut self, guid: impl Into<Guid>, usn: Usn) -> Self {
        self.guid = Some(guid.into());
        self.usn = Some(usn);
        self
    }

    /// Sets the client identifier.
    pub fn with_local_id(mut self, local_id: impl Into<LocalId>) -> Self {
        self.local_id = Some(local_id.into());
        self
    }

    /// Places the notebook in a linked notebook's scope.
    pub fn with_linked_notebook(mut self, guid: impl Into<Guid>) -> Self {
        self.linked_notebook_guid = Some(guid.into());
        self
    }

    /// Marks the notebook dirty.
    pub fn dirty(mut self) -> Self {
        self.dirty = true;
        self
    }
}

impl SyncEntity for Notebook {
    const KIND: EntityKind = EntityKind::Notebook;

    sync_identity!();

    fn unique_name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn linked_notebook_guid(&self) -> Option<&str> {
        self.linked_notebook_guid.as_deref()
    }

    fn clear_sync_identity(&mut self) {
        self.guid = None;
        self.usn = None;
    }

    fn carry_local_flags(&mut self, mine: &Self) {
        self.favorited = mine.favorited;
        self.local_only = mine.local_only;
    }
}

/// A hierarchical tag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    /// Client identifier.
    pub local_id: Option<LocalId>,
    /// Remote identifier.
    pub guid: Option<Guid>,
    /// Update sequence number.
    pub usn: Option<Usn>,
    /// Name, unique within the scope.
    pub name: String,
    /// Remote identifier of the parent tag.
    pub parent_guid: Option<Guid>,
    /// Client identifier of the parent tag.
    pub parent_local_id: Option<LocalId>,
    /// Owning linked notebook, `None` for the user's own tags.
    pub linked_notebook_guid: Option<Guid>,
    /// Unsent local modification.
    pub dirty: bool,
    /// Never to be synchronized.
    pub local_only: bool,
    /// Client-only favorite mark.
    pub favorited: bool,
}

impl Tag {
    /// Creates a tag with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets the remote identity.
    pub fn with_guid(mut self, guid: impl Into<Guid>, usn: Usn) -> Self {
        self.guid = Some(guid.into());
        self.usn = Some(usn);
        self
    }

    /// Sets the client identifier.
    pub fn with_local_id(mut self, local_id: impl Into<LocalId>) -> Self {
        self.local_id = Some(local_id.into());
        self
    }

    /// Sets the parent tag guid.
    pub fn with_parent(mut self, parent_guid: impl Into<Guid>) -> Self {
        self.parent_guid = Some(parent_guid.into());
        self
    }

    /// Places the tag in a linked notebook's scope.
    pub fn with_linked_notebook(mut self, guid: impl Into<Guid>) -> Self {
        self.linked_notebook_guid = Some(guid.into());
        self
    }

    /// Marks the tag dirty.
    pub fn dirty(mut self) -> Self {
        self.dirty = true;
        self
    }
}

impl SyncEntity for Tag {
    const KIND: EntityKind = EntityKind::Tag;

    sync_identity!();

    fn unique_name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn linked_notebook_guid(&self) -> Option<&str> {
        self.linked_notebook_guid.as_deref()
    }

    fn parent_guid(&self) -> Option<&str> {
        self.parent_guid.as_deref()
    }

    fn clear_sync_identity(&mut self) {
        self.guid = None;
        self.usn = None;
    }

    fn carry_local_flags(&mut self, mine: &Self) {
        self.favorited = mine.favorited;
        self.local_only = mine.local_only;
    }
}

/// A saved search. Saved searches exist only in the user's own scope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedSearch {
    /// Client identifier.
    pub local_id: Option<LocalId>,
    /// Remote identifier.
    pub guid: Option<Guid>,
    /// Update sequence number.
    pub usn: Option<Usn>,
    /// Name, unique among saved searches.
    pub name: String,
    /// Search query text.
    pub query: String,
    /// Unsent local modification.
    pub dirty: bool,
    /// Never to be synchronized.
    pub local_only: bool,
    /// Client-only favorite mark.
    pub favorited: bool,
}

impl SavedSearch {
    /// Creates a saved search.
    pub fn new(name: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            query: query.into(),
            ..Self::default()
        }
    }

    /// Sets the remote identity.
    pub fn with_guid(mut self, guid: impl Into<Guid>, usn: Usn) -> Self {
        self.guid = Some(guid.into());
        self.usn = Some(usn);
        self
    }

    /// Sets the client identifier.
    pub fn with_local_id(mut self, local_id: impl Into<LocalId>) -> Self {
        self.local_id = Some(local_id.into());
        self
    }

    /// Marks the saved search dirty.
    pub fn dirty(mut self) -> Self {
        self.dirty = true;
        self
    }
}

impl SyncEntity for SavedSearch {
    const KIND: EntityKind = EntityKind::SavedSearch;

    sync_identity!();

    fn unique_name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn clear_sync_identity(&mut self) {
        self.guid = None;
        self.usn = None;
    }

    fn carry_local_flags(&mut self, mine: &Self) {
        self.favorited = mine.favorited;
        self.local_only = mine.local_only;
    }
}

/// A note.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// Client identifier.
    pub local_id: Option<LocalId>,
    /// Remote identifier.
    pub guid: Option<Guid>,
    /// Update sequence number.
    pub usn: Option<Usn>,
    /// Title; not required to be unique.
    pub title: String,
    /// Markup content, absent until the full note data is downloaded.
    pub content: Option<String>,
    /// Remote identifier of the containing notebook.
    pub notebook_guid: Option<Guid>,
    /// Client identifier of the containing notebook.
    pub notebook_local_id: Option<LocalId>,
    /// Remote identifiers of the applied tags.
    pub tag_guids: Vec<Guid>,
    /// Attachments carried with the note.
    pub resources: Vec<Resource>,
    /// Unsent local modification.
    pub dirty: bool,
    /// Never to be synchronized.
    pub local_only: bool,
    /// Client-only favorite mark.
    pub favorited: bool,
}

impl Note {
    /// Creates a note with the given title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Sets the remote identity.
    pub fn with_guid(mut self, guid: impl Into<Guid>, usn: Usn) -> Self {
        self.guid = Some(guid.into());
        self.usn = Some(usn);
        self
    }

    /// Sets the client identifier.
    pub fn with_local_id(mut self, local_id: impl Into<LocalId>) -> Self {
        self.local_id = Some(local_id.into());
        self
    }

    /// Sets the containing notebook guid.
    pub fn in_notebook(mut self, notebook_guid: impl Into<Guid>) -> Self {
        self.notebook_guid = Some(notebook_guid.into());
        self
    }

    /// Sets the content.
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Marks the note dirty.
    pub fn dirty(mut self) -> Self {
        self.dirty = true;
        self
    }
}

impl SyncEntity for Note {
    const KIND: EntityKind = EntityKind::Note;

    sync_identity!();

    fn clear_sync_identity(&mut self) {
        self.guid = None;
        self.usn = None;
        for resource in &mut self.resources {
            resource.clear_sync_identity();
            resource.note_guid = None;
        }
    }

    fn carry_local_flags(&mut self, mine: &Self) {
        self.favorited = mine.favorited;
        self.local_only = mine.local_only;
    }
}

/// A note attachment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// Client identifier.
    pub local_id: Option<LocalId>,
    /// Remote identifier.
    pub guid: Option<Guid>,
    /// Update sequence number.
    pub usn: Option<Usn>,
    /// Remote identifier of the owning note.
    pub note_guid: Option<Guid>,
    /// Client identifier of the owning note.
    pub note_local_id: Option<LocalId>,
    /// MIME type of the body.
    pub mime: String,
    /// Hash of the body as reported by the remote service.
    pub data_hash: Option<Vec<u8>>,
    /// Size of the body in bytes.
    pub data_size: u64,
    /// The body, absent until downloaded.
    pub data_body: Option<Vec<u8>>,
    /// Unsent local modification.
    pub dirty: bool,
    /// Never to be synchronized.
    pub local_only: bool,
}

impl Resource {
    /// Creates an attachment with the given MIME type.
    pub fn new(mime: impl Into<String>) -> Self {
        Self {
            mime: mime.into(),
            ..Self::default()
        }
    }

    /// Sets the remote identity.
    pub fn with_guid(mut self, guid: impl Into<Guid>, usn: Usn) -> Self {
        self.guid = Some(guid.into());
        self.usn = Some(usn);
        self
    }

    /// Sets the client identifier.
    pub fn with_local_id(mut self, local_id: impl Into<LocalId>) -> Self {
        self.local_id = Some(local_id.into());
        self
    }

    /// Sets the owning note guid.
    pub fn in_note(mut self, note_guid: impl Into<Guid>) -> Self {
        self.note_guid = Some(note_guid.into());
        self
    }

    /// Marks the attachment dirty.
    pub fn dirty(mut self) -> Self {
        self.dirty = true;
        self
    }
}

impl SyncEntity for Resource {
    const KIND: EntityKind = EntityKind::Resource;

    sync_identity!();

    fn clear_sync_identity(&mut self) {
        self.guid = None;
        self.usn = None;
    }

    fn carry_local_flags(&mut self, mine: &Self) {
        self.local_only = mine.local_only;
    }
}
