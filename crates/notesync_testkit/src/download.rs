//! Fake payload downloaders.

use async_trait::async_trait;
use notesync_engine::{DownloadError, NoteDataDownloader, ResourceDataDownloader};
use notesync_protocol::{Guid, Note, Resource};
use parking_lot::Mutex;
use std::collections::HashSet;

/// Fills in note content and attachment bodies; fails for chosen guids.
#[derive(Default)]
pub struct FakeDownloader {
    failing: Mutex<HashSet<Guid>>,
    downloaded: Mutex<Vec<Guid>>,
}

impl FakeDownloader {
    /// Creates a downloader that always succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes downloads of `guid` fail.
    pub fn failing_on(self, guid: impl Into<Guid>) -> Self {
        self.failing.lock().insert(guid.into());
        self
    }

    /// Lets downloads of `guid` succeed again.
    pub fn heal(&self, guid: &str) {
        self.failing.lock().remove(guid);
    }

    /// Guids downloaded successfully, in order.
    pub fn downloaded(&self) -> Vec<Guid> {
        self.downloaded.lock().clone()
    }

    fn fetch(&self, guid: Option<&str>) -> Result<Guid, DownloadError> {
        let guid = guid.unwrap_or_default().to_string();
        if self.failing.lock().contains(&guid) {
            return Err(DownloadError::new(guid, "connection reset"));
        }
        self.downloaded.lock().push(guid.clone());
        Ok(guid)
    }
}

#[async_trait]
impl NoteDataDownloader for FakeDownloader {
    async fn download_note(&self, mut note: Note) -> Result<Note, DownloadError> {
        let guid = self.fetch(note.guid.as_deref())?;
        note.content = Some(format!("<en-note>{guid}</en-note>"));
        Ok(note)
    }
}

#[async_trait]
impl ResourceDataDownloader for FakeDownloader {
    async fn download_resource(&self, mut resource: Resource) -> Result<Resource, DownloadError> {
        let guid = self.fetch(resource.guid.as_deref())?;
        let body = guid.into_bytes();
        resource.data_size = body.len() as u64;
        resource.data_body = Some(body);
        Ok(resource)
    }
}
