//! Payload download collaborators.
//!
//! Sync chunks carry notes and attachments without their bodies. When a
//! downloader is configured, the note and attachment processors fetch the
//! full payload before writing the item locally.

use crate::error::DownloadError;
use async_trait::async_trait;
use notesync_protocol::{Note, Resource};

/// Fetches the full data of a note (content and attachments).
#[async_trait]
pub trait NoteDataDownloader: Send + Sync {
    /// Returns `note` completed with its full data.
    async fn download_note(&self, note: Note) -> Result<Note, DownloadError>;
}

/// Fetches the binary body of an attachment.
#[async_trait]
pub trait ResourceDataDownloader: Send + Sync {
    /// Returns `resource` completed with its body.
    async fn download_resource(&self, resource: Resource) -> Result<Resource, DownloadError>;
}
