//! CLI command implementations.

pub mod cleanup;
pub mod clear_cache;
pub mod dump_chunk;
pub mod ranges;
pub mod records;

use notesync_protocol::{EntityKind, SyncScope};
use std::fs;
use std::io;
use std::path::Path;

/// Parses `user-own` or `linked-notebook:<guid>`.
pub fn parse_scope(value: &str) -> Result<SyncScope, String> {
    if value == "user-own" {
        return Ok(SyncScope::UserOwn);
    }
    match value.strip_prefix("linked-notebook:") {
        Some(guid) if !guid.is_empty() => Ok(SyncScope::linked(guid)),
        _ => Err(format!(
            "invalid scope {value:?}, expected user-own or linked-notebook:<guid>"
        )),
    }
}

/// Parses an entity kind name such as `saved_search`.
pub fn parse_kind(value: &str) -> Result<EntityKind, String> {
    EntityKind::parse(value).ok_or_else(|| {
        format!("invalid kind {value:?}, expected notebook, tag, saved_search, note or resource")
    })
}

/// Scopes with a directory below `dir`, in display order.
pub fn scopes_in(dir: &Path) -> io::Result<Vec<SyncScope>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };
    let mut scopes = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        if let Some(scope) = entry.file_name().to_str().and_then(SyncScope::from_dir_name) {
            scopes.push(scope);
        }
    }
    scopes.sort_by_key(|s| s.to_string());
    Ok(scopes)
}

/// The requested scope, or every scope found below `dir`.
pub fn selected_scopes(
    dir: &Path,
    scope: Option<&str>,
) -> Result<Vec<SyncScope>, Box<dyn std::error::Error>> {
    match scope {
        Some(value) => Ok(vec![parse_scope(value)?]),
        None => Ok(scopes_in(dir)?),
    }
}
