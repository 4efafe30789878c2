//! Clear-cache command implementation.

use super::parse_scope;
use notesync_engine::{SyncChunkCache, SyncPaths};
use std::path::Path;

/// Runs the clear-cache command.
pub fn run(path: &Path, scope: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let paths = SyncPaths::new(path);
    let cache = SyncChunkCache::open(paths.sync_chunks_dir(), true)?;

    match scope {
        Some(value) => {
            let scope = parse_scope(value)?;
            cache.clear(&scope)?;
            println!("Cleared cached sync chunks of {scope}");
        }
        None => {
            cache.clear_all()?;
            println!("Cleared all cached sync chunks");
        }
    }
    Ok(())
}
