//! Dump-chunk command implementation.

use super::parse_scope;
use notesync_engine::{SyncChunkCache, SyncPaths};
use notesync_protocol::Usn;
use std::path::Path;

/// Runs the dump-chunk command.
pub fn run(
    path: &Path,
    scope: &str,
    low: Usn,
    high: Usn,
) -> Result<(), Box<dyn std::error::Error>> {
    let scope = parse_scope(scope)?;
    let paths = SyncPaths::new(path);
    let cache = SyncChunkCache::open(paths.sync_chunks_dir(), false)?;

    let chunk = cache.read_chunk(&scope, low, high)?;
    println!("{}", serde_json::to_string_pretty(&chunk)?);
    Ok(())
}
