//! Ranges command implementation.

use super::selected_scopes;
use notesync_engine::{SyncChunkCache, SyncPaths};
use notesync_protocol::Usn;
use serde::Serialize;
use std::path::Path;

/// Cached ranges of one scope.
#[derive(Debug, Serialize)]
pub struct ScopeRanges {
    /// Scope name.
    pub scope: String,
    /// Cached `(low, high)` USN ranges in order.
    pub ranges: Vec<(Usn, Usn)>,
}

/// Runs the ranges command.
pub fn run(
    path: &Path,
    scope: Option<&str>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let paths = SyncPaths::new(path);
    let cache_dir = paths.sync_chunks_dir();
    if !cache_dir.exists() {
        return Err(format!("No sync chunk cache found at {:?}", cache_dir).into());
    }
    let cache = SyncChunkCache::open(&cache_dir, false)?;

    let mut result = Vec::new();
    for scope in selected_scopes(&cache_dir, scope)? {
        result.push(ScopeRanges {
            scope: scope.to_string(),
            ranges: cache.fetch_usn_ranges(&scope)?,
        });
    }

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => {
            if result.is_empty() {
                println!("No cached sync chunks");
            }
            for entry in &result {
                let count = entry.ranges.len();
                match (entry.ranges.first(), entry.ranges.last()) {
                    (Some(first), Some(last)) => println!(
                        "{}: {count} chunk(s) covering USN {}..={}",
                        entry.scope, first.0, last.1
                    ),
                    _ => println!("{}: empty", entry.scope),
                }
                for (low, high) in &entry.ranges {
                    println!("  {low}_{high}");
                }
            }
        }
    }

    Ok(())
}
