//! Cleanup command implementation.

use super::selected_scopes;
use notesync_engine::{DurableRecords, SyncPaths};
use notesync_protocol::EntityKind;
use std::fs;
use std::io;
use std::path::Path;
use tracing::warn;

/// Removes `dir` if it exists and is empty.
fn remove_if_empty(dir: &Path) -> io::Result<bool> {
    match fs::read_dir(dir) {
        Ok(mut entries) => {
            if entries.next().is_some() {
                return Ok(false);
            }
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    }
    fs::remove_dir(dir)?;
    Ok(true)
}

/// Runs the cleanup command.
pub fn run(
    path: &Path,
    scope: Option<&str>,
    dry_run: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let paths = SyncPaths::new(path);
    let durable_dir = paths.durable_dir();

    let mut removed = 0;
    for scope in selected_scopes(&durable_dir, scope)? {
        for kind in EntityKind::ALL {
            let Some(dir) = paths.durable_kind_dir(&scope, kind) else {
                return Err(format!("Scope {scope} has no durable directory").into());
            };
            if !dir.exists() {
                continue;
            }
            if dry_run {
                println!("Would delete {}", dir.display());
            } else {
                DurableRecords::new(&dir, true).clear()?;
                println!("Deleted {scope} {kind} records");
            }
            removed += 1;
        }
        if !dry_run {
            if let Some(scope_dir) = scope.dir_name().map(|name| durable_dir.join(name)) {
                if let Err(e) = remove_if_empty(&scope_dir) {
                    warn!(
                        dir = %scope_dir.display(),
                        error = %e,
                        "failed to remove scope directory"
                    );
                }
            }
        }
    }

    if removed == 0 {
        println!("No durable records to delete");
    }
    Ok(())
}
