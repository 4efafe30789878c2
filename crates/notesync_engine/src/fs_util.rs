//! Crash-safe file helpers shared by the chunk cache and the durable
//! record store.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

const TEMP_SUFFIX: &str = ".tmp";

/// Writes `data` to `path` atomically.
///
/// Uses the write-then-rename pattern:
/// 1. Write to a temporary sibling file
/// 2. Sync the temporary file to disk
/// 3. Rename it over `path`
/// 4. Sync the directory so the rename is durable
///
/// A crash at any point leaves either the old file or the new one.
pub(crate) fn write_atomic(path: &Path, data: &[u8], fsync: bool) -> io::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no parent"))?;
    fs::create_dir_all(parent)?;

    let mut temp_name = path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?
        .to_os_string();
    temp_name.push(TEMP_SUFFIX);
    let temp_path = parent.join(temp_name);

    let mut file = File::create(&temp_path)?;
    file.write_all(data)?;
    if fsync {
        file.sync_all()?;
    }
    drop(file);

    fs::rename(&temp_path, path)?;

    if fsync {
        sync_directory(parent)?;
    }
    Ok(())
}

/// Removes a file, treating a missing file as success.
pub(crate) fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Removes a directory tree, treating a missing directory as success.
pub(crate) fn remove_dir_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Returns true for leftovers of an interrupted [`write_atomic`].
pub(crate) fn is_temp_file(name: &str) -> bool {
    name.ends_with(TEMP_SUFFIX)
}

/// Syncs a directory so entry creations, renames and removals are durable.
///
/// Windows NTFS journals metadata, so there is nothing to do there.
#[cfg(unix)]
pub(crate) fn sync_directory(path: &Path) -> io::Result<()> {
    let dir = File::open(path)?;
    dir.sync_all()
}

#[cfg(not(unix))]
pub(crate) fn sync_directory(_path: &Path) -> io::Result<()> {
    Ok(())
}
