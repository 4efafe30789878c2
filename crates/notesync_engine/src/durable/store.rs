//! On-disk outcome records of one entity kind.

use crate::error::SyncResult;
use crate::fs_util::{is_temp_file, remove_dir_if_exists, remove_if_exists, write_atomic};
use notesync_protocol::{
    decode_record, encode_record, FailureKind, FailureRecord, Guid, ProcessedRecord, SyncEntity,
    Usn,
};
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;

const PROCESSED_DIR: &str = "processed";
const EXPUNGED_DIR: &str = "expunged";

/// Maps a guid onto a file name; guids with unusual characters are hex-encoded.
fn file_name(guid: &str) -> String {
    let plain = !guid.is_empty()
        && guid
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if plain {
        guid.to_string()
    } else {
        let hex: String = guid.bytes().map(|b| format!("{b:02x}")).collect();
        format!("x{hex}")
    }
}

/// Durable outcome records of one entity kind in one scope.
///
/// Records live below `<dir>/{processed,expunged,failed_to_download,
/// failed_to_process,cancelled}/`, one file per guid.
#[derive(Debug, Clone)]
pub struct DurableRecords {
    dir: PathBuf,
    fsync: bool,
}

impl DurableRecords {
    /// Opens the records kept in `dir`.
    pub fn new(dir: impl Into<PathBuf>, fsync: bool) -> Self {
        Self {
            dir: dir.into(),
            fsync,
        }
    }

    /// Returns the record directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn write<T: serde::Serialize>(&self, sub: &str, guid: &str, value: &T) -> SyncResult<()> {
        let bytes = encode_record(value)?;
        write_atomic(&self.dir.join(sub).join(file_name(guid)), &bytes, self.fsync)?;
        Ok(())
    }

    fn read_all<T: DeserializeOwned>(&self, sub: &str) -> SyncResult<Vec<T>> {
        let dir = self.dir.join(sub);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut names = Vec::new();
        for entry in entries {
            let name = entry?.file_name().to_string_lossy().into_owned();
            if !is_temp_file(&name) {
                names.push(name);
            }
        }
        names.sort();

        let mut records = Vec::with_capacity(names.len());
        for name in names {
            let bytes = fs::read(dir.join(&name))?;
            match decode_record(&bytes) {
                Ok(record) => records.push(record),
                Err(e) => warn!(
                    file = %name,
                    dir = %dir.display(),
                    error = %e,
                    "skipping unreadable record"
                ),
            }
        }
        Ok(records)
    }

    fn remove_failures(&self, guid: &str, except: Option<FailureKind>) -> SyncResult<()> {
        let name = file_name(guid);
        for kind in FailureKind::ALL {
            if Some(kind) != except {
                remove_if_exists(&self.dir.join(kind.dir_name()).join(&name))?;
            }
        }
        Ok(())
    }

    fn read_processed(&self, guid: &str) -> SyncResult<Option<ProcessedRecord>> {
        let path = self.dir.join(PROCESSED_DIR).join(file_name(guid));
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match decode_record::<ProcessedRecord>(&bytes) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "replacing unreadable record");
                Ok(None)
            }
        }
    }

    /// Records `guid` as processed at `usn` and drops its failure records.
    ///
    /// A record of a newer USN is kept.
    pub(crate) fn write_processed(&self, guid: &str, usn: Usn) -> SyncResult<()> {
        match self.read_processed(guid)? {
            Some(existing) if existing.usn >= usn => {}
            _ => self.write(PROCESSED_DIR, guid, &ProcessedRecord::new(guid, usn))?,
        }
        self.remove_failures(guid, None)
    }

    /// Records `guid` as expunged.
    pub(crate) fn write_expunged(&self, guid: &str) -> SyncResult<()> {
        self.write(EXPUNGED_DIR, guid, &guid.to_string())
    }

    /// Records a failed or cancelled item, replacing any other failure
    /// record of the same guid.
    pub(crate) fn write_failure<E: SyncEntity>(&self, record: &FailureRecord<E>) -> SyncResult<()> {
        let Some(guid) = record.entity.guid() else {
            warn!(kind = %E::KIND, "not recording failure of item without guid");
            return Ok(());
        };
        self.write(record.kind.dir_name(), guid, record)?;
        self.remove_failures(guid, Some(record.kind))
    }

    /// Processed USN by guid.
    pub fn processed(&self) -> SyncResult<BTreeMap<Guid, Usn>> {
        Ok(self
            .read_all::<ProcessedRecord>(PROCESSED_DIR)?
            .into_iter()
            .map(|r| (r.guid, r.usn))
            .collect())
    }

    /// Expunged guids.
    pub fn expunged(&self) -> SyncResult<BTreeSet<Guid>> {
        Ok(self.read_all::<Guid>(EXPUNGED_DIR)?.into_iter().collect())
    }

    /// Failed and cancelled items.
    pub fn failures<E: SyncEntity>(&self) -> SyncResult<Vec<FailureRecord<E>>> {
        let mut records = Vec::new();
        for kind in FailureKind::ALL {
            records.extend(self.read_all::<FailureRecord<E>>(kind.dir_name())?);
        }
        Ok(records)
    }

    /// Deletes every record.
    pub fn clear(&self) -> SyncResult<()> {
        remove_dir_if_exists(&self.dir)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notesync_protocol::Note;
    use tempfile::TempDir;

    #[test]
    fn unusual_guids_are_hex_encoded() {
        assert_eq!(file_name("a1-b2_c3"), "a1-b2_c3");
        assert_eq!(file_name("../x"), "x2e2e2f78");
        assert_eq!(file_name(""), "x");
    }

    #[test]
    fn processed_replaces_failures() {
        let dir = TempDir::new().unwrap();
        let store = DurableRecords::new(dir.path().join("note"), false);
        let note = Note::new("n").with_guid("n1", 4);

        store
            .write_failure(&FailureRecord::new(FailureKind::Cancelled, note.clone(), None))
            .unwrap();
        store
            .write_failure(&FailureRecord::new(
                FailureKind::FailedToProcess,
                note.clone(),
                Some("disk full".into()),
            ))
            .unwrap();
        let failures = store.failures::<Note>().unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].kind, FailureKind::FailedToProcess);

        store.write_processed("n1", 4).unwrap();
        assert!(store.failures::<Note>().unwrap().is_empty());
        assert_eq!(store.processed().unwrap().get("n1"), Some(&4));
    }

    #[test]
    fn older_usn_keeps_newer_processed_record() {
        let dir = TempDir::new().unwrap();
        let store = DurableRecords::new(dir.path().join("note"), false);
        store.write_processed("n1", 10).unwrap();
        store
            .write_failure(&FailureRecord::new(
                FailureKind::Cancelled,
                Note::new("n").with_guid("n1", 5),
                None,
            ))
            .unwrap();

        store.write_processed("n1", 5).unwrap();
        assert_eq!(store.processed().unwrap().get("n1"), Some(&10));
        assert!(store.failures::<Note>().unwrap().is_empty());

        store.write_processed("n1", 12).unwrap();
        assert_eq!(store.processed().unwrap().get("n1"), Some(&12));
    }

    #[test]
    fn clear_removes_everything() {
        let dir = TempDir::new().unwrap();
        let store = DurableRecords::new(dir.path().join("tag"), false);
        store.write_processed("t1", 1).unwrap();
        store.write_expunged("t2").unwrap();
        assert_eq!(store.expunged().unwrap().len(), 1);

        store.clear().unwrap();
        assert!(store.processed().unwrap().is_empty());
        assert!(store.expunged().unwrap().is_empty());
        assert!(!store.dir().exists());
    }
}
