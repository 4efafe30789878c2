//! Records command implementation.

use super::{parse_kind, selected_scopes};
use notesync_engine::{DurableRecords, SyncPaths, SyncResult};
use notesync_protocol::{
    EntityKind, FailureKind, FailureRecord, Guid, Note, Notebook, Resource, SavedSearch,
    SyncEntity, SyncScope, Tag, Usn,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// One recorded failure.
#[derive(Debug, Serialize)]
pub struct FailureSummary {
    /// Failure category.
    pub kind: FailureKind,
    /// Guid of the failed item.
    pub guid: Option<Guid>,
    /// USN of the failed item.
    pub usn: Option<Usn>,
    /// Recorded error, if any.
    pub error: Option<String>,
}

/// Durable records of one entity kind in one scope.
#[derive(Debug, Serialize)]
pub struct KindRecords {
    /// Scope name.
    pub scope: String,
    /// Entity kind.
    pub kind: EntityKind,
    /// Processed USN by guid.
    pub processed: BTreeMap<Guid, Usn>,
    /// Expunged guids.
    pub expunged: Vec<Guid>,
    /// Failed and cancelled items.
    pub failures: Vec<FailureSummary>,
}

impl KindRecords {
    fn failure_count(&self, kind: FailureKind) -> usize {
        self.failures.iter().filter(|f| f.kind == kind).count()
    }

    fn counts(&self) -> RecordCounts {
        RecordCounts {
            scope: self.scope.clone(),
            kind: self.kind,
            processed: self.processed.len(),
            expunged: self.expunged.len(),
            failed_to_download: self.failure_count(FailureKind::FailedToDownload),
            failed_to_process: self.failure_count(FailureKind::FailedToProcess),
            cancelled: self.failure_count(FailureKind::Cancelled),
        }
    }
}

/// Record counts of one entity kind in one scope.
#[derive(Debug, Serialize)]
pub struct RecordCounts {
    /// Scope name.
    pub scope: String,
    /// Entity kind.
    pub kind: EntityKind,
    /// Number of processed records.
    pub processed: usize,
    /// Number of expunge records.
    pub expunged: usize,
    /// Number of failed downloads.
    pub failed_to_download: usize,
    /// Number of failed writes.
    pub failed_to_process: usize,
    /// Number of cancelled items.
    pub cancelled: usize,
}

fn summarize<E: SyncEntity>(records: Vec<FailureRecord<E>>) -> Vec<FailureSummary> {
    records
        .into_iter()
        .map(|record| FailureSummary {
            kind: record.kind,
            guid: record.entity.guid().map(str::to_string),
            usn: record.entity.usn(),
            error: record.error,
        })
        .collect()
}

fn failures(store: &DurableRecords, kind: EntityKind) -> SyncResult<Vec<FailureSummary>> {
    Ok(match kind {
        EntityKind::Notebook => summarize(store.failures::<Notebook>()?),
        EntityKind::Tag => summarize(store.failures::<Tag>()?),
        EntityKind::SavedSearch => summarize(store.failures::<SavedSearch>()?),
        EntityKind::Note => summarize(store.failures::<Note>()?),
        EntityKind::Resource => summarize(store.failures::<Resource>()?),
    })
}

/// Loads the records of `kind` in `scope`, or `None` if there are none.
pub fn load(
    paths: &SyncPaths,
    scope: &SyncScope,
    kind: EntityKind,
) -> Result<Option<KindRecords>, Box<dyn std::error::Error>> {
    let dir = paths
        .durable_kind_dir(scope, kind)
        .ok_or_else(|| format!("Scope {scope} has no durable directory"))?;
    if !dir.exists() {
        return Ok(None);
    }
    debug!(%scope, %kind, dir = %dir.display(), "loading durable records");
    let store = DurableRecords::new(dir, false);
    Ok(Some(KindRecords {
        scope: scope.to_string(),
        kind,
        processed: store.processed()?,
        expunged: store.expunged()?.into_iter().collect(),
        failures: failures(&store, kind)?,
    }))
}

/// Runs the records command.
pub fn run(
    path: &Path,
    scope: Option<&str>,
    kind: Option<&str>,
    list: bool,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let paths = SyncPaths::new(path);
    let kinds = match kind {
        Some(value) => vec![parse_kind(value)?],
        None => EntityKind::ALL.to_vec(),
    };

    let mut result = Vec::new();
    for scope in selected_scopes(&paths.durable_dir(), scope)? {
        for &kind in &kinds {
            if let Some(records) = load(&paths, &scope, kind)? {
                result.push(records);
            }
        }
    }

    match (format, list) {
        ("json", true) => println!("{}", serde_json::to_string_pretty(&result)?),
        ("json", false) => {
            let counts: Vec<_> = result.iter().map(KindRecords::counts).collect();
            println!("{}", serde_json::to_string_pretty(&counts)?);
        }
        _ => {
            if result.is_empty() {
                println!("No durable records");
            }
            for records in &result {
                print_text(records, list);
            }
        }
    }

    Ok(())
}

fn print_text(records: &KindRecords, list: bool) {
    let counts = records.counts();
    println!("{} {}:", records.scope, records.kind);
    println!("  Processed:          {}", counts.processed);
    println!("  Expunged:           {}", counts.expunged);
    println!("  Failed to download: {}", counts.failed_to_download);
    println!("  Failed to process:  {}", counts.failed_to_process);
    println!("  Cancelled:          {}", counts.cancelled);
    if !list {
        return;
    }
    for (guid, usn) in &records.processed {
        println!("  processed {guid} @ {usn}");
    }
    for guid in &records.expunged {
        println!("  expunged {guid}");
    }
    for failure in &records.failures {
        println!(
            "  {} {} @ {}{}",
            failure.kind,
            failure.guid.as_deref().unwrap_or("-"),
            failure.usn.map_or_else(|| "-".to_string(), |u| u.to_string()),
            failure
                .error
                .as_deref()
                .map(|e| format!(": {e}"))
                .unwrap_or_default()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notesync_engine::{
        DurableProcessor, EntityProcessor, MemoryLocalStorage, NotebookKind, ProcessingConfig,
        SimpleConflictResolver,
    };
    use notesync_protocol::SyncChunk;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    #[test]
    fn missing_kind_directory_has_no_records() {
        let dir = TempDir::new().unwrap();
        let paths = SyncPaths::new(dir.path());
        assert!(load(&paths, &SyncScope::UserOwn, EntityKind::Tag)
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn loads_records_written_by_a_durable_processor() {
        let dir = TempDir::new().unwrap();
        let paths = SyncPaths::new(dir.path());
        let storage = Arc::new(MemoryLocalStorage::new());
        let resolver = Arc::new(SimpleConflictResolver::new(storage.clone()));
        let processor = EntityProcessor::new(NotebookKind, storage, resolver)
            .with_config(ProcessingConfig::new().with_fsync(false));
        let durable = DurableProcessor::for_scope(processor, &paths, &SyncScope::UserOwn).unwrap();
        let mut chunk = SyncChunk::new(1, 2);
        chunk.notebooks.push(Notebook::new("a").with_guid("nb1", 1));
        chunk.expunged_notebooks.push("nb0".into());

        durable
            .process(&[chunk], &CancellationToken::new(), None)
            .await
            .unwrap();

        let records = load(&paths, &SyncScope::UserOwn, EntityKind::Notebook)
            .unwrap()
            .unwrap();
        let counts = records.counts();
        assert_eq!(counts.processed, 1);
        assert_eq!(counts.expunged, 1);
        assert_eq!(records.processed.get("nb1"), Some(&1));
    }
}
