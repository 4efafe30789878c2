//! Sync chunk cache.
//!
//! Buffers fetched sync chunks per scope and persists them so an
//! interrupted sync can resume without downloading them again. Each scope
//! is one directory; each chunk is one framed record named after its USN
//! range:
//!
//! ```text
//! <root>/
//! ├─ user_own/
//! │  ├─ 1_100
//! │  └─ 101_250
//! └─ linked_notebook_<guid>/
//!    └─ 1_40
//! ```
//!
//! Ranges of a scope never overlap and never leave a gap. A `put` that
//! would break this is rejected as a whole.

use crate::error::{SyncError, SyncResult};
use crate::fs_util::{is_temp_file, remove_dir_if_exists, write_atomic};
use notesync_protocol::{decode_record, encode_record, SyncChunk, SyncScope, Usn};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Default)]
struct ScopeState {
    /// Ranges persisted on disk, loaded on first use.
    persisted: Option<BTreeSet<(Usn, Usn)>>,
    /// Chunks accepted by `put` but not yet flushed, keyed by low USN.
    buffered: BTreeMap<Usn, SyncChunk>,
}

impl ScopeState {
    fn last_high_usn(&self) -> Option<Usn> {
        let persisted = self
            .persisted
            .as_ref()
            .and_then(|ranges| ranges.iter().next_back().map(|&(_, high)| high));
        let buffered = self.buffered.values().next_back().map(|c| c.chunk_high_usn);
        persisted.max(buffered)
    }
}

/// Persistent per-scope cache of downloaded sync chunks.
pub struct SyncChunkCache {
    root: PathBuf,
    fsync: bool,
    scopes: RwLock<HashMap<SyncScope, ScopeState>>,
}

impl SyncChunkCache {
    /// Opens (creating if needed) a cache rooted at `root`.
    pub fn open(root: impl Into<PathBuf>, fsync: bool) -> SyncResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            fsync,
            scopes: RwLock::new(HashMap::new()),
        })
    }

    /// Returns the cache root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn scope_dir(&self, scope: &SyncScope) -> SyncResult<PathBuf> {
        let name = scope
            .dir_name()
            .ok_or_else(|| SyncError::InvalidScope(scope.clone()))?;
        Ok(self.root.join(name))
    }

    fn state_mut<'a>(
        &self,
        scopes: &'a mut HashMap<SyncScope, ScopeState>,
        scope: &SyncScope,
    ) -> SyncResult<&'a mut ScopeState> {
        let dir = self.scope_dir(scope)?;
        let state = scopes.entry(scope.clone()).or_default();
        if state.persisted.is_none() {
            state.persisted = Some(list_ranges(&dir)?);
        }
        Ok(state)
    }

    /// Buffers `chunks` for `scope`.
    ///
    /// The chunks must be ordered and contiguous, each entity's USN must lie
    /// within its chunk's range, and the first chunk must start right after
    /// the last range already known for the scope. Otherwise nothing is
    /// buffered and [`SyncError::ChunkRange`] is returned.
    pub fn put(&self, scope: &SyncScope, chunks: Vec<SyncChunk>) -> SyncResult<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        let mut scopes = self.scopes.write();
        let state = self.state_mut(&mut scopes, scope)?;

        if let Err(message) = validate_chunks(state.last_high_usn(), &chunks) {
            warn!(%scope, %message, "rejecting sync chunks");
            return Err(SyncError::chunk_range(scope, message));
        }

        debug!(%scope, count = chunks.len(), "buffered sync chunks");
        for chunk in chunks {
            state.buffered.insert(chunk.chunk_low_usn, chunk);
        }
        Ok(())
    }

    /// Persists every buffered chunk, one record per USN range.
    pub fn flush(&self) -> SyncResult<()> {
        let mut scopes = self.scopes.write();
        for (scope, state) in scopes.iter_mut() {
            if state.buffered.is_empty() {
                continue;
            }
            let dir = self.scope_dir(scope)?;
            let count = state.buffered.len();
            while let Some((&low, chunk)) = state.buffered.first_key_value() {
                let range = chunk.usn_range();
                let bytes = encode_record(chunk)?;
                write_atomic(&dir.join(range_file_name(range)), &bytes, self.fsync)?;
                state.buffered.remove(&low);
                state.persisted.get_or_insert_with(BTreeSet::new).insert(range);
            }
            info!(%scope, count, "flushed sync chunks");
        }
        Ok(())
    }

    /// Returns, in USN order, every known chunk reaching above `after_usn`.
    ///
    /// A chunk straddling `after_usn` is trimmed to its entities with a USN
    /// above it.
    pub fn fetch_relevant(&self, scope: &SyncScope, after_usn: Usn) -> SyncResult<Vec<SyncChunk>> {
        let mut scopes = self.scopes.write();
        let dir = self.scope_dir(scope)?;
        let state = self.state_mut(&mut scopes, scope)?;

        let mut chunks: BTreeMap<Usn, SyncChunk> = BTreeMap::new();
        if let Some(ranges) = &state.persisted {
            for &range in ranges.iter().filter(|&&(_, high)| high > after_usn) {
                let chunk = read_chunk_file(&dir.join(range_file_name(range)))?;
                chunks.insert(range.0, chunk);
            }
        }
        for chunk in state
            .buffered
            .values()
            .filter(|c| c.chunk_high_usn > after_usn)
        {
            chunks.insert(chunk.chunk_low_usn, chunk.clone());
        }

        Ok(chunks
            .into_values()
            .map(|chunk| {
                if chunk.chunk_low_usn <= after_usn {
                    chunk.trimmed_after(after_usn)
                } else {
                    chunk
                }
            })
            .collect())
    }

    /// Returns the sorted list of known USN ranges of `scope`.
    pub fn fetch_usn_ranges(&self, scope: &SyncScope) -> SyncResult<Vec<(Usn, Usn)>> {
        let mut scopes = self.scopes.write();
        let state = self.state_mut(&mut scopes, scope)?;
        let mut ranges: BTreeSet<(Usn, Usn)> = state.persisted.clone().unwrap_or_default();
        ranges.extend(state.buffered.values().map(SyncChunk::usn_range));
        Ok(ranges.into_iter().collect())
    }

    /// Reads one persisted chunk.
    pub fn read_chunk(&self, scope: &SyncScope, low: Usn, high: Usn) -> SyncResult<SyncChunk> {
        let dir = self.scope_dir(scope)?;
        read_chunk_file(&dir.join(range_file_name((low, high))))
    }

    /// Lists the scopes that have persisted chunks.
    pub fn persisted_scopes(&self) -> SyncResult<Vec<SyncScope>> {
        let mut scopes = Vec::new();
        for entry in fs::read_dir(&self.root)? {
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

    /// Deletes every buffered and persisted chunk of `scope`.
    pub fn clear(&self, scope: &SyncScope) -> SyncResult<()> {
        let dir = self.scope_dir(scope)?;
        let mut scopes = self.scopes.write();
        remove_dir_if_exists(&dir)?;
        scopes.remove(scope);
        info!(%scope, "cleared sync chunk cache");
        Ok(())
    }

    /// Deletes every buffered and persisted chunk of every scope.
    pub fn clear_all(&self) -> SyncResult<()> {
        let mut scopes = self.scopes.write();
        remove_dir_if_exists(&self.root)?;
        fs::create_dir_all(&self.root)?;
        scopes.clear();
        info!("cleared sync chunk cache for all scopes");
        Ok(())
    }
}

fn validate_chunks(last_high: Option<Usn>, chunks: &[SyncChunk]) -> Result<(), String> {
    let mut expected_low = last_high.map(|high| high.saturating_add(1));
    for chunk in chunks {
        let (low, high) = chunk.usn_range();
        if low > high {
            return Err(format!("chunk range {low}..{high} is inverted"));
        }
        if let Some(expected) = expected_low {
            if low > expected {
                return Err(format!("gap before chunk {low}..{high}, expected low {expected}"));
            }
            if low < expected {
                return Err(format!(
                    "chunk {low}..{high} overlaps known data, expected low {expected}"
                ));
            }
        }
        if let Some(usn) = chunk
            .entity_usns()
            .flatten()
            .find(|usn| *usn < low || *usn > high)
        {
            return Err(format!("entity usn {usn} outside chunk {low}..{high}"));
        }
        expected_low = Some(high.saturating_add(1));
    }
    Ok(())
}

fn range_file_name((low, high): (Usn, Usn)) -> String {
    format!("{low}_{high}")
}

fn parse_range_file_name(name: &str) -> Option<(Usn, Usn)> {
    let (low, high) = name.split_once('_')?;
    Some((low.parse().ok()?, high.parse().ok()?))
}

fn list_ranges(dir: &Path) -> io::Result<BTreeSet<(Usn, Usn)>> {
    let mut ranges = BTreeSet::new();
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(ranges),
        Err(e) => return Err(e),
    };
    for entry in entries {
        let name = entry?.file_name();
        let name = name.to_string_lossy();
        if is_temp_file(&name) {
            debug!(file = %name, "ignoring interrupted chunk write");
            continue;
        }
        match parse_range_file_name(&name) {
            Some(range) => {
                ranges.insert(range);
            }
            None => warn!(file = %name, "ignoring unrecognized file in chunk cache"),
        }
    }
    Ok(ranges)
}

fn read_chunk_file(path: &Path) -> SyncResult<SyncChunk> {
    let bytes = fs::read(path)?;
    Ok(decode_record(&bytes)?)
}
