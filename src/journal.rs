//! Durable progress journal for multi-part downloads
//!
//! The journal is a sidecar file (`.<filename>.dl_progress`) recording how
//! many bytes each part has confirmed written, so an interrupted transfer
//! resumes from the exact positions last persisted. Saves go through an
//! atomic replace (write temp sibling, rename) so a crash mid-save leaves
//! the previous journal intact.
//!
//! Workers never touch the journal on their hot path: each one adds to its
//! own cache-line-padded atomic counter, and the periodic saver snapshots
//! all counters into the journal under a single lock.

use crate::error::{Error, Result};
use crate::types::{Part, ResourceInfo};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::info;

/// Current journal schema version
pub const JOURNAL_VERSION: u32 = 1;

/// Per-part counter of bytes written, padded to a cache line.
///
/// Each counter is mutated only by its owning worker (monotonic add) and
/// read without locking by the journal snapshot and the progress
/// aggregator. The 64-byte alignment keeps adjacent counters on separate
/// cache lines, avoiding false sharing at high parallelism.
#[derive(Debug, Default)]
#[repr(align(64))]
pub struct PartCounter {
    value: AtomicU64,
}

impl PartCounter {
    /// Add `n` bytes to the counter
    pub fn add(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    /// Read the current value
    pub fn load(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    /// Overwrite the counter (used when restoring from a journal)
    pub fn store(&self, n: u64) {
        self.value.store(n, Ordering::Relaxed);
    }
}

/// Fixed-size table of per-part counters
#[derive(Debug, Default)]
pub struct PartCounters {
    counters: Vec<PartCounter>,
}

impl PartCounters {
    /// Create `n` zeroed counters
    pub fn new(n: usize) -> Self {
        Self {
            counters: (0..n).map(|_| PartCounter::default()).collect(),
        }
    }

    /// Number of counters
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    /// Add `n` bytes to the counter for `index`
    pub fn add(&self, index: usize, n: u64) {
        self.counters[index].add(n);
    }

    /// Read the counter for `index`
    pub fn load(&self, index: usize) -> u64 {
        self.counters[index].load()
    }

    /// Overwrite the counter for `index`
    pub fn store(&self, index: usize, n: u64) {
        self.counters[index].store(n);
    }

    /// Sum of all counters
    ///
    /// Each read is atomic; across counters the sum may be slightly skewed,
    /// which is fine for progress reporting and journal snapshots.
    pub fn total(&self) -> u64 {
        self.counters.iter().map(PartCounter::load).sum()
    }
}

/// Progress record for a single part
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PartEntry {
    /// Dense 0-based part index
    pub index: usize,
    /// First byte of the part's range
    pub start_byte: u64,
    /// Last byte of the part's range (inclusive)
    pub end_byte: u64,
    /// Bytes confirmed written for this part
    pub downloaded: u64,
    /// Whether the part has been fully written
    pub completed: bool,
    /// When this entry was last updated
    pub last_modified: DateTime<Utc>,
}

/// The persisted journal document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Journal {
    /// Schema version tag
    pub version: u32,
    /// Source URI (fingerprint)
    pub uri: String,
    /// Total resource size in bytes (fingerprint)
    pub file_size: u64,
    /// Output filename
    pub filename: String,
    /// Part index -> progress entry
    pub parts: BTreeMap<usize, PartEntry>,
    /// When the journal was first created
    pub created: DateTime<Utc>,
    /// When the journal was last saved
    pub last_updated: DateTime<Utc>,
    /// Set true only after every part completed
    pub completed: bool,
}

impl Journal {
    /// Build a fresh journal for `info` partitioned into `parts`
    pub fn new(info: &ResourceInfo, parts: &[Part]) -> Self {
        let now = Utc::now();
        let entries = parts
            .iter()
            .map(|part| {
                (
                    part.index,
                    PartEntry {
                        index: part.index,
                        start_byte: part.start_byte,
                        end_byte: part.end_byte,
                        downloaded: 0,
                        completed: false,
                        last_modified: now,
                    },
                )
            })
            .collect();
        Self {
            version: JOURNAL_VERSION,
            uri: info.uri.clone(),
            file_size: info.total_size,
            filename: info.filename.clone(),
            parts: entries,
            created: now,
            last_updated: now,
            completed: false,
        }
    }

    /// Whether the journal's fingerprint matches the current resource
    pub fn matches(&self, info: &ResourceInfo) -> bool {
        self.uri == info.uri && self.file_size == info.total_size
    }

    /// Whether the journal's partitioning matches the planner's current one
    pub fn matches_plan(&self, parts: &[Part]) -> bool {
        self.parts.len() == parts.len()
            && parts.iter().all(|part| {
                self.parts.get(&part.index).is_some_and(|entry| {
                    entry.start_byte == part.start_byte && entry.end_byte == part.end_byte
                })
            })
    }

    /// Total bytes downloaded across all parts
    pub fn total_downloaded(&self) -> u64 {
        self.parts.values().map(|entry| entry.downloaded).sum()
    }
}

/// Owns the journal file and serializes every read, update, and save.
///
/// The in-memory journal starts empty; `load` or `init` populates it.
/// A store without a journal (single-stream mode, or before planning)
/// ignores updates and saves.
#[derive(Debug)]
pub struct JournalStore {
    path: PathBuf,
    state: Mutex<Option<Journal>>,
}

impl JournalStore {
    /// Create a store for the journal at `path` with no journal loaded
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            state: Mutex::new(None),
        }
    }

    /// Path of the journal file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the journal from disk.
    ///
    /// Returns `Ok(false)` when no usable journal exists: the file is
    /// absent, its fingerprint does not match `info`, its partitioning does
    /// not match `parts`, or it is already marked completed. A mismatched
    /// or completed journal is discarded in memory but never deleted from
    /// disk. Unreadable or unparseable files are reported as
    /// [`Error::Journal`] without being deleted.
    pub async fn load(&self, info: &ResourceInfo, parts: &[Part]) -> Result<bool> {
        let data = match std::fs::read(&self.path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(err) => {
                return Err(Error::Journal(format!(
                    "failed to read journal file: {err}"
                )));
            }
        };

        let journal: Journal = serde_json::from_slice(&data)
            .map_err(|err| Error::Journal(format!("failed to parse journal file: {err}")))?;

        if journal.version != JOURNAL_VERSION || !journal.matches(info) {
            info!("progress journal is for a different download, starting fresh");
            return Ok(false);
        }
        if !journal.matches_plan(parts) {
            info!("progress journal does not match the current partitioning, starting fresh");
            return Ok(false);
        }
        if journal.completed {
            return Ok(false);
        }

        *self.state.lock().await = Some(journal);
        Ok(true)
    }

    /// Install a fresh journal for `info` and `parts`
    pub async fn init(&self, info: &ResourceInfo, parts: &[Part]) {
        *self.state.lock().await = Some(Journal::new(info, parts));
    }

    /// Drop the in-memory journal without touching the file
    pub async fn discard(&self) {
        *self.state.lock().await = None;
    }

    /// Whether an in-memory journal is present and not completed
    pub async fn is_active(&self) -> bool {
        self.state
            .lock()
            .await
            .as_ref()
            .is_some_and(|journal| !journal.completed)
    }

    /// Whether the entry for `index` is marked completed
    pub async fn part_completed(&self, index: usize) -> bool {
        self.state
            .lock()
            .await
            .as_ref()
            .and_then(|journal| journal.parts.get(&index))
            .is_some_and(|entry| entry.completed)
    }

    /// Mark the entry for `index` completed with its final byte count
    pub async fn mark_part_completed(&self, index: usize, downloaded: u64) {
        if let Some(journal) = self.state.lock().await.as_mut()
            && let Some(entry) = journal.parts.get_mut(&index)
        {
            entry.downloaded = downloaded;
            entry.completed = true;
            entry.last_modified = Utc::now();
        }
    }

    /// Mark the whole journal completed
    pub async fn mark_completed(&self) {
        if let Some(journal) = self.state.lock().await.as_mut() {
            journal.completed = true;
        }
    }

    /// Total bytes downloaded across all entries
    pub async fn total_downloaded(&self) -> u64 {
        self.state
            .lock()
            .await
            .as_ref()
            .map(Journal::total_downloaded)
            .unwrap_or(0)
    }

    /// Copy each entry's `downloaded` into the matching counter
    pub async fn restore_counters(&self, counters: &PartCounters) {
        if let Some(journal) = self.state.lock().await.as_ref() {
            for (index, entry) in &journal.parts {
                if *index < counters.len() {
                    counters.store(*index, entry.downloaded);
                }
            }
        }
    }

    /// Snapshot the counters into the journal and atomically replace the
    /// file on disk.
    ///
    /// A store without a journal saves nothing and returns `Ok`. Callers
    /// are expected to tolerate errors (log and continue); a later save
    /// may succeed.
    pub async fn save(&self, counters: &PartCounters) -> Result<()> {
        let mut state = self.state.lock().await;
        let Some(journal) = state.as_mut() else {
            return Ok(());
        };

        let now = Utc::now();
        for (index, entry) in journal.parts.iter_mut() {
            if *index < counters.len() {
                entry.downloaded = counters.load(*index);
                entry.last_modified = now;
            }
        }
        journal.last_updated = now;

        let data = serde_json::to_vec_pretty(&*journal)
            .map_err(|err| Error::Journal(format!("failed to serialize journal: {err}")))?;

        // Write to a temp sibling, then rename over the journal path, so a
        // crash mid-write leaves the previous journal valid.
        let temp_path = {
            let mut os = self.path.clone().into_os_string();
            os.push(".tmp");
            PathBuf::from(os)
        };
        std::fs::write(&temp_path, &data)
            .map_err(|err| Error::Journal(format!("failed to write journal file: {err}")))?;
        std::fs::rename(&temp_path, &self.path)
            .map_err(|err| Error::Journal(format!("failed to rename journal file: {err}")))?;

        Ok(())
    }

    /// Remove the journal file, ignoring a missing file
    pub fn remove(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
