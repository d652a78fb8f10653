//! Core data types used throughout stampkeeper
//!
//! ## Overview
//!
//! - **Inventory State**: `FileRecord`, `Snapshot` - what a file looked like at scan time
//! - **Restore Results**: `RestorationRecord`, `RestoreFailure`, `DiffStats`
//! - **Runs**: `RunOptions`, `RunReport` - pipeline parameters and outcome
//! - **Progress**: `ProgressInfo`, `ProgressCallback`

use crate::error::{Result, StampError};
use serde::{Deserialize, Serialize};
use std::collections::btree_map;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Observed state of one file at snapshot time
///
/// Timestamps are whole seconds since the Unix epoch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct FileRecord {
    /// Hex-encoded SHA-256 of the file content
    pub fingerprint: String,
    /// Creation time
    pub created_at: u64,
    /// Last modification time
    pub modified_at: u64,
}

impl FileRecord {
    /// Create a new record
    pub fn new(fingerprint: impl Into<String>, created_at: u64, modified_at: u64) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            created_at,
            modified_at,
        }
    }
}

/// Full path → record inventory for one run
///
/// Keys are `/`-separated paths relative to the scanned root. Iteration is
/// ordered by path so that serialized snapshots are stable across runs no
/// matter in which order workers finished.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    files: BTreeMap<String, FileRecord>,
}

impl Snapshot {
    /// Create an empty snapshot
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record, replacing any previous record for `path`
    ///
    /// Records with an empty fingerprint are rejected.
    pub fn insert(&mut self, path: impl Into<String>, record: FileRecord) -> Result<Option<FileRecord>> {
        let path = path.into();
        if record.fingerprint.is_empty() {
            return Err(StampError::internal(format!(
                "empty fingerprint for {}",
                path
            )));
        }
        Ok(self.files.insert(path, record))
    }

    /// Look up a record by path
    pub fn get(&self, path: &str) -> Option<&FileRecord> {
        self.files.get(path)
    }

    /// Whether `path` is present
    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    /// Number of files
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether the snapshot holds no files
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Iterate over `(path, record)` pairs in path order
    pub fn iter(&self) -> btree_map::Iter<'_, String, FileRecord> {
        self.files.iter()
    }

    /// Iterate over paths in order
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }
}

impl<'a> IntoIterator for &'a Snapshot {
    type Item = (&'a String, &'a FileRecord);
    type IntoIter = btree_map::Iter<'a, String, FileRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.iter()
    }
}

impl IntoIterator for Snapshot {
    type Item = (String, FileRecord);
    type IntoIter = btree_map::IntoIter<String, FileRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.into_iter()
    }
}

/// A timestamp restoration applied to one file
///
/// Only produced when the fingerprint matched the prior snapshot, at least
/// one timestamp differed, and the write succeeded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RestorationRecord {
    /// Snapshot key of the file
    pub path: String,
    /// Whether the creation time was restored
    pub ctime_changed: bool,
    /// Creation time from the prior snapshot (the restored value)
    pub old_ctime: u64,
    /// Creation time found on disk before the restore
    pub new_ctime: u64,
    /// Whether the modification time was restored
    pub mtime_changed: bool,
    /// Modification time from the prior snapshot (the restored value)
    pub old_mtime: u64,
    /// Modification time found on disk before the restore
    pub new_mtime: u64,
}

/// A restoration that was attempted and refused
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RestoreFailure {
    /// Snapshot key of the file
    pub path: String,
    /// Error reported by the timestamp writer
    pub error: String,
}

/// Per-run classification of files against the prior snapshot
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiffStats {
    /// Same fingerprint and same timestamps
    pub unchanged: usize,
    /// Fingerprint differs from the prior snapshot
    pub content_changed: usize,
    /// Present now, absent from the prior snapshot
    pub new_files: usize,
    /// Present in the prior snapshot, gone now
    pub removed_files: usize,
    /// Same fingerprint, at least one timestamp differs
    pub timestamps_drifted: usize,
}

impl DiffStats {
    /// Total files classified from the current snapshot
    pub fn total_current(&self) -> usize {
        self.unchanged + self.content_changed + self.new_files + self.timestamps_drifted
    }
}

/// Parameters of one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOptions {
    /// Directory to inventory
    pub root: PathBuf,
    /// Snapshot file to read the prior state from and write the new one to
    pub output: PathBuf,
    /// Restore timestamps of files whose content did not change
    pub restore: bool,
    /// Worker threads (`None` = available parallelism)
    pub workers: Option<usize>,
    /// Extra glob patterns excluded from the inventory
    pub ignore_patterns: Vec<String>,
    /// Name of the system-wide instance lock
    pub lock_name: String,
}

/// Outcome of a pipeline run
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Where the snapshot was written
    pub snapshot_path: PathBuf,
    /// Files in the written snapshot
    pub file_count: usize,
    /// Files found by traversal but skipped because probing failed
    pub skipped: usize,
    /// Restorations applied (empty unless restore was requested)
    pub restorations: Vec<RestorationRecord>,
    /// Restorations that failed
    pub restore_failures: Vec<RestoreFailure>,
    /// Classification against the prior snapshot (default unless restoring)
    pub stats: DiffStats,
    /// Wall-clock time of the run
    pub duration: Duration,
}

/// Progress callback type
pub type ProgressCallback = Arc<dyn Fn(ProgressInfo) + Send + Sync>;

/// Progress information for long-running operations
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// Operation being performed
    pub operation: String,
    /// Current item being processed
    pub current_item: Option<String>,
    /// Items processed so far
    pub processed: usize,
    /// Total items to process (if known)
    pub total: Option<usize>,
}

impl ProgressInfo {
    /// Get progress as a percentage (0-100)
    pub fn percentage(&self) -> Option<f32> {
        match self.total {
            Some(total) if total > 0 => Some((self.processed as f32 / total as f32) * 100.0),
            _ => None,
        }
    }
}

/// Steps of a run, in the order they complete
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunStage {
    /// Every file was probed
    Inventory,
    /// The prior snapshot was read (restore runs only)
    LoadPrior,
    /// Drift was detected and restored (restore runs only)
    Restore,
    /// The new snapshot was written
    Save,
}

impl RunStage {
    /// Stages a run goes through
    pub fn sequence(restore: bool) -> &'static [RunStage] {
        if restore {
            &[RunStage::Inventory, RunStage::LoadPrior, RunStage::Restore, RunStage::Save]
        } else {
            &[RunStage::Inventory, RunStage::Save]
        }
    }

    /// Short label for status output
    pub fn label(&self) -> &'static str {
        match self {
            RunStage::Inventory => "extract infos for all files",
            RunStage::LoadPrior => "parsing json file",
            RunStage::Restore => "detect changed dates",
            RunStage::Save => "write to json file",
        }
    }
}

/// Called as each [`RunStage`] completes
pub type StageCallback = Arc<dyn Fn(RunStage) + Send + Sync>;
