//! Snapshot comparison and timestamp restoration
//!
//! [`diff_and_restore`] decides, file by file, whether a timestamp change is
//! real or spurious:
//!
//! 1. **New**: path absent from the prior snapshot, kept as probed
//! 2. **Content changed**: fingerprint differs, new timestamps are kept
//! 3. **Drifted**: fingerprint equal but creation and/or modification time
//!    differs, prior values are written back through a [`TimestampWriter`]
//! 4. **Removed**: only in the prior snapshot, dropped without a tombstone
//!
//! The two timestamps are evaluated independently. A writer failure keeps the
//! probed values, is logged, and is reported as a [`RestoreFailure`] rather
//! than a [`RestorationRecord`]. When the writer cannot set creation times, a
//! creation-time difference is reported as a [`RestoreFailure`] while a
//! modification-time difference on the same file is still restored.
//!
//! ## Example
//!
//! ```rust,no_run
//! use stampkeeper::restore::{diff_and_restore, FsTimestampWriter};
//! use stampkeeper::store::SnapshotStore;
//! use stampkeeper::Snapshot;
//! use std::path::Path;
//!
//! # fn example(current: Snapshot) {
//! let prior = SnapshotStore::load(Path::new("files.json"));
//! let writer = FsTimestampWriter::new("./photos");
//! let outcome = diff_and_restore(&current, &prior, &writer);
//! println!("{} files restored", outcome.restorations.len());
//! # }
//! ```

use crate::error::{Result, StampError};
use crate::types::{
    DiffStats, FileRecord, ProgressCallback, ProgressInfo, RestorationRecord, RestoreFailure, Snapshot,
};
use crate::utils;
use filetime::FileTime;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

/// Writes timestamps back onto files
pub trait TimestampWriter {
    /// Set the timestamps of the file behind snapshot key `path`
    ///
    /// A value of `0` leaves that timestamp as it is.
    ///
    /// # Errors
    ///
    /// Returns [`StampError::Restore`] if the file is missing or the OS
    /// refuses the change.
    fn set_timestamps(&self, path: &str, created_at: u64, modified_at: u64) -> Result<()>;

    /// Whether this writer can change creation times
    ///
    /// When `false`, creation-time drift is reported as a failure and only
    /// modification times are restored.
    fn supports_created(&self) -> bool {
        true
    }
}

/// Timestamp writer for the local filesystem
///
/// Modification times are written with `filetime`. Creation times can only
/// be written on Windows.
#[derive(Debug, Clone)]
pub struct FsTimestampWriter {
    root: PathBuf,
}

impl FsTimestampWriter {
    /// Create a writer resolving snapshot keys under `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl TimestampWriter for FsTimestampWriter {
    fn set_timestamps(&self, path: &str, created_at: u64, modified_at: u64) -> Result<()> {
        let full_path = utils::key_to_path(&self.root, path);
        if !full_path.is_file() {
            return Err(StampError::restore(full_path, "file not found"));
        }

        if created_at != 0 {
            if !self.supports_created() {
                return Err(StampError::restore(
                    full_path,
                    "creation time cannot be set on this platform",
                ));
            }
            set_created(&full_path, created_at)?;
        }

        if modified_at != 0 {
            let mtime = FileTime::from_unix_time(to_unix(modified_at), 0);
            filetime::set_file_mtime(&full_path, mtime)
                .map_err(|e| StampError::restore(&full_path, e.to_string()))?;
        }

        Ok(())
    }

    fn supports_created(&self) -> bool {
        cfg!(windows)
    }
}

fn to_unix(secs: u64) -> i64 {
    i64::try_from(secs).unwrap_or(i64::MAX)
}

#[cfg(windows)]
fn set_created(path: &Path, created_at: u64) -> Result<()> {
    use std::fs::{FileTimes, OpenOptions};
    use std::os::windows::fs::FileTimesExt;
    use std::time::{Duration, UNIX_EPOCH};

    let file = OpenOptions::new()
        .write(true)
        .open(path)
        .map_err(|e| StampError::restore(path, e.to_string()))?;
    let times = FileTimes::new().set_created(UNIX_EPOCH + Duration::from_secs(created_at));
    file.set_times(times)
        .map_err(|e| StampError::restore(path, e.to_string()))
}

#[cfg(not(windows))]
fn set_created(path: &Path, _created_at: u64) -> Result<()> {
    Err(StampError::restore(
        path,
        "creation time cannot be set on this platform",
    ))
}

/// Result of comparing and restoring one snapshot against another
#[derive(Debug, Clone, Default)]
pub struct RestoreOutcome {
    /// Current snapshot with restored timestamps applied
    pub snapshot: Snapshot,
    /// Restorations that succeeded
    pub restorations: Vec<RestorationRecord>,
    /// Restorations the writer refused
    pub failures: Vec<RestoreFailure>,
    /// Per-file classification
    pub stats: DiffStats,
}

/// Compare `current` against `prior` and restore spurious timestamp drift
///
/// Neither input is modified. The returned snapshot is `current` with the
/// prior timestamps carried over for every successfully restored file.
pub fn diff_and_restore(
    current: &Snapshot,
    prior: &Snapshot,
    writer: &dyn TimestampWriter,
) -> RestoreOutcome {
    diff_and_restore_with_progress(current, prior, writer, None)
}

/// Like [`diff_and_restore`], reporting progress after every current file
#[instrument(skip_all, fields(current = current.len(), prior = prior.len()))]
pub fn diff_and_restore_with_progress(
    current: &Snapshot,
    prior: &Snapshot,
    writer: &dyn TimestampWriter,
    progress: Option<&ProgressCallback>,
) -> RestoreOutcome {
    let can_set_created = writer.supports_created();
    let mut outcome = RestoreOutcome {
        snapshot: current.clone(),
        ..Default::default()
    };

    for (index, (path, cur)) in current.iter().enumerate() {
        compare_one(path, cur, prior, writer, can_set_created, &mut outcome);

        if let Some(callback) = progress {
            callback(ProgressInfo {
                operation: "Restoring timestamps".to_string(),
                current_item: Some(path.clone()),
                processed: index + 1,
                total: Some(current.len()),
            });
        }
    }

    outcome.stats.removed_files = prior.paths().filter(|p| !current.contains(p)).count();

    info!(
        "Restored {} files ({} failed, {} content changes, {} new, {} removed)",
        outcome.restorations.len(),
        outcome.failures.len(),
        outcome.stats.content_changed,
        outcome.stats.new_files,
        outcome.stats.removed_files
    );

    outcome
}

fn compare_one(
    path: &str,
    cur: &FileRecord,
    prior: &Snapshot,
    writer: &dyn TimestampWriter,
    can_set_created: bool,
    outcome: &mut RestoreOutcome,
) {
    let Some(old) = prior.get(path) else {
        outcome.stats.new_files += 1;
        return;
    };

    if cur.fingerprint != old.fingerprint {
        outcome.stats.content_changed += 1;
        return;
    }

    let ctime_drifted = cur.created_at != old.created_at;
    let mtime_drifted = cur.modified_at != old.modified_at;

    if !ctime_drifted && !mtime_drifted {
        outcome.stats.unchanged += 1;
        return;
    }
    outcome.stats.timestamps_drifted += 1;

    let ctime_changed = ctime_drifted && can_set_created;
    let mtime_changed = mtime_drifted;

    if ctime_drifted && !can_set_created {
        warn!("Cannot restore creation time of {} on this platform", path);
        outcome.failures.push(RestoreFailure {
            path: path.to_string(),
            error: format!(
                "creation time cannot be restored on this platform ({} -> {})",
                cur.created_at, old.created_at
            ),
        });
    }

    if !ctime_changed && !mtime_changed {
        return;
    }

    let created = if ctime_changed { old.created_at } else { 0 };
    let modified = if mtime_changed { old.modified_at } else { 0 };

    match writer.set_timestamps(path, created, modified) {
        Ok(()) => {
            let mut restored = cur.clone();
            if ctime_changed {
                restored.created_at = old.created_at;
            }
            if mtime_changed {
                restored.modified_at = old.modified_at;
            }
            // Fingerprint came from `current`, so it is non-empty.
            if let Err(e) = outcome.snapshot.insert(path.to_string(), restored) {
                warn!("Could not record restored timestamps for {}: {}", path, e);
            }

            debug!(
                "Restored {} (ctime {} -> {}, mtime {} -> {})",
                path, cur.created_at, old.created_at, cur.modified_at, old.modified_at
            );

            outcome.restorations.push(RestorationRecord {
                path: path.to_string(),
                ctime_changed,
                old_ctime: old.created_at,
                new_ctime: cur.created_at,
                mtime_changed,
                old_mtime: old.modified_at,
                new_mtime: cur.modified_at,
            });
        }
        Err(e) => {
            warn!("Failed to restore timestamps of {}: {}", path, e);
            outcome.failures.push(RestoreFailure {
                path: path.to_string(),
                error: e.to_string(),
            });
        }
    }
}
