//! Snapshot persistence
//!
//! Snapshots are stored as JSON, one file entry per line, sorted by path so
//! that consecutive snapshots of the same tree produce small version-control
//! diffs:
//!
//! ```json
//! {
//!   "files": [
//!     {"name":"docs/a.txt","sha":"2cf24dba5fb0a30e...","ctime":1700000000,"mtime":1700000000},
//!     {"name":"docs/b.txt","sha":"486ea46224d1bb4f...","ctime":1700000100,"mtime":1700000200}
//!   ]
//! }
//! ```
//!
//! Reading also accepts the older layout: a single JSON object keyed by path
//! whose values are `{"sha", "ctime", "mtime"}` objects. Those keys were the
//! scanned root joined with the file path, possibly with `\\` separators;
//! the `*_for_root` readers turn them back into root-relative keys.
//!
//! Writes go through a temporary file in the destination directory that is
//! renamed into place, so a failed save never leaves a truncated snapshot
//! behind.

use crate::error::{Result, StampError};
use crate::types::{FileRecord, Snapshot};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

#[derive(Debug, Serialize)]
struct EntryRef<'a> {
    name: &'a str,
    sha: &'a str,
    ctime: u64,
    mtime: u64,
}

#[derive(Debug, Deserialize)]
struct StoredEntry {
    name: String,
    sha: String,
    ctime: u64,
    mtime: u64,
}

#[derive(Debug, Deserialize)]
struct LegacyEntry {
    sha: String,
    ctime: u64,
    mtime: u64,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StoredSnapshot {
    Files { files: Vec<StoredEntry> },
    Legacy(BTreeMap<String, LegacyEntry>),
}

/// Reads and writes snapshot files
pub struct SnapshotStore;

impl SnapshotStore {
    /// Load a snapshot, treating any problem as "no prior snapshot"
    ///
    /// A missing file is expected on first use and is only logged at debug
    /// level. Unreadable or malformed files are logged as warnings.
    pub fn load(path: &Path) -> Snapshot {
        Self::load_inner(path, None)
    }

    /// Like [`load`](Self::load), rebasing legacy keys onto `root`
    pub fn load_for_root(path: &Path, root: &Path) -> Snapshot {
        Self::load_inner(path, Some(root))
    }

    fn load_inner(path: &Path, root: Option<&Path>) -> Snapshot {
        if !path.exists() {
            debug!("No prior snapshot at {:?}", path);
            return Snapshot::new();
        }

        let loaded = fs::read_to_string(path)
            .map_err(|e| StampError::SnapshotParse(format!("{:?}: {}", path, e)))
            .and_then(|content| Self::parse_inner(&content, root));
        match loaded {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Ignoring prior snapshot {:?}: {}", path, e);
                Snapshot::new()
            }
        }
    }

    /// Load a snapshot, reporting why it could not be read
    ///
    /// # Errors
    ///
    /// - [`StampError::SnapshotParse`] if the file is unreadable, is not
    ///   valid JSON in either layout, or holds an entry without a fingerprint
    pub fn try_load(path: &Path) -> Result<Snapshot> {
        let content = fs::read_to_string(path)
            .map_err(|e| StampError::SnapshotParse(format!("{:?}: {}", path, e)))?;
        Self::parse(&content)
    }

    /// Parse snapshot JSON
    pub fn parse(content: &str) -> Result<Snapshot> {
        Self::parse_inner(content, None)
    }

    /// Parse snapshot JSON, rebasing legacy absolute keys onto `root`
    pub fn parse_for_root(content: &str, root: &Path) -> Result<Snapshot> {
        Self::parse_inner(content, Some(root))
    }

    fn parse_inner(content: &str, root: Option<&Path>) -> Result<Snapshot> {
        let stored: StoredSnapshot =
            serde_json::from_str(content).map_err(|e| StampError::SnapshotParse(e.to_string()))?;

        let mut snapshot = Snapshot::new();
        match stored {
            StoredSnapshot::Files { files } => {
                for entry in files {
                    insert_entry(&mut snapshot, entry.name, entry.sha, entry.ctime, entry.mtime)?;
                }
            }
            StoredSnapshot::Legacy(map) => {
                let prefixes = root.map(root_prefixes).unwrap_or_default();
                for (name, entry) in map {
                    let key = legacy_key(&name, &prefixes);
                    insert_entry(&mut snapshot, key, entry.sha, entry.ctime, entry.mtime)?;
                }
            }
        }
        Ok(snapshot)
    }

    /// Serialize a snapshot into its on-disk text
    pub fn render(snapshot: &Snapshot) -> Result<String> {
        let mut out = String::from("{\n  \"files\": [");
        for (i, (name, record)) in snapshot.iter().enumerate() {
            let line = serde_json::to_string(&EntryRef {
                name,
                sha: &record.fingerprint,
                ctime: record.created_at,
                mtime: record.modified_at,
            })?;
            out.push_str(if i == 0 { "\n    " } else { ",\n    " });
            out.push_str(&line);
        }
        if !snapshot.is_empty() {
            out.push_str("\n  ");
        }
        out.push_str("]\n}\n");
        Ok(out)
    }

    /// Write `snapshot` to `path` atomically
    ///
    /// # Errors
    ///
    /// - [`StampError::WriteFailed`] if the destination cannot be written
    pub fn save(path: &Path, snapshot: &Snapshot) -> Result<()> {
        let content = Self::render(snapshot)?;
        let write_failed = |source: std::io::Error| StampError::WriteFailed {
            path: path.to_path_buf(),
            source,
        };

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut temp = NamedTempFile::new_in(dir).map_err(write_failed)?;
        {
            let mut writer = BufWriter::new(temp.as_file_mut());
            writer.write_all(content.as_bytes()).map_err(write_failed)?;
            writer.flush().map_err(write_failed)?;
        }
        temp.as_file().sync_all().map_err(write_failed)?;
        temp.persist(path).map_err(|e| write_failed(e.error))?;

        info!("Wrote snapshot of {} files to {:?}", snapshot.len(), path);
        Ok(())
    }
}

/// Spellings of `root` a legacy key may start with, `/`-separated
fn root_prefixes(root: &Path) -> Vec<String> {
    let mut prefixes = vec![normalize_separators(&root.to_string_lossy())];
    if let Ok(canonical) = root.canonicalize() {
        prefixes.push(normalize_separators(&canonical.to_string_lossy()));
    }
    prefixes
}

fn normalize_separators(path: &str) -> String {
    path.replace('\\', "/").trim_end_matches('/').to_string()
}

/// Root-relative key for a legacy entry, or the entry unchanged when it does
/// not live under any known root spelling
fn legacy_key(name: &str, prefixes: &[String]) -> String {
    let normalized = normalize_separators(name);
    for prefix in prefixes {
        if let Some(rest) = normalized.strip_prefix(prefix.as_str()) {
            if rest.starts_with('/') {
                return rest.trim_start_matches('/').to_string();
            }
        }
    }
    normalized
}

fn insert_entry(snapshot: &mut Snapshot, name: String, sha: String, ctime: u64, mtime: u64) -> Result<()> {
    if sha.is_empty() {
        return Err(StampError::SnapshotParse(format!("entry {:?} has no sha", name)));
    }
    snapshot.insert(name, FileRecord::new(sha, ctime, mtime))?;
    Ok(())
}
