//! Per-file fingerprint and timestamp extraction
//!
//! A [`FileProbe`] turns a path into a [`FileRecord`]. The inventory builder
//! calls it concurrently from every worker, so implementations must be
//! `Send + Sync` and free of shared mutable state.

use crate::error::{Result, StampError};
use crate::types::FileRecord;
use crate::utils;
use std::fs;
use std::path::Path;
use tracing::trace;

/// Source of file fingerprints and timestamps
pub trait FileProbe: Send + Sync {
    /// Probe one file
    ///
    /// # Errors
    ///
    /// Returns [`StampError::Probe`] when the file cannot be stat'ed or read.
    /// Callers treat this as a per-file failure.
    fn probe(&self, path: &Path) -> Result<FileRecord>;
}

/// Probe backed by the local filesystem
///
/// Fingerprints are SHA-256 of the whole file content.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsProbe;

impl FsProbe {
    /// Create a filesystem probe
    pub fn new() -> Self {
        Self
    }
}

impl FileProbe for FsProbe {
    fn probe(&self, path: &Path) -> Result<FileRecord> {
        let metadata = fs::metadata(path).map_err(|source| StampError::Probe {
            path: path.to_path_buf(),
            source,
        })?;

        if !metadata.is_file() {
            return Err(StampError::Probe {
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a regular file"),
            });
        }

        let (created_at, modified_at) =
            utils::file_timestamps(&metadata).map_err(|e| into_probe_error(path, e))?;
        let fingerprint = utils::hash_file_content(path).map_err(|e| into_probe_error(path, e))?;

        trace!("Probed {:?}: {}", path, fingerprint);

        Ok(FileRecord {
            fingerprint,
            created_at,
            modified_at,
        })
    }
}

fn into_probe_error(path: &Path, err: StampError) -> StampError {
    match err {
        StampError::Io(source) => StampError::Probe {
            path: path.to_path_buf(),
            source,
        },
        other => other,
    }
}
