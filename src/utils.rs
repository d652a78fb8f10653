//! Utility functions for stampkeeper
//!
//! File hashing, metadata timestamps, snapshot key normalization and
//! timestamp formatting shared by the probe, the restore engine and the CLI.
//!
//! All functions are thread-safe and are called concurrently by inventory
//! workers without synchronization.

use crate::error::{Result, StampError};
use chrono::{Local, TimeZone};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Hash a file's content using SHA-256
///
/// Reads the file through an 8KB buffer so memory use does not depend on
/// file size.
///
/// # Returns
///
/// Returns the SHA-256 hash as a 64-character lowercase hexadecimal string.
///
/// # Errors
///
/// - [`StampError::Io`] if the file cannot be opened or read
pub fn hash_file_content(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 8192]; // 8KB buffer

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Hash arbitrary data using SHA-256
pub fn hash_data(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Convert a `SystemTime` into whole seconds since the Unix epoch
///
/// Times before the epoch clamp to 0.
pub fn epoch_seconds(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Creation and modification times of a file, in epoch seconds
///
/// Creation time comes from the filesystem birth time where the platform
/// reports one. Otherwise the inode change time is used on Unix and the
/// modification time elsewhere.
pub fn file_timestamps(metadata: &fs::Metadata) -> Result<(u64, u64)> {
    let modified = epoch_seconds(metadata.modified()?);
    let created = match metadata.created() {
        Ok(created) => epoch_seconds(created),
        Err(_) => fallback_created(metadata, modified),
    };
    Ok((created, modified))
}

#[cfg(unix)]
fn fallback_created(metadata: &fs::Metadata, _modified: u64) -> u64 {
    use std::os::unix::fs::MetadataExt;
    u64::try_from(metadata.ctime()).unwrap_or(0)
}

#[cfg(not(unix))]
fn fallback_created(_metadata: &fs::Metadata, modified: u64) -> u64 {
    modified
}

/// Make a path relative to a base path
///
/// Tries a lexical strip first so symlinked roots keep their spelling, then
/// falls back to comparing canonical paths.
///
/// # Errors
///
/// - [`StampError::Internal`] if the path is not under the base path
/// - [`StampError::Io`] if canonicalization fails (fallback case only)
pub fn make_relative(path: &Path, base: &Path) -> Result<PathBuf> {
    if let Ok(relative) = path.strip_prefix(base) {
        return Ok(relative.to_path_buf());
    }

    let path_canon = path.canonicalize()?;
    let base_canon = base.canonicalize()?;

    path_canon
        .strip_prefix(&base_canon)
        .map(|p| p.to_path_buf())
        .map_err(|_| {
            StampError::internal(format!(
                "Path {:?} is not relative to {:?}",
                path_canon, base_canon
            ))
        })
}

/// Snapshot key for a path relative to the root
///
/// Components are joined with `/` on every platform so a snapshot written on
/// Windows diffs cleanly against one written elsewhere.
pub fn snapshot_key(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Resolve a snapshot key back to a path under `root`
pub fn key_to_path(root: &Path, key: &str) -> PathBuf {
    key.split('/')
        .filter(|part| !part.is_empty())
        .fold(root.to_path_buf(), |acc, part| acc.join(part))
}

/// Format epoch seconds as local `YYYY-MM-DD HH:MM:SS`
pub fn format_timestamp(secs: u64) -> String {
    i64::try_from(secs)
        .ok()
        .and_then(|s| Local.timestamp_opt(s, 0).single())
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| secs.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_hash_functions() {
        let data = b"Hello, World!";
        let hash1 = hash_data(data);
        let hash2 = hash_data(data);
        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_hash_file_matches_hash_data() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("data.bin");
        let content: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
        fs::write(&file, &content).unwrap();

        assert_eq!(hash_file_content(&file).unwrap(), hash_data(&content));
    }

    #[test]
    fn test_epoch_seconds() {
        let t = UNIX_EPOCH + Duration::from_millis(1_700_000_000_999);
        assert_eq!(epoch_seconds(t), 1_700_000_000);
        assert_eq!(epoch_seconds(UNIX_EPOCH - Duration::from_secs(5)), 0);
    }

    #[test]
    fn test_make_relative() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path();
        let subdir = base.join("subdir");
        let file = subdir.join("file.txt");

        fs::create_dir_all(&subdir).unwrap();
        fs::write(&file, b"test").unwrap();

        let relative = make_relative(&file, base).unwrap();
        assert_eq!(relative, PathBuf::from("subdir/file.txt"));
    }

    #[test]
    fn test_snapshot_key_roundtrip() {
        let key = snapshot_key(&Path::new("sub").join("dir").join("file.txt"));
        assert_eq!(key, "sub/dir/file.txt");

        let root = Path::new("root");
        assert_eq!(
            key_to_path(root, &key),
            root.join("sub").join("dir").join("file.txt")
        );
    }

    #[test]
    fn test_format_timestamp_shape() {
        let formatted = format_timestamp(1_600_000_000);
        assert_eq!(formatted.len(), "2020-09-13 12:26:40".len());
        assert_eq!(&formatted[4..5], "-");
    }
}
