//! Error types for stampkeeper
//!
//! Errors fall into two groups. File-level failures (a probe that cannot read
//! a file, a timestamp write the OS refuses) are recovered where they happen
//! and only ever show up in logs and run reports. Directory- and store-level
//! failures abort the run and surface to the caller as a single message.

use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in the stampkeeper library
pub type Result<T> = std::result::Result<T, StampError>;

/// Main error type for all stampkeeper operations
#[derive(Debug, Error)]
pub enum StampError {
    /// I/O errors during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors during JSON serialization/deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Root directory is missing or is not a directory
    #[error("The directory {path:?} doesn't exist or is not a directory")]
    InvalidRoot {
        /// Path given as the inventory root
        path: PathBuf,
    },

    /// A single file could not be stat'ed or hashed
    #[error("Failed to probe {path:?}: {source}")]
    Probe {
        /// File that failed
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Every probe failed, or there was nothing to probe
    #[error("Inventory of {root:?} is empty ({attempted} files attempted)")]
    EmptyInventory {
        /// Root that was scanned
        root: PathBuf,
        /// Number of paths handed to the builder
        attempted: usize,
    },

    /// A stored snapshot could not be read or parsed
    #[error("Invalid snapshot: {0}")]
    SnapshotParse(String),

    /// The output snapshot could not be written
    #[error("Can't write file {path:?}: {source}")]
    WriteFailed {
        /// Destination snapshot path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Timestamps could not be written back to a file
    #[error("Restore failed for {path:?}: {message}")]
    Restore {
        /// File whose timestamps were being restored
        path: PathBuf,
        /// What went wrong
        message: String,
    },

    /// The cross-process instance lock could not be taken
    #[error("Failed to acquire instance lock '{name}': {source}")]
    Lock {
        /// Lock name
        name: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Walk directory error from the ignore crate
    #[error("Walk error: {0}")]
    Walk(#[from] ignore::Error),

    /// Thread pool error
    #[error("Thread pool error: {0}")]
    ThreadPool(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<rayon::ThreadPoolBuildError> for StampError {
    fn from(err: rayon::ThreadPoolBuildError) -> Self {
        StampError::ThreadPool(err.to_string())
    }
}

impl StampError {
    /// Create an internal error with a custom message
    pub fn internal(msg: impl Into<String>) -> Self {
        StampError::Internal(msg.into())
    }

    /// Create a restore error for `path`
    pub fn restore(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        StampError::Restore {
            path: path.into(),
            message: msg.into(),
        }
    }

    /// Check if this error is recovered locally instead of aborting a run
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            StampError::Probe { .. } | StampError::Restore { .. } | StampError::SnapshotParse(_)
        )
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            StampError::InvalidRoot { path } => {
                format!("the directory: {:?} doesn't exist", path)
            }
            StampError::EmptyInventory { root, .. } => {
                format!(
                    "no readable files found under {:?}. Check that the directory is not empty \
                     and that its files are accessible.",
                    root
                )
            }
            StampError::Lock { name, .. } => {
                format!(
                    "could not take the '{}' instance lock. Check permissions on the temp directory.",
                    name
                )
            }
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StampError::SnapshotParse("missing files".to_string());
        assert_eq!(err.to_string(), "Invalid snapshot: missing files");
    }

    #[test]
    fn test_error_recoverable() {
        assert!(StampError::restore("a.txt", "denied").is_recoverable());
        assert!(StampError::SnapshotParse("bad".to_string()).is_recoverable());
        assert!(!StampError::EmptyInventory {
            root: PathBuf::from("/tmp/x"),
            attempted: 0,
        }
        .is_recoverable());
        assert!(!StampError::InvalidRoot {
            path: PathBuf::from("/nope"),
        }
        .is_recoverable());
    }

    #[test]
    fn test_user_message_for_invalid_root() {
        let err = StampError::InvalidRoot {
            path: PathBuf::from("missing"),
        };
        assert!(err.user_message().contains("doesn't exist"));
    }
}
