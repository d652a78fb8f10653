//! # stampkeeper - keep file timestamps honest
//!
//! Builds a point-in-time inventory of every regular file under a directory
//! (content fingerprint plus creation and modification times) and uses it to
//! undo *spurious* timestamp drift: timestamps that changed while the content
//! did not, as happens after copies, backup restores or sync tools.
//!
//! ## Overview
//!
//! Each run:
//! - walks the directory, skipping hidden files and directories
//! - hashes every file in parallel on a fixed pool of workers
//! - optionally compares the result with the previous snapshot and writes the
//!   old timestamps back onto files whose content is unchanged
//! - saves the new snapshot as line-per-file JSON
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use stampkeeper::StampKeeperBuilder;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // First run records the current state
//! StampKeeperBuilder::new("./photos", "./photos.json").build()?.run()?;
//!
//! // Later runs put back timestamps that drifted without a content change
//! let report = StampKeeperBuilder::new("./photos", "./photos.json")
//!     .restore(true)
//!     .build()?
//!     .run()?;
//!
//! for r in &report.restorations {
//!     println!("restored {}", r.path);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Using the pieces directly
//!
//! ```rust,no_run
//! use stampkeeper::inventory::InventoryBuilder;
//! use stampkeeper::restore::{diff_and_restore, FsTimestampWriter};
//! use stampkeeper::store::SnapshotStore;
//! use stampkeeper::traversal::{collect_files, TraversalOptions};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let root = Path::new("./photos");
//! let files = collect_files(root, &TraversalOptions::default())?;
//! let current = InventoryBuilder::new(root.to_path_buf()).build(files, None)?;
//!
//! let prior = SnapshotStore::load(Path::new("photos.json"));
//! let outcome = diff_and_restore(&current, &prior, &FsTimestampWriter::new(root));
//! SnapshotStore::save(Path::new("photos.json"), &outcome.snapshot)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! All operations return `Result<T, StampError>`. Per-file problems (a file
//! that cannot be read, a timestamp the OS refuses to set) are logged and
//! skipped; an invalid root, an empty inventory, a lock failure or a failed
//! snapshot write abort the run.
//!
//! ## Module Organization
//!
//! - [`inventory`]: parallel snapshot building
//! - [`queue`]: work queue shared by inventory workers
//! - [`probe`]: per-file fingerprint and timestamps
//! - [`restore`]: snapshot comparison and timestamp restoration
//! - [`store`]: snapshot file format
//! - [`traversal`]: directory walking
//! - [`lock`]: system-wide instance lock
//! - [`pipeline`]: the end-to-end run
//! - [`types`]: shared data types
//! - [`error`]: error types

// Public API modules
pub mod error;
pub mod inventory;
pub mod lock;
pub mod pipeline;
pub mod probe;
pub mod queue;
pub mod restore;
pub mod store;
pub mod traversal;
pub mod types;
pub mod utils;

// Re-export main types for convenience
pub use error::{Result, StampError};
pub use inventory::InventoryBuilder;
pub use lock::InstanceLock;
pub use pipeline::{StampKeeper, StampKeeperBuilder};
pub use probe::{FileProbe, FsProbe};
pub use restore::{
    diff_and_restore, diff_and_restore_with_progress, FsTimestampWriter, RestoreOutcome, TimestampWriter,
};
pub use store::SnapshotStore;
pub use types::*;
