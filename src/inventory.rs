//! Parallel inventory building
//!
//! [`InventoryBuilder`] probes a fixed list of files with a fixed pool of
//! workers and freezes the results into a [`Snapshot`].
//!
//! ## How it runs
//!
//! 1. The paths seed a [`WorkQueue`]
//! 2. A dedicated rayon pool with exactly `workers` threads is built
//! 3. One worker per thread loops `take_next` → probe → `publish`
//! 4. The pool scope joins every worker before the snapshot is frozen
//!
//! Per-file probe failures are logged and skipped. Only an empty result is
//! an error.
//!
//! ## Example
//!
//! ```rust,no_run
//! use stampkeeper::inventory::InventoryBuilder;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let root = PathBuf::from("./photos");
//! let paths = vec![root.join("a.jpg"), root.join("b.jpg")];
//!
//! let snapshot = InventoryBuilder::new(root).build(paths, Some(4))?;
//! println!("{} files inventoried", snapshot.len());
//! # Ok(())
//! # }
//! ```

use crate::error::{Result, StampError};
use crate::probe::{FileProbe, FsProbe};
use crate::queue::WorkQueue;
use crate::types::{ProgressCallback, ProgressInfo, Snapshot};
use crate::utils;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Result of one inventory build
#[derive(Debug, Clone)]
pub struct Inventory {
    /// Frozen snapshot
    pub snapshot: Snapshot,
    /// Paths handed to the builder
    pub attempted: usize,
    /// Paths skipped because probing failed
    pub skipped: usize,
    /// Worker threads actually used
    pub workers: usize,
    /// Time spent probing
    pub duration: Duration,
}

/// Builds snapshots by probing files on a worker pool
pub struct InventoryBuilder {
    root: PathBuf,
    probe: Arc<dyn FileProbe>,
    progress: Option<ProgressCallback>,
}

impl std::fmt::Debug for InventoryBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InventoryBuilder")
            .field("root", &self.root)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl InventoryBuilder {
    /// Create a builder whose snapshot keys are relative to `root`
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            probe: Arc::new(FsProbe::new()),
            progress: None,
        }
    }

    /// Use a different probe
    pub fn with_probe(mut self, probe: Arc<dyn FileProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Report progress after every processed file
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Root the snapshot keys are relative to
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Probe `paths` and return the snapshot
    ///
    /// `worker_count` of `None` means available parallelism. The effective
    /// count is capped at `paths.len()` and is at least 1.
    ///
    /// # Errors
    ///
    /// - [`StampError::EmptyInventory`] if no file could be probed
    /// - [`StampError::ThreadPool`] if the worker pool cannot be started
    pub fn build(&self, paths: Vec<PathBuf>, worker_count: Option<usize>) -> Result<Snapshot> {
        Ok(self.build_inventory(paths, worker_count)?.snapshot)
    }

    /// Like [`build`](Self::build) but also returns build statistics
    #[instrument(skip(self, paths), fields(root = %self.root.display(), files = paths.len()))]
    pub fn build_inventory(&self, paths: Vec<PathBuf>, worker_count: Option<usize>) -> Result<Inventory> {
        let start = Instant::now();
        let attempted = paths.len();

        if attempted == 0 {
            return Err(StampError::EmptyInventory {
                root: self.root.clone(),
                attempted,
            });
        }

        let workers = resolve_worker_count(worker_count, attempted);
        info!("Probing {} files with {} workers", attempted, workers);

        let queue = WorkQueue::new(paths);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("stampkeeper-probe-{}", i))
            .build()?;

        pool.scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|_| self.run_worker(&queue));
            }
        });

        let skipped = queue.failed();
        let snapshot = queue.into_snapshot();
        let duration = start.elapsed();

        if snapshot.is_empty() {
            return Err(StampError::EmptyInventory {
                root: self.root.clone(),
                attempted,
            });
        }

        debug!(
            "Inventoried {} files ({} skipped) in {:?}",
            snapshot.len(),
            skipped,
            duration
        );

        Ok(Inventory {
            snapshot,
            attempted,
            skipped,
            workers,
            duration,
        })
    }

    fn run_worker(&self, queue: &WorkQueue) {
        while let Some(path) = queue.take_next() {
            let (item, processed) = match self.key_for(&path) {
                Ok(key) => {
                    let processed = match self.probe.probe(&path) {
                        Ok(record) => match queue.publish(key.clone(), record) {
                            Ok(processed) => processed,
                            Err(e) => {
                                warn!("Dropping record for {}: {}", key, e);
                                queue.record_failure()
                            }
                        },
                        Err(e) => {
                            warn!("Skipping {:?}: {}", path, e);
                            queue.record_failure()
                        }
                    };
                    (key, processed)
                }
                Err(e) => {
                    warn!("Skipping {:?}: {}", path, e);
                    (path.display().to_string(), queue.record_failure())
                }
            };

            if let Some(ref callback) = self.progress {
                callback(ProgressInfo {
                    operation: "Probing files".to_string(),
                    current_item: Some(item),
                    processed,
                    total: Some(queue.total()),
                });
            }
        }
    }

    /// Snapshot key of `path`, or a probe failure if the path has no
    /// faithful key
    fn key_for(&self, path: &Path) -> Result<String> {
        let key_error = |reason: String| StampError::Probe {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, reason),
        };

        let relative = utils::make_relative(path, &self.root)
            .map_err(|e| key_error(format!("not under {:?}: {}", self.root, e)))?;
        if relative.to_str().is_none() {
            return Err(key_error("path is not valid UTF-8".to_string()));
        }
        Ok(utils::snapshot_key(&relative))
    }
}

/// Effective worker count for `files` paths
///
/// `requested` (or available parallelism when `None`), capped at `files`,
/// never below 1.
pub fn resolve_worker_count(requested: Option<usize>, files: usize) -> usize {
    requested
        .unwrap_or_else(num_cpus::get)
        .min(files)
        .max(1)
}
