//! End-to-end run: traverse, inventory, restore, persist
//!
//! [`StampKeeper`] wires the pieces together in a fixed order:
//!
//! 1. Validate the root directory (nothing else happens if it is invalid)
//! 2. Take the system-wide [`InstanceLock`]
//! 3. Collect files with [`traversal::collect_files`]
//! 4. Build the snapshot with [`InventoryBuilder`]
//! 5. If restoring, load the prior snapshot and run [`diff_and_restore_with_progress`]
//! 6. Save the (possibly restored) snapshot with [`SnapshotStore`]
//!
//! The lock is held from step 2 until the run returns, whichever way it
//! returns. An optional stage callback hears about each [`RunStage`] as it
//! completes.

use crate::error::{Result, StampError};
use crate::inventory::InventoryBuilder;
use crate::lock::{InstanceLock, DEFAULT_LOCK_NAME};
use crate::probe::{FileProbe, FsProbe};
use crate::restore::{diff_and_restore_with_progress, FsTimestampWriter, TimestampWriter};
use crate::store::SnapshotStore;
use crate::traversal::{self, TraversalOptions};
use crate::types::{DiffStats, ProgressCallback, RunOptions, RunReport, RunStage, StageCallback};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument};

/// Configured inventory run
pub struct StampKeeper {
    options: RunOptions,
    probe: Arc<dyn FileProbe>,
    writer: Box<dyn TimestampWriter + Send + Sync>,
    progress: Option<ProgressCallback>,
    on_stage: Option<StageCallback>,
    lock_path: Option<PathBuf>,
}

impl std::fmt::Debug for StampKeeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StampKeeper")
            .field("options", &self.options)
            .field("lock_path", &self.lock_path)
            .finish()
    }
}

impl StampKeeper {
    /// Run options
    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    fn stage_done(&self, stage: RunStage) {
        info!("Stage complete: {}", stage.label());
        if let Some(ref on_stage) = self.on_stage {
            on_stage(stage);
        }
    }

    /// Execute the run
    ///
    /// # Errors
    ///
    /// - [`StampError::InvalidRoot`] if the root is not a directory
    /// - [`StampError::Lock`] if the instance lock cannot be taken
    /// - [`StampError::EmptyInventory`] if no file could be inventoried; no
    ///   snapshot is written in that case
    /// - [`StampError::WriteFailed`] if the snapshot cannot be saved
    #[instrument(skip(self), fields(root = %self.options.root.display()))]
    pub fn run(&self) -> Result<RunReport> {
        let start = Instant::now();
        let root = &self.options.root;

        if !root.is_dir() {
            return Err(StampError::InvalidRoot { path: root.clone() });
        }

        let lock_path = self
            .lock_path
            .clone()
            .unwrap_or_else(|| InstanceLock::lock_path(&self.options.lock_name));
        let _lock = InstanceLock::acquire_at(&self.options.lock_name, &lock_path)?;

        let files = traversal::collect_files(
            root,
            &TraversalOptions {
                ignore_patterns: self.options.ignore_patterns.clone(),
                exclude: vec![self.options.output.clone(), lock_path],
                threads: self.options.workers.unwrap_or(0),
            },
        )?;
        info!("Found {} files under {:?}", files.len(), root);

        let mut builder = InventoryBuilder::new(root.clone()).with_probe(Arc::clone(&self.probe));
        if let Some(ref progress) = self.progress {
            builder = builder.with_progress(Arc::clone(progress));
        }
        let inventory = builder.build_inventory(files, self.options.workers)?;
        self.stage_done(RunStage::Inventory);

        let (snapshot, restorations, restore_failures, stats) = if self.options.restore {
            let prior = SnapshotStore::load_for_root(&self.options.output, root);
            info!("Loaded prior snapshot with {} files", prior.len());
            self.stage_done(RunStage::LoadPrior);

            let outcome = diff_and_restore_with_progress(
                &inventory.snapshot,
                &prior,
                self.writer.as_ref(),
                self.progress.as_ref(),
            );
            self.stage_done(RunStage::Restore);
            (outcome.snapshot, outcome.restorations, outcome.failures, outcome.stats)
        } else {
            (inventory.snapshot, Vec::new(), Vec::new(), DiffStats::default())
        };

        SnapshotStore::save(&self.options.output, &snapshot)?;
        self.stage_done(RunStage::Save);

        Ok(RunReport {
            snapshot_path: self.options.output.clone(),
            file_count: snapshot.len(),
            skipped: inventory.skipped,
            restorations,
            restore_failures,
            stats,
            duration: start.elapsed(),
        })
    }
}

/// Builder for [`StampKeeper`]
///
/// ```rust,no_run
/// use stampkeeper::StampKeeperBuilder;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let report = StampKeeperBuilder::new("./photos", "./photos.json")
///     .restore(true)
///     .workers(4)
///     .ignore_patterns(vec!["*.tmp".to_string()])
///     .build()?
///     .run()?;
/// println!("{} files, {} restored", report.file_count, report.restorations.len());
/// # Ok(())
/// # }
/// ```
pub struct StampKeeperBuilder {
    root: PathBuf,
    output: PathBuf,
    restore: bool,
    workers: Option<usize>,
    ignore_patterns: Vec<String>,
    lock_name: String,
    lock_path: Option<PathBuf>,
    probe: Option<Arc<dyn FileProbe>>,
    writer: Option<Box<dyn TimestampWriter + Send + Sync>>,
    progress: Option<ProgressCallback>,
    on_stage: Option<StageCallback>,
}

impl StampKeeperBuilder {
    /// Start a builder for inventorying `root` into the snapshot file `output`
    pub fn new(root: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            output: output.into(),
            restore: false,
            workers: None,
            ignore_patterns: Vec::new(),
            lock_name: DEFAULT_LOCK_NAME.to_string(),
            lock_path: None,
            probe: None,
            writer: None,
            progress: None,
            on_stage: None,
        }
    }

    /// Start from serialized run options
    pub fn from_options(options: RunOptions) -> Self {
        let mut builder = Self::new(options.root, options.output)
            .restore(options.restore)
            .ignore_patterns(options.ignore_patterns)
            .lock_name(options.lock_name);
        builder.workers = options.workers;
        builder
    }

    /// Restore timestamps of files whose content did not change
    pub fn restore(mut self, restore: bool) -> Self {
        self.restore = restore;
        self
    }

    /// Number of probe workers (default: available parallelism)
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    /// Extra glob patterns to exclude (gitignore syntax, no `!` negation)
    pub fn ignore_patterns(mut self, patterns: Vec<String>) -> Self {
        self.ignore_patterns = patterns;
        self
    }

    /// Name of the system-wide instance lock
    pub fn lock_name(mut self, name: impl Into<String>) -> Self {
        self.lock_name = name.into();
        self
    }

    /// Back the instance lock with an explicit file instead of the temp directory
    pub fn lock_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.lock_path = Some(path.into());
        self
    }

    /// Replace the filesystem probe
    pub fn probe(mut self, probe: Arc<dyn FileProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Replace the filesystem timestamp writer
    pub fn timestamp_writer(mut self, writer: Box<dyn TimestampWriter + Send + Sync>) -> Self {
        self.writer = Some(writer);
        self
    }

    /// Receive progress while files are probed
    pub fn progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Hear about each stage as it completes
    pub fn on_stage(mut self, callback: StageCallback) -> Self {
        self.on_stage = Some(callback);
        self
    }

    /// Validate the configuration and build the run
    ///
    /// # Errors
    ///
    /// - [`StampError::InvalidConfiguration`] for a zero worker count, an
    ///   empty lock name, an output path without a file name or an ignore
    ///   pattern starting with `!`
    pub fn build(self) -> Result<StampKeeper> {
        if self.workers == Some(0) {
            return Err(StampError::InvalidConfiguration(
                "worker count must be at least 1".to_string(),
            ));
        }
        if self.lock_name.trim().is_empty() {
            return Err(StampError::InvalidConfiguration(
                "lock name must not be empty".to_string(),
            ));
        }
        if let Some(pattern) = self.ignore_patterns.iter().find(|p| p.starts_with('!')) {
            return Err(StampError::InvalidConfiguration(format!(
                "ignore pattern '{}' cannot start with '!'",
                pattern
            )));
        }
        if self.output.file_name().is_none() {
            return Err(StampError::InvalidConfiguration(format!(
                "output {:?} is not a file path",
                self.output
            )));
        }

        let writer: Box<dyn TimestampWriter + Send + Sync> = match self.writer {
            Some(writer) => writer,
            None => Box::new(FsTimestampWriter::new(self.root.clone())),
        };
        let probe: Arc<dyn FileProbe> = match self.probe {
            Some(probe) => probe,
            None => Arc::new(FsProbe::new()),
        };

        Ok(StampKeeper {
            options: RunOptions {
                root: self.root,
                output: self.output,
                restore: self.restore,
                workers: self.workers,
                ignore_patterns: self.ignore_patterns,
                lock_name: self.lock_name,
            },
            probe,
            writer,
            progress: self.progress,
            on_stage: self.on_stage,
            lock_path: self.lock_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::{set_file_mtime, FileTime};
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        root: TempDir,
        work: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                root: TempDir::new().unwrap(),
                work: TempDir::new().unwrap(),
            }
        }

        fn builder(&self) -> StampKeeperBuilder {
            StampKeeperBuilder::new(self.root.path(), self.work.path().join("files.json"))
                .lock_path(self.work.path().join("run.lock"))
        }
    }

    #[test]
    fn test_build_rejects_zero_workers() {
        let fx = Fixture::new();
        let err = fx.builder().workers(0).build().unwrap_err();
        assert!(matches!(err, StampError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_build_rejects_negated_ignore_pattern() {
        let fx = Fixture::new();
        let err = fx
            .builder()
            .ignore_patterns(vec!["*.tmp".to_string(), "!*.jpg".to_string()])
            .build()
            .unwrap_err();
        assert!(matches!(err, StampError::InvalidConfiguration(ref m) if m.contains("!*.jpg")));
    }

    #[test]
    fn test_stages_are_reported_in_order() {
        let fx = Fixture::new();
        fs::write(fx.root.path().join("a.txt"), "a").unwrap();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::<RunStage>::new()));

        for restore in [false, true] {
            seen.lock().clear();
            let sink = Arc::clone(&seen);
            fx.builder()
                .restore(restore)
                .on_stage(Arc::new(move |stage: RunStage| sink.lock().push(stage)))
                .build()
                .unwrap()
                .run()
                .unwrap();
            assert_eq!(seen.lock().as_slice(), RunStage::sequence(restore));
        }
    }

    #[test]
    fn test_failed_stage_is_not_reported() {
        let fx = Fixture::new();
        fs::write(fx.root.path().join("a.txt"), "a").unwrap();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::<RunStage>::new()));
        let sink = Arc::clone(&seen);

        let err = StampKeeperBuilder::new(fx.root.path(), fx.work.path().join("missing").join("o.json"))
            .lock_path(fx.work.path().join("run.lock"))
            .on_stage(Arc::new(move |stage: RunStage| sink.lock().push(stage)))
            .build()
            .unwrap()
            .run()
            .unwrap_err();

        assert!(matches!(err, StampError::WriteFailed { .. }));
        assert_eq!(seen.lock().as_slice(), &[RunStage::Inventory]);
    }

    #[test]
    fn test_invalid_root() {
        let fx = Fixture::new();
        let err = StampKeeperBuilder::new(fx.root.path().join("missing"), fx.work.path().join("o.json"))
            .lock_path(fx.work.path().join("run.lock"))
            .build()
            .unwrap()
            .run()
            .unwrap_err();
        assert!(matches!(err, StampError::InvalidRoot { .. }));
        assert!(!fx.work.path().join("o.json").exists());
    }

    #[test]
    fn test_empty_directory_writes_nothing() {
        let fx = Fixture::new();
        let err = fx.builder().build().unwrap().run().unwrap_err();
        assert!(matches!(err, StampError::EmptyInventory { attempted: 0, .. }));
        assert!(!fx.work.path().join("files.json").exists());
    }

    #[test]
    fn test_restore_undoes_mtime_drift() {
        let fx = Fixture::new();
        let file = fx.root.path().join("a.txt");
        fs::write(&file, "stable").unwrap();
        set_file_mtime(&file, FileTime::from_unix_time(1_000_000_000, 0)).unwrap();

        let first = fx.builder().build().unwrap().run().unwrap();
        assert_eq!(first.file_count, 1);
        assert!(first.restorations.is_empty());

        set_file_mtime(&file, FileTime::from_unix_time(1_600_000_000, 0)).unwrap();

        let second = fx.builder().restore(true).build().unwrap().run().unwrap();
        assert_eq!(second.restorations.len(), 1);
        assert!(second.restorations[0].mtime_changed);
        assert_eq!(second.restorations[0].old_mtime, 1_000_000_000);
        assert_eq!(second.restorations[0].new_mtime, 1_600_000_000);

        let meta = fs::metadata(&file).unwrap();
        assert_eq!(FileTime::from_last_modification_time(&meta).unix_seconds(), 1_000_000_000);

        let saved = SnapshotStore::try_load(&fx.work.path().join("files.json")).unwrap();
        assert_eq!(saved.get("a.txt").unwrap().modified_at, 1_000_000_000);
    }

    #[test]
    fn test_snapshot_inside_root_is_not_inventoried() {
        let fx = Fixture::new();
        fs::write(fx.root.path().join("a.txt"), "a").unwrap();
        let output = fx.root.path().join("files.json");

        let run = || {
            StampKeeperBuilder::new(fx.root.path(), &output)
                .lock_path(fx.work.path().join("run.lock"))
                .build()
                .unwrap()
                .run()
                .unwrap()
        };
        run();
        let report = run();

        assert_eq!(report.file_count, 1);
        assert!(!SnapshotStore::try_load(&output).unwrap().contains("files.json"));
    }
}
