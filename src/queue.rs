//! Shared work queue for inventory workers
//!
//! The queue is seeded once with every path to probe and never refilled. A
//! worker that finds it empty exits instead of waiting. Pending paths and the
//! result table sit behind separate mutexes; each operation takes exactly one
//! of them for a single short critical section.

use crate::error::{Result, StampError};
use crate::types::{FileRecord, Snapshot};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Pending paths plus the snapshot being assembled
#[derive(Debug)]
pub struct WorkQueue {
    pending: Mutex<VecDeque<PathBuf>>,
    results: Mutex<Snapshot>,
    total: usize,
    processed: AtomicUsize,
    failed: AtomicUsize,
}

impl WorkQueue {
    /// Seed a queue with `paths`, in order
    pub fn new(paths: impl IntoIterator<Item = PathBuf>) -> Self {
        let pending: VecDeque<PathBuf> = paths.into_iter().collect();
        let total = pending.len();
        Self {
            pending: Mutex::new(pending),
            results: Mutex::new(Snapshot::new()),
            total,
            processed: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
        }
    }

    /// Pop the next pending path, or `None` once drained
    pub fn take_next(&self) -> Option<PathBuf> {
        self.pending.lock().pop_front()
    }

    /// Publish the record for `key` and return the processed count
    ///
    /// The counter is bumped while the table lock is held, so a reader never
    /// sees a count ahead of the table. A key that is already present is
    /// rejected and the earlier record is kept.
    pub fn publish(&self, key: String, record: FileRecord) -> Result<usize> {
        let mut results = self.results.lock();
        if results.contains(&key) {
            return Err(StampError::internal(format!("duplicate snapshot key {}", key)));
        }
        results.insert(key, record)?;
        Ok(self.processed.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Count a path whose probe failed and return the processed count
    pub fn record_failure(&self) -> usize {
        self.failed.fetch_add(1, Ordering::SeqCst);
        self.processed.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Number of paths the queue was seeded with
    pub fn total(&self) -> usize {
        self.total
    }

    /// Paths taken and finished so far, successful or not
    pub fn processed(&self) -> usize {
        self.processed.load(Ordering::SeqCst)
    }

    /// Paths whose probe failed
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Freeze the result table
    ///
    /// Consuming `self` guarantees no worker still holds a reference.
    pub fn into_snapshot(self) -> Snapshot {
        self.results.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_take_next_is_fifo_and_never_blocks() {
        let queue = WorkQueue::new(vec![PathBuf::from("a"), PathBuf::from("b")]);
        assert_eq!(queue.total(), 2);
        assert_eq!(queue.take_next(), Some(PathBuf::from("a")));
        assert_eq!(queue.take_next(), Some(PathBuf::from("b")));
        assert_eq!(queue.take_next(), None);
        assert_eq!(queue.take_next(), None);
    }

    #[test]
    fn test_publish_and_failures_are_counted() {
        let queue = WorkQueue::new(vec![PathBuf::from("a"), PathBuf::from("b")]);
        assert_eq!(queue.publish("a".to_string(), FileRecord::new("x", 1, 2)).unwrap(), 1);
        assert_eq!(queue.record_failure(), 2);
        assert_eq!(queue.processed(), 2);
        assert_eq!(queue.failed(), 1);

        let snapshot = queue.into_snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.get("a"), Some(&FileRecord::new("x", 1, 2)));
    }

    #[test]
    fn test_duplicate_key_is_rejected() {
        let queue = WorkQueue::new(vec![PathBuf::from("a"), PathBuf::from("b")]);
        queue.publish("a".to_string(), FileRecord::new("first", 1, 1)).unwrap();

        let err = queue.publish("a".to_string(), FileRecord::new("second", 2, 2)).unwrap_err();
        assert!(matches!(err, StampError::Internal(_)));
        assert_eq!(queue.processed(), 1);
        assert_eq!(queue.into_snapshot().get("a"), Some(&FileRecord::new("first", 1, 1)));
    }

    #[test]
    fn test_concurrent_drain_loses_nothing() {
        let paths: Vec<PathBuf> = (0..1000).map(|i| PathBuf::from(format!("f{i}"))).collect();
        let queue = Arc::new(WorkQueue::new(paths));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    while let Some(path) = queue.take_next() {
                        let key = path.to_string_lossy().into_owned();
                        queue.publish(key.clone(), FileRecord::new(key, 0, 0)).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let queue = Arc::try_unwrap(queue).unwrap();
        assert_eq!(queue.processed(), 1000);
        let snapshot = queue.into_snapshot();
        assert_eq!(snapshot.len(), 1000);
        for (key, record) in &snapshot {
            assert_eq!(key, &record.fingerprint);
        }
    }
}
