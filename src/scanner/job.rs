use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use super::tracker::TaskTracker;

/// Counters for one walk, or for the watcher's live ingestion.
#[derive(Debug, Default)]
pub struct JobProgress {
    processed: AtomicU64,
    skipped: AtomicU64,
    pub(crate) tasks: TaskTracker,
}

impl JobProgress {
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    pub(crate) fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone)]
pub struct ScanResult {
    pub roots: Vec<PathBuf>,
    pub started_at: DateTime<Utc>,
    pub processed: u64,
    pub skipped: u64,
    pub error: Option<String>,
    pub duration: Duration,
}

impl ScanResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Sums counts across jobs and keeps the first error.
    pub fn combine(results: Vec<ScanResult>) -> ScanResult {
        let mut combined = ScanResult {
            roots: Vec::new(),
            started_at: Utc::now(),
            processed: 0,
            skipped: 0,
            error: None,
            duration: Duration::ZERO,
        };
        for result in results {
            combined.started_at = combined.started_at.min(result.started_at);
            combined.roots.extend(result.roots);
            combined.processed += result.processed;
            combined.skipped += result.skipped;
            combined.duration = combined.duration.max(result.duration);
            if combined.error.is_none() {
                combined.error = result.error;
            }
        }
        combined
    }
}

/// A running walk. `wait` blocks until traversal and every per-file task of
/// the walk have finished.
pub struct ScanHandle {
    pub(crate) root: PathBuf,
    pub(crate) started_at: DateTime<Utc>,
    pub(crate) handle: JoinHandle<ScanResult>,
}

impl ScanHandle {
    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn wait(self) -> ScanResult {
        match self.handle.join() {
            Ok(result) => result,
            Err(_) => ScanResult {
                roots: vec![self.root],
                started_at: self.started_at,
                processed: 0,
                skipped: 0,
                error: Some("scan thread panicked".to_string()),
                duration: (Utc::now() - self.started_at).to_std().unwrap_or_default(),
            },
        }
    }
}
