use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Cumulative pipeline counters, shared by every scan and the watcher.
#[derive(Debug, Default)]
pub struct PipelineStats {
    processed: AtomicU64,
    skipped: AtomicU64,
    dropped: AtomicU64,
    persisted: AtomicU64,
    persist_failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineSnapshot {
    pub processed: u64,
    pub skipped: u64,
    pub dropped: u64,
    pub persisted: u64,
    pub persist_failures: u64,
}

impl PipelineStats {
    pub fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_persisted(&self, count: usize) {
        self.persisted.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_persist_failures(&self, count: usize) {
        self.persist_failures.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PipelineSnapshot {
        PipelineSnapshot {
            processed: self.processed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            persisted: self.persisted.load(Ordering::Relaxed),
            persist_failures: self.persist_failures.load(Ordering::Relaxed),
        }
    }
}
