use parking_lot::Mutex;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::thread;
use tracing::warn;

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashExecutorKind {
    /// Bounded rayon pool of `hashing_threads` workers.
    #[default]
    Fixed,
    /// One short-lived thread per file, falling back to the fixed pool.
    Elastic,
}

type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs hashing tasks off the traversal threads.
pub struct HashExecutor {
    kind: HashExecutorKind,
    pool: ThreadPool,
}

impl HashExecutor {
    pub fn new(kind: HashExecutorKind, threads: usize) -> Result<Self, Error> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(|i| format!("hash-{}", i))
            .build()
            .map_err(|e| Error::Other(format!("Failed to build hashing pool: {}", e)))?;
        Ok(Self { kind, pool })
    }

    pub fn kind(&self) -> HashExecutorKind {
        self.kind
    }

    pub fn spawn<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        match self.kind {
            HashExecutorKind::Fixed => self.pool.spawn(task),
            HashExecutorKind::Elastic => self.spawn_elastic(Box::new(task)),
        }
    }

    fn spawn_elastic(&self, task: Task) {
        let slot: Arc<Mutex<Option<Task>>> = Arc::new(Mutex::new(Some(task)));
        let thread_slot = Arc::clone(&slot);
        let spawned = thread::Builder::new()
            .name("hash-elastic".to_string())
            .spawn(move || {
                let task = thread_slot.lock().take();
                if let Some(task) = task {
                    task();
                }
            });

        if let Err(e) = spawned {
            warn!("Elastic hashing thread unavailable, using fixed pool: {}", e);
            let task = slot.lock().take();
            if let Some(task) = task {
                self.pool.spawn(task);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use std::time::Duration;

    #[test]
    fn test_both_kinds_run_tasks() {
        for kind in [HashExecutorKind::Fixed, HashExecutorKind::Elastic] {
            let executor = HashExecutor::new(kind, 2).unwrap();
            let (tx, rx) = unbounded();
            for i in 0..8 {
                let tx = tx.clone();
                executor.spawn(move || {
                    tx.send(i).unwrap();
                });
            }
            let mut seen: Vec<i32> = (0..8)
                .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
                .collect();
            seen.sort();
            assert_eq!(seen, (0..8).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_kind_parses_lowercase() {
        let kind: HashExecutorKind = serde_json::from_str("\"elastic\"").unwrap();
        assert_eq!(kind, HashExecutorKind::Elastic);
    }
}
