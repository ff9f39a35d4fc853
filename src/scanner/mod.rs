//! Ingestion pipeline: walk → filter → extract → hash → bounded persistence.
//!
//! Traversal runs on its own rayon pool. Admitted files are hashed on the
//! [`HashExecutor`] and handed to a single batch writer through a bounded
//! queue; producers that cannot enqueue within the offer timeout drop the
//! record.

mod executor;
pub mod extract;
mod job;
mod persist;
mod stats;
mod tracker;
pub mod walk;

pub use executor::{HashExecutor, HashExecutorKind};
pub use job::{JobProgress, ScanHandle, ScanResult};
pub use persist::{Persister, PersisterSettings};
pub use stats::{PipelineSnapshot, PipelineStats};
pub use tracker::{TaskGuard, TaskTracker};

use chrono::{DateTime, Utc};
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::analysis::DuplicateResolver;
use crate::config::AppConfig;
use crate::error::Error;
use crate::filter::PathFilter;
use crate::hasher::ContentHasher;
use crate::progress::ProgressReporter;
use crate::storage::MetadataStore;

pub struct IngestionPipeline {
    filter: Arc<PathFilter>,
    hasher: ContentHasher,
    traversal: ThreadPool,
    hash_executor: HashExecutor,
    persister: Persister,
    stats: Arc<PipelineStats>,
    in_flight: TaskTracker,
    live: Arc<JobProgress>,
    reporter: Arc<dyn ProgressReporter>,
}

impl IngestionPipeline {
    pub fn new(
        config: &AppConfig,
        filter: Arc<PathFilter>,
        store: Arc<dyn MetadataStore>,
        resolver: Option<Arc<DuplicateResolver>>,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Result<Arc<Self>, Error> {
        let processing = &config.processing;
        let performance = &config.performance;

        let traversal = ThreadPoolBuilder::new()
            .num_threads(processing.parallelism.max(1))
            .thread_name(|i| format!("walk-{}", i))
            .build()
            .map_err(|e| Error::Other(format!("Failed to build traversal pool: {}", e)))?;
        let hash_executor =
            HashExecutor::new(performance.hash_executor, performance.hashing_threads)?;

        let stats = Arc::new(PipelineStats::default());
        let persister = Persister::start(
            PersisterSettings {
                queue_capacity: processing.queue_capacity,
                batch_size: processing.batch_size,
                offer_timeout: processing.queue_offer_timeout(),
            },
            store,
            Arc::clone(&stats),
            resolver,
        )?;

        info!(
            "Ingestion pipeline ready: {} traversal threads, {} hashing threads ({:?}), queue {}",
            processing.parallelism,
            performance.hashing_threads,
            hash_executor.kind(),
            processing.queue_capacity
        );

        Ok(Arc::new(Self {
            filter,
            hasher: ContentHasher::new(performance.io_buffer_size),
            traversal,
            hash_executor,
            persister,
            stats,
            in_flight: TaskTracker::new(),
            live: Arc::new(JobProgress::default()),
            reporter,
        }))
    }

    /// Start walking `root` in the background. `on_complete` runs on the job
    /// thread once the result is final.
    pub fn walk_then<F>(self: &Arc<Self>, root: &Path, on_complete: F) -> Result<ScanHandle, Error>
    where
        F: FnOnce(&ScanResult) + Send + 'static,
    {
        let root = root.to_path_buf();
        let started_at = Utc::now();
        let pipeline = Arc::clone(self);
        let job_root = root.clone();
        let handle = thread::Builder::new()
            .name("scan-job".to_string())
            .spawn(move || {
                let result = pipeline.run_job(job_root, started_at);
                on_complete(&result);
                result
            })?;
        Ok(ScanHandle {
            root,
            started_at,
            handle,
        })
    }

    fn run_job(self: Arc<Self>, root: PathBuf, started_at: DateTime<Utc>) -> ScanResult {
        let start = Instant::now();
        info!("Starting directory scan: {}", root.display());
        self.reporter.on_scan_start(&root);

        let job = Arc::new(JobProgress::default());
        let walked = self.traversal.install(|| {
            walk::walk_tree(&root, &|path: PathBuf| {
                self.process_file(path, &job);
            })
        });
        job.tasks.wait_idle();

        let error = walked.err().map(|e| {
            warn!("Error scanning directory {}: {}", root.display(), e);
            format!("Error: {}", e)
        });
        let result = ScanResult {
            roots: vec![root],
            started_at,
            processed: job.processed(),
            skipped: job.skipped(),
            error,
            duration: start.elapsed(),
        };
        info!(
            "Completed directory scan: {} in {:.2}s. Files processed: {}, skipped: {}",
            result.roots[0].display(),
            result.duration.as_secs_f64(),
            result.processed,
            result.skipped
        );
        self.reporter.on_scan_complete(&result);
        result
    }

    /// Run the per-file path for a single file outside any walk. Returns
    /// false if the filter rejected it or its metadata could not be read.
    pub fn ingest_file(self: &Arc<Self>, path: &Path) -> bool {
        let live = Arc::clone(&self.live);
        self.process_file(path.to_path_buf(), &live)
    }

    fn process_file(self: &Arc<Self>, path: PathBuf, job: &Arc<JobProgress>) -> bool {
        if !self.filter.should_index(&path) {
            job.record_skipped();
            self.stats.record_skipped();
            return false;
        }

        let mut record = match extract::extract_metadata(&path) {
            Ok(record) => record,
            Err(e) => {
                debug!("Failed to read metadata for {}: {}", path.display(), e);
                job.record_skipped();
                self.stats.record_skipped();
                return false;
            }
        };
        job.record_processed();
        self.stats.record_processed();

        let job_guard = job.tasks.begin();
        let global_guard = self.in_flight.begin();
        let pipeline = Arc::clone(self);
        self.hash_executor.spawn(move || {
            let _guards = (job_guard, global_guard);
            match pipeline.hasher.hash(&path) {
                Ok(hash) => record.hash = Some(hash),
                Err(e) => warn!("{}; indexing without hash", e),
            }
            let indexed = record.path();
            let size = record.size;
            if pipeline.persister.offer(record) {
                pipeline.reporter.on_file_indexed(&indexed, size);
            }
        });
        true
    }

    pub fn stats(&self) -> PipelineSnapshot {
        self.stats.snapshot()
    }

    /// Per-file tasks currently hashing or waiting on the queue.
    pub fn active_tasks(&self) -> usize {
        self.in_flight.active()
    }

    pub fn queue_depth(&self) -> usize {
        self.persister.queue_depth()
    }

    /// Block until every started per-file task has finished and every
    /// queued record has been written.
    pub fn flush(&self) {
        self.in_flight.wait_idle();
        self.persister.flush();
    }

    pub fn shutdown(&self) {
        self.in_flight.wait_idle();
        self.persister.close();
        debug!("Ingestion pipeline stopped");
    }
}
