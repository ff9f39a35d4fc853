use parking_lot::Mutex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use crate::analysis::{
    DuplicateResolver, DuplicateStatistics, ResolverSettings, SweepResult, SweepScheduler,
};
use crate::config::AppConfig;
use crate::error::Error;
use crate::filter::{FilterStatistics, PathFilter};
use crate::progress::{ProgressReporter, SilentReporter};
use crate::scanner::{IngestionPipeline, ScanHandle, ScanResult};
use crate::storage::{MetadataStore, SqliteStore};
use crate::watcher::{FilesystemWatcher, WatcherHandle};

/// Owns the pipeline, resolver, watchers and sweep schedule, and bounds how
/// many full-tree scans run at once.
pub struct ScanCoordinator {
    config: AppConfig,
    store: Arc<dyn MetadataStore>,
    filter: Arc<PathFilter>,
    resolver: Arc<DuplicateResolver>,
    pipeline: Arc<IngestionPipeline>,
    permits: ScanPermits,
    last_error: Arc<Mutex<Option<String>>>,
    scheduler: Mutex<Option<SweepScheduler>>,
    watchers: Mutex<Vec<WatcherHandle>>,
    reporter: Arc<dyn ProgressReporter>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanStatistics {
    pub total_processed: u64,
    pub total_skipped: u64,
    pub dropped: u64,
    pub persisted: u64,
    pub persist_failures: u64,
    pub active_tasks: usize,
    pub queue_size: usize,
    pub active_scans: usize,
    pub scanning: bool,
    pub last_error: Option<String>,
}

/// Everything `status` reports in one snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct SystemStatus {
    pub scanner: ScanStatistics,
    pub duplicates: DuplicateStatistics,
    pub filter: FilterStatistics,
    pub storage_used: u64,
    pub content_types: Vec<(String, u64)>,
    pub watched_roots: Vec<PathBuf>,
}

impl ScanCoordinator {
    /// Validate `config` and open its SQLite database.
    pub fn open(config: AppConfig) -> Result<Self, Error> {
        config.validate()?;
        let store = Arc::new(SqliteStore::open(&config.database.path)?);
        Self::new(config, store)
    }

    pub fn new(config: AppConfig, store: Arc<dyn MetadataStore>) -> Result<Self, Error> {
        Self::with_reporter(config, store, Arc::new(SilentReporter))
    }

    pub fn with_reporter(
        config: AppConfig,
        store: Arc<dyn MetadataStore>,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Result<Self, Error> {
        config.validate()?;
        let filter = Arc::new(PathFilter::new(config.file_filter.clone()));
        let resolver = Arc::new(DuplicateResolver::new(
            Arc::clone(&store),
            ResolverSettings::from(&config.duplicate_detection),
        ));
        let on_ingest = config
            .processing
            .check_duplicates_on_ingest
            .then(|| Arc::clone(&resolver));
        let pipeline = IngestionPipeline::new(
            &config,
            Arc::clone(&filter),
            Arc::clone(&store),
            on_ingest,
            Arc::clone(&reporter),
        )?;

        Ok(Self {
            permits: ScanPermits::new(config.processing.max_concurrent_scans),
            config,
            store,
            filter,
            resolver,
            pipeline,
            last_error: Arc::new(Mutex::new(None)),
            scheduler: Mutex::new(None),
            watchers: Mutex::new(Vec::new()),
            reporter,
        })
    }

    // ── Scans ────────────────────────────────────────────────────

    /// Start a full walk of `path`, or fail immediately when every scan
    /// permit is taken.
    pub fn scan_path(&self, path: &Path) -> Result<ScanHandle, Error> {
        let permit = match self.permits.try_acquire() {
            Some(permit) => permit,
            None => {
                warn!("Rejecting scan of {}: max concurrent scans reached", path.display());
                return Err(Error::ScanLimitReached(self.permits.max));
            }
        };
        let last_error = Arc::clone(&self.last_error);
        self.pipeline.walk_then(path, move |result| {
            if let Some(error) = &result.error {
                *last_error.lock() = Some(error.clone());
            }
            drop(permit);
        })
    }

    /// Scan every configured root (nested roots collapsed) and wait for all
    /// of them. Roots rejected for lack of a permit count as failed jobs.
    pub fn scan_all(&self) -> Result<ScanResult, Error> {
        let roots = self.config.scan_roots();
        if roots.is_empty() {
            return Err(Error::InvalidConfig("no root_paths configured".into()));
        }
        info!("Processing directories: {:?}", roots);

        let mut handles = Vec::with_capacity(roots.len());
        let mut results = Vec::new();
        for root in &roots {
            match self.scan_path(root) {
                Ok(handle) => handles.push(handle),
                Err(e) => results.push(rejected(root, &e)),
            }
        }
        results.extend(handles.into_iter().map(ScanHandle::wait));
        Ok(ScanResult::combine(results))
    }

    pub fn detect_duplicates(&self) -> Result<SweepResult, Error> {
        let result = self.resolver.sweep()?;
        self.reporter.on_sweep_complete(&result);
        Ok(result)
    }

    /// Block until every queued record has been written.
    pub fn flush(&self) {
        self.pipeline.flush();
    }

    // ── Live monitoring ──────────────────────────────────────────

    pub fn start_scheduled_sweeps(&self) -> Result<bool, Error> {
        let detection = &self.config.duplicate_detection;
        if !detection.auto_delete {
            info!("Auto-delete disabled, duplicate sweep not scheduled");
            return Ok(false);
        }
        let mut scheduler = self.scheduler.lock();
        if scheduler.is_none() {
            *scheduler = Some(SweepScheduler::start(
                Arc::clone(&self.resolver),
                detection.duplicate_check_delay(),
                Arc::clone(&self.reporter),
            )?);
        }
        Ok(true)
    }

    pub fn watch_path(&self, path: &Path) -> Result<(), Error> {
        let watcher =
            FilesystemWatcher::new(path, Arc::clone(&self.pipeline), Arc::clone(&self.store))?;
        let handle = watcher.spawn()?;
        self.watchers.lock().push(handle);
        Ok(())
    }

    pub fn watch_all(&self) -> Result<usize, Error> {
        let roots = self.config.scan_roots();
        for root in &roots {
            self.watch_path(root)?;
        }
        Ok(roots.len())
    }

    pub fn watched_roots(&self) -> Vec<PathBuf> {
        let mut watchers = self.watchers.lock();
        watchers.retain(|handle| !handle.is_finished());
        watchers.iter().map(|handle| handle.root().to_path_buf()).collect()
    }

    // ── Control surface ──────────────────────────────────────────

    pub fn statistics(&self) -> ScanStatistics {
        let pipeline = self.pipeline.stats();
        let active_scans = self.permits.in_use();
        ScanStatistics {
            total_processed: pipeline.processed,
            total_skipped: pipeline.skipped,
            dropped: pipeline.dropped,
            persisted: pipeline.persisted,
            persist_failures: pipeline.persist_failures,
            active_tasks: self.pipeline.active_tasks(),
            queue_size: self.pipeline.queue_depth(),
            active_scans,
            scanning: active_scans > 0,
            last_error: self.last_error.lock().clone(),
        }
    }

    pub fn duplicate_statistics(&self) -> Result<DuplicateStatistics, Error> {
        self.resolver.statistics()
    }

    pub fn filter_statistics(&self) -> FilterStatistics {
        self.filter.statistics()
    }

    pub fn status(&self) -> Result<SystemStatus, Error> {
        Ok(SystemStatus {
            scanner: self.statistics(),
            duplicates: self.duplicate_statistics()?,
            filter: self.filter_statistics(),
            storage_used: self.store.total_size()?,
            content_types: self.store.count_by_content_type()?,
            watched_roots: self.watched_roots(),
        })
    }

    /// Replace the file name patterns for every later filter decision.
    pub fn update_filter_patterns(&self, included: &[String], excluded: &[String]) -> FilterStatistics {
        self.filter.update_patterns(included, excluded);
        self.filter.statistics()
    }

    /// The configuration in effect, including runtime pattern updates.
    pub fn configuration(&self) -> AppConfig {
        AppConfig {
            file_filter: self.filter.effective_config(),
            ..self.config.clone()
        }
    }

    pub fn store(&self) -> &Arc<dyn MetadataStore> {
        &self.store
    }

    pub fn shutdown(&self) {
        info!("Shutting down scan coordinator...");
        if let Some(scheduler) = self.scheduler.lock().take() {
            scheduler.stop();
        }
        for watcher in self.watchers.lock().drain(..) {
            watcher.stop();
        }
        self.pipeline.shutdown();
    }
}

fn rejected(root: &Path, error: &Error) -> ScanResult {
    ScanResult {
        roots: vec![root.to_path_buf()],
        started_at: chrono::Utc::now(),
        processed: 0,
        skipped: 0,
        error: Some(error.to_string()),
        duration: std::time::Duration::ZERO,
    }
}

/// Non-blocking counting permit.
struct ScanPermits {
    max: usize,
    in_use: Arc<AtomicUsize>,
}

struct ScanPermit {
    in_use: Arc<AtomicUsize>,
}

impl ScanPermits {
    fn new(max: usize) -> Self {
        Self {
            max,
            in_use: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn try_acquire(&self) -> Option<ScanPermit> {
        let mut current = self.in_use.load(Ordering::Acquire);
        loop {
            if current >= self.max {
                return None;
            }
            match self.in_use.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    return Some(ScanPermit {
                        in_use: Arc::clone(&self.in_use),
                    })
                }
                Err(actual) => current = actual,
            }
        }
    }

    fn in_use(&self) -> usize {
        self.in_use.load(Ordering::Acquire)
    }
}

impl Drop for ScanPermit {
    fn drop(&mut self) {
        self.in_use.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permits_bound_and_release() {
        let permits = ScanPermits::new(2);
        let first = permits.try_acquire().unwrap();
        let second = permits.try_acquire().unwrap();
        assert!(permits.try_acquire().is_none());
        assert_eq!(permits.in_use(), 2);

        drop(first);
        let third = permits.try_acquire();
        assert!(third.is_some());
        drop(second);
        drop(third);
        assert_eq!(permits.in_use(), 0);
    }

    #[test]
    fn test_open_reports_status_from_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("root");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("a.txt"), "alpha").unwrap();

        let mut config = AppConfig::default();
        config.root_paths = vec![root.to_string_lossy().into_owned()];
        config.database.path = dir.path().join("index.db").to_string_lossy().into_owned();
        config.processing.parallelism = 1;
        config.performance.hashing_threads = 1;

        let coordinator = ScanCoordinator::open(config).unwrap();
        let result = coordinator.scan_all().unwrap();
        coordinator.flush();
        assert_eq!(result.processed, 1);

        let status = coordinator.status().unwrap();
        assert_eq!(status.scanner.persisted, 1);
        assert_eq!(status.duplicates.total_files, 1);
        assert_eq!(status.storage_used, 5);
        assert_eq!(status.content_types, vec![("text/plain".to_string(), 1)]);
        assert!(status.watched_roots.is_empty());
        assert!(serde_json::to_string(&status).is_ok());
        coordinator.shutdown();
    }

    #[test]
    fn test_open_rejects_invalid_config() {
        let mut config = AppConfig::default();
        config.processing.queue_capacity = 0;
        assert!(matches!(
            ScanCoordinator::open(config),
            Err(Error::InvalidConfig(_))
        ));
    }
}
