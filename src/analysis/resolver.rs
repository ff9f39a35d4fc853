use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::retention::RetentionStrategy;
use crate::config::DuplicateDetectionConfig;
use crate::error::Error;
use crate::storage::{FileRecord, MetadataStore};

#[derive(Debug, Clone)]
pub struct ResolverSettings {
    pub auto_delete: bool,
    pub strategy: RetentionStrategy,
    pub min_file_size: u64,
    pub protected_extensions: Vec<String>,
    pub log_deletions: bool,
}

impl From<&DuplicateDetectionConfig> for ResolverSettings {
    fn from(config: &DuplicateDetectionConfig) -> Self {
        Self {
            auto_delete: config.auto_delete,
            strategy: config.deletion_strategy,
            min_file_size: config.min_file_size_for_duplication,
            protected_extensions: config
                .protected_extensions
                .iter()
                .map(|ext| ext.to_lowercase())
                .collect(),
            log_deletions: config.enable_deduplication_logging,
        }
    }
}

/// What [`DuplicateResolver::check_one`] did with a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DuplicateOutcome {
    NoHash,
    TooSmall,
    Protected,
    Unique,
    /// Duplicates exist but auto-delete is off.
    Reported { duplicates: usize },
    Resolved(GroupResolution),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GroupResolution {
    pub keeper: Option<PathBuf>,
    /// Copies besides the keeper.
    pub duplicates: usize,
    pub deleted: usize,
    pub bytes_freed: u64,
    /// Records removed because their file was already gone or they repeated
    /// another member's location.
    pub stale_records: usize,
    pub failures: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepResult {
    pub groups: usize,
    pub duplicates: usize,
    pub deleted: usize,
    pub bytes_freed: u64,
    pub failures: usize,
    #[serde(skip)]
    pub duration: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DuplicateStatistics {
    pub duplicates_detected: u64,
    pub duplicates_deleted: u64,
    pub space_reclaimed: u64,
    pub total_files: u64,
    pub duplicate_hash_groups: u64,
    pub auto_delete_enabled: bool,
    pub potential_savings: u64,
}

#[derive(Debug, Default)]
struct ResolverCounters {
    detected: AtomicU64,
    deleted: AtomicU64,
    reclaimed: AtomicU64,
}

/// Groups indexed files by hash and removes every copy but the keeper.
pub struct DuplicateResolver {
    store: Arc<dyn MetadataStore>,
    settings: ResolverSettings,
    counters: ResolverCounters,
    resolve_lock: Mutex<()>,
    sweep_lock: Mutex<()>,
}

impl DuplicateResolver {
    pub fn new(store: Arc<dyn MetadataStore>, settings: ResolverSettings) -> Self {
        Self {
            store,
            settings,
            counters: ResolverCounters::default(),
            resolve_lock: Mutex::new(()),
            sweep_lock: Mutex::new(()),
        }
    }

    pub fn settings(&self) -> &ResolverSettings {
        &self.settings
    }

    pub fn is_protected(&self, record: &FileRecord) -> bool {
        let name = record.name.to_lowercase();
        self.settings
            .protected_extensions
            .iter()
            .any(|ext| name.ends_with(ext.as_str()))
    }

    fn is_eligible(&self, record: &FileRecord) -> bool {
        record.hash.is_some()
            && record.size >= self.settings.min_file_size
            && !self.is_protected(record)
    }

    /// Check a freshly persisted record against the rest of the index.
    pub fn check_one(&self, record: &FileRecord) -> Result<DuplicateOutcome, Error> {
        let hash = match &record.hash {
            Some(hash) => hash,
            None => return Ok(DuplicateOutcome::NoHash),
        };
        if record.size < self.settings.min_file_size {
            return Ok(DuplicateOutcome::TooSmall);
        }
        if self.is_protected(record) {
            return Ok(DuplicateOutcome::Protected);
        }

        let others = self.store.find_by_hash_excluding(hash, record.id)?;
        if others.is_empty() {
            return Ok(DuplicateOutcome::Unique);
        }
        if !self.settings.auto_delete {
            self.counters
                .detected
                .fetch_add(others.len() as u64, Ordering::Relaxed);
            info!(
                "Found {} duplicates for file: {} (auto-delete disabled)",
                others.len(),
                record.name
            );
            return Ok(DuplicateOutcome::Reported {
                duplicates: others.len(),
            });
        }

        let resolution = self.resolve_hash(hash)?;
        self.counters
            .detected
            .fetch_add(resolution.duplicates as u64, Ordering::Relaxed);
        Ok(DuplicateOutcome::Resolved(resolution))
    }

    /// Resolve every duplicate group currently in the index.
    pub fn sweep(&self) -> Result<SweepResult, Error> {
        let _sweeping = self.sweep_lock.lock();
        let start = Instant::now();
        info!("Starting duplicate sweep...");

        let hashes = self
            .store
            .find_duplicate_hashes(self.settings.min_file_size)?;
        let mut result = SweepResult {
            groups: hashes.len(),
            ..SweepResult::default()
        };
        if hashes.is_empty() {
            info!("No duplicates found during sweep");
            result.duration = start.elapsed();
            return Ok(result);
        }
        info!("Found {} hash groups with duplicates", hashes.len());

        for hash in &hashes {
            if !self.settings.auto_delete {
                let members = self.store.find_by_hash(hash)?;
                let extra = members.len().saturating_sub(1);
                self.counters.detected.fetch_add(extra as u64, Ordering::Relaxed);
                result.duplicates += extra;
                continue;
            }
            match self.resolve_hash(hash) {
                Ok(resolution) => {
                    self.counters
                        .detected
                        .fetch_add(resolution.duplicates as u64, Ordering::Relaxed);
                    result.duplicates += resolution.duplicates;
                    result.deleted += resolution.deleted;
                    result.bytes_freed += resolution.bytes_freed;
                    result.failures += resolution.failures;
                }
                Err(e) => {
                    error!("Failed to resolve duplicate group {}: {}", hash, e);
                    result.failures += 1;
                }
            }
        }

        result.duration = start.elapsed();
        info!(
            "Duplicate sweep completed: {} groups, {} deleted, {} bytes freed in {:.2}s",
            result.groups,
            result.deleted,
            result.bytes_freed,
            result.duration.as_secs_f64()
        );
        Ok(result)
    }

    /// Re-read the group for `hash` and resolve it.
    pub fn resolve_hash(&self, hash: &str) -> Result<GroupResolution, Error> {
        let _resolving = self.resolve_lock.lock();
        let members = self.store.find_by_hash(hash)?;
        Ok(self.resolve_members(members))
    }

    pub fn resolve_group(&self, members: Vec<FileRecord>) -> GroupResolution {
        let _resolving = self.resolve_lock.lock();
        self.resolve_members(members)
    }

    fn resolve_members(&self, members: Vec<FileRecord>) -> GroupResolution {
        let mut resolution = GroupResolution::default();

        let mut seen = HashSet::new();
        let mut candidates = Vec::with_capacity(members.len());
        for member in members {
            if !self.is_eligible(&member) {
                continue;
            }
            if !seen.insert(member.path()) {
                debug!("Dropping repeated record {} for {}", member.id, member.path().display());
                self.forget(&member, &mut resolution);
                continue;
            }
            candidates.push(member);
        }

        let keeper = loop {
            if candidates.len() < 2 {
                return resolution;
            }
            let idx = match self.settings.strategy.select_keeper(&candidates) {
                Some(idx) => idx,
                None => return resolution,
            };
            if candidates[idx].path().exists() {
                break candidates.remove(idx);
            }
            let missing = candidates.remove(idx);
            warn!(
                "Keeper {} no longer exists, removing it from the index",
                missing.path().display()
            );
            self.forget(&missing, &mut resolution);
        };
        resolution.keeper = Some(keeper.path());
        resolution.duplicates = candidates.len();

        for loser in candidates {
            self.remove_copy(&loser, &mut resolution);
        }

        self.counters
            .deleted
            .fetch_add(resolution.deleted as u64, Ordering::Relaxed);
        self.counters
            .reclaimed
            .fetch_add(resolution.bytes_freed, Ordering::Relaxed);

        if resolution.deleted > 0 {
            debug!(
                "Deleted {} duplicates, freed {} bytes, kept: {}",
                resolution.deleted,
                resolution.bytes_freed,
                keeper.name
            );
        }
        resolution
    }

    fn remove_copy(&self, loser: &FileRecord, resolution: &mut GroupResolution) {
        let path = loser.path();
        match fs::symlink_metadata(&path) {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(
                    "File not found for deletion, removed from index: {}",
                    path.display()
                );
                self.forget(loser, resolution);
                return;
            }
            Err(e) => {
                error!("Failed to stat duplicate file {}: {}", path.display(), e);
                resolution.failures += 1;
                return;
            }
        }

        if let Err(e) = fs::remove_file(&path) {
            error!("Failed to delete duplicate file {}: {}", path.display(), e);
            resolution.failures += 1;
            return;
        }
        resolution.deleted += 1;
        resolution.bytes_freed += loser.size;
        if self.settings.log_deletions {
            info!(
                "Deleted duplicate file: {} (freed {} bytes)",
                path.display(),
                loser.size
            );
        }

        if let Err(e) = self.store.delete(loser.id) {
            error!(
                "Deleted {} but failed to remove its record: {}",
                path.display(),
                e
            );
        }
    }

    fn forget(&self, record: &FileRecord, resolution: &mut GroupResolution) {
        match self.store.delete(record.id) {
            Ok(()) => resolution.stale_records += 1,
            Err(e) => {
                error!("Failed to remove record {}: {}", record.id, e);
                resolution.failures += 1;
            }
        }
    }

    pub fn statistics(&self) -> Result<DuplicateStatistics, Error> {
        let min_size = self.settings.min_file_size;
        Ok(DuplicateStatistics {
            duplicates_detected: self.counters.detected.load(Ordering::Relaxed),
            duplicates_deleted: self.counters.deleted.load(Ordering::Relaxed),
            space_reclaimed: self.counters.reclaimed.load(Ordering::Relaxed),
            total_files: self.store.count()?,
            duplicate_hash_groups: self.store.count_duplicate_hashes(min_size)?,
            auto_delete_enabled: self.settings.auto_delete,
            potential_savings: self.store.potential_savings(min_size)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::models::millis_to_datetime;
    use crate::storage::MemoryStore;
    use std::path::Path;

    fn settings(strategy: RetentionStrategy) -> ResolverSettings {
        ResolverSettings {
            auto_delete: true,
            strategy,
            min_file_size: 4,
            protected_extensions: vec![".exe".into()],
            log_deletions: false,
        }
    }

    fn indexed(store: &MemoryStore, dir: &Path, name: &str, body: &[u8], mtime: i64) -> FileRecord {
        let path = dir.join(name);
        fs::write(&path, body).unwrap();
        let record = FileRecord {
            id: 0,
            name: name.to_string(),
            directory: dir.to_string_lossy().into_owned(),
            size: body.len() as u64,
            last_modified: millis_to_datetime(mtime),
            content_type: None,
            hash: Some(crate::hasher::hash_bytes(body)),
        };
        store.batch_upsert(&[record]).unwrap().remove(0)
    }

    #[test]
    fn test_check_one_short_circuits() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let resolver = DuplicateResolver::new(store.clone(), settings(RetentionStrategy::KeepOldest));

        let mut unhashed = indexed(&store, dir.path(), "a.bin", b"abcdef", 1);
        unhashed.hash = None;
        assert_eq!(resolver.check_one(&unhashed).unwrap(), DuplicateOutcome::NoHash);

        let tiny = indexed(&store, dir.path(), "tiny.bin", b"abc", 1);
        assert_eq!(resolver.check_one(&tiny).unwrap(), DuplicateOutcome::TooSmall);

        let exe = indexed(&store, dir.path(), "APP.EXE", b"abcdef", 1);
        assert_eq!(resolver.check_one(&exe).unwrap(), DuplicateOutcome::Protected);

        let unique = indexed(&store, dir.path(), "u.bin", b"unique!", 1);
        assert_eq!(resolver.check_one(&unique).unwrap(), DuplicateOutcome::Unique);
    }

    #[test]
    fn test_report_only_when_auto_delete_off() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let mut cfg = settings(RetentionStrategy::KeepOldest);
        cfg.auto_delete = false;
        let resolver = DuplicateResolver::new(store.clone(), cfg);

        indexed(&store, dir.path(), "a.bin", b"same body", 1);
        let b = indexed(&store, dir.path(), "b.bin", b"same body", 2);
        assert_eq!(
            resolver.check_one(&b).unwrap(),
            DuplicateOutcome::Reported { duplicates: 1 }
        );
        assert!(dir.path().join("a.bin").exists());
        assert!(dir.path().join("b.bin").exists());
        assert_eq!(resolver.statistics().unwrap().duplicates_detected, 1);
    }

    #[test]
    fn test_missing_loser_only_loses_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let resolver = DuplicateResolver::new(store.clone(), settings(RetentionStrategy::KeepOldest));

        indexed(&store, dir.path(), "old.bin", b"payload", 1);
        let newer = indexed(&store, dir.path(), "new.bin", b"payload", 2);
        fs::remove_file(newer.path()).unwrap();

        let resolution = match resolver.check_one(&newer).unwrap() {
            DuplicateOutcome::Resolved(resolution) => resolution,
            other => panic!("unexpected outcome {:?}", other),
        };
        assert_eq!(resolution.deleted, 0);
        assert_eq!(resolution.bytes_freed, 0);
        assert_eq!(resolution.stale_records, 1);
        assert_eq!(store.count().unwrap(), 1);
        assert!(dir.path().join("old.bin").exists());
    }

    #[test]
    fn test_missing_keeper_is_reselected() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let resolver = DuplicateResolver::new(store.clone(), settings(RetentionStrategy::KeepOldest));

        let oldest = indexed(&store, dir.path(), "a.bin", b"payload", 1);
        indexed(&store, dir.path(), "b.bin", b"payload", 2);
        indexed(&store, dir.path(), "c.bin", b"payload", 3);
        fs::remove_file(oldest.path()).unwrap();

        let result = resolver.sweep().unwrap();
        assert_eq!(result.deleted, 1);
        assert!(dir.path().join("b.bin").exists());
        assert!(!dir.path().join("c.bin").exists());
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_protected_and_undersized_members_survive_group() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let resolver = DuplicateResolver::new(store.clone(), settings(RetentionStrategy::KeepNewest));

        indexed(&store, dir.path(), "app.exe", b"binary!", 1);
        indexed(&store, dir.path(), "copy1.bin", b"binary!", 2);
        indexed(&store, dir.path(), "copy2.bin", b"binary!", 3);

        let result = resolver.sweep().unwrap();
        assert_eq!(result.deleted, 1);
        assert!(dir.path().join("app.exe").exists());
        assert!(dir.path().join("copy2.bin").exists());
        assert!(!dir.path().join("copy1.bin").exists());
    }

    #[test]
    fn test_repeated_location_is_never_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let resolver = DuplicateResolver::new(store.clone(), settings(RetentionStrategy::KeepNewest));

        let first = indexed(&store, dir.path(), "only.bin", b"payload", 1);
        let mut repeat = first.clone();
        repeat.id = first.id + 100;
        repeat.last_modified = millis_to_datetime(5);

        let resolution = resolver.resolve_group(vec![first.clone(), repeat]);
        assert_eq!(resolution.deleted, 0);
        assert_eq!(resolution.stale_records, 1);
        assert!(first.path().exists());
    }

    #[test]
    fn test_checking_a_whole_batch_counts_each_copy_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let resolver = DuplicateResolver::new(store.clone(), settings(RetentionStrategy::KeepOldest));

        let batch = vec![
            indexed(&store, dir.path(), "a.bin", b"payload", 3),
            indexed(&store, dir.path(), "b.bin", b"payload", 1),
            indexed(&store, dir.path(), "c.bin", b"payload", 2),
        ];
        for record in &batch {
            resolver.check_one(record).unwrap();
        }

        let stats = resolver.statistics().unwrap();
        assert_eq!(stats.duplicates_detected, 2);
        assert_eq!(stats.duplicates_deleted, 2);
        assert!(dir.path().join("b.bin").exists());
        assert_eq!(store.count().unwrap(), 1);
    }
}
