use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::analysis::RetentionStrategy;
use crate::error::Error;
use crate::filter::FilterConfig;
use crate::scanner::HashExecutorKind;

const ENV_PREFIX: &str = "LIVE_DUPER";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub root_paths: Vec<String>,
    pub processing: ProcessingConfig,
    pub duplicate_detection: DuplicateDetectionConfig,
    pub file_filter: FilterConfig,
    pub database: DatabaseConfig,
    pub performance: PerformanceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Traversal pool size.
    pub parallelism: usize,
    pub queue_capacity: usize,
    pub batch_size: usize,
    /// How long a producer waits on a full persistence queue before dropping.
    pub queue_offer_timeout_secs: u64,
    pub max_concurrent_scans: usize,
    /// Run the per-record duplicate check after every persisted batch.
    pub check_duplicates_on_ingest: bool,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            parallelism: available_cpus(),
            queue_capacity: 10_000,
            batch_size: 500,
            queue_offer_timeout_secs: 5,
            max_concurrent_scans: 3,
            check_duplicates_on_ingest: true,
        }
    }
}

impl ProcessingConfig {
    pub fn queue_offer_timeout(&self) -> Duration {
        Duration::from_secs(self.queue_offer_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DuplicateDetectionConfig {
    pub auto_delete: bool,
    pub deletion_strategy: RetentionStrategy,
    pub min_file_size_for_duplication: u64,
    pub duplicate_check_delay_secs: u64,
    pub protected_extensions: Vec<String>,
    pub enable_deduplication_logging: bool,
}

impl Default for DuplicateDetectionConfig {
    fn default() -> Self {
        Self {
            auto_delete: true,
            deletion_strategy: RetentionStrategy::KeepOldest,
            min_file_size_for_duplication: 1024,
            duplicate_check_delay_secs: 30,
            protected_extensions: [".exe", ".dll", ".sys", ".ini"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            enable_deduplication_logging: true,
        }
    }
}

impl DuplicateDetectionConfig {
    pub fn duplicate_check_delay(&self) -> Duration {
        Duration::from_secs(self.duplicate_check_delay_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "live_duper.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    pub io_buffer_size: usize,
    pub hashing_threads: usize,
    pub hash_executor: HashExecutorKind,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            io_buffer_size: crate::hasher::DEFAULT_BUFFER_SIZE,
            hashing_threads: available_cpus(),
            hash_executor: HashExecutorKind::Fixed,
        }
    }
}

impl AppConfig {
    /// Reject values that would stall or deadlock the pipeline.
    pub fn validate(&self) -> Result<(), Error> {
        let p = &self.processing;
        if p.parallelism == 0 {
            return Err(Error::InvalidConfig("processing.parallelism must be > 0".into()));
        }
        if p.queue_capacity == 0 {
            return Err(Error::InvalidConfig("processing.queue_capacity must be > 0".into()));
        }
        if p.batch_size == 0 {
            return Err(Error::InvalidConfig("processing.batch_size must be > 0".into()));
        }
        if p.max_concurrent_scans == 0 {
            return Err(Error::InvalidConfig(
                "processing.max_concurrent_scans must be > 0".into(),
            ));
        }
        if self.performance.hashing_threads == 0 {
            return Err(Error::InvalidConfig("performance.hashing_threads must be > 0".into()));
        }
        if self.performance.io_buffer_size == 0 {
            return Err(Error::InvalidConfig("performance.io_buffer_size must be > 0".into()));
        }
        let f = &self.file_filter;
        if f.min_file_size > f.max_file_size {
            return Err(Error::InvalidConfig(format!(
                "file_filter.min_file_size ({}) exceeds max_file_size ({})",
                f.min_file_size, f.max_file_size
            )));
        }
        Ok(())
    }

    /// Configured roots with nested roots collapsed into their ancestors.
    pub fn scan_roots(&self) -> Vec<PathBuf> {
        non_overlapping_directories(self.root_paths.iter().map(PathBuf::from).collect())
    }
}

pub fn load_configuration() -> Result<AppConfig, ConfigError> {
    load_configuration_from(None)
}

/// Defaults < `Config.toml` (or `path`) < `LIVE_DUPER__*` environment variables.
pub fn load_configuration_from(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let file_source = match path {
        Some(path) => ConfigFile::from(path).required(true),
        None => ConfigFile::with_name("Config").required(false),
    };
    let builder = Config::builder()
        .add_source(file_source)
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("root_paths"),
        )
        .build()?;
    builder.try_deserialize::<AppConfig>()
}

/// Remove directories that are subdirectories of other directories in the list.
pub fn non_overlapping_directories(dirs: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::with_capacity(dirs.len());

    for dir in dirs {
        if result.iter().any(|kept| dir.starts_with(kept)) {
            continue;
        }
        result.retain(|kept| !kept.starts_with(&dir));
        result.push(dir);
    }

    result
}

fn available_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
