//! Indexing admission filter.
//!
//! [`PathFilter::should_index`] runs an ordered list of checks and stops at
//! the first one that fails. Any error while probing the entry denies it.

mod patterns;

pub use patterns::PatternSet;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, trace};

use crate::platform::{self, SystemFileProbe};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub included_extensions: Vec<String>,
    pub excluded_extensions: Vec<String>,
    /// Path fragments; a file whose absolute path contains one is skipped.
    pub excluded_directories: Vec<String>,
    pub min_file_size: u64,
    pub max_file_size: u64,
    pub included_patterns: Vec<String>,
    pub excluded_patterns: Vec<String>,
    pub skip_hidden_files: bool,
    pub skip_system_files: bool,
    pub skip_read_only_files: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            included_extensions: Vec::new(),
            excluded_extensions: [".tmp", ".log", ".cache", ".lock"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            excluded_directories: ["$RECYCLE.BIN", "System Volume Information", ".git", "node_modules"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            min_file_size: 0,
            max_file_size: i64::MAX as u64,
            included_patterns: Vec::new(),
            excluded_patterns: Vec::new(),
            skip_hidden_files: true,
            skip_system_files: true,
            skip_read_only_files: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterStatistics {
    pub included_extensions: usize,
    pub excluded_extensions: usize,
    pub excluded_directories: usize,
    pub included_patterns: usize,
    pub excluded_patterns: usize,
    pub min_file_size: u64,
    pub max_file_size: u64,
}

#[derive(Debug)]
pub struct PathFilter {
    config: FilterConfig,
    included_extensions: Vec<String>,
    excluded_extensions: Vec<String>,
    patterns: RwLock<Arc<PatternSet>>,
    probe: Arc<dyn SystemFileProbe>,
}

impl PathFilter {
    pub fn new(config: FilterConfig) -> Self {
        Self::with_probe(config, platform::native_probe())
    }

    pub fn with_probe(config: FilterConfig, probe: Arc<dyn SystemFileProbe>) -> Self {
        let patterns = PatternSet::compile(&config.included_patterns, &config.excluded_patterns);
        info!(
            "Initialized file filters - {} included patterns, {} excluded patterns",
            patterns.included_count(),
            patterns.excluded_count()
        );
        Self {
            included_extensions: normalize_extensions(&config.included_extensions),
            excluded_extensions: normalize_extensions(&config.excluded_extensions),
            config,
            patterns: RwLock::new(Arc::new(patterns)),
            probe,
        }
    }

    pub fn should_index(&self, path: &Path) -> bool {
        let metadata = match fs::symlink_metadata(path) {
            Ok(metadata) => metadata,
            Err(e) => {
                trace!("Cannot stat {}: {}", path.display(), e);
                return false;
            }
        };
        if !metadata.file_type().is_file() {
            return false;
        }

        let config = &self.config;
        if config.skip_hidden_files && self.probe.is_hidden(path, &metadata) {
            return false;
        }
        if config.skip_system_files && self.probe.is_system_file(path, &metadata) {
            return false;
        }
        if config.skip_read_only_files && metadata.permissions().readonly() {
            return false;
        }

        let path_str = path.to_string_lossy();
        if config
            .excluded_directories
            .iter()
            .any(|fragment| path_str.contains(fragment.as_str()))
        {
            return false;
        }

        let size = metadata.len();
        if size < config.min_file_size || size > config.max_file_size {
            return false;
        }

        let file_name = match path.file_name() {
            Some(name) => name.to_string_lossy(),
            None => return false,
        };
        if !self.extension_allowed(extension_of(&file_name)) {
            return false;
        }

        self.current_patterns().allows(&file_name)
    }

    fn extension_allowed(&self, extension: &str) -> bool {
        if !self.included_extensions.is_empty()
            && !self
                .included_extensions
                .iter()
                .any(|ext| ext.eq_ignore_ascii_case(extension))
        {
            return false;
        }
        !self
            .excluded_extensions
            .iter()
            .any(|ext| ext.eq_ignore_ascii_case(extension))
    }

    /// Swap in a freshly compiled pattern set. Readers holding the old set
    /// keep using it until their check finishes.
    pub fn update_patterns(&self, included: &[String], excluded: &[String]) -> Arc<PatternSet> {
        let fresh = Arc::new(PatternSet::compile(included, excluded));
        *self.patterns.write() = Arc::clone(&fresh);
        info!(
            "Updated file filter patterns - {} included, {} excluded",
            fresh.included_count(),
            fresh.excluded_count()
        );
        fresh
    }

    pub fn current_patterns(&self) -> Arc<PatternSet> {
        Arc::clone(&self.patterns.read())
    }

    /// The configuration in effect, including runtime pattern updates.
    pub fn effective_config(&self) -> FilterConfig {
        let patterns = self.current_patterns();
        FilterConfig {
            included_patterns: patterns.included_sources(),
            excluded_patterns: patterns.excluded_sources(),
            ..self.config.clone()
        }
    }

    pub fn statistics(&self) -> FilterStatistics {
        let patterns = self.current_patterns();
        FilterStatistics {
            included_extensions: self.config.included_extensions.len(),
            excluded_extensions: self.config.excluded_extensions.len(),
            excluded_directories: self.config.excluded_directories.len(),
            included_patterns: patterns.included_count(),
            excluded_patterns: patterns.excluded_count(),
            min_file_size: self.config.min_file_size,
            max_file_size: self.config.max_file_size,
        }
    }
}

/// Last dot suffix including the dot, or "" for names like `.bashrc` or `file.`.
pub(crate) fn extension_of(file_name: &str) -> &str {
    match file_name.rfind('.') {
        Some(idx) if idx > 0 && idx < file_name.len() - 1 => &file_name[idx..],
        _ => "",
    }
}

fn normalize_extensions(extensions: &[String]) -> Vec<String> {
    extensions
        .iter()
        .map(|ext| ext.trim())
        .filter(|ext| !ext.is_empty())
        .map(|ext| {
            if ext.starts_with('.') {
                ext.to_string()
            } else {
                format!(".{}", ext)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn permissive() -> FilterConfig {
        FilterConfig {
            excluded_extensions: Vec::new(),
            excluded_directories: Vec::new(),
            skip_hidden_files: false,
            skip_system_files: false,
            ..FilterConfig::default()
        }
    }

    fn write(dir: &Path, name: &str, len: usize) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, vec![b'x'; len]).unwrap();
        path
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("movie.MKV"), ".MKV");
        assert_eq!(extension_of("archive.tar.gz"), ".gz");
        assert_eq!(extension_of(".bashrc"), "");
        assert_eq!(extension_of("trailing."), "");
        assert_eq!(extension_of("noext"), "");
    }

    #[test]
    fn test_directories_and_missing_paths_denied() {
        let dir = tempfile::tempdir().unwrap();
        let filter = PathFilter::new(permissive());
        assert!(!filter.should_index(dir.path()));
        assert!(!filter.should_index(&dir.path().join("missing.txt")));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_denied() {
        let dir = tempfile::tempdir().unwrap();
        let target = write(dir.path(), "target.txt", 10);
        let link = dir.path().join("link.txt");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let filter = PathFilter::new(permissive());
        assert!(filter.should_index(&target));
        assert!(!filter.should_index(&link));
    }

    #[test]
    fn test_size_bounds_inclusive() {
        let dir = tempfile::tempdir().unwrap();
        let filter = PathFilter::new(FilterConfig {
            min_file_size: 10,
            max_file_size: 20,
            ..permissive()
        });
        assert!(!filter.should_index(&write(dir.path(), "a.bin", 9)));
        assert!(filter.should_index(&write(dir.path(), "b.bin", 10)));
        assert!(filter.should_index(&write(dir.path(), "c.bin", 20)));
        assert!(!filter.should_index(&write(dir.path(), "d.bin", 21)));
    }

    #[test]
    fn test_extension_lists_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        let filter = PathFilter::new(FilterConfig {
            included_extensions: vec![".jpg".into(), "png".into()],
            excluded_extensions: vec![".PNG".into()],
            ..permissive()
        });
        assert!(filter.should_index(&write(dir.path(), "a.JPG", 1)));
        assert!(!filter.should_index(&write(dir.path(), "b.png", 1)));
        assert!(!filter.should_index(&write(dir.path(), "c.gif", 1)));
    }

    #[test]
    fn test_excluded_directory_fragment() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("project").join("node_modules");
        fs::create_dir_all(&nested).unwrap();
        let filter = PathFilter::new(FilterConfig {
            excluded_directories: vec!["node_modules".into()],
            ..permissive()
        });
        assert!(!filter.should_index(&write(&nested, "index.js", 5)));
        assert!(filter.should_index(&write(dir.path(), "index.js", 5)));
    }

    #[cfg(unix)]
    #[test]
    fn test_hidden_and_system_flags() {
        let dir = tempfile::tempdir().unwrap();
        let hidden = write(dir.path(), ".secret", 5);

        assert!(PathFilter::new(permissive()).should_index(&hidden));
        let skip_hidden = PathFilter::new(FilterConfig {
            skip_hidden_files: true,
            ..permissive()
        });
        assert!(!skip_hidden.should_index(&hidden));
        let skip_system = PathFilter::new(FilterConfig {
            skip_system_files: true,
            ..permissive()
        });
        assert!(!skip_system.should_index(&hidden));
    }

    #[test]
    fn test_read_only_flag() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "locked.txt", 5);
        let mut perms = fs::metadata(&path).unwrap().permissions();
        perms.set_readonly(true);
        fs::set_permissions(&path, perms).unwrap();

        assert!(PathFilter::new(permissive()).should_index(&path));
        let filter = PathFilter::new(FilterConfig {
            skip_read_only_files: true,
            ..permissive()
        });
        assert!(!filter.should_index(&path));
    }

    #[test]
    fn test_pattern_update_swaps_whole_set() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "draft_v2.docx", 5);
        let filter = PathFilter::new(FilterConfig {
            excluded_patterns: vec!["draft_.*".into()],
            ..permissive()
        });
        assert!(!filter.should_index(&path));

        let before = filter.current_patterns();
        filter.update_patterns(&[r".*\.docx".into()], &["(broken".into()]);
        assert!(filter.should_index(&path));
        assert_eq!(before.excluded_count(), 1);

        let stats = filter.statistics();
        assert_eq!(stats.included_patterns, 1);
        assert_eq!(stats.excluded_patterns, 0);
        assert_eq!(
            filter.effective_config().included_patterns,
            vec![r".*\.docx".to_string()]
        );
    }

    #[test]
    fn test_decision_is_repeatable() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "repeat.bin", 42);
        let filter = PathFilter::new(FilterConfig::default());
        let first = filter.should_index(&path);
        for _ in 0..5 {
            assert_eq!(first, filter.should_index(&path));
        }
        assert!(path.exists());
    }
}
