use notify::{RecursiveMode, Watcher};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::platform;

/// Directories with a live, non-recursive subscription.
pub struct WatchRegistry<W: Watcher> {
    watcher: W,
    watched: BTreeSet<PathBuf>,
}

impl<W: Watcher> WatchRegistry<W> {
    pub fn new(watcher: W) -> Self {
        Self {
            watcher,
            watched: BTreeSet::new(),
        }
    }

    /// Subscribe to `root` and every directory below it, skipping system
    /// directories and any subtree that cannot be subscribed. Returns the
    /// number of newly watched directories.
    pub fn register_tree(&mut self, root: &Path) -> usize {
        let mut registered = 0;
        let mut entries = WalkDir::new(root).follow_links(false).into_iter();
        while let Some(entry) = entries.next() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Error while registering directories: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_dir() {
                continue;
            }
            let dir = entry.path();
            if platform::is_system_directory(dir) {
                entries.skip_current_dir();
                continue;
            }
            if self.watched.contains(dir) {
                continue;
            }
            match self.watcher.watch(dir, RecursiveMode::NonRecursive) {
                Ok(()) => {
                    self.watched.insert(dir.to_path_buf());
                    registered += 1;
                }
                Err(e) => {
                    warn!("Cannot watch directory {} - skipping: {}", dir.display(), e);
                    entries.skip_current_dir();
                }
            }
        }
        debug!("Registered {} directories under {}", registered, root.display());
        registered
    }

    /// Drop `dir` and every watched directory below it.
    pub fn prune(&mut self, dir: &Path) -> Vec<PathBuf> {
        let pruned: Vec<PathBuf> = self
            .watched
            .iter()
            .filter(|watched| watched.starts_with(dir))
            .cloned()
            .collect();
        for path in &pruned {
            self.watched.remove(path);
            if let Err(e) = self.watcher.unwatch(path) {
                debug!("Unwatch {} failed: {}", path.display(), e);
            }
        }
        pruned
    }

    pub fn contains(&self, dir: &Path) -> bool {
        self.watched.contains(dir)
    }

    pub fn len(&self) -> usize {
        self.watched.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watched.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::{Config, RecommendedWatcher};
    use std::fs;

    fn registry() -> WatchRegistry<RecommendedWatcher> {
        let watcher = RecommendedWatcher::new(|_res: notify::Result<notify::Event>| {}, Config::default())
            .unwrap();
        WatchRegistry::new(watcher)
    }

    #[test]
    fn test_registers_tree_without_system_dirs() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a").join("b")).unwrap();
        fs::create_dir_all(dir.path().join("$RECYCLE.BIN").join("inner")).unwrap();
        fs::write(dir.path().join("a").join("file.txt"), "x").unwrap();

        let mut registry = registry();
        assert_eq!(registry.register_tree(dir.path()), 3);
        assert!(registry.contains(&dir.path().join("a").join("b")));
        assert!(!registry.contains(&dir.path().join("$RECYCLE.BIN")));
        assert!(!registry.contains(&dir.path().join("$RECYCLE.BIN").join("inner")));

        assert_eq!(registry.register_tree(dir.path()), 0);
    }

    #[test]
    fn test_prune_removes_descendants() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a").join("b")).unwrap();
        fs::create_dir_all(dir.path().join("ab")).unwrap();

        let mut registry = registry();
        registry.register_tree(dir.path());
        assert_eq!(registry.len(), 4);

        let pruned = registry.prune(&dir.path().join("a"));
        assert_eq!(pruned.len(), 2);
        assert!(registry.contains(&dir.path().join("ab")));
        assert_eq!(registry.len(), 2);
    }
}
