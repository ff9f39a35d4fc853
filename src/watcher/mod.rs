//! Live filesystem watcher.
//!
//! Every directory of the tree gets its own non-recursive subscription so
//! new subdirectories can be picked up (and system directories skipped) as
//! they appear. Created files go through the pipeline's per-file path;
//! removed entries are dropped from the store.

mod registry;

pub use registry::WatchRegistry;

use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender};
use notify::event::{AccessKind, AccessMode, ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, Watcher};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, trace, warn};

use crate::error::Error;
use crate::platform;
use crate::scanner::IngestionPipeline;
use crate::storage::MetadataStore;

pub struct FilesystemWatcher {
    root: PathBuf,
    registry: WatchRegistry<RecommendedWatcher>,
    events: Receiver<notify::Result<Event>>,
    pipeline: Arc<IngestionPipeline>,
    store: Arc<dyn MetadataStore>,
}

/// Handle to a watcher running on its own thread.
pub struct WatcherHandle {
    root: PathBuf,
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl FilesystemWatcher {
    pub fn new(
        root: &Path,
        pipeline: Arc<IngestionPipeline>,
        store: Arc<dyn MetadataStore>,
    ) -> Result<Self, Error> {
        let (events_tx, events_rx) = unbounded();
        let watcher = RecommendedWatcher::new(
            move |result: notify::Result<Event>| {
                if events_tx.send(result).is_err() {
                    trace!("Watcher event dropped after shutdown");
                }
            },
            Config::default(),
        )?;

        let mut registry = WatchRegistry::new(watcher);
        let count = registry.register_tree(root);
        info!("Watching {} directories under {}", count, root.display());

        Ok(Self {
            root: root.to_path_buf(),
            registry,
            events: events_rx,
            pipeline,
            store,
        })
    }

    pub fn watched_directories(&self) -> usize {
        self.registry.len()
    }

    /// Process events until `stop` fires or nothing is left to watch.
    pub fn run(mut self, stop: Receiver<()>) {
        let events = self.events.clone();
        loop {
            if self.registry.is_empty() {
                info!("No directories left to watch under {}", self.root.display());
                break;
            }
            select! {
                recv(stop) -> _ => {
                    info!("Stopping watcher for {}", self.root.display());
                    break;
                }
                recv(events) -> message => match message {
                    Ok(Ok(event)) => self.handle_event(event),
                    Ok(Err(e)) => warn!("Watch error under {}: {}", self.root.display(), e),
                    Err(_) => break,
                },
            }
        }
    }

    pub fn spawn(self) -> Result<WatcherHandle, Error> {
        let (stop_tx, stop_rx) = bounded(1);
        let root = self.root.clone();
        let handle = thread::Builder::new()
            .name("fs-watcher".to_string())
            .spawn(move || self.run(stop_rx))?;
        Ok(WatcherHandle {
            root,
            stop: Some(stop_tx),
            handle: Some(handle),
        })
    }

    pub fn handle_event(&mut self, event: Event) {
        trace!("Watch event {:?} {:?}", event.kind, event.paths);
        match event.kind {
            EventKind::Create(_) => {
                for path in &event.paths {
                    self.on_created(path);
                }
            }
            EventKind::Remove(_) => {
                for path in &event.paths {
                    self.on_removed(path);
                }
            }
            EventKind::Modify(ModifyKind::Name(mode)) => match mode {
                RenameMode::From => {
                    for path in &event.paths {
                        self.on_removed(path);
                    }
                }
                RenameMode::To => {
                    for path in &event.paths {
                        self.on_created(path);
                    }
                }
                RenameMode::Both if event.paths.len() == 2 => {
                    self.on_removed(&event.paths[0]);
                    self.on_created(&event.paths[1]);
                }
                _ => {
                    for path in &event.paths {
                        if fs::symlink_metadata(path).is_ok() {
                            self.on_created(path);
                        } else {
                            self.on_removed(path);
                        }
                    }
                }
            },
            EventKind::Access(AccessKind::Close(AccessMode::Write)) => {
                for path in &event.paths {
                    if path.is_file() {
                        self.pipeline.ingest_file(path);
                    }
                }
            }
            _ => {}
        }
    }

    fn on_created(&mut self, path: &Path) {
        let metadata = match fs::symlink_metadata(path) {
            Ok(metadata) => metadata,
            Err(e) => {
                debug!("Created entry {} vanished: {}", path.display(), e);
                return;
            }
        };

        if metadata.is_dir() {
            if platform::is_system_directory(path) {
                debug!("Skipping system directory {}", path.display());
                return;
            }
            let count = self.registry.register_tree(path);
            debug!("Now watching {} new directories under {}", count, path.display());
        } else if self.pipeline.ingest_file(path) {
            debug!("New file queued: {}", path.display());
        }
    }

    fn on_removed(&mut self, path: &Path) {
        let (directory, name) = match (path.parent(), path.file_name()) {
            (Some(directory), Some(name)) => (
                directory.to_string_lossy().into_owned(),
                name.to_string_lossy().into_owned(),
            ),
            _ => return,
        };

        match self.store.delete_by_path(&directory, &name) {
            Ok(0) => {}
            Ok(count) => debug!("File deleted and metadata removed: {} ({})", path.display(), count),
            Err(e) => error!("Unable to process deleted file {}: {}", path.display(), e),
        }

        if self.registry.contains(path) {
            let pruned = self.registry.prune(path);
            debug!("Stopped watching {} directories under {}", pruned.len(), path.display());
            self.forget_tree(path);
        }
    }

    fn forget_tree(&self, dir: &Path) {
        let records = match self.store.find_by_directory_prefix(&dir.to_string_lossy()) {
            Ok(records) => records,
            Err(e) => {
                error!("Unable to list records under {}: {}", dir.display(), e);
                return;
            }
        };
        for record in &records {
            if let Err(e) = self.store.delete(record.id) {
                error!("Unable to remove record {}: {}", record.id, e);
            }
        }
        if !records.is_empty() {
            debug!("Removed {} records under {}", records.len(), dir.display());
        }
    }
}

impl WatcherHandle {
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |handle| handle.is_finished())
    }

    /// Signal the watcher to stop and wait for its thread.
    pub fn stop(mut self) {
        self.shutdown();
    }

    /// Wait for the watcher to end on its own (its tree vanished).
    pub fn wait(mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Watcher thread for {} panicked", self.root.display());
            }
        }
    }

    fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Watcher thread for {} panicked", self.root.display());
            }
        }
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
