use crossbeam_channel::{bounded, Receiver, SendTimeoutError, Sender};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, warn};

use super::stats::PipelineStats;
use super::tracker::TaskTracker;
use crate::analysis::DuplicateResolver;
use crate::error::Error;
use crate::storage::{FileRecord, MetadataStore};

/// Bounded hand-off between producers and the single batch writer thread.
pub struct Persister {
    sender: RwLock<Option<Sender<FileRecord>>>,
    offer_timeout: Duration,
    pending: TaskTracker,
    stats: Arc<PipelineStats>,
    writer: Mutex<Option<JoinHandle<()>>>,
}

pub struct PersisterSettings {
    pub queue_capacity: usize,
    pub batch_size: usize,
    pub offer_timeout: Duration,
}

struct Writer {
    receiver: Receiver<FileRecord>,
    store: Arc<dyn MetadataStore>,
    batch_size: usize,
    stats: Arc<PipelineStats>,
    pending: TaskTracker,
    resolver: Option<Arc<DuplicateResolver>>,
}

impl Persister {
    pub fn start(
        settings: PersisterSettings,
        store: Arc<dyn MetadataStore>,
        stats: Arc<PipelineStats>,
        resolver: Option<Arc<DuplicateResolver>>,
    ) -> Result<Self, Error> {
        let (sender, receiver) = bounded(settings.queue_capacity.max(1));
        let pending = TaskTracker::new();
        let writer = Writer {
            receiver,
            store,
            batch_size: settings.batch_size.max(1),
            stats: Arc::clone(&stats),
            pending: pending.clone(),
            resolver,
        };
        let handle = thread::Builder::new()
            .name("metadata-writer".to_string())
            .spawn(move || writer.run())?;

        Ok(Self {
            sender: RwLock::new(Some(sender)),
            offer_timeout: settings.offer_timeout,
            pending,
            stats,
            writer: Mutex::new(Some(handle)),
        })
    }

    /// Queue a record for the writer. Returns false if it was dropped.
    pub fn offer(&self, record: FileRecord) -> bool {
        let sender = match self.sender.read().as_ref() {
            Some(sender) => sender.clone(),
            None => {
                warn!("Persistence closed, dropping {}", record.path().display());
                self.stats.record_dropped();
                return false;
            }
        };

        self.pending.enter(1);
        match sender.send_timeout(record, self.offer_timeout) {
            Ok(()) => true,
            Err(SendTimeoutError::Timeout(record)) => {
                self.pending.exit(1);
                self.stats.record_dropped();
                warn!(
                    "Persistence queue full for {:?}, dropping {}",
                    self.offer_timeout,
                    record.path().display()
                );
                false
            }
            Err(SendTimeoutError::Disconnected(record)) => {
                self.pending.exit(1);
                self.stats.record_dropped();
                error!("Metadata writer gone, dropping {}", record.path().display());
                false
            }
        }
    }

    pub fn queue_depth(&self) -> usize {
        self.sender.read().as_ref().map_or(0, |sender| sender.len())
    }

    /// Block until every accepted record has been written (or failed).
    pub fn flush(&self) {
        self.pending.wait_idle();
    }

    /// Stop accepting records, drain the queue and join the writer.
    pub fn close(&self) {
        self.sender.write().take();
        if let Some(handle) = self.writer.lock().take() {
            if handle.join().is_err() {
                error!("Metadata writer thread panicked");
            }
        }
    }
}

impl Drop for Persister {
    fn drop(&mut self) {
        self.close();
    }
}

impl Writer {
    fn run(self) {
        debug!("Metadata writer started (batch size {})", self.batch_size);
        while let Ok(first) = self.receiver.recv() {
            let mut batch = Vec::with_capacity(self.batch_size);
            batch.push(first);
            while batch.len() < self.batch_size {
                match self.receiver.try_recv() {
                    Ok(record) => batch.push(record),
                    Err(_) => break,
                }
            }

            let count = batch.len();
            match self.store.batch_upsert(&batch) {
                Ok(saved) => {
                    self.stats.record_persisted(count);
                    debug!("Saved batch of {} records", count);
                    if let Some(resolver) = &self.resolver {
                        for record in &saved {
                            if let Err(e) = resolver.check_one(record) {
                                error!(
                                    "Duplicate check failed for {}: {}",
                                    record.path().display(),
                                    e
                                );
                            }
                        }
                    }
                }
                Err(e) => {
                    self.stats.record_persist_failures(count);
                    error!("Failed to save batch of {} records: {}", count, e);
                }
            }
            self.pending.exit(count);
        }
        debug!("Metadata writer stopped");
    }
}
