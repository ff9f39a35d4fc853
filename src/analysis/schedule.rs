use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{error, info};

use super::resolver::DuplicateResolver;
use crate::error::Error;
use crate::progress::ProgressReporter;

/// Runs [`DuplicateResolver::sweep`] with a fixed delay between the end of
/// one sweep and the start of the next.
pub struct SweepScheduler {
    stop: Mutex<Option<Sender<()>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl SweepScheduler {
    pub fn start(
        resolver: Arc<DuplicateResolver>,
        delay: Duration,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Result<Self, Error> {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let handle = thread::Builder::new()
            .name("duplicate-sweep".to_string())
            .spawn(move || loop {
                match stop_rx.recv_timeout(delay) {
                    Err(RecvTimeoutError::Timeout) => match resolver.sweep() {
                        Ok(result) => reporter.on_sweep_complete(&result),
                        Err(e) => error!("Error during scheduled duplicate sweep: {}", e),
                    },
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })?;
        info!("Scheduled duplicate sweep every {} seconds", delay.as_secs());

        Ok(Self {
            stop: Mutex::new(Some(stop_tx)),
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Stop scheduling. A sweep already running is allowed to finish.
    pub fn stop(&self) {
        self.stop.lock().take();
        if let Some(handle) = self.handle.lock().take() {
            if handle.join().is_err() {
                error!("Duplicate sweep thread panicked");
            }
        }
    }
}

impl Drop for SweepScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
