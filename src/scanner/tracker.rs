use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Counts in-flight work and lets callers block until it drains.
#[derive(Debug, Clone, Default)]
pub struct TaskTracker {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    active: Mutex<usize>,
    idle: Condvar,
}

/// Decrements its tracker when dropped.
#[derive(Debug)]
pub struct TaskGuard {
    inner: Arc<Inner>,
}

impl TaskTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self) -> TaskGuard {
        self.enter(1);
        TaskGuard {
            inner: Arc::clone(&self.inner),
        }
    }

    pub fn enter(&self, count: usize) {
        *self.inner.active.lock() += count;
    }

    pub fn exit(&self, count: usize) {
        self.inner.exit(count);
    }

    pub fn active(&self) -> usize {
        *self.inner.active.lock()
    }

    pub fn wait_idle(&self) {
        let mut active = self.inner.active.lock();
        while *active > 0 {
            self.inner.idle.wait(&mut active);
        }
    }

    /// Returns false if work was still in flight when `timeout` elapsed.
    pub fn wait_idle_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut active = self.inner.active.lock();
        while *active > 0 {
            if self.inner.idle.wait_until(&mut active, deadline).timed_out() {
                return *active == 0;
            }
        }
        true
    }
}

impl Inner {
    fn exit(&self, count: usize) {
        let mut active = self.active.lock();
        *active = active.saturating_sub(count);
        if *active == 0 {
            self.idle.notify_all();
        }
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.inner.exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_idle_tracker_does_not_block() {
        let tracker = TaskTracker::new();
        tracker.wait_idle();
        assert!(tracker.wait_idle_timeout(Duration::from_millis(1)));
    }

    #[test]
    fn test_waits_for_guards_on_other_threads() {
        let tracker = TaskTracker::new();
        let guards: Vec<TaskGuard> = (0..4).map(|_| tracker.begin()).collect();
        assert_eq!(tracker.active(), 4);

        let handles: Vec<_> = guards
            .into_iter()
            .map(|guard| {
                thread::spawn(move || {
                    thread::sleep(Duration::from_millis(20));
                    drop(guard);
                })
            })
            .collect();

        tracker.wait_idle();
        assert_eq!(tracker.active(), 0);
        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn test_timeout_reports_pending_work() {
        let tracker = TaskTracker::new();
        let _guard = tracker.begin();
        assert!(!tracker.wait_idle_timeout(Duration::from_millis(10)));
    }
}
