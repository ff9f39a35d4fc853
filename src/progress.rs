use std::path::Path;

use crate::analysis::SweepResult;
use crate::scanner::ScanResult;

/// Trait for reporting pipeline and resolver progress.
///
/// The CLI implements it with colored console output. All methods have
/// default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    fn on_scan_start(&self, _root: &Path) {}
    fn on_file_indexed(&self, _path: &Path, _size: u64) {}
    fn on_scan_complete(&self, _result: &ScanResult) {}
    fn on_sweep_complete(&self, _result: &SweepResult) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}
