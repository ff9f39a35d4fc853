//! Platform-specific file attribute probes.
//!
//! Windows exposes hidden/system as file attributes; elsewhere they are
//! inferred from the name and location of the entry.

#[cfg(target_os = "windows")]
pub mod windows;

#[cfg(not(target_os = "windows"))]
pub mod unix;

use std::fmt::Debug;
use std::fs::Metadata;
use std::path::Path;
use std::sync::Arc;

pub trait SystemFileProbe: Send + Sync + Debug {
    fn is_hidden(&self, path: &Path, metadata: &Metadata) -> bool;

    fn is_system_file(&self, path: &Path, metadata: &Metadata) -> bool;
}

#[cfg(target_os = "windows")]
pub fn native_probe() -> Arc<dyn SystemFileProbe> {
    Arc::new(windows::AttributeProbe)
}

#[cfg(not(target_os = "windows"))]
pub fn native_probe() -> Arc<dyn SystemFileProbe> {
    Arc::new(unix::NameProbe)
}

/// Recycle-bin style directories that are never watched.
pub fn is_system_directory(dir: &Path) -> bool {
    match dir.file_name() {
        Some(name) => {
            let name = name.to_string_lossy();
            name == "$RECYCLE.BIN" || name.starts_with('$') || name == "System Volume Information"
        }
        None => false,
    }
}
