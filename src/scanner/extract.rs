use chrono::{DateTime, Utc};
use std::fs;
use std::io;
use std::path::Path;

use crate::storage::FileRecord;

/// Builds an unsaved, unhashed record from the entry's current metadata.
pub fn extract_metadata(path: &Path) -> io::Result<FileRecord> {
    let metadata = fs::metadata(path)?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;
    let directory = path
        .parent()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default();
    let last_modified: DateTime<Utc> = metadata.modified()?.into();
    let content_type = mime_guess::from_path(path)
        .first()
        .map(|mime| mime.essence_str().to_string());

    Ok(FileRecord {
        id: 0,
        name,
        directory,
        size: metadata.len(),
        last_modified,
        content_type,
        hash: None,
    })
}
