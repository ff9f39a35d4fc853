use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use std::path::PathBuf;

/// One indexed file.
///
/// `id == 0` means the record has not been persisted yet. `hash` is only set
/// when the whole file was read; records without one never take part in
/// duplicate grouping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    pub id: i64,
    pub name: String,
    pub directory: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
    pub content_type: Option<String>,
    pub hash: Option<String>,
}

impl FileRecord {
    pub fn path(&self) -> PathBuf {
        PathBuf::from(&self.directory).join(&self.name)
    }

    pub fn is_persisted(&self) -> bool {
        self.id != 0
    }

    pub(crate) fn last_modified_millis(&self) -> i64 {
        self.last_modified.timestamp_millis()
    }
}

pub(crate) fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}
