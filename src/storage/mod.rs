pub mod memory;
pub mod models;
pub mod queries;
pub mod sqlite;

pub use memory::MemoryStore;
pub use models::FileRecord;
pub use sqlite::{Database, SqliteStore};

use crate::error::Error;

/// Durable index of files, queried by the resolver and fed by the pipeline.
///
/// Implementations must be safe to share between the persistence writer, the
/// watcher and the resolver.
pub trait MetadataStore: Send + Sync {
    /// Persist a batch in one operation. Returns the records with their
    /// assigned ids, in input order.
    fn batch_upsert(&self, records: &[FileRecord]) -> Result<Vec<FileRecord>, Error>;

    fn delete(&self, id: i64) -> Result<(), Error>;

    /// Returns the number of records removed.
    fn delete_by_path(&self, directory: &str, name: &str) -> Result<usize, Error>;

    fn find_by_hash_excluding(&self, hash: &str, exclude_id: i64) -> Result<Vec<FileRecord>, Error>;

    /// All records with `hash`, in id order.
    fn find_by_hash(&self, hash: &str) -> Result<Vec<FileRecord>, Error>;

    /// Hashes shared by more than one record of at least `min_size` bytes.
    fn find_duplicate_hashes(&self, min_size: u64) -> Result<Vec<String>, Error>;

    fn count(&self) -> Result<u64, Error>;

    fn count_duplicate_hashes(&self, min_size: u64) -> Result<u64, Error>;

    fn find_by_size_between(&self, min: u64, max: u64) -> Result<Vec<FileRecord>, Error>;

    fn find_by_directory_prefix(&self, prefix: &str) -> Result<Vec<FileRecord>, Error>;

    fn count_by_content_type(&self) -> Result<Vec<(String, u64)>, Error>;

    fn total_size(&self) -> Result<u64, Error>;

    /// Bytes that would be reclaimed if every duplicate group kept one copy.
    fn potential_savings(&self, min_size: u64) -> Result<u64, Error>;

    fn truncate(&self) -> Result<(), Error>;
}
