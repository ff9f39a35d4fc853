use parking_lot::Mutex;
use rusqlite::{Connection, Result};
use tracing::debug;

use super::models::FileRecord;
use super::MetadataStore;
use crate::error::Error;

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        let db = Database { conn };
        db.configure_pragmas()?;
        db.migrate_schema()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.configure_pragmas()?;
        db.migrate_schema()?;
        Ok(db)
    }

    fn configure_pragmas(&self) -> Result<()> {
        self.conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -64000;
             PRAGMA busy_timeout = 5000;",
        )?;
        debug!("SQLite pragmas configured (WAL mode, 64MB cache)");
        Ok(())
    }

    fn migrate_schema(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))?;

        if version < 1 {
            debug!("Schema version {} < 1, creating file_record", version);
            self.conn.execute_batch(include_str!("schema.sql"))?;
        }
        debug!("SQLite schema initialized (version 1)");
        Ok(())
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn truncate_all(&self) -> Result<()> {
        self.conn.execute_batch("DELETE FROM file_record;")?;
        debug!("All tables truncated");
        Ok(())
    }
}

/// [`MetadataStore`] over a single SQLite connection.
pub struct SqliteStore {
    db: Mutex<Database>,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self { db: Mutex::new(db) }
    }

    pub fn open(path: &str) -> Result<Self, Error> {
        Ok(Self::new(Database::open(path)?))
    }

    pub fn open_in_memory() -> Result<Self, Error> {
        Ok(Self::new(Database::open_in_memory()?))
    }
}

impl MetadataStore for SqliteStore {
    fn batch_upsert(&self, records: &[FileRecord]) -> Result<Vec<FileRecord>, Error> {
        Ok(self.db.lock().upsert_file_records(records)?)
    }

    fn delete(&self, id: i64) -> Result<(), Error> {
        self.db.lock().delete_file_record(id)?;
        Ok(())
    }

    fn delete_by_path(&self, directory: &str, name: &str) -> Result<usize, Error> {
        Ok(self.db.lock().delete_file_records_at(directory, name)?)
    }

    fn find_by_hash_excluding(&self, hash: &str, exclude_id: i64) -> Result<Vec<FileRecord>, Error> {
        Ok(self.db.lock().get_files_by_hash_excluding(hash, exclude_id)?)
    }

    fn find_by_hash(&self, hash: &str) -> Result<Vec<FileRecord>, Error> {
        Ok(self.db.lock().get_files_by_hash(hash)?)
    }

    fn find_duplicate_hashes(&self, min_size: u64) -> Result<Vec<String>, Error> {
        Ok(self.db.lock().get_duplicate_hashes(min_size)?)
    }

    fn count(&self) -> Result<u64, Error> {
        Ok(self.db.lock().get_file_count()?)
    }

    fn count_duplicate_hashes(&self, min_size: u64) -> Result<u64, Error> {
        Ok(self.db.lock().get_duplicate_hash_count(min_size)?)
    }

    fn find_by_size_between(&self, min: u64, max: u64) -> Result<Vec<FileRecord>, Error> {
        Ok(self.db.lock().get_files_by_size_between(min, max)?)
    }

    fn find_by_directory_prefix(&self, prefix: &str) -> Result<Vec<FileRecord>, Error> {
        Ok(self.db.lock().get_files_under_directory(prefix)?)
    }

    fn count_by_content_type(&self) -> Result<Vec<(String, u64)>, Error> {
        Ok(self.db.lock().get_content_type_counts()?)
    }

    fn total_size(&self) -> Result<u64, Error> {
        Ok(self.db.lock().get_total_size()?)
    }

    fn potential_savings(&self, min_size: u64) -> Result<u64, Error> {
        Ok(self.db.lock().get_potential_savings(min_size)?)
    }

    fn truncate(&self) -> Result<(), Error> {
        self.db.lock().truncate_all()?;
        Ok(())
    }
}
