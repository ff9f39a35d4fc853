use super::models::{millis_to_datetime, FileRecord};
use super::sqlite::Database;
use rusqlite::{params, Result, Row};
use std::path::MAIN_SEPARATOR;
use tracing::debug;

const FILE_COLUMNS: &str =
    "id, name, directory, file_size, last_modified, content_type, hash";

fn file_record_from_row(row: &Row<'_>) -> Result<FileRecord> {
    Ok(FileRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        directory: row.get(2)?,
        size: row.get::<_, i64>(3)? as u64,
        last_modified: millis_to_datetime(row.get(4)?),
        content_type: row.get(5)?,
        hash: row.get(6)?,
    })
}

fn to_sql_size(size: u64) -> i64 {
    size.min(i64::MAX as u64) as i64
}

impl Database {
    // ── File Records ─────────────────────────────────────────────

    /// Unsaved records replace whatever is indexed at the same location;
    /// saved records are rewritten in place.
    pub fn upsert_file_records(&self, records: &[FileRecord]) -> Result<Vec<FileRecord>> {
        let tx = self.connection().unchecked_transaction()?;
        let mut saved = Vec::with_capacity(records.len());
        {
            let mut clear_stmt = tx.prepare_cached(
                "DELETE FROM file_record WHERE directory = ?1 AND name = ?2",
            )?;
            let mut insert_stmt = tx.prepare_cached(
                "INSERT INTO file_record \
                 (name, directory, file_size, last_modified, content_type, hash) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            let mut replace_stmt = tx.prepare_cached(
                "INSERT OR REPLACE INTO file_record \
                 (id, name, directory, file_size, last_modified, content_type, hash) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;

            for record in records {
                let mut record = record.clone();
                if record.is_persisted() {
                    replace_stmt.execute(params![
                        record.id,
                        record.name,
                        record.directory,
                        to_sql_size(record.size),
                        record.last_modified_millis(),
                        record.content_type,
                        record.hash,
                    ])?;
                } else {
                    clear_stmt.execute(params![record.directory, record.name])?;
                    insert_stmt.execute(params![
                        record.name,
                        record.directory,
                        to_sql_size(record.size),
                        record.last_modified_millis(),
                        record.content_type,
                        record.hash,
                    ])?;
                    record.id = tx.last_insert_rowid();
                }
                saved.push(record);
            }
        }
        tx.commit()?;
        debug!("Upserted {} file records", saved.len());
        Ok(saved)
    }

    pub fn delete_file_record(&self, id: i64) -> Result<usize> {
        self.connection()
            .execute("DELETE FROM file_record WHERE id = ?1", params![id])
    }

    pub fn delete_file_records_at(&self, directory: &str, name: &str) -> Result<usize> {
        self.connection().execute(
            "DELETE FROM file_record WHERE directory = ?1 AND name = ?2",
            params![directory, name],
        )
    }

    pub fn get_file_count(&self) -> Result<u64> {
        let count: i64 =
            self.connection()
                .query_row("SELECT COUNT(*) FROM file_record", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    pub fn get_total_size(&self) -> Result<u64> {
        let total: i64 = self.connection().query_row(
            "SELECT COALESCE(SUM(file_size), 0) FROM file_record",
            [],
            |row| row.get(0),
        )?;
        Ok(total as u64)
    }

    // ── Hash Lookups ─────────────────────────────────────────────

    pub fn get_files_by_hash(&self, hash: &str) -> Result<Vec<FileRecord>> {
        let mut stmt = self.connection().prepare_cached(&format!(
            "SELECT {} FROM file_record WHERE hash = ?1 ORDER BY id",
            FILE_COLUMNS
        ))?;
        let files = stmt
            .query_map(params![hash], file_record_from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok(files)
    }

    pub fn get_files_by_hash_excluding(&self, hash: &str, exclude_id: i64) -> Result<Vec<FileRecord>> {
        let mut stmt = self.connection().prepare_cached(&format!(
            "SELECT {} FROM file_record WHERE hash = ?1 AND id != ?2 ORDER BY id",
            FILE_COLUMNS
        ))?;
        let files = stmt
            .query_map(params![hash, exclude_id], file_record_from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok(files)
    }

    // ── Duplicate Groups ─────────────────────────────────────────

    pub fn get_duplicate_hashes(&self, min_size: u64) -> Result<Vec<String>> {
        let mut stmt = self.connection().prepare_cached(
            "SELECT hash FROM file_record \
             WHERE hash IS NOT NULL AND file_size >= ?1 \
             GROUP BY hash HAVING COUNT(*) > 1 \
             ORDER BY MIN(id)",
        )?;
        let hashes = stmt
            .query_map(params![to_sql_size(min_size)], |row| row.get(0))?
            .collect::<Result<Vec<String>>>()?;
        Ok(hashes)
    }

    pub fn get_duplicate_hash_count(&self, min_size: u64) -> Result<u64> {
        let count: i64 = self.connection().query_row(
            "SELECT COUNT(*) FROM ( \
                 SELECT hash FROM file_record \
                 WHERE hash IS NOT NULL AND file_size >= ?1 \
                 GROUP BY hash HAVING COUNT(*) > 1)",
            params![to_sql_size(min_size)],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    pub fn get_potential_savings(&self, min_size: u64) -> Result<u64> {
        let savings: i64 = self.connection().query_row(
            "SELECT COALESCE(SUM(group_size * (group_count - 1)), 0) FROM ( \
                 SELECT MAX(file_size) AS group_size, COUNT(*) AS group_count \
                 FROM file_record \
                 WHERE hash IS NOT NULL AND file_size >= ?1 \
                 GROUP BY hash HAVING COUNT(*) > 1)",
            params![to_sql_size(min_size)],
            |row| row.get(0),
        )?;
        Ok(savings as u64)
    }

    // ── Range Queries ────────────────────────────────────────────

    pub fn get_files_by_size_between(&self, min: u64, max: u64) -> Result<Vec<FileRecord>> {
        let mut stmt = self.connection().prepare_cached(&format!(
            "SELECT {} FROM file_record WHERE file_size BETWEEN ?1 AND ?2 ORDER BY id",
            FILE_COLUMNS
        ))?;
        let files = stmt
            .query_map(params![to_sql_size(min), to_sql_size(max)], file_record_from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok(files)
    }

    /// Records in `prefix` or any directory below it.
    pub fn get_files_under_directory(&self, prefix: &str) -> Result<Vec<FileRecord>> {
        let exact = prefix.trim_end_matches(MAIN_SEPARATOR);
        let nested = format!("{}{}", exact, MAIN_SEPARATOR);
        let mut stmt = self.connection().prepare_cached(&format!(
            "SELECT {} FROM file_record \
             WHERE directory = ?1 OR substr(directory, 1, length(?2)) = ?2 \
             ORDER BY id",
            FILE_COLUMNS
        ))?;
        let files = stmt
            .query_map(params![exact, nested], file_record_from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok(files)
    }

    pub fn get_content_type_counts(&self) -> Result<Vec<(String, u64)>> {
        let mut stmt = self.connection().prepare_cached(
            "SELECT content_type, COUNT(*) FROM file_record \
             WHERE content_type IS NOT NULL \
             GROUP BY content_type ORDER BY COUNT(*) DESC, content_type",
        )?;
        let counts = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
            })?
            .collect::<Result<Vec<_>>>()?;
        Ok(counts)
    }
}
