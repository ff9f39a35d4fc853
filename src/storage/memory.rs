use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::path::MAIN_SEPARATOR;
use std::sync::atomic::{AtomicI64, Ordering};

use super::models::FileRecord;
use super::MetadataStore;
use crate::error::Error;

/// Process-local store with the same semantics as [`super::SqliteStore`].
/// Results are returned in id order.
#[derive(Debug)]
pub struct MemoryStore {
    records: DashMap<i64, FileRecord>,
    next_id: AtomicI64,
    write_lock: Mutex<()>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            records: DashMap::new(),
            next_id: AtomicI64::new(1),
            write_lock: Mutex::new(()),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn select<F>(&self, predicate: F) -> Vec<FileRecord>
    where
        F: Fn(&FileRecord) -> bool,
    {
        let mut found: Vec<FileRecord> = self
            .records
            .iter()
            .filter(|entry| predicate(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        found.sort_by_key(|record| record.id);
        found
    }

    /// hash -> (first id, size, count) over hashed records of at least `min_size` bytes.
    fn hash_groups(&self, min_size: u64) -> HashMap<String, (i64, u64, u64)> {
        let mut groups: HashMap<String, (i64, u64, u64)> = HashMap::new();
        for entry in self.records.iter() {
            let record = entry.value();
            let hash = match &record.hash {
                Some(hash) if record.size >= min_size => hash,
                _ => continue,
            };
            let group = groups
                .entry(hash.clone())
                .or_insert((record.id, record.size, 0));
            group.0 = group.0.min(record.id);
            group.1 = group.1.max(record.size);
            group.2 += 1;
        }
        groups.retain(|_, group| group.2 > 1);
        groups
    }

    fn clear_location(&self, directory: &str, name: &str) -> usize {
        let stale: Vec<i64> = self
            .records
            .iter()
            .filter(|entry| entry.directory == directory && entry.name == name)
            .map(|entry| *entry.key())
            .collect();
        for id in &stale {
            self.records.remove(id);
        }
        stale.len()
    }
}

impl MetadataStore for MemoryStore {
    fn batch_upsert(&self, records: &[FileRecord]) -> Result<Vec<FileRecord>, Error> {
        let _guard = self.write_lock.lock();
        let mut saved = Vec::with_capacity(records.len());
        for record in records {
            let mut record = record.clone();
            if !record.is_persisted() {
                self.clear_location(&record.directory, &record.name);
                record.id = self.next_id.fetch_add(1, Ordering::SeqCst);
            } else {
                self.next_id.fetch_max(record.id + 1, Ordering::SeqCst);
            }
            self.records.insert(record.id, record.clone());
            saved.push(record);
        }
        Ok(saved)
    }

    fn delete(&self, id: i64) -> Result<(), Error> {
        let _guard = self.write_lock.lock();
        self.records.remove(&id);
        Ok(())
    }

    fn delete_by_path(&self, directory: &str, name: &str) -> Result<usize, Error> {
        let _guard = self.write_lock.lock();
        Ok(self.clear_location(directory, name))
    }

    fn find_by_hash_excluding(&self, hash: &str, exclude_id: i64) -> Result<Vec<FileRecord>, Error> {
        Ok(self.select(|r| r.id != exclude_id && r.hash.as_deref() == Some(hash)))
    }

    fn find_by_hash(&self, hash: &str) -> Result<Vec<FileRecord>, Error> {
        Ok(self.select(|r| r.hash.as_deref() == Some(hash)))
    }

    fn find_duplicate_hashes(&self, min_size: u64) -> Result<Vec<String>, Error> {
        let mut groups: Vec<(String, i64)> = self
            .hash_groups(min_size)
            .into_iter()
            .map(|(hash, (first_id, _, _))| (hash, first_id))
            .collect();
        groups.sort_by_key(|(_, first_id)| *first_id);
        Ok(groups.into_iter().map(|(hash, _)| hash).collect())
    }

    fn count(&self) -> Result<u64, Error> {
        Ok(self.records.len() as u64)
    }

    fn count_duplicate_hashes(&self, min_size: u64) -> Result<u64, Error> {
        Ok(self.hash_groups(min_size).len() as u64)
    }

    fn find_by_size_between(&self, min: u64, max: u64) -> Result<Vec<FileRecord>, Error> {
        Ok(self.select(|r| r.size >= min && r.size <= max))
    }

    fn find_by_directory_prefix(&self, prefix: &str) -> Result<Vec<FileRecord>, Error> {
        let exact = prefix.trim_end_matches(MAIN_SEPARATOR);
        let nested = format!("{}{}", exact, MAIN_SEPARATOR);
        Ok(self.select(|r| r.directory == exact || r.directory.starts_with(&nested)))
    }

    fn count_by_content_type(&self) -> Result<Vec<(String, u64)>, Error> {
        let mut counts: BTreeMap<String, u64> = BTreeMap::new();
        for entry in self.records.iter() {
            if let Some(content_type) = &entry.content_type {
                *counts.entry(content_type.clone()).or_default() += 1;
            }
        }
        let mut counts: Vec<(String, u64)> = counts.into_iter().collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Ok(counts)
    }

    fn total_size(&self) -> Result<u64, Error> {
        Ok(self.records.iter().map(|entry| entry.size).sum())
    }

    fn potential_savings(&self, min_size: u64) -> Result<u64, Error> {
        Ok(self
            .hash_groups(min_size)
            .values()
            .map(|(_, size, count)| size * (count - 1))
            .sum())
    }

    fn truncate(&self) -> Result<(), Error> {
        let _guard = self.write_lock.lock();
        self.records.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Arc;
    use std::thread;

    fn record(directory: &str, name: &str) -> FileRecord {
        FileRecord {
            id: 0,
            name: name.to_string(),
            directory: directory.to_string(),
            size: 8,
            last_modified: Utc::now(),
            content_type: None,
            hash: Some("cafe".to_string()),
        }
    }

    #[test]
    fn test_delete_interleaved_with_upserts() {
        let store = Arc::new(MemoryStore::new());
        let workers: Vec<_> = (0..4)
            .map(|worker| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    let directory = format!("/data/{}", worker);
                    for round in 0..100 {
                        let name = format!("{}.bin", round % 3);
                        let saved = store.batch_upsert(&[record(&directory, &name)]).unwrap();
                        store.delete(saved[0].id).unwrap();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(store.count().unwrap(), 0);
        assert!(store.find_by_hash("cafe").unwrap().is_empty());
    }

    #[test]
    fn test_delete_unknown_id_is_noop() {
        let store = MemoryStore::new();
        let saved = store.batch_upsert(&[record("/data", "a.bin")]).unwrap();
        store.delete(saved[0].id + 1000).unwrap();
        assert_eq!(store.count().unwrap(), 1);
    }
}
