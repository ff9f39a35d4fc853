use std::sync::Arc;

use live_duper::storage::models::FileRecord;
use live_duper::storage::{Database, MemoryStore, MetadataStore, SqliteStore};

fn record(dir: &str, name: &str, size: u64, mtime_millis: i64, hash: Option<&str>) -> FileRecord {
    FileRecord {
        id: 0,
        name: name.to_string(),
        directory: dir.to_string(),
        size,
        last_modified: chrono::DateTime::from_timestamp_millis(mtime_millis).unwrap(),
        content_type: Some("text/plain".to_string()),
        hash: hash.map(str::to_string),
    }
}

fn stores() -> Vec<(&'static str, Arc<dyn MetadataStore>)> {
    vec![
        ("memory", Arc::new(MemoryStore::new())),
        ("sqlite", Arc::new(SqliteStore::open_in_memory().unwrap())),
    ]
}

#[test]
fn test_batch_upsert_assigns_ids_in_order() {
    for (kind, store) in stores() {
        let saved = store
            .batch_upsert(&[
                record("/data", "a.txt", 100, 1_700_000_000_000, Some("h1")),
                record("/data", "b.txt", 200, 1_700_000_000_000, Some("h2")),
            ])
            .unwrap();
        assert_eq!(saved.len(), 2, "{}", kind);
        assert!(saved.iter().all(FileRecord::is_persisted), "{}", kind);
        assert!(saved[0].id < saved[1].id, "{}", kind);
        assert_eq!(saved[0].name, "a.txt", "{}", kind);
        assert_eq!(store.count().unwrap(), 2, "{}", kind);
        assert_eq!(store.total_size().unwrap(), 300, "{}", kind);
    }
}

#[test]
fn test_upsert_same_location_replaces_row() {
    for (kind, store) in stores() {
        store
            .batch_upsert(&[record("/data", "a.txt", 100, 1, Some("old"))])
            .unwrap();
        let saved = store
            .batch_upsert(&[record("/data", "a.txt", 150, 2, Some("new"))])
            .unwrap();

        assert_eq!(store.count().unwrap(), 1, "{}", kind);
        assert!(store.find_by_hash("old").unwrap().is_empty(), "{}", kind);
        let current = store.find_by_hash("new").unwrap();
        assert_eq!(current, saved, "{}", kind);
        assert_eq!(current[0].size, 150, "{}", kind);
    }
}

#[test]
fn test_persisted_record_updates_in_place() {
    for (kind, store) in stores() {
        let mut saved = store
            .batch_upsert(&[record("/data", "a.txt", 100, 1, None)])
            .unwrap()
            .remove(0);
        saved.hash = Some("late".to_string());
        let updated = store.batch_upsert(&[saved.clone()]).unwrap().remove(0);

        assert_eq!(updated.id, saved.id, "{}", kind);
        assert_eq!(store.find_by_hash("late").unwrap().len(), 1, "{}", kind);
        assert_eq!(store.count().unwrap(), 1, "{}", kind);
    }
}

#[test]
fn test_hash_queries_and_duplicate_groups() {
    for (kind, store) in stores() {
        let saved = store
            .batch_upsert(&[
                record("/a", "one.bin", 4096, 1, Some("dup")),
                record("/b", "one.bin", 4096, 2, Some("dup")),
                record("/c", "one.bin", 4096, 3, Some("dup")),
                record("/a", "small.txt", 10, 1, Some("tiny")),
                record("/b", "small.txt", 10, 2, Some("tiny")),
                record("/a", "solo.bin", 5000, 1, Some("solo")),
                record("/a", "nohash.bin", 5000, 1, None),
            ])
            .unwrap();

        let others = store.find_by_hash_excluding("dup", saved[0].id).unwrap();
        assert_eq!(others.len(), 2, "{}", kind);
        assert!(others.iter().all(|r| r.id != saved[0].id), "{}", kind);

        assert_eq!(
            store.find_duplicate_hashes(0).unwrap(),
            vec!["dup".to_string(), "tiny".to_string()],
            "{}",
            kind
        );
        assert_eq!(store.find_duplicate_hashes(1024).unwrap(), vec!["dup".to_string()], "{}", kind);
        assert_eq!(store.count_duplicate_hashes(1024).unwrap(), 1, "{}", kind);
        assert_eq!(store.potential_savings(1024).unwrap(), 8192, "{}", kind);
        assert_eq!(store.potential_savings(0).unwrap(), 8202, "{}", kind);
    }
}

#[test]
fn test_delete_and_delete_by_path() {
    for (kind, store) in stores() {
        let saved = store
            .batch_upsert(&[
                record("/data", "a.txt", 1, 1, Some("x")),
                record("/data", "b.txt", 1, 1, Some("x")),
            ])
            .unwrap();

        store.delete(saved[0].id).unwrap();
        store.delete(saved[0].id).unwrap();
        assert_eq!(store.count().unwrap(), 1, "{}", kind);

        assert_eq!(store.delete_by_path("/data", "b.txt").unwrap(), 1, "{}", kind);
        assert_eq!(store.delete_by_path("/data", "b.txt").unwrap(), 0, "{}", kind);
        assert_eq!(store.count().unwrap(), 0, "{}", kind);
    }
}

#[test]
fn test_size_range_and_directory_prefix() {
    for (kind, store) in stores() {
        store
            .batch_upsert(&[
                record("/srv/share", "a", 10, 1, None),
                record("/srv/share/sub", "b", 20, 1, None),
                record("/srv/shared", "c", 30, 1, None),
                record("/other", "d", 40, 1, None),
            ])
            .unwrap();

        let mid: Vec<String> = store
            .find_by_size_between(20, 30)
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(mid, vec!["b", "c"], "{}", kind);

        let under: Vec<String> = store
            .find_by_directory_prefix("/srv/share")
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(under, vec!["a", "b"], "{}", kind);
    }
}

#[test]
fn test_content_type_counts_and_truncate() {
    for (kind, store) in stores() {
        let mut pdf = record("/d", "a.pdf", 1, 1, None);
        pdf.content_type = Some("application/pdf".to_string());
        store
            .batch_upsert(&[pdf, record("/d", "a.txt", 1, 1, None), record("/d", "b.txt", 1, 1, None)])
            .unwrap();

        let counts = store.count_by_content_type().unwrap();
        assert!(counts.contains(&("text/plain".to_string(), 2)), "{}", kind);
        assert!(counts.contains(&("application/pdf".to_string(), 1)), "{}", kind);

        store.truncate().unwrap();
        assert_eq!(store.count().unwrap(), 0, "{}", kind);
    }
}

#[test]
fn test_sqlite_reopen_keeps_records() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.db");
    let path = path.to_str().unwrap();

    {
        let store = SqliteStore::open(path).unwrap();
        store
            .batch_upsert(&[record("/data", "kept.txt", 42, 1_700_000_000_123, Some("k"))])
            .unwrap();
    }

    let store = SqliteStore::open(path).unwrap();
    let found = store.find_by_hash("k").unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].size, 42);
    assert_eq!(found[0].last_modified.timestamp_millis(), 1_700_000_000_123);

    let db = Database::open(path).unwrap();
    db.truncate_all().unwrap();
    assert_eq!(store.count().unwrap(), 0);
}
