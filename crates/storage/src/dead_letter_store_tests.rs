use super::*;
use chrono::{Duration as ChronoDuration, Utc};
use poppo_core::test_support::sample_work_item;
use poppo_core::DeadLetterReason;
use tempfile::tempdir;

fn config(dir: &std::path::Path) -> DeadLetterConfig {
    DeadLetterConfig {
        enabled: true,
        path: dir.join("dead-letters"),
        retention_days: 7,
    }
}

fn record_at(age_days: i64) -> DeadLetter {
    let item = sample_work_item("org/repo", "1", 5);
    DeadLetter::new(item, DeadLetterReason::MaxRetriesExceeded, None, Utc::now() - ChronoDuration::days(age_days))
}

#[test]
fn put_then_get_round_trips() {
    let dir = tempdir().unwrap();
    let store = DeadLetterStore::new(&config(dir.path())).unwrap();
    let record = record_at(0);
    store.put(&record).unwrap();
    let loaded = store.get(record.id).unwrap().unwrap();
    assert_eq!(loaded.id, record.id);
    assert_eq!(loaded.reason, DeadLetterReason::MaxRetriesExceeded);
}

#[test]
fn get_missing_is_none() {
    let dir = tempdir().unwrap();
    let store = DeadLetterStore::new(&config(dir.path())).unwrap();
    assert!(store.get(uuid::Uuid::new_v4()).unwrap().is_none());
}

#[test]
fn remove_deletes_and_reports_presence() {
    let dir = tempdir().unwrap();
    let store = DeadLetterStore::new(&config(dir.path())).unwrap();
    let record = record_at(0);
    store.put(&record).unwrap();
    assert!(store.remove(record.id).unwrap());
    assert!(!store.remove(record.id).unwrap());
    assert!(store.get(record.id).unwrap().is_none());
}

#[test]
fn list_returns_all_records_oldest_first() {
    let dir = tempdir().unwrap();
    let store = DeadLetterStore::new(&config(dir.path())).unwrap();
    let older = record_at(5);
    let newer = record_at(1);
    store.put(&older).unwrap();
    store.put(&newer).unwrap();
    let listed = store.list().unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].id, older.id);
    assert_eq!(listed[1].id, newer.id);
}

#[test]
fn prune_expired_removes_only_records_past_retention() {
    let dir = tempdir().unwrap();
    let store = DeadLetterStore::new(&config(dir.path())).unwrap();
    let expired = record_at(10);
    let fresh = record_at(1);
    store.put(&expired).unwrap();
    store.put(&fresh).unwrap();

    let removed = store.prune_expired(Utc::now()).unwrap();

    assert_eq!(removed, 1);
    assert!(store.get(expired.id).unwrap().is_none());
    assert!(store.get(fresh.id).unwrap().is_some());
}
