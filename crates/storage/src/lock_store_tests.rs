use super::*;
use poppo_core::{FakeClock, SessionId, TaskId};
use tempfile::tempdir;

fn holder() -> Holder {
    Holder {
        pid: std::process::id(),
        hostname: local_hostname(),
        session_id: SessionId::new(),
        task_id: TaskId::new(),
    }
}

fn other_holder() -> Holder {
    Holder {
        pid: std::process::id(),
        hostname: "other-host".to_string(),
        session_id: SessionId::new(),
        task_id: TaskId::new(),
    }
}

fn store() -> (tempfile::TempDir, LockStore<FakeClock>) {
    let dir = tempdir().unwrap();
    let config = LockStoreConfig {
        locks_dir: dir.path().to_path_buf(),
        default_ttl: std::time::Duration::from_secs(30),
        acquire_retry_budget: 3,
    };
    let store = LockStore::new(config, FakeClock::new()).unwrap();
    (dir, store)
}

#[test]
fn acquire_then_duplicate_acquire_is_contention() {
    let (_dir, store) = store();
    let h = holder();
    assert!(store.acquire("org/repo/1", h.clone(), std::time::Duration::from_secs(30)).unwrap());
    assert!(!store.acquire("org/repo/1", other_holder(), std::time::Duration::from_secs(30)).unwrap());
}

#[test]
fn release_by_owner_succeeds_by_other_fails() {
    let (_dir, store) = store();
    let h = holder();
    store.acquire("k", h.clone(), std::time::Duration::from_secs(30)).unwrap();
    assert!(!store.release("k", &other_holder()).unwrap());
    assert!(store.release("k", &h).unwrap());
    assert!(store.acquire("k", other_holder(), std::time::Duration::from_secs(30)).unwrap());
}

#[test]
fn expired_lock_is_reclaimed_on_acquire() {
    let dir = tempdir().unwrap();
    let clock = FakeClock::new();
    let config = LockStoreConfig {
        locks_dir: dir.path().to_path_buf(),
        default_ttl: std::time::Duration::from_secs(1),
        acquire_retry_budget: 3,
    };
    let store = LockStore::new(config, clock.clone()).unwrap();
    let h = holder();
    assert!(store.acquire("k", h, std::time::Duration::from_secs(1)).unwrap());
    clock.advance(std::time::Duration::from_secs(2));
    assert!(store.acquire("k", other_holder(), std::time::Duration::from_secs(30)).unwrap());
}

#[test]
fn dead_pid_on_same_host_is_reclaimed() {
    let (_dir, store) = store();
    let dead_holder = Holder {
        // pid 1 belongs to init in any container this test runs in, but we
        // want a pid that is *not* alive: pick a very large, almost
        // certainly-unused pid instead.
        pid: 2_000_000_000,
        hostname: local_hostname(),
        session_id: SessionId::new(),
        task_id: TaskId::new(),
    };
    assert!(store.acquire("k", dead_holder, std::time::Duration::from_secs(30)).unwrap());
    assert!(store.acquire("k", holder(), std::time::Duration::from_secs(30)).unwrap());
}

#[test]
fn cross_host_pid_is_never_assumed_dead() {
    let (_dir, store) = store();
    let cross_host = Holder {
        pid: 2_000_000_000,
        hostname: "some-other-host".to_string(),
        session_id: SessionId::new(),
        task_id: TaskId::new(),
    };
    assert!(store.acquire("k", cross_host, std::time::Duration::from_secs(30)).unwrap());
    assert!(!store.acquire("k", holder(), std::time::Duration::from_secs(30)).unwrap());
}

#[test]
fn renew_extends_expiry_for_owner_only() {
    let dir = tempdir().unwrap();
    let clock = FakeClock::new();
    let config = LockStoreConfig {
        locks_dir: dir.path().to_path_buf(),
        default_ttl: std::time::Duration::from_secs(5),
        acquire_retry_budget: 3,
    };
    let store = LockStore::new(config, clock.clone()).unwrap();
    let h = holder();
    store.acquire("k", h.clone(), std::time::Duration::from_secs(5)).unwrap();
    assert!(!store.renew("k", &other_holder(), std::time::Duration::from_secs(30)).unwrap());
    assert!(store.renew("k", &h, std::time::Duration::from_secs(30)).unwrap());
    clock.advance(std::time::Duration::from_secs(10));
    // Still valid thanks to the renewal.
    assert!(!store.acquire("k", other_holder(), std::time::Duration::from_secs(30)).unwrap());
}

#[test]
fn release_all_matches_only_same_pid_and_host() {
    let (_dir, store) = store();
    let h = holder();
    store.acquire("a", h.clone(), std::time::Duration::from_secs(30)).unwrap();
    store.acquire("b", h.clone(), std::time::Duration::from_secs(30)).unwrap();
    store.acquire("c", other_holder(), std::time::Duration::from_secs(30)).unwrap();
    let released = store.release_all(h.pid).unwrap();
    assert_eq!(released, 2);
    assert!(store.list_active().unwrap().iter().any(|l| l.item_key == "c"));
}

#[test]
fn list_active_excludes_expired() {
    let dir = tempdir().unwrap();
    let clock = FakeClock::new();
    let config = LockStoreConfig {
        locks_dir: dir.path().to_path_buf(),
        default_ttl: std::time::Duration::from_secs(1),
        acquire_retry_budget: 3,
    };
    let store = LockStore::new(config, clock.clone()).unwrap();
    store.acquire("k", holder(), std::time::Duration::from_secs(1)).unwrap();
    assert_eq!(store.list_active().unwrap().len(), 1);
    clock.advance(std::time::Duration::from_secs(2));
    assert_eq!(store.list_active().unwrap().len(), 0);
}
