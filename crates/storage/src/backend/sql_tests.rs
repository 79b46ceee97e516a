use super::*;
use poppo_core::test_support::sample_work_item;
use tempfile::tempdir;

fn config(dir: &std::path::Path) -> StatePersistenceConfig {
    StatePersistenceConfig {
        backend: crate::config::StateBackendKind::Sql,
        path: dir.join("state.sqlite3"),
        save_interval: std::time::Duration::from_secs(30),
        backup_count: 3,
    }
}

fn state_with(item_name: &str) -> SnapshotState {
    SnapshotState {
        queue: vec![sample_work_item("org/repo", item_name, 5)],
        ..Default::default()
    }
}

#[tokio::test]
async fn load_on_empty_state_is_none() {
    let dir = tempdir().unwrap();
    let store = SqlStateStore::new(&config(dir.path())).unwrap();
    assert!(store.load().await.unwrap().is_none());
}

#[tokio::test]
async fn save_then_load_round_trips_and_overwrites() {
    let dir = tempdir().unwrap();
    let store = SqlStateStore::new(&config(dir.path())).unwrap();
    store.save(state_with("1")).await.unwrap();
    store.save(state_with("2")).await.unwrap();
    let loaded = store.load().await.unwrap().unwrap();
    assert_eq!(loaded.state.queue[0].item_id.0, "2");
}

#[tokio::test]
async fn named_snapshots_are_independent_of_the_primary_row() {
    let dir = tempdir().unwrap();
    let store = SqlStateStore::new(&config(dir.path())).unwrap();
    store.save(state_with("primary")).await.unwrap();
    store.create_snapshot("manual", state_with("snap")).await.unwrap();

    let restored = store.restore_snapshot("manual").await.unwrap();
    assert_eq!(restored.state.queue[0].item_id.0, "snap");
    assert_eq!(store.list_snapshots().await.unwrap(), vec!["manual".to_string()]);

    store.delete_snapshot("manual").await.unwrap();
    assert!(store.list_snapshots().await.unwrap().is_empty());
    // The primary row survives deleting a named snapshot.
    assert!(store.load().await.unwrap().is_some());
}
