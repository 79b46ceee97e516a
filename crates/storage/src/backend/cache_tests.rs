use super::*;
use poppo_core::test_support::sample_work_item;

// Exercises a live redis instance; set `POPPO_TEST_REDIS_URL` to run it. CI
// without a redis service simply skips these, same as the rest of the
// ecosystem's redis-backed test suites.
fn redis_url() -> Option<String> {
    std::env::var("POPPO_TEST_REDIS_URL").ok()
}

fn config(url: String) -> StatePersistenceConfig {
    StatePersistenceConfig {
        backend: crate::config::StateBackendKind::Cache,
        path: std::path::PathBuf::from(url),
        save_interval: std::time::Duration::from_secs(30),
        backup_count: 0,
    }
}

fn state_with(item_name: &str) -> SnapshotState {
    SnapshotState {
        queue: vec![sample_work_item("org/repo", item_name, 5)],
        ..Default::default()
    }
}

#[tokio::test]
async fn save_then_load_round_trips() {
    let Some(url) = redis_url() else {
        eprintln!("skipping: POPPO_TEST_REDIS_URL not set");
        return;
    };
    let store = CacheStateStore::new(&config(url)).await.unwrap();
    store.save(state_with("1")).await.unwrap();
    let loaded = store.load().await.unwrap().unwrap();
    assert_eq!(loaded.state.queue[0].item_id.0, "1");
}

#[tokio::test]
async fn named_snapshot_survives_primary_overwrite() {
    let Some(url) = redis_url() else {
        eprintln!("skipping: POPPO_TEST_REDIS_URL not set");
        return;
    };
    let store = CacheStateStore::new(&config(url)).await.unwrap();
    store.create_snapshot("manual", state_with("snap")).await.unwrap();
    store.save(state_with("primary")).await.unwrap();

    let restored = store.restore_snapshot("manual").await.unwrap();
    assert_eq!(restored.state.queue[0].item_id.0, "snap");

    store.delete_snapshot("manual").await.unwrap();
    assert!(store.list_snapshots().await.unwrap().is_empty());
}
