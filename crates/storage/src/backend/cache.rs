// SPDX-License-Identifier: MIT

//! Network cache backend (`redis`), for deployments that already run a
//! shared cache and want the daemon's state to survive host replacement.
//! Every write is a pipelined `MULTI`/`EXEC` transaction: the snapshot body
//! and the named-snapshot index move together or not at all.

use async_trait::async_trait;
use poppo_core::snapshot::{Snapshot, SnapshotState};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::{seal, verify, StateStore};
use crate::config::StatePersistenceConfig;
use crate::error::StateStoreError;

const PRIMARY_KEY: &str = "poppo:state:primary";
const SNAPSHOT_INDEX_KEY: &str = "poppo:state:snapshots";

fn snapshot_key(id: &str) -> String {
    format!("poppo:state:snapshot:{id}")
}

pub struct CacheStateStore {
    manager: ConnectionManager,
}

impl CacheStateStore {
    pub async fn new(config: &StatePersistenceConfig) -> Result<Self, StateStoreError> {
        let conn_str = config.path.to_string_lossy().to_string();
        let client = redis::Client::open(conn_str).map_err(|e| StateStoreError::Cache(e.to_string()))?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(|e| StateStoreError::Cache(e.to_string()))?;
        Ok(Self { manager })
    }
}

#[async_trait]
impl StateStore for CacheStateStore {
    async fn save(&self, state: SnapshotState) -> Result<(), StateStoreError> {
        let snapshot = seal(state, chrono::Utc::now())?;
        let body = serde_json::to_string(&snapshot)?;
        let mut conn = self.manager.clone();
        redis::pipe()
            .atomic()
            .set(PRIMARY_KEY, body)
            .ignore()
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| StateStoreError::Cache(e.to_string()))?;
        Ok(())
    }

    async fn load(&self) -> Result<Option<Snapshot>, StateStoreError> {
        let mut conn = self.manager.clone();
        let body: Option<String> = conn.get(PRIMARY_KEY).await.map_err(|e| StateStoreError::Cache(e.to_string()))?;
        let Some(body) = body else {
            return Ok(None);
        };
        let snapshot: Snapshot = serde_json::from_str(&body)?;
        verify(&snapshot)?;
        Ok(Some(snapshot))
    }

    async fn create_snapshot(&self, id: &str, state: SnapshotState) -> Result<(), StateStoreError> {
        let snapshot = seal(state, chrono::Utc::now())?;
        let body = serde_json::to_string(&snapshot)?;
        let mut conn = self.manager.clone();
        redis::pipe()
            .atomic()
            .set(snapshot_key(id), body)
            .ignore()
            .sadd(SNAPSHOT_INDEX_KEY, id)
            .ignore()
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| StateStoreError::Cache(e.to_string()))?;
        Ok(())
    }

    async fn restore_snapshot(&self, id: &str) -> Result<Snapshot, StateStoreError> {
        let mut conn = self.manager.clone();
        let body: Option<String> = conn
            .get(snapshot_key(id))
            .await
            .map_err(|e| StateStoreError::Cache(e.to_string()))?;
        let body = body.ok_or_else(|| StateStoreError::SnapshotNotFound(id.to_string()))?;
        let snapshot: Snapshot = serde_json::from_str(&body)?;
        verify(&snapshot)?;
        Ok(snapshot)
    }

    async fn list_snapshots(&self) -> Result<Vec<String>, StateStoreError> {
        let mut conn = self.manager.clone();
        let mut names: Vec<String> = conn
            .smembers(SNAPSHOT_INDEX_KEY)
            .await
            .map_err(|e| StateStoreError::Cache(e.to_string()))?;
        names.sort();
        Ok(names)
    }

    async fn delete_snapshot(&self, id: &str) -> Result<(), StateStoreError> {
        let mut conn = self.manager.clone();
        redis::pipe()
            .atomic()
            .del(snapshot_key(id))
            .ignore()
            .srem(SNAPSHOT_INDEX_KEY, id)
            .ignore()
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| StateStoreError::Cache(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
