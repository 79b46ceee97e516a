// SPDX-License-Identifier: MIT

//! Single-file embedded SQL backend (`rusqlite`, bundled SQLite). Every
//! `save`/`create_snapshot` is one transaction; `load`/`restore_snapshot`
//! verify the stored checksum exactly like the file backend.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use poppo_core::snapshot::{Snapshot, SnapshotState};
use rusqlite::{params, Connection};

use super::{seal, verify, StateStore};
use crate::config::StatePersistenceConfig;
use crate::error::StateStoreError;

const PRIMARY_ID: &str = "__primary__";

pub struct SqlStateStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqlStateStore {
    pub fn new(config: &StatePersistenceConfig) -> Result<Self, StateStoreError> {
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&config.path).map_err(|e| StateStoreError::Sql(e.to_string()))?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS snapshots (
                id TEXT PRIMARY KEY,
                schema_version INTEGER NOT NULL,
                saved_at TEXT NOT NULL,
                checksum TEXT NOT NULL,
                body BLOB NOT NULL
            )",
            [],
        )
        .map_err(|e| StateStoreError::Sql(e.to_string()))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn write(conn: &Connection, id: &str, snapshot: &Snapshot) -> Result<(), StateStoreError> {
        let body = serde_json::to_vec(&snapshot.state)?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| StateStoreError::Sql(e.to_string()))?;
        tx.execute("DELETE FROM snapshots WHERE id = ?1", params![id])
            .map_err(|e| StateStoreError::Sql(e.to_string()))?;
        tx.execute(
            "INSERT INTO snapshots (id, schema_version, saved_at, checksum, body) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, snapshot.schema_version as i64, snapshot.saved_at.to_rfc3339(), snapshot.checksum, body],
        )
        .map_err(|e| StateStoreError::Sql(e.to_string()))?;
        tx.commit().map_err(|e| StateStoreError::Sql(e.to_string()))?;
        Ok(())
    }

    fn read(conn: &Connection, id: &str) -> Result<Option<Snapshot>, StateStoreError> {
        let mut stmt = conn
            .prepare("SELECT schema_version, saved_at, checksum, body FROM snapshots WHERE id = ?1")
            .map_err(|e| StateStoreError::Sql(e.to_string()))?;
        let mut rows = stmt
            .query(params![id])
            .map_err(|e| StateStoreError::Sql(e.to_string()))?;
        let Some(row) = rows.next().map_err(|e| StateStoreError::Sql(e.to_string()))? else {
            return Ok(None);
        };
        let schema_version: i64 = row.get(0).map_err(|e| StateStoreError::Sql(e.to_string()))?;
        let schema_version = schema_version as u32;
        let saved_at: String = row.get(1).map_err(|e| StateStoreError::Sql(e.to_string()))?;
        let checksum: String = row.get(2).map_err(|e| StateStoreError::Sql(e.to_string()))?;
        let body: Vec<u8> = row.get(3).map_err(|e| StateStoreError::Sql(e.to_string()))?;
        let state: SnapshotState = serde_json::from_slice(&body)?;
        let saved_at = chrono::DateTime::parse_from_rfc3339(&saved_at)
            .map_err(|e| StateStoreError::Sql(e.to_string()))?
            .with_timezone(&chrono::Utc);
        let snapshot = Snapshot {
            schema_version,
            saved_at,
            checksum,
            state,
        };
        verify(&snapshot)?;
        Ok(Some(snapshot))
    }
}

#[async_trait]
impl StateStore for SqlStateStore {
    async fn save(&self, state: SnapshotState) -> Result<(), StateStoreError> {
        let snapshot = seal(state, chrono::Utc::now())?;
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || Self::write(&conn.lock(), PRIMARY_ID, &snapshot))
            .await
            .map_err(|e| StateStoreError::Sql(e.to_string()))?
    }

    async fn load(&self) -> Result<Option<Snapshot>, StateStoreError> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || Self::read(&conn.lock(), PRIMARY_ID))
            .await
            .map_err(|e| StateStoreError::Sql(e.to_string()))?
    }

    async fn create_snapshot(&self, id: &str, state: SnapshotState) -> Result<(), StateStoreError> {
        let snapshot = seal(state, chrono::Utc::now())?;
        let conn = self.conn.clone();
        let id = id.to_string();
        tokio::task::spawn_blocking(move || Self::write(&conn.lock(), &id, &snapshot))
            .await
            .map_err(|e| StateStoreError::Sql(e.to_string()))?
    }

    async fn restore_snapshot(&self, id: &str) -> Result<Snapshot, StateStoreError> {
        let conn = self.conn.clone();
        let id_owned = id.to_string();
        let result = tokio::task::spawn_blocking(move || Self::read(&conn.lock(), &id_owned))
            .await
            .map_err(|e| StateStoreError::Sql(e.to_string()))??;
        result.ok_or_else(|| StateStoreError::SnapshotNotFound(id.to_string()))
    }

    async fn list_snapshots(&self) -> Result<Vec<String>, StateStoreError> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            let mut stmt = conn
                .prepare("SELECT id FROM snapshots WHERE id != ?1 ORDER BY id")
                .map_err(|e| StateStoreError::Sql(e.to_string()))?;
            let rows = stmt
                .query_map(params![PRIMARY_ID], |row| row.get::<_, String>(0))
                .map_err(|e| StateStoreError::Sql(e.to_string()))?;
            let mut names = Vec::new();
            for row in rows {
                names.push(row.map_err(|e| StateStoreError::Sql(e.to_string()))?);
            }
            Ok(names)
        })
        .await
        .map_err(|e| StateStoreError::Sql(e.to_string()))?
    }

    async fn delete_snapshot(&self, id: &str) -> Result<(), StateStoreError> {
        let conn = self.conn.clone();
        let id = id.to_string();
        tokio::task::spawn_blocking(move || {
            conn.lock()
                .execute("DELETE FROM snapshots WHERE id = ?1", params![id])
                .map_err(|e| StateStoreError::Sql(e.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|e| StateStoreError::Sql(e.to_string()))?
    }
}

#[cfg(test)]
#[path = "sql_tests.rs"]
mod tests;
