// SPDX-License-Identifier: MIT

//! Dead-letter store: one immutable JSON record per abandoned WorkItem under
//! `<state_root>/dead-letters/<id>.json`, retained for a configurable number
//! of days.

use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use poppo_core::DeadLetter;
use uuid::Uuid;

use crate::config::DeadLetterConfig;
use crate::error::StateStoreError;

pub struct DeadLetterStore {
    dir: PathBuf,
    retention_days: u32,
}

impl DeadLetterStore {
    pub fn new(config: &DeadLetterConfig) -> Result<Self, StateStoreError> {
        fs::create_dir_all(&config.path)?;
        Ok(Self {
            dir: config.path.clone(),
            retention_days: config.retention_days,
        })
    }

    fn path_for(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    /// Addressable by id; records are immutable once written.
    pub fn put(&self, record: &DeadLetter) -> Result<(), StateStoreError> {
        let path = self.path_for(record.id);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(record)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    pub fn get(&self, id: Uuid) -> Result<Option<DeadLetter>, StateStoreError> {
        let path = self.path_for(id);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path)?;
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    pub fn remove(&self, id: Uuid) -> Result<bool, StateStoreError> {
        let path = self.path_for(id);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(path)?;
        Ok(true)
    }

    pub fn list(&self) -> Result<Vec<DeadLetter>, StateStoreError> {
        let mut records = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if entry.path().extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = fs::read(entry.path())?;
            if let Ok(record) = serde_json::from_slice(&bytes) {
                records.push(record);
            }
        }
        records.sort_by_key(|r: &DeadLetter| r.dead_lettered_at);
        Ok(records)
    }

    /// Delete records older than `retention_days`. Called on a periodic tick
    /// by the Dispatcher, not automatically on every `put`.
    pub fn prune_expired(&self, now: DateTime<Utc>) -> Result<usize, StateStoreError> {
        let cutoff = now - chrono::Duration::days(self.retention_days as i64);
        let mut removed = 0;
        for record in self.list()? {
            if record.dead_lettered_at < cutoff && self.remove(record.id)? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
#[path = "dead_letter_store_tests.rs"]
mod tests;
