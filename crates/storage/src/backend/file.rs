// SPDX-License-Identifier: MIT

//! File backend: write-to-temp + fsync + rename, zstd-compressed JSON,
//! checksummed, with up to `backup_count` rotated backups. On a checksum
//! mismatch, `load` rolls back through the backups in order before giving
//! up loudly.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use poppo_core::snapshot::{Snapshot, SnapshotState};
use tracing::warn;

use super::{seal, verify, StateStore};
use crate::config::StatePersistenceConfig;
use crate::error::StateStoreError;

pub struct FileStateStore {
    path: PathBuf,
    snapshots_dir: PathBuf,
    backup_count: u32,
}

impl FileStateStore {
    pub fn new(config: &StatePersistenceConfig) -> Result<Self, StateStoreError> {
        if let Some(parent) = config.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let snapshots_dir = config
            .path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join("snapshots");
        fs::create_dir_all(&snapshots_dir)?;
        Ok(Self {
            path: config.path.clone(),
            snapshots_dir,
            backup_count: config.backup_count.max(1),
        })
    }

    fn backup_path(&self, n: u32) -> PathBuf {
        if n == 1 {
            self.path.with_extension("snapshot.bak")
        } else {
            self.path.with_extension(format!("snapshot.bak.{n}"))
        }
    }

    /// Shift `.bak` -> `.bak.2` -> ... -> drop the oldest, making room for a
    /// fresh `.bak` of the image about to be overwritten.
    fn rotate_backups(&self) -> Result<(), StateStoreError> {
        let oldest = self.backup_path(self.backup_count);
        if oldest.exists() {
            fs::remove_file(&oldest)?;
        }
        for n in (1..self.backup_count).rev() {
            let src = self.backup_path(n);
            if src.exists() {
                fs::rename(&src, self.backup_path(n + 1))?;
            }
        }
        if self.path.exists() {
            fs::copy(&self.path, self.backup_path(1))?;
        }
        Ok(())
    }

    fn write_atomic(&self, path: &Path, snapshot: &Snapshot) -> Result<(), StateStoreError> {
        let tmp_path = path.with_extension("tmp");
        let json = serde_json::to_vec(snapshot)?;
        let compressed = zstd::encode_all(json.as_slice(), 3).map_err(StateStoreError::Io)?;
        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(&compressed)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, path)?;
        if let Some(parent) = path.parent() {
            if let Ok(dir) = File::open(parent) {
                let _ = dir.sync_all();
            }
        }
        Ok(())
    }

    fn read_checked(&self, path: &Path) -> Result<Snapshot, StateStoreError> {
        let file = File::open(path)?;
        let decoder = zstd::stream::read::Decoder::new(file).map_err(StateStoreError::Io)?;
        let snapshot: Snapshot = serde_json::from_reader(decoder)?;
        verify(&snapshot)?;
        Ok(snapshot)
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn save(&self, state: SnapshotState) -> Result<(), StateStoreError> {
        let snapshot = seal(state, chrono::Utc::now())?;
        // Back up the previous good image before overwriting: if the
        // process crashes mid-write, `load` still has a prior valid image
        // to roll back to even if the primary slot is now a partial rename.
        self.rotate_backups()?;
        self.write_atomic(&self.path, &snapshot)
    }

    async fn load(&self) -> Result<Option<Snapshot>, StateStoreError> {
        if !self.path.exists() {
            return Ok(None);
        }
        match self.read_checked(&self.path) {
            Ok(snapshot) => return Ok(Some(snapshot)),
            Err(e) => warn!(error = %e, "primary snapshot unreadable, falling back to backups"),
        }
        for n in 1..=self.backup_count {
            let path = self.backup_path(n);
            if !path.exists() {
                continue;
            }
            match self.read_checked(&path) {
                Ok(snapshot) => {
                    warn!(backup = n, "recovered state from rotated backup");
                    return Ok(Some(snapshot));
                }
                Err(e) => warn!(error = %e, backup = n, "backup unreadable, trying next"),
            }
        }
        Err(StateStoreError::RecoveryExhausted(self.backup_count as usize))
    }

    async fn create_snapshot(&self, id: &str, state: SnapshotState) -> Result<(), StateStoreError> {
        let snapshot = seal(state, chrono::Utc::now())?;
        let path = self.snapshots_dir.join(format!("{id}.snapshot"));
        self.write_atomic(&path, &snapshot)
    }

    async fn restore_snapshot(&self, id: &str) -> Result<Snapshot, StateStoreError> {
        let path = self.snapshots_dir.join(format!("{id}.snapshot"));
        if !path.exists() {
            return Err(StateStoreError::SnapshotNotFound(id.to_string()));
        }
        self.read_checked(&path)
    }

    async fn list_snapshots(&self) -> Result<Vec<String>, StateStoreError> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.snapshots_dir)? {
            let entry = entry?;
            if let Some(stem) = entry.path().file_stem().and_then(|s| s.to_str()) {
                if entry.path().extension().and_then(|e| e.to_str()) == Some("snapshot") {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    async fn delete_snapshot(&self, id: &str) -> Result<(), StateStoreError> {
        let path = self.snapshots_dir.join(format!("{id}.snapshot"));
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "file_tests.rs"]
mod tests;
