// SPDX-License-Identifier: MIT

//! The Persistence Layer's capability set: one async trait, three backends
//! (file / sql / cache) selected by configuration, all exercised by the same
//! property suite.

pub mod cache;
pub mod file;
pub mod sql;

use async_trait::async_trait;
use poppo_core::snapshot::{Snapshot, SnapshotState, CURRENT_SCHEMA_VERSION};
use sha2::{Digest, Sha256};

use crate::config::{StateBackendKind, StatePersistenceConfig};
use crate::error::StateStoreError;

/// Compute the checksum over the canonical serialization of `state`. Maps in
/// this workspace's snapshot types serialize as `serde_json::Map`, which (in
/// the absence of the `preserve_order` feature) is BTreeMap-backed — key
/// order is therefore stable across processes, which is what makes this
/// checksum reproducible.
pub fn compute_checksum(state: &SnapshotState) -> Result<String, StateStoreError> {
    let bytes = serde_json::to_vec(state)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let digest = hasher.finalize();
    Ok(digest.iter().map(|b| format!("{b:02x}")).collect())
}

pub fn seal(state: SnapshotState, saved_at: chrono::DateTime<chrono::Utc>) -> Result<Snapshot, StateStoreError> {
    let checksum = compute_checksum(&state)?;
    Ok(Snapshot {
        schema_version: CURRENT_SCHEMA_VERSION,
        saved_at,
        checksum,
        state,
    })
}

/// Verify a loaded snapshot's checksum against a freshly-computed one over
/// its own body.
pub fn verify(snapshot: &Snapshot) -> Result<(), StateStoreError> {
    let computed = compute_checksum(&snapshot.state)?;
    if computed != snapshot.checksum {
        return Err(StateStoreError::ChecksumMismatch {
            expected: snapshot.checksum.clone(),
            computed,
        });
    }
    Ok(())
}

/// The Persistence Layer contract (§4.2), polymorphic over backend.
///
/// `save` must be crash-safe: after a crash the on-disk image is either the
/// previous good snapshot or the new one, never a partial write. `load`
/// returns the last valid snapshot, or `None` if none exists yet (a
/// well-defined empty state, not an error).
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn save(&self, state: SnapshotState) -> Result<(), StateStoreError>;
    async fn load(&self) -> Result<Option<Snapshot>, StateStoreError>;
    async fn create_snapshot(&self, id: &str, state: SnapshotState) -> Result<(), StateStoreError>;
    async fn restore_snapshot(&self, id: &str) -> Result<Snapshot, StateStoreError>;
    async fn list_snapshots(&self) -> Result<Vec<String>, StateStoreError>;
    async fn delete_snapshot(&self, id: &str) -> Result<(), StateStoreError>;
}

/// Selects and constructs the configured backend. All three satisfy the same
/// `StateStore` contract and invariants.
pub async fn build(config: &StatePersistenceConfig) -> Result<Box<dyn StateStore>, StateStoreError> {
    match config.backend {
        StateBackendKind::File => Ok(Box::new(file::FileStateStore::new(config)?)),
        StateBackendKind::Sql => Ok(Box::new(sql::SqlStateStore::new(config)?)),
        StateBackendKind::Cache => Ok(Box::new(cache::CacheStateStore::new(config).await?)),
    }
}
