// SPDX-License-Identifier: MIT

//! Persistence and lock store configuration, matching the `state_persistence.*`
//! and lock-related keys in the daemon's configuration surface.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateBackendKind {
    File,
    Sql,
    Cache,
}

impl Default for StateBackendKind {
    fn default() -> Self {
        Self::File
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatePersistenceConfig {
    pub backend: StateBackendKind,
    /// File/SQL path, or cache connection string, depending on `backend`.
    pub path: PathBuf,
    #[serde(with = "duration_ms")]
    pub save_interval: Duration,
    /// Rotated backup count for the file backend.
    pub backup_count: u32,
}

impl Default for StatePersistenceConfig {
    fn default() -> Self {
        Self {
            backend: StateBackendKind::File,
            path: PathBuf::from("/var/lib/poppo/state"),
            save_interval: Duration::from_secs(30),
            backup_count: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterConfig {
    pub enabled: bool,
    pub path: PathBuf,
    pub retention_days: u32,
}

impl Default for DeadLetterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: PathBuf::from("/var/lib/poppo/dead-letters"),
            retention_days: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockStoreConfig {
    pub locks_dir: PathBuf,
    #[serde(with = "duration_ms")]
    pub default_ttl: Duration,
    /// Number of acquire retries after reclaiming a stale record before giving up.
    pub acquire_retry_budget: u32,
}

impl Default for LockStoreConfig {
    fn default() -> Self {
        Self {
            locks_dir: PathBuf::from("/var/lib/poppo/locks"),
            default_ttl: Duration::from_secs(30),
            acquire_retry_budget: 3,
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        (value.as_millis() as u64).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
