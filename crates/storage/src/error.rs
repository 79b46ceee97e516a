// SPDX-License-Identifier: MIT

use thiserror::Error;

/// Errors from the Lock Store (C1).
#[derive(Debug, Error)]
pub enum LockStoreError {
    #[error("I/O error on lock file {path}: {source}")]
    Io { path: String, source: std::io::Error },
    #[error("lock for {0} is held by another session")]
    Contention(String),
    #[error("lock for {0} is not held by the calling holder")]
    NotHeld(String),
    #[error("lock record for {0} is corrupt: {message}")]
    Corrupt { item_key: String, message: String },
}

/// Errors from the Persistence Layer (C2), common across all three backends.
#[derive(Debug, Error)]
pub enum StateStoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("snapshot checksum mismatch: expected {expected}, computed {computed}")]
    ChecksumMismatch { expected: String, computed: String },
    #[error("sql backend error: {0}")]
    Sql(String),
    #[error("cache backend error: {0}")]
    Cache(String),
    #[error("no snapshot named {0}")]
    SnapshotNotFound(String),
    #[error("all {0} backup(s) exhausted during recovery")]
    RecoveryExhausted(usize),
}
