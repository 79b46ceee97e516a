// SPDX-License-Identifier: MIT

//! Engine-internal error kinds, distinct from the error taxonomy a worker's
//! failure is classified into (see `poppo-retry::ErrorKind`). These never
//! escape the Dispatcher: they are recorded, counted, and translated into
//! scheduling decisions.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineErrorKind {
    QueueAdmissionRefused,
    LockContention,
    LockMissing,
    PersistenceWriteFailed,
    PersistenceCorrupt,
    WorkerSpawnFailed,
    WorkerTimedOut,
    WorkerKilled,
    SnapshotRecoveryUsedBackup,
    CircuitBreakerOpen,
    MaintenanceModeBlocked,
    DeadlineExceeded,
    ValidationRejected,
}

impl EngineErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::QueueAdmissionRefused => "queue-admission-refused",
            Self::LockContention => "lock-contention",
            Self::LockMissing => "lock-missing",
            Self::PersistenceWriteFailed => "persistence-write-failed",
            Self::PersistenceCorrupt => "persistence-corrupt",
            Self::WorkerSpawnFailed => "worker-spawn-failed",
            Self::WorkerTimedOut => "worker-timed-out",
            Self::WorkerKilled => "worker-killed",
            Self::SnapshotRecoveryUsedBackup => "snapshot-recovery-used-backup",
            Self::CircuitBreakerOpen => "circuit-breaker-open",
            Self::MaintenanceModeBlocked => "maintenance-mode-blocked",
            Self::DeadlineExceeded => "deadline-exceeded",
            Self::ValidationRejected => "validation-rejected",
        }
    }
}

/// A structured, user-facing reason for a refusal or failure.
///
/// The CLI always prints one of these rather than a bare error string, per
/// the engine's error handling design.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{kind}: {message}", kind = self.kind.as_str())]
pub struct EngineError {
    pub kind: EngineErrorKind,
    pub message: String,
}

impl EngineError {
    pub fn new(kind: EngineErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}
