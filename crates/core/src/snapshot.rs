// SPDX-License-Identifier: MIT

//! `Snapshot` — atomically-written union of queue/running/retry/breaker
//! state suitable for whole-process restore.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::circuit_breaker::CircuitBreaker;
use crate::id::TaskId;
use crate::retry::RetryState;
use crate::work_item::WorkItem;

/// A WorkItem currently assigned to the worker pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunningEntry {
    pub item: WorkItem,
    pub task_id: TaskId,
    pub started_at: DateTime<Utc>,
}

/// The state body carried by a [`Snapshot`]: queue, running set, retry map,
/// and circuit breakers. Dead letters are persisted separately (one file per
/// record) and are not part of this body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotState {
    pub queue: Vec<WorkItem>,
    /// Keyed by `ItemKey::sanitized()`.
    pub running_map: HashMap<String, RunningEntry>,
    /// Keyed by `ItemKey::sanitized()`.
    pub retry_map: HashMap<String, RetryState>,
    /// Keyed by `CircuitBreakerKey` Display string.
    pub circuit_breakers: HashMap<String, CircuitBreaker>,
}

/// Canonical form: schema version, `saved_at` (ISO-8601 UTC), a checksum over
/// the canonical serialization of `state` with the checksum field elided,
/// and the state body itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub schema_version: u32,
    pub saved_at: DateTime<Utc>,
    pub checksum: String,
    pub state: SnapshotState,
}

pub const CURRENT_SCHEMA_VERSION: u32 = 1;
