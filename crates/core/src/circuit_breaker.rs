// SPDX-License-Identifier: MIT

//! `CircuitBreaker` — one per `(project_id, work_item_type)` key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::ProjectId;
use crate::work_item::WorkItemType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// `(project_id, work_item_type)`, serialized as a single string key for use
/// as a map key and as part of a dead-letter reason.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CircuitBreakerKey {
    pub project_id: ProjectId,
    pub item_type: WorkItemType,
}

impl CircuitBreakerKey {
    pub fn new(project_id: ProjectId, item_type: WorkItemType) -> Self {
        Self { project_id, item_type }
    }
}

impl std::fmt::Display for CircuitBreakerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.project_id, self.item_type)
    }
}

/// Transitions: N consecutive failures -> open; cooldown elapsed -> half-open;
/// success in half-open -> closed; failure in half-open -> open.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreaker {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub opened_at: Option<DateTime<Utc>>,
    pub half_open_probes_used: u32,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            half_open_probes_used: 0,
        }
    }
}

impl CircuitBreaker {
    pub fn is_open(&self) -> bool {
        matches!(self.state, CircuitState::Open)
    }
}
