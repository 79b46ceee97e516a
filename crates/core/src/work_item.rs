// SPDX-License-Identifier: MIT

//! `WorkItem` — the unit of scheduling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{ItemId, ProjectId};

/// Closed set of work item kinds the engine dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkItemType {
    Issue,
    Comment,
    Dogfooding,
    Documentation,
    Quality,
    Review,
    ErrorLog,
}

impl WorkItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Issue => "issue",
            Self::Comment => "comment",
            Self::Dogfooding => "dogfooding",
            Self::Documentation => "documentation",
            Self::Quality => "quality",
            Self::Review => "review",
            Self::ErrorLog => "error-log",
        }
    }
}

impl std::fmt::Display for WorkItemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where a WorkItem currently sits. Invariant I-1: a WorkItem is referenced
/// by at most one of {queue, running set, dead-letter store} at any instant;
/// this enum names which one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkItemStatus {
    Enqueued,
    Locked,
    Running,
    Succeeded,
    TransientFailed,
    HardFailed,
    TimedOut,
    ReEnqueued,
    DeadLettered,
    Retired,
}

/// The unit of scheduling. Identity is `(project_id, item_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub project_id: ProjectId,
    pub item_id: ItemId,
    pub item_type: WorkItemType,
    pub priority: i32,
    pub deadline: Option<DateTime<Utc>>,
    pub max_retries: Option<u32>,
    pub created_at: DateTime<Utc>,
    /// Opaque to the engine; interpreted only by the external adapter/worker.
    pub payload: serde_json::Value,
    /// Lets an adapter self-describe its payload shape without the engine parsing it.
    pub schema_hint: Option<String>,
}

impl WorkItem {
    pub fn key(&self) -> crate::id::ItemKey {
        crate::id::ItemKey::new(self.project_id.clone(), self.item_id.clone())
    }
}
