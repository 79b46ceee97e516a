// SPDX-License-Identifier: MIT

//! Identity newtypes threaded through the rest of the engine.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Upstream project identifier, e.g. `"org/repo"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProjectId(pub String);

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ProjectId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ProjectId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Upstream item identifier (e.g. a numeric issue id), unique within a project.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemId(pub String);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ItemId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// `(project_id, item_id)` — a WorkItem's identity, globally unique within a project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemKey {
    pub project_id: ProjectId,
    pub item_id: ItemId,
}

impl ItemKey {
    pub fn new(project_id: impl Into<ProjectId>, item_id: impl Into<ItemId>) -> Self {
        Self {
            project_id: project_id.into(),
            item_id: item_id.into(),
        }
    }

    /// Filesystem-safe rendering used for lock file names and dead-letter ids.
    pub fn sanitized(&self) -> String {
        let raw = format!("{}__{}", self.project_id, self.item_id);
        raw.chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.project_id, self.item_id)
    }
}

/// A dispatch attempt id, fresh for every time a WorkItem is submitted to the worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A daemon process lifetime id, distinguishing restarts of the same host/pid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The identity of whoever holds a [`crate::Lock`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holder {
    pub pid: u32,
    pub hostname: String,
    pub session_id: SessionId,
    pub task_id: TaskId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitized_key_strips_unsafe_characters() {
        let key = ItemKey::new("org/repo", "issue #42");
        assert_eq!(key.sanitized(), "org_repo__issue__42");
    }

    #[test]
    fn display_matches_spec_slash_form() {
        let key = ItemKey::new("org/repo", "42");
        assert_eq!(key.to_string(), "org/repo/42");
    }
}
