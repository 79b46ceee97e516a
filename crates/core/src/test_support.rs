// SPDX-License-Identifier: MIT

//! Test-only builders shared across crates (enabled via the `test-support` feature).

use chrono::Utc;
use serde_json::json;

use crate::id::{Holder, ItemId, ProjectId, SessionId, TaskId};
use crate::work_item::{WorkItem, WorkItemType};

pub fn sample_holder() -> Holder {
    Holder {
        pid: std::process::id(),
        hostname: "test-host".to_string(),
        session_id: SessionId::new(),
        task_id: TaskId::new(),
    }
}

pub fn sample_work_item(project: &str, item: &str, priority: i32) -> WorkItem {
    WorkItem {
        project_id: ProjectId::from(project),
        item_id: ItemId::from(item),
        item_type: WorkItemType::Issue,
        priority,
        deadline: None,
        max_retries: None,
        created_at: Utc::now(),
        payload: json!({}),
        schema_hint: None,
    }
}
