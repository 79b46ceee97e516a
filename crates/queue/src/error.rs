// SPDX-License-Identifier: MIT

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("project {project} queue is at capacity ({cap})")]
    AdmissionRefused { project: String, cap: u32 },
    #[error("item {0} is already queued")]
    DuplicateItem(String),
    #[error("no such item queued or running: {0}")]
    NotFound(String),
}
