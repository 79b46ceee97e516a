// SPDX-License-Identifier: MIT

//! Handles for a running task: a cancellation handle the Dispatcher holds,
//! and the eventual outcome it is reported via.

use std::path::PathBuf;

use poppo_core::{Outcome, TaskId};
use tokio::sync::oneshot;

use crate::telemetry::Telemetry;

#[derive(Debug, Clone)]
pub struct TaskResult {
    pub task_id: TaskId,
    /// The pool's own read of the exit: success, timeout, canceled, or a
    /// provisional `Transient(unknown)` for any other nonzero exit. A failed
    /// exit's true [`poppo_core::ErrorKind`] is assigned upstream by running
    /// `stderr_tail` back through the Retry Controller's classifier — the
    /// pool has no taxonomy of its own.
    pub outcome: Outcome,
    pub exit_code: Option<i32>,
    pub log_path: PathBuf,
    pub telemetry: Telemetry,
    /// Last few captured stderr lines, for error classification and operator `logs`.
    pub stderr_tail: String,
}

/// Held by the Dispatcher for a task in flight. Dropping it without calling
/// [`TaskHandle::cancel`] leaves the task to run to completion or timeout.
pub struct TaskHandle {
    pub task_id: TaskId,
    pub(crate) cancel_tx: Option<oneshot::Sender<()>>,
}

impl TaskHandle {
    /// Request cooperative cancellation (SIGTERM, then SIGKILL after grace).
    pub fn cancel(&mut self) {
        if let Some(tx) = self.cancel_tx.take() {
            let _ = tx.send(());
        }
    }
}
