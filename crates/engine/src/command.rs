// SPDX-License-Identifier: MIT

//! Out-of-band commands the socket listener feeds into the dispatch loop.
//!
//! The Dispatcher's state (queue, retry map, handles) is only ever touched
//! from its own task, so an operator request (`status`, `kill`, a
//! maintenance toggle) is shipped across a channel and answered with a
//! oneshot reply rather than shared behind a mutex.

use std::collections::HashSet;
use std::time::Duration;

use poppo_core::WorkItemType;
use poppo_retry::RetryConfig;
use tokio::sync::oneshot;

use crate::config::MonitorConfig;

/// Point-in-time view of the dispatcher, enough to answer `status`.
#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    pub uptime: Duration,
    pub queue_depth: usize,
    pub running_count: usize,
    pub dead_letter_count: usize,
    pub active_locks: usize,
    pub maintenance: Option<MaintenanceStatus>,
}

#[derive(Debug, Clone)]
pub struct MaintenanceStatus {
    pub until: chrono::DateTime<chrono::Utc>,
    pub allow: HashSet<WorkItemType>,
}

/// Commands the listener sends to the dispatch loop. Each carries a
/// reply channel; the loop answers inline on its own select arm, so no
/// command ever blocks on I/O owned by another task.
pub enum DispatcherCommand {
    Status(oneshot::Sender<StatusSnapshot>),
    CancelTask {
        key: String,
        reply: oneshot::Sender<bool>,
    },
    EnterMaintenance {
        duration: Duration,
        allow: HashSet<WorkItemType>,
        reply: oneshot::Sender<()>,
    },
    LeaveMaintenance {
        reply: oneshot::Sender<()>,
    },
    RetryDeadLetter {
        id: uuid::Uuid,
        reply: oneshot::Sender<Result<(), String>>,
    },
    /// Apply a hot-reloaded retry/monitor configuration. Worker concurrency
    /// caps are not included: the pool's semaphores are sized once at
    /// construction and resizing them live is not supported, so changing
    /// those keys still requires a restart.
    Reload {
        retry: RetryConfig,
        monitor: MonitorConfig,
        reply: oneshot::Sender<()>,
    },
}
