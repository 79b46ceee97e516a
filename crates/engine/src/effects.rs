// SPDX-License-Identifier: MIT

//! The Dispatcher's decision/effect split: every step of the top-level loop
//! first computes a closed set of `Effect`s from the current state and an
//! input (a worker outcome, a timer tick, a startup reconciliation), then a
//! separate executor performs the I/O each `Effect` names. Keeping the two
//! apart makes the decision half pure and unit-testable without a runtime.

use std::time::Duration;

use chrono::{DateTime, Utc};
use poppo_core::{DeadLetterReason, RetryState, TaskId, WorkItem};

/// A narrative event worth a structured log line (and, eventually, a CLI
/// `status`/`logs` view). Distinct from `Effect` because several effects can
/// share one event (e.g. a retry decision both re-enqueues and logs).
#[derive(Debug, Clone)]
pub enum DispatchEvent {
    Started { task_id: TaskId, item_key: String },
    Succeeded { task_id: TaskId, item_key: String },
    Retried { item_key: String, delay: Duration, attempts: u32 },
    DeadLettered { item_key: String, reason: DeadLetterReason },
    CrashRecovered { item_key: String },
    LockContention { item_key: String },
}

impl DispatchEvent {
    /// A one-line human summary, the same role as the teacher's
    /// `Event::log_summary`.
    pub fn log_summary(&self) -> String {
        match self {
            Self::Started { item_key, .. } => format!("started {item_key}"),
            Self::Succeeded { item_key, .. } => format!("succeeded {item_key}"),
            Self::Retried { item_key, delay, attempts } => {
                format!("retrying {item_key} in {delay:?} (attempt {attempts})")
            }
            Self::DeadLettered { item_key, reason } => format!("dead-lettered {item_key}: {reason}"),
            Self::CrashRecovered { item_key } => format!("recovered {item_key} after crash"),
            Self::LockContention { item_key } => format!("lock contention on {item_key}"),
        }
    }
}

/// Everything the Dispatcher's decision path can ask the executor to do.
/// Closed by design: adding a new kind of side effect means adding a variant
/// here, not reaching for ad hoc I/O inside the decision function.
#[derive(Debug, Clone)]
pub enum Effect {
    EmitEvent(DispatchEvent),
    AcquireLock { item: WorkItem, task_id: TaskId },
    SubmitToPool { item: WorkItem, task_id: TaskId },
    ReleaseLock { item_key: String },
    EnqueueRetry { item: WorkItem, retry_state: RetryState, next_retry_at: DateTime<Utc> },
    DeadLetter { item: WorkItem, reason: DeadLetterReason, retry_state: Option<RetryState> },
    Snapshot,
}

impl Effect {
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        match self {
            Self::EmitEvent(event) => vec![("summary", event.log_summary())],
            Self::AcquireLock { item, task_id } => {
                vec![("item", item.key().to_string()), ("task_id", task_id.to_string())]
            }
            Self::SubmitToPool { item, task_id } => {
                vec![("item", item.key().to_string()), ("task_id", task_id.to_string())]
            }
            Self::ReleaseLock { item_key } => vec![("item", item_key.clone())],
            Self::EnqueueRetry { item, next_retry_at, .. } => {
                vec![("item", item.key().to_string()), ("next_retry_at", next_retry_at.to_rfc3339())]
            }
            Self::DeadLetter { item, reason, .. } => {
                vec![("item", item.key().to_string()), ("reason", reason.to_string())]
            }
            Self::Snapshot => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retried_event_summary_mentions_delay() {
        let event = DispatchEvent::Retried {
            item_key: "org/repo/1".to_string(),
            delay: Duration::from_secs(5),
            attempts: 2,
        };
        assert!(event.log_summary().contains("org/repo/1"));
        assert!(event.log_summary().contains("attempt 2"));
    }
}
