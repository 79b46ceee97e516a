// SPDX-License-Identifier: MIT

//! `DeadLetter` — immutable record of an abandoned WorkItem.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::retry::RetryState;
use crate::work_item::WorkItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeadLetterReason {
    CircuitBreakerOpen,
    MaxRetriesExceeded,
    DeadlineExceeded,
    /// `auth`/`validation` classified failures, and cancellation: never retried.
    NonRetryable,
    CrashRecoveryExhausted,
}

impl DeadLetterReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CircuitBreakerOpen => "circuit-breaker-open",
            Self::MaxRetriesExceeded => "max-retries-exceeded",
            Self::DeadlineExceeded => "deadline-exceeded",
            Self::NonRetryable => "non-retryable",
            Self::CrashRecoveryExhausted => "crash-recovery-exhausted",
        }
    }
}

impl std::fmt::Display for DeadLetterReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetter {
    pub id: Uuid,
    pub item: WorkItem,
    pub reason: DeadLetterReason,
    pub retry_state: Option<RetryState>,
    pub dead_lettered_at: DateTime<Utc>,
}

impl DeadLetter {
    pub fn new(item: WorkItem, reason: DeadLetterReason, retry_state: Option<RetryState>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            item,
            reason,
            retry_state,
            dead_lettered_at: now,
        }
    }
}
