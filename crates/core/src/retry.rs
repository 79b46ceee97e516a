// SPDX-License-Identifier: MIT

//! `RetryState` and the closed error-kind taxonomy it classifies against.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Closed set of error kinds, evaluated in order (first match wins) by the
/// Retry Controller's classifier chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    RateLimit,
    Network,
    Timeout,
    ApiError,
    Auth,
    Validation,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RateLimit => "rate-limit",
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::ApiError => "api-error",
            Self::Auth => "auth",
            Self::Validation => "validation",
            Self::Unknown => "unknown",
        }
    }

    /// `auth` and `validation` are hard failures with no retry budget by default.
    pub fn default_retryable(&self) -> bool {
        !matches!(self, Self::Auth | Self::Validation)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One classified failure in a WorkItem's retry history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
    /// A server-supplied `Retry-After` hint, if the failure carried one.
    #[serde(default, with = "duration_ms_opt")]
    pub retry_after_hint: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStatus {
    /// Currently running or awaiting an outcome.
    Active,
    /// Waiting in the retry map for `next_retry_at` to elapse.
    Scheduled,
}

/// One per in-flight WorkItem that has failed at least once.
///
/// Invariant I-2: `attempts <= max_retries_for(last_error.kind)` at all
/// times; exceeding the cap triggers dead-lettering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryState {
    pub attempts: u32,
    pub errors: Vec<ClassifiedError>,
    pub first_attempt_at: DateTime<Utc>,
    pub last_error_at: DateTime<Utc>,
    pub next_retry_at: DateTime<Utc>,
    pub status: RetryStatus,
}

impl RetryState {
    pub fn first_failure(now: DateTime<Utc>, error: ClassifiedError, next_retry_at: DateTime<Utc>) -> Self {
        Self {
            attempts: 1,
            errors: vec![error],
            first_attempt_at: now,
            last_error_at: now,
            next_retry_at,
            status: RetryStatus::Scheduled,
        }
    }

    /// Record an additional failure. `next_retry_at` must be monotone
    /// non-decreasing during a retry chain (P3); callers compute the new
    /// value and pass it in rather than this type guessing a backoff.
    pub fn record_failure(&mut self, now: DateTime<Utc>, error: ClassifiedError, next_retry_at: DateTime<Utc>) {
        debug_assert!(next_retry_at >= self.next_retry_at);
        self.attempts += 1;
        self.last_error_at = now;
        self.next_retry_at = next_retry_at.max(self.next_retry_at);
        self.errors.push(error);
        self.status = RetryStatus::Scheduled;
    }

    pub fn last_error(&self) -> Option<&ClassifiedError> {
        self.errors.last()
    }
}


mod duration_ms_opt {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        value.map(|d| d.as_millis() as u64).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let ms = Option::<u64>::deserialize(d)?;
        Ok(ms.map(Duration::from_millis))
    }
}
