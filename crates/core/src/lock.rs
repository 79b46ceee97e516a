// SPDX-License-Identifier: MIT

//! `Lock` — exclusive assertion that a given WorkItem is being processed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::id::Holder;

/// Invariant I-3: at any wall-clock instant, at most one valid Lock exists
/// per `item_key`; a lock is valid iff `now < expires_at` and the holder
/// process exists on the same host (best-effort via PID probe).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lock {
    pub item_key: String,
    pub holder: Holder,
    pub acquired_at: DateTime<Utc>,
    #[serde(with = "duration_ms")]
    pub ttl: Duration,
    pub expires_at: DateTime<Utc>,
}

impl Lock {
    pub fn new(item_key: String, holder: Holder, acquired_at: DateTime<Utc>, ttl: Duration) -> Self {
        let expires_at = acquired_at + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::zero());
        Self {
            item_key,
            holder,
            acquired_at,
            ttl,
            expires_at,
        }
    }

    /// Expiry alone, ignoring PID liveness (that check requires a host probe
    /// and lives in `poppo-storage`).
    pub fn expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn renew(&mut self, extra_ttl: Duration) {
        self.expires_at += chrono::Duration::from_std(extra_ttl).unwrap_or(chrono::Duration::zero());
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        (value.as_millis() as u64).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
