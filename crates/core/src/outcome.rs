// SPDX-License-Identifier: MIT

//! The result of running a WorkItem through the Worker Pool.

use serde::{Deserialize, Serialize};

use crate::retry::ErrorKind;

/// `outcome ∈ {success, transient(kind), hard_fail(kind), timeout, canceled}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Transient { kind: ErrorKind },
    HardFail { kind: ErrorKind },
    Timeout,
    /// Cooperatively cancelled mid-run; treated by the Retry Controller as a
    /// hard failure (no retry).
    Canceled,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}
