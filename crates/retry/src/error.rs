// SPDX-License-Identifier: MIT

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RetryError {
    #[error("no retry state found for item key {0}")]
    NoRetryState(String),
}
