// SPDX-License-Identifier: MIT

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerPoolError {
    #[error("global concurrency cap reached")]
    GlobalCapacityExhausted,
    #[error("per-project concurrency cap reached for {0}")]
    ProjectCapacityExhausted(String),
    #[error("failed to spawn worker: {0}")]
    SpawnFailed(#[from] std::io::Error),
    #[error("failed to open log file {path}: {source}")]
    LogOpenFailed { path: String, source: std::io::Error },
}
