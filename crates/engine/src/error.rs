// SPDX-License-Identifier: MIT

//! The Dispatcher's own error enum: wraps every lower-layer error with
//! `#[from]`. Unlike the per-crate enums it wraps, values of this type are
//! logged and swallowed rather than propagated — the dispatch loop must
//! keep running through a single bad snapshot write or a single spawn
//! failure.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Lock(#[from] poppo_storage::LockStoreError),

    #[error(transparent)]
    State(#[from] poppo_storage::StateStoreError),

    #[error(transparent)]
    Queue(#[from] poppo_queue::QueueError),

    #[error(transparent)]
    Worker(#[from] poppo_worker::WorkerPoolError),

    #[error("dead letter not found: {0}")]
    DeadLetterNotFound(uuid::Uuid),
}
