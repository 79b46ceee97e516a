// SPDX-License-Identifier: MIT

//! The Lock Store (C1) and Persistence Layer (C2): filesystem-based
//! cross-process exclusive locking, the dead-letter record store, and a
//! `StateStore` trait backed by one of three interchangeable engines (file,
//! sql, cache).

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

pub mod backend;
pub mod config;
pub mod dead_letter_store;
pub mod error;
pub mod lock_store;

pub use backend::{build as build_state_store, StateStore};
pub use config::{DeadLetterConfig, LockStoreConfig, StateBackendKind, StatePersistenceConfig};
pub use dead_letter_store::DeadLetterStore;
pub use error::{LockStoreError, StateStoreError};
pub use lock_store::LockStore;
