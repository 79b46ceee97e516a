// SPDX-License-Identifier: MIT

//! The Retry Controller (C3): classifies worker failures, computes backoff,
//! maintains per-`(project, type)` circuit breakers, and routes unrecoverable
//! items to the dead-letter store.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

pub mod anomaly;
pub mod backoff;
pub mod breaker;
pub mod classifier;
pub mod config;
pub mod controller;
pub mod error;

pub use backoff::BackoffStrategy;
pub use classifier::{ErrorClassifier, FailureSignal, TaxonomyClassifier};
pub use config::RetryConfig;
pub use controller::{Decision, RetryController};
pub use error::RetryError;
