// SPDX-License-Identifier: MIT

//! Retry Controller configuration: per-kind retry caps, backoff, circuit
//! breaker thresholds, and anomaly-detection knobs.

use std::collections::HashMap;

use poppo_core::ErrorKind;
use serde::{Deserialize, Serialize};

use crate::backoff::{BackoffConfig, BackoffStrategy};
use crate::breaker::CircuitBreakerConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Per-kind maximum attempts, per §4.3's taxonomy defaults.
    pub max_retries: HashMap<ErrorKind, u32>,
    /// Baseline timing (initial delay, ceiling, multiplier, jitter) shared by
    /// every kind; `backoff_strategies` overrides which curve applies.
    pub backoff: BackoffConfig,
    /// Per-kind strategy override, per §4.3: `rate-limit` stays fixed-delay
    /// rather than growing exponentially on repeated attempts, everything
    /// else defaults to `backoff.strategy`.
    pub backoff_strategies: HashMap<ErrorKind, BackoffStrategy>,
    pub circuit_breaker: CircuitBreakerConfig,
    /// If true, `auth` failures get one retry before hard-failing (Open
    /// Question in §9, default false — "never").
    pub auth_retry_once: bool,
    pub alert_threshold: u32,
    /// More than this many retries for the same key within the rolling
    /// window counts as a "retry storm".
    pub retry_storm_threshold: u32,
    pub retry_storm_window_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let mut max_retries = HashMap::new();
        max_retries.insert(ErrorKind::RateLimit, 5);
        max_retries.insert(ErrorKind::Network, 5);
        max_retries.insert(ErrorKind::Timeout, 3);
        max_retries.insert(ErrorKind::ApiError, 2);
        max_retries.insert(ErrorKind::Auth, 0);
        max_retries.insert(ErrorKind::Validation, 0);
        max_retries.insert(ErrorKind::Unknown, 3);

        let mut backoff_strategies = HashMap::new();
        backoff_strategies.insert(ErrorKind::RateLimit, BackoffStrategy::Fixed);

        Self {
            max_retries,
            backoff: BackoffConfig::default(),
            backoff_strategies,
            circuit_breaker: CircuitBreakerConfig::default(),
            auth_retry_once: false,
            alert_threshold: 3,
            retry_storm_threshold: 10,
            retry_storm_window_secs: 300,
        }
    }
}

impl RetryConfig {
    pub fn max_for(&self, kind: ErrorKind) -> u32 {
        if kind == ErrorKind::Auth && self.auth_retry_once {
            return 1;
        }
        self.max_retries.get(&kind).copied().unwrap_or(3)
    }

    /// The backoff strategy to use for `kind`, overriding `backoff.strategy`
    /// where §4.3 calls for a different curve (fixed-delay for rate limits).
    pub fn strategy_for(&self, kind: ErrorKind) -> BackoffStrategy {
        self.backoff_strategies.get(&kind).copied().unwrap_or(self.backoff.strategy)
    }

    /// `backoff`, with its strategy overridden for `kind`.
    pub fn backoff_for(&self, kind: ErrorKind) -> BackoffConfig {
        BackoffConfig {
            strategy: self.strategy_for(kind),
            ..self.backoff
        }
    }
}
