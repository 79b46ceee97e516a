// SPDX-License-Identifier: MIT

//! The Retry Controller: given a failed `(item, error)` pair, decides one of
//! `{retry after delta, dead-letter, block via circuit breaker}`.

use chrono::{DateTime, Utc};
use poppo_core::{
    CircuitBreakerKey, ClassifiedError, DeadLetterReason, ErrorKind, RetryState, WorkItem,
};

use crate::anomaly::AnomalyDetector;
use crate::breaker::CircuitBreakerBank;
use crate::classifier::{ErrorClassifier, FailureSignal, TaxonomyClassifier};
use crate::config::RetryConfig;

/// What the Dispatcher should do next, following a worker failure.
#[derive(Debug, Clone)]
pub enum Decision {
    /// Persist `retry_state` and re-enqueue with `next_retry_at`.
    Retry { retry_state: RetryState, delay: std::time::Duration },
    /// Move the item to the dead-letter store.
    DeadLetter { reason: DeadLetterReason, retry_state: Option<RetryState> },
}

/// Classifies failures, computes backoff, owns the circuit-breaker bank, and
/// emits anomaly alerts. One instance per daemon, process-wide singleton per
/// the data model's ownership note — but constructed explicitly and owned by
/// the Dispatcher rather than a hidden module-level global.
pub struct RetryController {
    config: RetryConfig,
    classifiers: Vec<Box<dyn ErrorClassifier>>,
    breakers: CircuitBreakerBank,
    anomalies: AnomalyDetector,
}

impl RetryController {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            classifiers: vec![Box::new(TaxonomyClassifier)],
            breakers: CircuitBreakerBank::new(),
            anomalies: AnomalyDetector::new(),
        }
    }

    pub fn restore_breakers(&mut self, breakers: std::collections::HashMap<String, poppo_core::CircuitBreaker>) {
        self.breakers = CircuitBreakerBank::restore(breakers);
    }

    pub fn breaker_snapshot(&self) -> std::collections::HashMap<String, poppo_core::CircuitBreaker> {
        self.breakers.snapshot()
    }

    /// Register a custom classifier ahead of the built-in taxonomy.
    pub fn register_classifier(&mut self, classifier: Box<dyn ErrorClassifier>) {
        self.classifiers.insert(0, classifier);
    }

    pub fn classify(&self, signal: &FailureSignal) -> ErrorKind {
        for classifier in &self.classifiers {
            if let Some(kind) = classifier.classify(signal) {
                return kind;
            }
        }
        ErrorKind::Unknown
    }

    pub fn breaker_allows(&mut self, key: &CircuitBreakerKey, now: DateTime<Utc>) -> bool {
        self.breakers.is_allowed(key, &self.config.circuit_breaker, now)
    }

    pub fn record_success(&mut self, key: &CircuitBreakerKey, retry_state: Option<&RetryState>) {
        self.breakers.record_success(key);
        let _ = retry_state;
    }

    /// The full decision algorithm from §4.3, steps 1-5.
    #[allow(clippy::too_many_arguments)]
    pub fn decide(
        &mut self,
        item: &WorkItem,
        breaker_key: &CircuitBreakerKey,
        signal: &FailureSignal,
        retry_state: Option<RetryState>,
        now: DateTime<Utc>,
    ) -> Decision {
        // Step 1: circuit breaker.
        if !self.breakers.is_allowed(breaker_key, &self.config.circuit_breaker, now) {
            return Decision::DeadLetter {
                reason: DeadLetterReason::CircuitBreakerOpen,
                retry_state,
            };
        }
        if matches!(
            self.breakers.snapshot().get(&breaker_key.to_string()).map(|b| b.state),
            Some(poppo_core::CircuitState::HalfOpen)
        ) {
            self.breakers.note_half_open_probe(breaker_key);
        }

        // Step 2: classify and compute attempts+1.
        let kind = self.classify(signal);
        let next_attempts = retry_state.as_ref().map(|r| r.attempts + 1).unwrap_or(1);

        self.breakers.record_failure(breaker_key, &self.config.circuit_breaker, now);
        self.anomalies.record_failure(item.key().sanitized(), now, self.config.retry_storm_window_secs);

        // Step 3: max-retries check (taxonomy cap and item-specific override).
        let kind_max = self.config.max_for(kind);
        let item_max = item.max_retries.unwrap_or(kind_max);
        let effective_max = kind_max.min(item_max);
        if next_attempts > effective_max {
            let error = ClassifiedError {
                kind,
                message: signal.message.clone(),
                occurred_at: now,
                retry_after_hint: signal.retry_after,
            };
            let state = apply_error(retry_state, now, error, now);
            return Decision::DeadLetter {
                reason: DeadLetterReason::MaxRetriesExceeded,
                retry_state: Some(state),
            };
        }

        // Non-retryable kinds (auth/validation by default) dead-letter immediately.
        if !kind.default_retryable() && !(kind == ErrorKind::Auth && self.config.auth_retry_once) {
            let error = ClassifiedError {
                kind,
                message: signal.message.clone(),
                occurred_at: now,
                retry_after_hint: signal.retry_after,
            };
            let state = apply_error(retry_state, now, error, now);
            return Decision::DeadLetter {
                reason: DeadLetterReason::NonRetryable,
                retry_state: Some(state),
            };
        }

        // Compute backoff delay, honoring server-supplied Retry-After as a floor.
        let mut delay = self.config.backoff_for(kind).delay(next_attempts);
        if kind == ErrorKind::RateLimit {
            if let Some(hint) = signal.retry_after {
                delay = delay.max(hint);
            }
        }
        let next_retry_at = now + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::zero());

        // Step 4: deadline check.
        if let Some(deadline) = item.deadline {
            if next_retry_at > deadline {
                let error = ClassifiedError {
                    kind,
                    message: signal.message.clone(),
                    occurred_at: now,
                    retry_after_hint: signal.retry_after,
                };
                let state = apply_error(retry_state, now, error, now);
                return Decision::DeadLetter {
                    reason: DeadLetterReason::DeadlineExceeded,
                    retry_state: Some(state),
                };
            }
        }

        // Step 5: persist updated RetryState, return retry decision.
        let error = ClassifiedError {
            kind,
            message: signal.message.clone(),
            occurred_at: now,
            retry_after_hint: signal.retry_after,
        };
        let state = apply_error(retry_state, now, error, next_retry_at);
        Decision::Retry { retry_state: state, delay }
    }

    pub fn is_retry_storm(&self, item_key: &str, now: DateTime<Utc>) -> bool {
        self.anomalies.is_retry_storm(
            item_key,
            now,
            self.config.retry_storm_threshold,
            self.config.retry_storm_window_secs,
        )
    }

    pub fn consecutive_failure_alert(&self, item_key: &str) -> bool {
        self.anomalies.consecutive_failures(item_key) >= self.config.alert_threshold
    }
}

fn apply_error(
    retry_state: Option<RetryState>,
    now: DateTime<Utc>,
    error: ClassifiedError,
    next_retry_at: DateTime<Utc>,
) -> RetryState {
    match retry_state {
        Some(mut state) => {
            state.record_failure(now, error, next_retry_at);
            state
        }
        None => RetryState::first_failure(now, error, next_retry_at),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use poppo_core::{ItemId, ProjectId, WorkItemType};
    use std::time::Duration;

    fn item() -> WorkItem {
        poppo_core::test_support::sample_work_item("projectA", "issue", 5)
    }

    fn breaker_key() -> CircuitBreakerKey {
        CircuitBreakerKey::new(ProjectId::from("projectA"), WorkItemType::Issue)
    }

    #[test]
    fn auth_errors_hard_fail_by_default() {
        let mut controller = RetryController::new(RetryConfig::default());
        let signal = FailureSignal {
            status_code: Some(401),
            message: "unauthorized".to_string(),
            retry_after: None,
        };
        let decision = controller.decide(&item(), &breaker_key(), &signal, None, Utc::now());
        assert!(matches!(
            decision,
            Decision::DeadLetter {
                reason: DeadLetterReason::NonRetryable,
                ..
            }
        ));
    }

    #[test]
    fn rate_limit_retry_after_header_floors_the_delay() {
        let mut controller = RetryController::new(RetryConfig::default());
        let signal = FailureSignal {
            status_code: Some(429),
            message: "too many requests".to_string(),
            retry_after: Some(Duration::from_secs(7)),
        };
        let decision = controller.decide(&item(), &breaker_key(), &signal, None, Utc::now());
        match decision {
            Decision::Retry { delay, .. } => assert!(delay >= Duration::from_secs(7)),
            other => panic!("expected retry, got {other:?}"),
        }
    }

    #[test]
    fn exceeding_max_retries_dead_letters() {
        let mut controller = RetryController::new(RetryConfig::default());
        let signal = FailureSignal {
            status_code: Some(503),
            message: "server error".to_string(),
            retry_after: None,
        };
        let mut state = None;
        let mut decision = controller.decide(&item(), &breaker_key(), &signal, state.clone(), Utc::now());
        // api-error caps at 2 attempts.
        for _ in 0..2 {
            if let Decision::Retry { retry_state, .. } = decision {
                state = Some(retry_state);
            }
            decision = controller.decide(&item(), &breaker_key(), &signal, state.clone(), Utc::now());
        }
        assert!(matches!(
            decision,
            Decision::DeadLetter {
                reason: DeadLetterReason::MaxRetriesExceeded,
                ..
            }
        ));
    }

    #[test]
    fn item_specific_max_retries_overrides_taxonomy_cap() {
        let mut controller = RetryController::new(RetryConfig::default());
        let mut custom_item = item();
        custom_item.item_id = ItemId::from("capped");
        custom_item.max_retries = Some(0);
        let signal = FailureSignal {
            status_code: Some(503),
            message: "server error".to_string(),
            retry_after: None,
        };
        let decision = controller.decide(&custom_item, &breaker_key(), &signal, None, Utc::now());
        assert!(matches!(
            decision,
            Decision::DeadLetter {
                reason: DeadLetterReason::MaxRetriesExceeded,
                ..
            }
        ));
    }

    #[test]
    fn open_breaker_dead_letters_immediately() {
        let mut controller = RetryController::new(RetryConfig {
            circuit_breaker: crate::breaker::CircuitBreakerConfig {
                threshold: 1,
                ..Default::default()
            },
            ..Default::default()
        });
        let signal = FailureSignal {
            status_code: Some(503),
            message: "server error".to_string(),
            retry_after: None,
        };
        let now = Utc::now();
        let _ = controller.decide(&item(), &breaker_key(), &signal, None, now);
        let decision = controller.decide(&item(), &breaker_key(), &signal, None, now);
        assert!(matches!(
            decision,
            Decision::DeadLetter {
                reason: DeadLetterReason::CircuitBreakerOpen,
                ..
            }
        ));
    }
}
