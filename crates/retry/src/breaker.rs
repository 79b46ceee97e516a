// SPDX-License-Identifier: MIT

//! Per-`(project, type)` circuit breaker bank.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use poppo_core::{CircuitBreaker, CircuitBreakerKey, CircuitState};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    pub threshold: u32,
    pub cooldown_ms: u64,
    pub half_open_probes: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            threshold: 5,
            cooldown_ms: 30_000,
            half_open_probes: 2,
        }
    }
}

/// Owns every `(project, type)` circuit breaker. Opens when consecutive
/// failures reach `threshold`; after `cooldown_ms` the next check sees it as
/// half-open, admitting up to `half_open_probes` probes.
#[derive(Debug, Default)]
pub struct CircuitBreakerBank {
    breakers: HashMap<String, CircuitBreaker>,
}

impl CircuitBreakerBank {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn restore(breakers: HashMap<String, CircuitBreaker>) -> Self {
        Self { breakers }
    }

    pub fn snapshot(&self) -> HashMap<String, CircuitBreaker> {
        self.breakers.clone()
    }

    /// Whether dispatch is currently allowed for this key. Transitions a
    /// breaker whose cooldown has elapsed from `open` to `half_open` as a
    /// side effect of the check.
    pub fn is_allowed(&mut self, key: &CircuitBreakerKey, config: &CircuitBreakerConfig, now: DateTime<Utc>) -> bool {
        let entry = self.breakers.entry(key.to_string()).or_default();
        if entry.state == CircuitState::Open {
            if let Some(opened_at) = entry.opened_at {
                let cooldown = chrono::Duration::milliseconds(config.cooldown_ms as i64);
                if now >= opened_at + cooldown {
                    entry.state = CircuitState::HalfOpen;
                    entry.half_open_probes_used = 0;
                }
            }
        }
        match entry.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => entry.half_open_probes_used < config.half_open_probes,
            CircuitState::Open => false,
        }
    }

    pub fn record_success(&mut self, key: &CircuitBreakerKey) {
        let entry = self.breakers.entry(key.to_string()).or_default();
        entry.consecutive_failures = 0;
        if entry.state == CircuitState::HalfOpen {
            entry.state = CircuitState::Closed;
            entry.half_open_probes_used = 0;
            entry.opened_at = None;
        }
    }

    pub fn record_failure(&mut self, key: &CircuitBreakerKey, config: &CircuitBreakerConfig, now: DateTime<Utc>) {
        let entry = self.breakers.entry(key.to_string()).or_default();
        match entry.state {
            CircuitState::HalfOpen => {
                entry.state = CircuitState::Open;
                entry.opened_at = Some(now);
                entry.half_open_probes_used = 0;
                entry.consecutive_failures += 1;
            }
            CircuitState::Closed => {
                entry.consecutive_failures += 1;
                if entry.consecutive_failures >= config.threshold {
                    entry.state = CircuitState::Open;
                    entry.opened_at = Some(now);
                }
            }
            CircuitState::Open => {
                entry.consecutive_failures += 1;
            }
        }
    }

    /// Called whenever `is_allowed` admits a half-open probe, so the next
    /// check can enforce the probe budget.
    pub fn note_half_open_probe(&mut self, key: &CircuitBreakerKey) {
        if let Some(entry) = self.breakers.get_mut(&key.to_string()) {
            if entry.state == CircuitState::HalfOpen {
                entry.half_open_probes_used += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use poppo_core::{ProjectId, WorkItemType};

    fn key() -> CircuitBreakerKey {
        CircuitBreakerKey::new(ProjectId::from("projectA"), WorkItemType::Issue)
    }

    #[test]
    fn opens_after_threshold_consecutive_failures() {
        let mut bank = CircuitBreakerBank::new();
        let config = CircuitBreakerConfig {
            threshold: 5,
            ..Default::default()
        };
        let now = Utc::now();
        for _ in 0..4 {
            bank.record_failure(&key(), &config, now);
            assert!(bank.is_allowed(&key(), &config, now));
        }
        bank.record_failure(&key(), &config, now);
        assert!(!bank.is_allowed(&key(), &config, now));
    }

    #[test]
    fn cooldown_elapsed_moves_to_half_open_then_closes_on_success() {
        let mut bank = CircuitBreakerBank::new();
        let config = CircuitBreakerConfig {
            threshold: 1,
            cooldown_ms: 1_000,
            half_open_probes: 2,
        };
        let t0 = Utc::now();
        bank.record_failure(&key(), &config, t0);
        assert!(!bank.is_allowed(&key(), &config, t0));

        let after_cooldown = t0 + chrono::Duration::milliseconds(1_500);
        assert!(bank.is_allowed(&key(), &config, after_cooldown));
        bank.note_half_open_probe(&key());
        bank.record_success(&key());
        assert!(bank.is_allowed(&key(), &config, after_cooldown));
    }

    #[test]
    fn failure_while_half_open_reopens_immediately() {
        let mut bank = CircuitBreakerBank::new();
        let config = CircuitBreakerConfig {
            threshold: 1,
            cooldown_ms: 1_000,
            half_open_probes: 2,
        };
        let t0 = Utc::now();
        bank.record_failure(&key(), &config, t0);
        let after_cooldown = t0 + chrono::Duration::milliseconds(1_500);
        assert!(bank.is_allowed(&key(), &config, after_cooldown));
        bank.note_half_open_probe(&key());
        bank.record_failure(&key(), &config, after_cooldown);
        assert!(!bank.is_allowed(&key(), &config, after_cooldown));
    }
}
