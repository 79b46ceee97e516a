// SPDX-License-Identifier: MIT

//! Backoff delay computation: `delay = clamp(base * multiplier^(attempts-1), 0, ceiling)`
//! with +/- jitter%, strategy selectable per error kind.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    Exponential,
    Linear,
    Fixed,
    Immediate,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BackoffConfig {
    pub strategy: BackoffStrategy,
    pub initial_ms: u64,
    pub max_ms: u64,
    pub multiplier: f64,
    /// Fraction in `[0, 1]`, e.g. `0.1` for +/-10%.
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            strategy: BackoffStrategy::Exponential,
            initial_ms: 1_000,
            max_ms: 5 * 60 * 1_000,
            multiplier: 2.0,
            jitter: 0.10,
        }
    }
}

impl BackoffConfig {
    /// Compute the delay before the `attempts`-th retry (1-indexed), without jitter.
    fn base_delay_ms(&self, attempts: u32) -> u64 {
        let raw = match self.strategy {
            BackoffStrategy::Exponential => {
                self.initial_ms as f64 * self.multiplier.powi(attempts.saturating_sub(1) as i32)
            }
            BackoffStrategy::Linear => self.initial_ms as f64 * attempts.max(1) as f64,
            BackoffStrategy::Fixed => self.initial_ms as f64,
            BackoffStrategy::Immediate => 0.0,
        };
        (raw.max(0.0) as u64).min(self.max_ms)
    }

    /// Compute the jittered delay for the `attempts`-th retry using the given rng.
    pub fn delay_with_rng(&self, attempts: u32, rng: &mut impl Rng) -> Duration {
        let base = self.base_delay_ms(attempts);
        if base == 0 || self.jitter <= 0.0 {
            return Duration::from_millis(base);
        }
        let spread = (base as f64 * self.jitter).round() as i64;
        let offset = rng.gen_range(-spread..=spread);
        let jittered = (base as i64 + offset).clamp(0, self.max_ms as i64);
        Duration::from_millis(jittered as u64)
    }

    pub fn delay(&self, attempts: u32) -> Duration {
        self.delay_with_rng(attempts, &mut rand::thread_rng())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn exponential_backoff_doubles_and_clamps_to_ceiling() {
        let config = BackoffConfig {
            jitter: 0.0,
            ..Default::default()
        };
        assert_eq!(config.base_delay_ms(1), 1_000);
        assert_eq!(config.base_delay_ms(2), 2_000);
        assert_eq!(config.base_delay_ms(3), 4_000);
        assert_eq!(config.base_delay_ms(20), config.max_ms);
    }

    #[test]
    fn immediate_strategy_never_delays() {
        let config = BackoffConfig {
            strategy: BackoffStrategy::Immediate,
            ..Default::default()
        };
        assert_eq!(config.delay(5), Duration::ZERO);
    }

    #[test]
    fn jitter_stays_within_configured_bound() {
        let config = BackoffConfig {
            initial_ms: 1_000,
            jitter: 0.10,
            strategy: BackoffStrategy::Fixed,
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..50 {
            let delay = config.delay_with_rng(1, &mut rng).as_millis() as i64;
            assert!((900..=1_100).contains(&delay), "delay {delay} out of jitter bound");
        }
    }
}
