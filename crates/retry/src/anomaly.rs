// SPDX-License-Identifier: MIT

//! Anomaly detection: consecutive-failure alerts and "retry storm" detection
//! over a rolling window. Per the redesign notes, every rolling window here
//! is sized by time and evicts samples older than the window rather than
//! growing unbounded.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

#[derive(Debug, Default)]
struct KeyHistory {
    consecutive_failures: u32,
    /// Timestamps of recent failures, oldest first, time-bounded.
    recent_failures: Vec<DateTime<Utc>>,
}

#[derive(Debug, Default)]
pub struct AnomalyDetector {
    history: HashMap<String, KeyHistory>,
}

impl AnomalyDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure and evict anything older than `window_secs` so
    /// `recent_failures` stays time-bounded rather than growing forever for
    /// a long-lived item.
    pub fn record_failure(&mut self, item_key: String, at: DateTime<Utc>, window_secs: u64) {
        let entry = self.history.entry(item_key).or_default();
        entry.consecutive_failures += 1;
        entry.recent_failures.push(at);
        self.evict_stale(at, window_secs);
    }

    pub fn record_success(&mut self, item_key: &str) {
        if let Some(entry) = self.history.get_mut(item_key) {
            entry.consecutive_failures = 0;
        }
    }

    pub fn consecutive_failures(&self, item_key: &str) -> u32 {
        self.history.get(item_key).map(|h| h.consecutive_failures).unwrap_or(0)
    }

    /// More than `threshold` failures for the same key within `window_secs`.
    pub fn is_retry_storm(&self, item_key: &str, now: DateTime<Utc>, threshold: u32, window_secs: u64) -> bool {
        let Some(entry) = self.history.get(item_key) else {
            return false;
        };
        let cutoff = now - chrono::Duration::seconds(window_secs as i64);
        let count = entry.recent_failures.iter().filter(|&&t| t >= cutoff).count();
        count as u32 > threshold
    }

    /// Drop failure timestamps older than `window_secs`, bounding memory use.
    pub fn evict_stale(&mut self, now: DateTime<Utc>, window_secs: u64) {
        let cutoff = now - chrono::Duration::seconds(window_secs as i64);
        for entry in self.history.values_mut() {
            entry.recent_failures.retain(|&t| t >= cutoff);
        }
        self.history.retain(|_, v| v.consecutive_failures > 0 || !v.recent_failures.is_empty());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_storm_detected_past_threshold_within_window() {
        let mut detector = AnomalyDetector::new();
        let now = Utc::now();
        for i in 0..11 {
            detector.record_failure("k".to_string(), now + chrono::Duration::seconds(i), 300);
        }
        assert!(detector.is_retry_storm("k", now + chrono::Duration::seconds(11), 10, 300));
    }

    #[test]
    fn failures_outside_window_do_not_count() {
        let mut detector = AnomalyDetector::new();
        let now = Utc::now();
        detector.record_failure("k".to_string(), now, 300);
        let later = now + chrono::Duration::seconds(400);
        assert!(!detector.is_retry_storm("k", later, 0, 300));
    }

    #[test]
    fn evict_stale_bounds_memory() {
        let mut detector = AnomalyDetector::new();
        let now = Utc::now();
        detector.record_failure("k".to_string(), now, 300);
        detector.evict_stale(now + chrono::Duration::seconds(400), 300);
        assert!(!detector.is_retry_storm("k", now + chrono::Duration::seconds(401), 0, 300));
    }
}
