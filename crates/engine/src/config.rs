// SPDX-License-Identifier: MIT

//! Combined configuration for the Dispatcher and Process Monitor: one
//! struct per component plus the cadences that tie them together.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use poppo_queue::QueueConfig;
use poppo_retry::RetryConfig;
use poppo_storage::{DeadLetterConfig, LockStoreConfig, StatePersistenceConfig};
use poppo_worker::WorkerPoolConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Memory,
    Cpu,
    Queue,
    ErrorRate,
    LockFailureRate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(with = "duration_ms", default = "default_sample_interval")]
    pub sample_interval: Duration,
    #[serde(with = "duration_ms", default = "default_monitor_cooldown")]
    pub cooldown: Duration,
    /// How far back the rolling trend window looks, per metric.
    #[serde(default = "default_trend_window_secs")]
    pub trend_window_secs: u64,
    #[serde(default)]
    pub thresholds: HashMap<MetricKind, f64>,
}

fn default_sample_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_monitor_cooldown() -> Duration {
    Duration::from_secs(300)
}

fn default_trend_window_secs() -> u64 {
    3000
}

impl Default for MonitorConfig {
    fn default() -> Self {
        let mut thresholds = HashMap::new();
        thresholds.insert(MetricKind::Memory, 90.0);
        thresholds.insert(MetricKind::Cpu, 90.0);
        thresholds.insert(MetricKind::Queue, 1000.0);
        thresholds.insert(MetricKind::ErrorRate, 0.5);
        thresholds.insert(MetricKind::LockFailureRate, 0.5);

        Self {
            sample_interval: Duration::from_secs(30),
            cooldown: Duration::from_secs(300),
            trend_window_secs: 3000,
            thresholds,
        }
    }
}

/// The full configuration surface the Dispatcher is built from, combining
/// every lower component's own config plus the Dispatcher's own cadences.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub worker: WorkerPoolConfig,
    #[serde(default)]
    pub lock_store: LockStoreConfig,
    #[serde(default)]
    pub persistence: StatePersistenceConfig,
    #[serde(default)]
    pub dead_letter: DeadLetterConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    /// How often due `RetryState`s are moved back from the retry map to the queue.
    #[serde(with = "duration_ms", default = "default_retry_tick_interval")]
    pub retry_tick_interval: Duration,
    /// Extra margin added on top of `task_timeout` when computing a lock's TTL,
    /// per the Open Question resolution: `ttl = max(configured_ttl,
    /// task_timeout + safety_margin)`.
    #[serde(with = "duration_ms", default = "default_lock_safety_margin")]
    pub lock_safety_margin: Duration,
}

fn default_retry_tick_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_lock_safety_margin() -> Duration {
    Duration::from_secs(30)
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            queue: QueueConfig::default(),
            retry: RetryConfig::default(),
            worker: WorkerPoolConfig::default(),
            lock_store: LockStoreConfig::default(),
            persistence: StatePersistenceConfig::default(),
            dead_letter: DeadLetterConfig::default(),
            monitor: MonitorConfig::default(),
            retry_tick_interval: Duration::from_secs(5),
            lock_safety_margin: Duration::from_secs(30),
        }
    }
}

impl EngineConfig {
    pub fn lock_ttl(&self) -> Duration {
        self.lock_store.default_ttl.max(self.worker.task_timeout + self.lock_safety_margin)
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        (value.as_millis() as u64).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
