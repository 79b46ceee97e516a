// SPDX-License-Identifier: MIT

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerPoolConfig {
    pub max_concurrent_global: usize,
    pub max_concurrent_per_project: usize,
    #[serde(with = "duration_ms")]
    pub task_timeout: Duration,
    #[serde(with = "duration_ms")]
    pub grace_shutdown: Duration,
    pub log_dir: PathBuf,
    pub locale: String,
    /// The external worker executable; invoked once per WorkItem with the
    /// closed environment vector from [`crate::env::build_env`]. What this
    /// process actually does with a work item is opaque to the pool.
    pub worker_command: PathBuf,
    pub worker_args: Vec<String>,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            max_concurrent_global: 4,
            max_concurrent_per_project: 2,
            task_timeout: Duration::from_secs(600),
            grace_shutdown: Duration::from_secs(10),
            log_dir: PathBuf::from("/var/log/poppo"),
            locale: "en_US".to_string(),
            worker_command: PathBuf::from("/usr/local/bin/poppo-worker-run"),
            worker_args: Vec::new(),
        }
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
