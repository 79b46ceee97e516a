// SPDX-License-Identifier: MIT

//! A closed, typed alert set published on a `tokio::sync::broadcast` channel
//! — the small typed event bus the redesign notes call for, replacing a
//! dynamic-subscriber-list pattern. Every subscriber (the Dispatcher itself,
//! the CLI's `status` query, future collaborators) gets its own receiver;
//! a slow subscriber drops old alerts rather than back-pressuring the
//! Process Monitor.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::config::MetricKind;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Alert {
    MemoryHigh { percent: f64 },
    CpuHigh { percent: f64 },
    QueueDepthHigh { depth: usize },
    ErrorRateHigh { rate: f64 },
    LockFailureRateHigh { rate: f64 },
}

impl Alert {
    pub fn metric(&self) -> MetricKind {
        match self {
            Self::MemoryHigh { .. } => MetricKind::Memory,
            Self::CpuHigh { .. } => MetricKind::Cpu,
            Self::QueueDepthHigh { .. } => MetricKind::Queue,
            Self::ErrorRateHigh { .. } => MetricKind::ErrorRate,
            Self::LockFailureRateHigh { .. } => MetricKind::LockFailureRate,
        }
    }

    pub fn log_summary(&self) -> String {
        match self {
            Self::MemoryHigh { percent } => format!("host memory at {percent:.1}%"),
            Self::CpuHigh { percent } => format!("host cpu at {percent:.1}%"),
            Self::QueueDepthHigh { depth } => format!("queue depth at {depth}"),
            Self::ErrorRateHigh { rate } => format!("task error rate at {rate:.2}"),
            Self::LockFailureRateHigh { rate } => format!("lock failure rate at {rate:.2}"),
        }
    }
}

/// Capacity of the broadcast channel: large enough that a normally-paced
/// subscriber never lags, small enough that a stuck subscriber recovers
/// quickly by dropping old alerts instead of holding memory.
const ALERT_CHANNEL_CAPACITY: usize = 64;

#[derive(Clone)]
pub struct AlertBus {
    tx: broadcast::Sender<Alert>,
}

impl AlertBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(ALERT_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Alert> {
        self.tx.subscribe()
    }

    /// Best-effort publish: no subscribers is not an error.
    pub fn publish(&self, alert: Alert) {
        let _ = self.tx.send(alert);
    }
}

impl Default for AlertBus {
    fn default() -> Self {
        Self::new()
    }
}
