// SPDX-License-Identifier: MIT

//! The Process Monitor (C7): periodically samples host and dispatch metrics,
//! keeps a time-bounded rolling window per metric, and raises a named,
//! cooldown-suppressed alert when a threshold is breached.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sysinfo::System;

use crate::alert::Alert;
use crate::config::{MetricKind, MonitorConfig};

/// What the Dispatcher reports on each sampling tick; host metrics are read
/// directly by the monitor itself via `sysinfo`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DispatchSample {
    pub queue_depth: usize,
    /// Fraction of recent worker outcomes that were a failure, in `[0, 1]`.
    pub task_error_rate: f64,
    /// Fraction of recent lock acquisition attempts that failed, in `[0, 1]`.
    pub lock_failure_rate: f64,
}

#[derive(Debug, Default)]
struct Window {
    samples: Vec<(DateTime<Utc>, f64)>,
}

impl Window {
    fn push(&mut self, at: DateTime<Utc>, value: f64, window_secs: u64) {
        self.samples.push((at, value));
        let cutoff = at - chrono::Duration::seconds(window_secs as i64);
        self.samples.retain(|&(t, _)| t >= cutoff);
    }

    fn latest(&self) -> Option<f64> {
        self.samples.last().map(|&(_, v)| v)
    }
}

/// Samples host/dispatch metrics on a fixed cadence and raises alerts.
pub struct ProcessMonitor {
    config: MonitorConfig,
    system: System,
    windows: HashMap<MetricKind, Window>,
    last_fired: HashMap<MetricKind, DateTime<Utc>>,
}

impl ProcessMonitor {
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            config,
            system: System::new(),
            windows: HashMap::new(),
            last_fired: HashMap::new(),
        }
    }

    /// Refresh host metrics, fold in the Dispatcher-reported sample, and
    /// return any alerts newly raised (empty most ticks).
    pub fn sample(&mut self, dispatch: DispatchSample, now: DateTime<Utc>) -> Vec<Alert> {
        self.system.refresh_memory();
        self.system.refresh_cpu_usage();

        let memory_percent = if self.system.total_memory() > 0 {
            self.system.used_memory() as f64 / self.system.total_memory() as f64 * 100.0
        } else {
            0.0
        };
        let cpu_percent = self.system.global_cpu_usage() as f64;

        let mut alerts = Vec::new();
        self.record(MetricKind::Memory, memory_percent, now, &mut alerts, |v| Alert::MemoryHigh { percent: v });
        self.record(MetricKind::Cpu, cpu_percent, now, &mut alerts, |v| Alert::CpuHigh { percent: v });
        self.record(MetricKind::Queue, dispatch.queue_depth as f64, now, &mut alerts, |v| Alert::QueueDepthHigh {
            depth: v as usize,
        });
        self.record(MetricKind::ErrorRate, dispatch.task_error_rate, now, &mut alerts, |v| Alert::ErrorRateHigh {
            rate: v,
        });
        self.record(MetricKind::LockFailureRate, dispatch.lock_failure_rate, now, &mut alerts, |v| {
            Alert::LockFailureRateHigh { rate: v }
        });

        alerts
    }

    fn record(
        &mut self,
        kind: MetricKind,
        value: f64,
        now: DateTime<Utc>,
        alerts: &mut Vec<Alert>,
        make_alert: impl FnOnce(f64) -> Alert,
    ) {
        let window = self.windows.entry(kind).or_default();
        window.push(now, value, self.config.trend_window_secs);

        let Some(threshold) = self.config.thresholds.get(&kind).copied() else {
            return;
        };
        if value < threshold {
            return;
        }
        if let Some(&fired_at) = self.last_fired.get(&kind) {
            if now - fired_at < chrono::Duration::from_std(self.config.cooldown).unwrap_or_default() {
                return;
            }
        }
        self.last_fired.insert(kind, now);
        alerts.push(make_alert(value));
    }

    /// The latest value recorded for `kind`, for a `status` view.
    pub fn latest(&self, kind: MetricKind) -> Option<f64> {
        self.windows.get(&kind).and_then(Window::latest)
    }
}

#[cfg(test)]
#[path = "monitor_tests.rs"]
mod tests;
