// SPDX-License-Identifier: MIT

//! Peak RSS / approximate CPU-seconds sampling for a running child, via `sysinfo`.

use sysinfo::{Pid, System};

#[derive(Debug, Clone, Copy, Default, serde::Serialize, serde::Deserialize)]
pub struct Telemetry {
    pub peak_rss_bytes: u64,
    pub cpu_seconds: f64,
}

/// Samples a single child's resource usage once. Callers poll this on an
/// interval while the child is alive and keep a running max/accumulator.
pub struct TelemetrySampler {
    system: System,
    pid: Pid,
}

impl TelemetrySampler {
    pub fn new(pid: u32) -> Self {
        Self {
            system: System::new(),
            pid: Pid::from_u32(pid),
        }
    }

    /// Refresh this process's stats and fold them into `telemetry`.
    pub fn sample(&mut self, telemetry: &mut Telemetry) {
        self.system.refresh_processes(sysinfo::ProcessesToUpdate::Some(&[self.pid]), true);
        if let Some(process) = self.system.process(self.pid) {
            telemetry.peak_rss_bytes = telemetry.peak_rss_bytes.max(process.memory());
            telemetry.cpu_seconds += process.cpu_usage() as f64 / 100.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sampling_a_dead_pid_does_not_panic() {
        let mut sampler = TelemetrySampler::new(u32::MAX);
        let mut telemetry = Telemetry::default();
        sampler.sample(&mut telemetry);
        assert_eq!(telemetry.peak_rss_bytes, 0);
    }
}
