use super::*;
use chrono::Utc;

fn config() -> MonitorConfig {
    let mut thresholds = HashMap::new();
    thresholds.insert(MetricKind::Queue, 10.0);
    thresholds.insert(MetricKind::ErrorRate, 0.5);
    MonitorConfig {
        sample_interval: std::time::Duration::from_secs(30),
        cooldown: std::time::Duration::from_secs(60),
        trend_window_secs: 3000,
        thresholds,
    }
}

#[test]
fn queue_depth_past_threshold_raises_alert() {
    let mut monitor = ProcessMonitor::new(config());
    let now = Utc::now();
    let alerts = monitor.sample(
        DispatchSample {
            queue_depth: 20,
            task_error_rate: 0.0,
            lock_failure_rate: 0.0,
        },
        now,
    );
    assert!(alerts.iter().any(|a| matches!(a, Alert::QueueDepthHigh { depth: 20 })));
}

#[test]
fn repeated_breach_within_cooldown_is_suppressed() {
    let mut monitor = ProcessMonitor::new(config());
    let now = Utc::now();
    let first = monitor.sample(
        DispatchSample {
            queue_depth: 20,
            task_error_rate: 0.0,
            lock_failure_rate: 0.0,
        },
        now,
    );
    assert_eq!(first.len(), 1);

    let still_within_cooldown = now + chrono::Duration::seconds(10);
    let second = monitor.sample(
        DispatchSample {
            queue_depth: 20,
            task_error_rate: 0.0,
            lock_failure_rate: 0.0,
        },
        still_within_cooldown,
    );
    assert!(second.is_empty());
}

#[test]
fn breach_after_cooldown_elapses_fires_again() {
    let mut monitor = ProcessMonitor::new(config());
    let now = Utc::now();
    let _ = monitor.sample(
        DispatchSample {
            queue_depth: 20,
            task_error_rate: 0.0,
            lock_failure_rate: 0.0,
        },
        now,
    );

    let after_cooldown = now + chrono::Duration::seconds(120);
    let alerts = monitor.sample(
        DispatchSample {
            queue_depth: 20,
            task_error_rate: 0.0,
            lock_failure_rate: 0.0,
        },
        after_cooldown,
    );
    assert_eq!(alerts.len(), 1);
}

#[test]
fn below_threshold_never_alerts() {
    let mut monitor = ProcessMonitor::new(config());
    let now = Utc::now();
    let alerts = monitor.sample(
        DispatchSample {
            queue_depth: 2,
            task_error_rate: 0.1,
            lock_failure_rate: 0.0,
        },
        now,
    );
    assert!(alerts.is_empty());
}
