use super::*;
use poppo_core::test_support::sample_work_item;
use poppo_core::SystemClock;
use std::time::Duration;
use tempfile::tempdir;

fn config(log_dir: &std::path::Path) -> WorkerPoolConfig {
    WorkerPoolConfig {
        max_concurrent_global: 2,
        max_concurrent_per_project: 1,
        task_timeout: Duration::from_secs(5),
        grace_shutdown: Duration::from_millis(200),
        log_dir: log_dir.to_path_buf(),
        locale: "en_US".to_string(),
        worker_command: std::path::PathBuf::from("/bin/sh"),
        worker_args: Vec::new(),
    }
}

fn shell(args: &[&str], config: &mut WorkerPoolConfig) {
    config.worker_args = args.iter().map(|s| s.to_string()).collect();
}

async fn recv(rx: &mut mpsc::UnboundedReceiver<TaskResult>) -> TaskResult {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("result channel timed out")
        .expect("result channel closed")
}

#[tokio::test]
async fn clean_exit_reports_success() {
    let dir = tempdir().unwrap();
    let mut cfg = config(dir.path());
    shell(&["-c", "exit 0"], &mut cfg);
    let (pool, mut rx) = WorkerPool::new(cfg, SystemClock);

    let item = sample_work_item("org/repo", "1", 5);
    pool.try_submit(item, None).unwrap();

    let result = recv(&mut rx).await;
    assert_eq!(result.outcome, Outcome::Success);
    assert_eq!(result.exit_code, Some(0));
}

#[tokio::test]
async fn nonzero_exit_reports_provisional_transient_outcome() {
    let dir = tempdir().unwrap();
    let mut cfg = config(dir.path());
    shell(&["-c", "echo boom 1>&2; exit 7"], &mut cfg);
    let (pool, mut rx) = WorkerPool::new(cfg, SystemClock);

    let item = sample_work_item("org/repo", "2", 5);
    pool.try_submit(item, None).unwrap();

    let result = recv(&mut rx).await;
    assert_eq!(result.outcome, Outcome::Transient { kind: ErrorKind::Unknown });
    assert_eq!(result.exit_code, Some(7));
    assert!(result.stderr_tail.contains("boom"));
}

#[tokio::test]
async fn hung_task_is_timed_out_after_task_timeout() {
    let dir = tempdir().unwrap();
    let mut cfg = config(dir.path());
    cfg.task_timeout = Duration::from_millis(150);
    cfg.grace_shutdown = Duration::from_millis(100);
    shell(&["-c", "sleep 5"], &mut cfg);
    let (pool, mut rx) = WorkerPool::new(cfg, SystemClock);

    let item = sample_work_item("org/repo", "3", 5);
    pool.try_submit(item, None).unwrap();

    let result = recv(&mut rx).await;
    assert_eq!(result.outcome, Outcome::Timeout);
}

#[tokio::test]
async fn canceling_a_running_task_reports_canceled() {
    let dir = tempdir().unwrap();
    let mut cfg = config(dir.path());
    shell(&["-c", "sleep 5"], &mut cfg);
    let (pool, mut rx) = WorkerPool::new(cfg, SystemClock);

    let item = sample_work_item("org/repo", "4", 5);
    let mut handle = pool.try_submit(item, None).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    handle.cancel();

    let result = recv(&mut rx).await;
    assert_eq!(result.outcome, Outcome::Canceled);
}

#[tokio::test]
async fn global_capacity_exhausted_rejects_submission() {
    let dir = tempdir().unwrap();
    let mut cfg = config(dir.path());
    cfg.max_concurrent_global = 1;
    cfg.max_concurrent_per_project = 2;
    shell(&["-c", "sleep 5"], &mut cfg);
    let (pool, mut _rx) = WorkerPool::new(cfg, SystemClock);

    let first = sample_work_item("org/repo", "5", 5);
    let second = sample_work_item("org/other", "6", 5);
    assert!(pool.try_submit(first, None).is_ok());
    let err = pool.try_submit(second, None).unwrap_err();
    assert!(matches!(err, WorkerPoolError::GlobalCapacityExhausted));
}

#[tokio::test]
async fn per_project_capacity_exhausted_rejects_submission() {
    let dir = tempdir().unwrap();
    let mut cfg = config(dir.path());
    cfg.max_concurrent_global = 4;
    cfg.max_concurrent_per_project = 1;
    shell(&["-c", "sleep 5"], &mut cfg);
    let (pool, mut _rx) = WorkerPool::new(cfg, SystemClock);

    let first = sample_work_item("org/repo", "7", 5);
    let second = sample_work_item("org/repo", "8", 5);
    assert!(pool.try_submit(first, None).is_ok());
    let err = pool.try_submit(second, None).unwrap_err();
    assert!(matches!(err, WorkerPoolError::ProjectCapacityExhausted(project) if project == "org/repo"));
}

#[tokio::test]
async fn heartbeat_is_invoked_while_task_runs() {
    let dir = tempdir().unwrap();
    let mut cfg = config(dir.path());
    cfg.task_timeout = Duration::from_millis(400);
    shell(&["-c", "sleep 5"], &mut cfg);
    let (pool, mut rx) = WorkerPool::new(cfg, SystemClock);

    let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let calls_clone = calls.clone();
    let heartbeat: Heartbeat = Box::new(move || {
        calls_clone.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        true
    });

    let item = sample_work_item("org/repo", "9", 5);
    pool.try_submit(item, Some(heartbeat)).unwrap();

    let _ = recv(&mut rx).await;
    assert!(calls.load(std::sync::atomic::Ordering::SeqCst) >= 1);
}
