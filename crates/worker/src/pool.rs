// SPDX-License-Identifier: MIT

//! The Worker Pool (C5): spawns one child process per submitted WorkItem,
//! enforces global and per-project concurrency caps, watches streams to
//! per-item log files, applies the task timeout, and reports outcomes.

use std::collections::HashMap;
use std::io::Write as _;
use std::process::Stdio;
use std::sync::Arc;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use parking_lot::Mutex;
use poppo_core::{Clock, ErrorKind, Outcome, ProjectId, TaskId, WorkItem};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot, Semaphore};

use crate::config::WorkerPoolConfig;
use crate::env::build_env;
use crate::error::WorkerPoolError;
use crate::handle::{TaskHandle, TaskResult};
use crate::telemetry::{Telemetry, TelemetrySampler};

/// Called on an interval while a task runs, to renew the Dispatcher's C1
/// lock independently of the Dispatcher's own loop cadence; a task whose
/// runtime badly outlives its estimate must never lose its lock to a TTL
/// that turned out too short. Returns whether the renewal succeeded.
pub type Heartbeat = Box<dyn Fn() -> bool + Send + Sync>;

const STDERR_TAIL_LINES: usize = 20;
const TELEMETRY_SAMPLE_INTERVAL: std::time::Duration = std::time::Duration::from_secs(2);

enum ExitReason {
    Exited(std::process::ExitStatus),
    WaitFailed,
    TimedOut,
    Canceled,
}

pub struct WorkerPool<C: Clock> {
    config: WorkerPoolConfig,
    clock: C,
    global: Arc<Semaphore>,
    per_project: Mutex<HashMap<ProjectId, Arc<Semaphore>>>,
    results_tx: mpsc::UnboundedSender<TaskResult>,
}

impl<C: Clock> WorkerPool<C> {
    pub fn new(config: WorkerPoolConfig, clock: C) -> (Self, mpsc::UnboundedReceiver<TaskResult>) {
        let (results_tx, results_rx) = mpsc::unbounded_channel();
        let global = Arc::new(Semaphore::new(config.max_concurrent_global));
        let pool = Self {
            config,
            clock,
            global,
            per_project: Mutex::new(HashMap::new()),
            results_tx,
        };
        (pool, results_rx)
    }

    fn project_semaphore(&self, project_id: &ProjectId) -> Arc<Semaphore> {
        let mut projects = self.per_project.lock();
        projects
            .entry(project_id.clone())
            .or_insert_with(|| Arc::new(Semaphore::new(self.config.max_concurrent_per_project)))
            .clone()
    }

    /// Attempts to submit `item` for execution. Returns a cancellation
    /// handle on success; refuses immediately (no internal queueing) if
    /// either concurrency cap is currently exhausted — the Task Queue is the
    /// only place work waits.
    pub fn try_submit(&self, item: WorkItem, heartbeat: Option<Heartbeat>) -> Result<TaskHandle, WorkerPoolError> {
        let project_id = item.project_id.clone();
        let project_sem = self.project_semaphore(&project_id);

        let global_permit = self
            .global
            .clone()
            .try_acquire_owned()
            .map_err(|_| WorkerPoolError::GlobalCapacityExhausted)?;
        let project_permit = project_sem
            .try_acquire_owned()
            .map_err(|_| WorkerPoolError::ProjectCapacityExhausted(project_id.to_string()))?;

        let task_id = TaskId::new();
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let config = self.config.clone();
        let results_tx = self.results_tx.clone();
        let clock = self.clock.clone();

        tokio::spawn(run_task(
            task_id,
            item,
            config,
            clock,
            cancel_rx,
            heartbeat,
            global_permit,
            project_permit,
            results_tx,
        ));

        Ok(TaskHandle {
            task_id,
            cancel_tx: Some(cancel_tx),
        })
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_task<C: Clock>(
    task_id: TaskId,
    item: WorkItem,
    config: WorkerPoolConfig,
    clock: C,
    mut cancel_rx: oneshot::Receiver<()>,
    heartbeat: Option<Heartbeat>,
    _global_permit: tokio::sync::OwnedSemaphorePermit,
    _project_permit: tokio::sync::OwnedSemaphorePermit,
    results_tx: mpsc::UnboundedSender<TaskResult>,
) {
    let log_path = config
        .log_dir
        .join(format!("{}__{}__{}.log", item.project_id.0, item.item_id.0, task_id));

    if let Some(parent) = log_path.parent() {
        let _ = tokio::fs::create_dir_all(parent).await;
    }

    let env = build_env(&item, &config.log_dir, &config.locale);
    let mut command = Command::new(&config.worker_command);
    command
        .args(&config.worker_args)
        .envs(env)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(source) => {
            let result = TaskResult {
                task_id,
                outcome: Outcome::HardFail { kind: ErrorKind::Unknown },
                exit_code: None,
                log_path,
                telemetry: Telemetry::default(),
                stderr_tail: WorkerPoolError::SpawnFailed(source).to_string(),
            };
            let _ = results_tx.send(result);
            return;
        }
    };

    let pid = child.id();
    let mut log_file = match std::fs::OpenOptions::new().create(true).append(true).open(&log_path) {
        Ok(file) => Some(file),
        Err(_) => None,
    };

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let stdout_task = stdout.map(|s| tokio::spawn(drain_stream(s, "stdout")));
    let (stderr_task, stderr_tail) = match stderr {
        Some(s) => {
            let (tx, rx) = oneshot::channel();
            (Some(tokio::spawn(drain_stderr(s, tx))), Some(rx))
        }
        None => (None, None),
    };

    let mut telemetry = Telemetry::default();
    let mut sampler = pid.map(TelemetrySampler::new);
    let mut telemetry_tick = tokio::time::interval(TELEMETRY_SAMPLE_INTERVAL);
    let heartbeat_interval = heartbeat
        .as_ref()
        .map(|_| (config.task_timeout / 3).max(std::time::Duration::from_secs(1)))
        .unwrap_or(config.task_timeout + std::time::Duration::from_secs(1));
    let mut heartbeat_tick = tokio::time::interval(heartbeat_interval);
    let deadline = tokio::time::sleep(config.task_timeout);
    tokio::pin!(deadline);

    let started_at = clock.now();

    let reason = loop {
        tokio::select! {
            status = child.wait() => {
                match status {
                    Ok(status) => break ExitReason::Exited(status),
                    Err(_) => break ExitReason::WaitFailed,
                }
            }
            _ = &mut cancel_rx => break ExitReason::Canceled,
            _ = &mut deadline => break ExitReason::TimedOut,
            _ = telemetry_tick.tick() => {
                if let Some(sampler) = sampler.as_mut() {
                    sampler.sample(&mut telemetry);
                }
            }
            _ = heartbeat_tick.tick() => {
                if let Some(hb) = heartbeat.as_ref() {
                    if !hb() {
                        tracing::warn!(task_id = %task_id, "lock heartbeat renewal failed mid-task");
                    }
                }
            }
        }
    };

    let (outcome, exit_code) = match reason {
        ExitReason::Exited(status) => {
            if status.success() {
                (Outcome::Success, status.code())
            } else {
                (Outcome::Transient { kind: ErrorKind::Unknown }, status.code())
            }
        }
        ExitReason::TimedOut => {
            terminate_with_grace(pid, &mut child, config.grace_shutdown).await;
            (Outcome::Timeout, None)
        }
        ExitReason::Canceled => {
            terminate_with_grace(pid, &mut child, config.grace_shutdown).await;
            (Outcome::Canceled, None)
        }
        ExitReason::WaitFailed => (Outcome::HardFail { kind: ErrorKind::Unknown }, None),
    };

    if let Some(handle) = stdout_task {
        if let Ok(lines) = handle.await {
            write_lines(&mut log_file, "stdout", &lines);
        }
    }
    let tail = if let (Some(handle), Some(rx)) = (stderr_task, stderr_tail) {
        let lines = handle.await.unwrap_or_default();
        write_lines(&mut log_file, "stderr", &lines);
        rx.await.unwrap_or_default()
    } else {
        String::new()
    };

    tracing::debug!(task_id = %task_id, elapsed = ?clock.now().duration_since(started_at), "worker task finished");

    let result = TaskResult {
        task_id,
        outcome,
        exit_code,
        log_path,
        telemetry,
        stderr_tail: tail,
    };
    let _ = results_tx.send(result);
}

async fn terminate_with_grace(pid: Option<u32>, child: &mut tokio::process::Child, grace: std::time::Duration) {
    let Some(pid) = pid else { return };
    let nix_pid = Pid::from_raw(pid as i32);
    if kill(nix_pid, Signal::SIGTERM).is_err() {
        return;
    }
    if tokio::time::timeout(grace, child.wait()).await.is_ok() {
        return;
    }
    let _ = kill(nix_pid, Signal::SIGKILL);
    let _ = child.wait().await;
}

async fn drain_stream(stream: impl tokio::io::AsyncRead + Unpin, _label: &'static str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut reader = BufReader::new(stream).lines();
    while let Ok(Some(line)) = reader.next_line().await {
        lines.push(line);
    }
    lines
}

async fn drain_stderr(stream: impl tokio::io::AsyncRead + Unpin, tail_tx: oneshot::Sender<String>) -> Vec<String> {
    let lines = drain_stream(stream, "stderr").await;
    let tail: Vec<&str> = lines
        .iter()
        .rev()
        .take(STDERR_TAIL_LINES)
        .rev()
        .map(String::as_str)
        .collect();
    let _ = tail_tx.send(tail.join("\n"));
    lines
}

fn write_lines(log_file: &mut Option<std::fs::File>, label: &str, lines: &[String]) {
    let Some(file) = log_file.as_mut() else { return };
    for line in lines {
        let _ = writeln!(file, "[{label}] {line}");
    }
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
