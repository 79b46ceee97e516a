// SPDX-License-Identifier: MIT

//! The Dispatcher (C6): the top-level loop. A single `tokio::select!` over a
//! worker-outcome channel, a snapshot-cadence interval, a dispatch-retry
//! interval, the Process Monitor's alert channel, and a shutdown signal.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use poppo_core::{
    CircuitBreakerKey, Clock, ClassifiedError, DeadLetter, DeadLetterReason, ErrorKind, Holder,
    Outcome, RetryState, SessionId, TaskId, WorkItem, WorkItemType,
};
use poppo_queue::{queue::ItemKeyRef, TaskQueue};
use poppo_retry::{Decision, FailureSignal, RetryController};
use poppo_storage::{DeadLetterStore, LockStore, StateStore};
use poppo_worker::{Heartbeat, TaskHandle, TaskResult, WorkerPool};
use tokio::sync::{mpsc, Notify};
use uuid::Uuid;

use crate::alert::AlertBus;
use crate::command::{DispatcherCommand, MaintenanceStatus, StatusSnapshot};
use crate::config::EngineConfig;
use crate::effects::DispatchEvent;
use crate::error::DispatchError;
use crate::monitor::{DispatchSample, ProcessMonitor};

struct InflightTask {
    item: WorkItem,
    key: String,
    enqueued_at: DateTime<Utc>,
    holder: Holder,
}

/// Entering a maintenance window restricts dispatch to an allow-listed set
/// of work item types; everything else stays queued until it lifts.
struct Maintenance {
    until: DateTime<Utc>,
    allow: HashSet<WorkItemType>,
}

pub struct Dispatcher<C: Clock> {
    config: EngineConfig,
    clock: C,
    hostname: String,
    session_id: SessionId,
    queue: TaskQueue,
    retry: RetryController,
    retry_states: HashMap<String, RetryState>,
    lock_store: Arc<LockStore<C>>,
    state_store: Box<dyn StateStore>,
    dead_letter_store: DeadLetterStore,
    worker_pool: WorkerPool<C>,
    worker_results_rx: mpsc::UnboundedReceiver<TaskResult>,
    monitor: ProcessMonitor,
    alert_bus: AlertBus,
    handles: HashMap<String, TaskHandle>,
    inflight: HashMap<TaskId, InflightTask>,
    maintenance: Option<Maintenance>,
    started_at: std::time::Instant,
    dirty: bool,
    lock_attempts: u64,
    lock_failures: u64,
    outcomes: u64,
    failures: u64,
}

impl<C: Clock> Dispatcher<C> {
    pub async fn new(config: EngineConfig, clock: C) -> Result<Self, DispatchError> {
        let state_store = poppo_storage::build_state_store(&config.persistence).await?;
        let lock_store = Arc::new(LockStore::new(config.lock_store.clone(), clock.clone())?);
        let dead_letter_store = DeadLetterStore::new(&config.dead_letter)?;
        let queue = TaskQueue::new(config.queue.clone());
        let retry = RetryController::new(config.retry.clone());
        let (worker_pool, worker_results_rx) = WorkerPool::new(config.worker.clone(), clock.clone());
        let monitor = ProcessMonitor::new(config.monitor.clone());

        Ok(Self {
            config,
            clock,
            hostname: local_hostname(),
            session_id: SessionId::new(),
            queue,
            retry,
            retry_states: HashMap::new(),
            lock_store,
            state_store,
            dead_letter_store,
            worker_pool,
            worker_results_rx,
            monitor,
            alert_bus: AlertBus::new(),
            handles: HashMap::new(),
            inflight: HashMap::new(),
            maintenance: None,
            started_at: std::time::Instant::now(),
            dirty: false,
            lock_attempts: 0,
            lock_failures: 0,
            outcomes: 0,
            failures: 0,
        })
    }

    pub fn alert_bus(&self) -> AlertBus {
        self.alert_bus.clone()
    }

    pub fn queue_depth(&self) -> usize {
        self.queue.size()
    }

    pub fn running_count(&self) -> usize {
        self.queue.running_count()
    }

    pub fn is_in_maintenance(&self) -> bool {
        self.maintenance.is_some()
    }

    pub fn enter_maintenance(&mut self, duration: std::time::Duration, allow: HashSet<WorkItemType>) {
        let until = self.clock.now_utc() + chrono::Duration::from_std(duration).unwrap_or_default();
        self.maintenance = Some(Maintenance { until, allow });
    }

    pub fn leave_maintenance(&mut self) {
        self.maintenance = None;
    }

    pub fn enqueue(&mut self, item: WorkItem) -> Result<(), DispatchError> {
        let now = self.clock.now_utc();
        self.queue.enqueue(item, now)?;
        Ok(())
    }

    /// Manually reinject a dead-lettered item: resets its retry history and
    /// enqueues it fresh.
    pub fn retry_dead_letter(&mut self, id: Uuid) -> Result<(), DispatchError> {
        let record = self
            .dead_letter_store
            .get(id)?
            .ok_or(DispatchError::DeadLetterNotFound(id))?;
        self.dead_letter_store.remove(id)?;
        let key = record.item.key().sanitized();
        self.retry_states.remove(&key);
        let now = self.clock.now_utc();
        self.queue.enqueue(record.item, now)?;
        Ok(())
    }

    /// Request cooperative cancellation of a running task.
    pub fn cancel_task(&mut self, key: &str) -> bool {
        if let Some(handle) = self.handles.get_mut(key) {
            handle.cancel();
            true
        } else {
            false
        }
    }

    /// Startup recovery: load the last snapshot, reconcile running-vs-lock,
    /// and requeue anything whose lock didn't survive the crash.
    pub async fn recover(&mut self) -> Result<(), DispatchError> {
        let Some(snapshot) = self.state_store.load().await? else {
            tracing::info!("no snapshot found, starting with empty state");
            return Ok(());
        };
        if let Err(e) = poppo_storage::backend::verify(&snapshot) {
            tracing::warn!(error = %e, "snapshot checksum mismatch, starting with empty state");
            return Ok(());
        }

        self.retry.restore_breakers(snapshot.state.circuit_breakers);
        self.retry_states = snapshot.state.retry_map;

        let now = self.clock.now_utc();
        let mut still_running = HashMap::new();
        let mut to_recover = Vec::new();
        for (key, entry) in snapshot.state.running_map {
            let valid = self.lock_store.is_valid(&key).unwrap_or(false);
            if valid {
                still_running.insert(key, entry);
            } else {
                to_recover.push((key, entry.item));
            }
        }

        self.queue.restore(snapshot.state.queue, still_running, now);

        for (key, item) in to_recover {
            self.requeue_crash_recovered(key, item, now);
        }

        Ok(())
    }

    fn requeue_crash_recovered(&mut self, key: String, item: WorkItem, now: DateTime<Utc>) {
        let error = ClassifiedError {
            kind: ErrorKind::Unknown,
            message: "crash recovery: lock invalid at startup".to_string(),
            occurred_at: now,
            retry_after_hint: None,
        };
        let mut retry_state = self.retry_states.remove(&key);
        let next_attempts = retry_state.as_ref().map(|r| r.attempts + 1).unwrap_or(1);
        let kind_max = self.config.retry.max_for(ErrorKind::Unknown);
        let item_max = item.max_retries.unwrap_or(kind_max);
        let effective_max = kind_max.min(item_max);

        let state = match retry_state.take() {
            Some(mut s) => {
                s.record_failure(now, error, now);
                s
            }
            None => RetryState::first_failure(now, error, now),
        };

        if next_attempts > effective_max {
            let record = DeadLetter::new(item, DeadLetterReason::CrashRecoveryExhausted, Some(state), now);
            if let Err(e) = self.dead_letter_store.put(&record) {
                tracing::warn!(error = %e, item = %key, "failed to persist crash-recovery dead letter");
            }
            return;
        }

        self.retry_states.insert(key.clone(), state);
        self.queue.re_enqueue(item, now, now);
        self.emit(DispatchEvent::CrashRecovered { item_key: key });
        self.dirty = true;
    }

    fn emit(&self, event: DispatchEvent) {
        tracing::info!(summary = %event.log_summary(), "dispatch event");
    }

    /// Pull and submit as many eligible items as pool capacity allows.
    /// Bounded by the queue's size at the start of the call so a persistent
    /// lock contention on one item can never spin forever.
    fn drain_dispatch(&mut self) {
        let bound = self.queue.size() + 1;
        for _ in 0..bound {
            if !self.dispatch_once() {
                break;
            }
        }
    }

    /// Returns whether progress was made (an item was submitted or returned
    /// to the queue after losing a lock race); `false` means "stop looping".
    fn dispatch_once(&mut self) -> bool {
        let now = self.clock.now_utc();
        let maintenance = &self.maintenance;
        let retry = &mut self.retry;
        let item = self.queue.dequeue_eligible(now, |key| {
            if let Some(window) = maintenance {
                if now < window.until && !window.allow.contains(&key.item_type) {
                    return false;
                }
            }
            retry.breaker_allows(key, now)
        });
        let Some(item) = item else { return false };

        let key = item.key().sanitized();
        let task_id = TaskId::new();
        let holder = Holder {
            pid: std::process::id(),
            hostname: self.hostname.clone(),
            session_id: self.session_id,
            task_id,
        };
        let ttl = self.config.lock_ttl();

        self.lock_attempts += 1;
        let acquired = self.lock_store.acquire(&key, holder.clone(), ttl);
        let acquired = match acquired {
            Ok(acquired) => acquired,
            Err(e) => {
                tracing::warn!(error = %e, item = %key, "lock acquisition failed");
                false
            }
        };
        if !acquired {
            self.lock_failures += 1;
            self.emit(DispatchEvent::LockContention { item_key: key.clone() });
            let _ = self.queue.return_pending(&ItemKeyRef::from(key.as_str()));
            return true;
        }

        let heartbeat = self.make_heartbeat(key.clone(), holder.clone(), ttl);
        match self.worker_pool.try_submit(item.clone(), Some(heartbeat)) {
            Ok(handle) => {
                if let Err(e) = self.queue.mark_running(&key, task_id, now) {
                    tracing::warn!(error = %e, item = %key, "queue mark_running failed after submit");
                }
                self.handles.insert(key.clone(), handle);
                self.inflight.insert(
                    task_id,
                    InflightTask {
                        item,
                        key: key.clone(),
                        enqueued_at: now,
                        holder,
                    },
                );
                self.emit(DispatchEvent::Started { task_id, item_key: key });
                self.dirty = true;
                true
            }
            Err(_) => {
                let _ = self.lock_store.release(&key, &holder);
                let _ = self.queue.return_pending(&ItemKeyRef::from(key.as_str()));
                false
            }
        }
    }

    fn make_heartbeat(&self, key: String, holder: Holder, ttl: std::time::Duration) -> Heartbeat {
        let lock_store = Arc::clone(&self.lock_store);
        Box::new(move || lock_store.renew(&key, &holder, ttl).unwrap_or(false))
    }

    fn handle_outcome(&mut self, result: TaskResult) {
        let Some(task) = self.inflight.remove(&result.task_id) else {
            return;
        };
        self.handles.remove(&task.key);
        self.outcomes += 1;

        let now = self.clock.now_utc();
        let breaker_key = CircuitBreakerKey::new(task.item.project_id.clone(), task.item.item_type);
        let key = task.key.clone();
        let holder = task.holder.clone();

        match result.outcome {
            Outcome::Success => {
                self.retry.record_success(&breaker_key, None);
                self.retry_states.remove(&key);
                self.queue.mark_done(&key);
                self.emit(DispatchEvent::Succeeded { task_id: result.task_id, item_key: key.clone() });
            }
            Outcome::Canceled => {
                self.queue.mark_done(&key);
                let retry_state = self.retry_states.remove(&key);
                let record = DeadLetter::new(task.item, DeadLetterReason::NonRetryable, retry_state, now);
                if let Err(e) = self.dead_letter_store.put(&record) {
                    tracing::warn!(error = %e, "failed to persist dead letter for canceled task");
                }
                self.emit(DispatchEvent::DeadLettered {
                    item_key: key.clone(),
                    reason: DeadLetterReason::NonRetryable,
                });
            }
            outcome => {
                self.failures += 1;
                let message = match outcome {
                    Outcome::Timeout => "timed out".to_string(),
                    _ => result.stderr_tail.clone(),
                };
                let signal = FailureSignal {
                    status_code: None,
                    message,
                    retry_after: parse_retry_after(&result.stderr_tail),
                };
                self.queue.mark_done(&key);
                let retry_state = self.retry_states.remove(&key);
                let decision = self.retry.decide(&task.item, &breaker_key, &signal, retry_state, now);
                match decision {
                    Decision::Retry { retry_state, delay } => {
                        let attempts = retry_state.attempts;
                        self.retry_states.insert(key.clone(), retry_state);
                        let next_retry_at = now + chrono::Duration::from_std(delay).unwrap_or_default();
                        self.queue.re_enqueue(task.item, task.enqueued_at, next_retry_at);
                        self.emit(DispatchEvent::Retried { item_key: key.clone(), delay, attempts });
                    }
                    Decision::DeadLetter { reason, retry_state } => {
                        let record = DeadLetter::new(task.item, reason, retry_state, now);
                        if let Err(e) = self.dead_letter_store.put(&record) {
                            tracing::warn!(error = %e, "failed to persist dead letter");
                        }
                        self.emit(DispatchEvent::DeadLettered { item_key: key.clone(), reason });
                    }
                }
            }
        }
        let _ = self.lock_store.release(&key, &holder);
        self.dirty = true;
    }

    fn snapshot_state(&self) -> poppo_core::SnapshotState {
        poppo_core::SnapshotState {
            queue: self.queue.snapshot_queue(),
            running_map: self.queue.snapshot_running(),
            retry_map: self.retry_states.clone(),
            circuit_breakers: self.retry.breaker_snapshot(),
        }
    }

    async fn snapshot_now(&mut self) {
        let state = self.snapshot_state();
        if let Err(e) = self.state_store.save(state).await {
            tracing::error!(error = %e, "failed to save snapshot");
        }
        self.dirty = false;
    }

    fn status_snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            uptime: self.started_at.elapsed(),
            queue_depth: self.queue.size(),
            running_count: self.queue.running_count(),
            dead_letter_count: self.dead_letter_store.list().map(|v| v.len()).unwrap_or(0),
            active_locks: self.lock_store.list_active().map(|v| v.len()).unwrap_or(0),
            maintenance: self.maintenance.as_ref().map(|m| MaintenanceStatus {
                until: m.until,
                allow: m.allow.clone(),
            }),
        }
    }

    fn handle_command(&mut self, command: DispatcherCommand) {
        match command {
            DispatcherCommand::Status(reply) => {
                let _ = reply.send(self.status_snapshot());
            }
            DispatcherCommand::CancelTask { key, reply } => {
                let _ = reply.send(self.cancel_task(&key));
            }
            DispatcherCommand::EnterMaintenance { duration, allow, reply } => {
                self.enter_maintenance(duration, allow);
                let _ = reply.send(());
            }
            DispatcherCommand::LeaveMaintenance { reply } => {
                self.leave_maintenance();
                let _ = reply.send(());
            }
            DispatcherCommand::RetryDeadLetter { id, reply } => {
                let result = self.retry_dead_letter(id).map_err(|e| e.to_string());
                let _ = reply.send(result);
            }
            DispatcherCommand::Reload { retry, monitor, reply } => {
                let breakers = self.retry.breaker_snapshot();
                let mut fresh = RetryController::new(retry.clone());
                fresh.restore_breakers(breakers);
                self.retry = fresh;
                self.config.retry = retry;
                self.monitor = ProcessMonitor::new(monitor.clone());
                self.config.monitor = monitor;
                let _ = reply.send(());
            }
        }
    }

    fn run_monitor_tick(&mut self) {
        let now = self.clock.now_utc();
        let lock_failure_rate = ratio(self.lock_failures, self.lock_attempts);
        let task_error_rate = ratio(self.failures, self.outcomes);
        let sample = DispatchSample {
            queue_depth: self.queue.size(),
            task_error_rate,
            lock_failure_rate,
        };
        for alert in self.monitor.sample(sample, now) {
            self.alert_bus.publish(alert);
        }
        self.lock_attempts = 0;
        self.lock_failures = 0;
        self.outcomes = 0;
        self.failures = 0;
    }

    /// Run the dispatch loop until `shutdown` is notified. `commands` feeds
    /// operator requests (status, kill, maintenance) from the socket
    /// listener, answered inline on the loop's own task.
    pub async fn run(
        mut self,
        shutdown: Arc<Notify>,
        mut commands: mpsc::UnboundedReceiver<DispatcherCommand>,
    ) {
        if let Err(e) = self.recover().await {
            tracing::error!(error = %e, "startup recovery failed");
        }
        self.drain_dispatch();

        let mut snapshot_tick = tokio::time::interval(self.config.persistence.save_interval);
        let mut retry_tick = tokio::time::interval(self.config.retry_tick_interval);
        let mut monitor_tick = tokio::time::interval(self.config.monitor.sample_interval);
        let mut alert_rx = self.alert_bus.subscribe();

        loop {
            tokio::select! {
                result = self.worker_results_rx.recv() => {
                    match result {
                        Some(result) => {
                            self.handle_outcome(result);
                            self.drain_dispatch();
                        }
                        None => break,
                    }
                }
                command = commands.recv() => {
                    match command {
                        Some(command) => self.handle_command(command),
                        None => {}
                    }
                }
                _ = snapshot_tick.tick() => {
                    self.snapshot_now().await;
                    let now = self.clock.now_utc();
                    if let Err(e) = self.dead_letter_store.prune_expired(now) {
                        tracing::warn!(error = %e, "dead-letter pruning failed");
                    }
                }
                _ = retry_tick.tick() => {
                    self.drain_dispatch();
                }
                _ = monitor_tick.tick() => {
                    self.run_monitor_tick();
                }
                alert = alert_rx.recv() => {
                    if let Ok(alert) = alert {
                        tracing::warn!(summary = %alert.log_summary(), "process monitor alert");
                    }
                }
                _ = shutdown.notified() => {
                    break;
                }
            }
        }

        self.shutdown_sequence().await;
    }

    async fn shutdown_sequence(&mut self) {
        tracing::info!("dispatcher shutting down");
        for (_, mut handle) in self.handles.drain() {
            handle.cancel();
        }

        let grace = self.config.worker.grace_shutdown + std::time::Duration::from_secs(1);
        let deadline = tokio::time::sleep(grace);
        tokio::pin!(deadline);
        while !self.inflight.is_empty() {
            tokio::select! {
                _ = &mut deadline => break,
                result = self.worker_results_rx.recv() => {
                    match result {
                        Some(result) => self.handle_outcome(result),
                        None => break,
                    }
                }
            }
        }

        match self.lock_store.release_all(std::process::id()) {
            Ok(released) => tracing::info!(released, "released locks on shutdown"),
            Err(e) => tracing::warn!(error = %e, "failed to release locks on shutdown"),
        }
        self.snapshot_now().await;
    }
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// A server-supplied `Retry-After: <seconds>` hint, if present verbatim in
/// the captured stderr tail. Workers that talk to a rate-limited upstream
/// are expected to echo this header into their failure output.
fn parse_retry_after(stderr_tail: &str) -> Option<std::time::Duration> {
    let line = stderr_tail.lines().find(|l| l.to_ascii_lowercase().contains("retry-after"))?;
    let digits: String = line.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse::<u64>().ok().map(std::time::Duration::from_secs)
}

fn local_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown-host".to_string())
}

#[cfg(test)]
#[path = "dispatcher_tests.rs"]
mod tests;
