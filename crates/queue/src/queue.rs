// SPDX-License-Identifier: MIT

//! `TaskQueue`: the in-process priority queue owned exclusively by the
//! Dispatcher's serial decision path.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use poppo_core::{CircuitBreakerKey, ItemId, ProjectId, RunningEntry, TaskId, WorkItem, WorkItemType};

use crate::config::QueueConfig;
use crate::error::QueueError;
use crate::fairness::{self, DispatchShareTracker};

#[derive(Debug, Clone)]
struct Entry {
    item: WorkItem,
    /// Preserved across retries for aging purposes even when `next_retry_at` changes.
    enqueued_at: DateTime<Utc>,
    next_retry_at: DateTime<Utc>,
}

/// A multi-project priority queue keyed by effective score, with sub-indexes
/// by project id and type.
///
/// Ordering is recomputed on every `dequeue_eligible` rather than maintained
/// as a standing heap: the aging bonus is a function of wall-clock time, so a
/// score-ordered heap's invariant would be stale between pushes anyway. Queue
/// sizes in this domain (per-host backlog of review/issue work) make an O(n)
/// scan over entries cheap relative to the I/O each dispatch already does.
#[derive(Debug)]
pub struct TaskQueue {
    config: QueueConfig,
    entries: HashMap<String, Entry>,
    /// Items popped by `dequeue_eligible` but not yet confirmed running (lock
    /// acquisition pending). Re-enqueued verbatim if the lock attempt fails.
    pending: HashMap<String, Entry>,
    running: HashMap<String, RunningEntry>,
    project_index: HashMap<ProjectId, HashSet<String>>,
    project_weights: HashMap<ProjectId, f64>,
    project_caps: HashMap<ProjectId, u32>,
    share_tracker: DispatchShareTracker,
}

impl TaskQueue {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            config,
            entries: HashMap::new(),
            pending: HashMap::new(),
            running: HashMap::new(),
            project_index: HashMap::new(),
            project_weights: HashMap::new(),
            project_caps: HashMap::new(),
            share_tracker: DispatchShareTracker::new(),
        }
    }

    pub fn set_project_cap(&mut self, project: ProjectId, cap: u32) {
        self.project_caps.insert(project, cap);
    }

    pub fn set_project_weight(&mut self, project: ProjectId, weight: f64) {
        self.project_weights.insert(project, weight);
    }

    fn project_count(&self, project: &ProjectId) -> u32 {
        self.project_index.get(project).map(|s| s.len() as u32).unwrap_or(0)
    }

    /// `enqueue(item)`: rejects duplicates of an already-queued/running
    /// `(project, item_id)` (invariant I-1) and enforces the per-project cap.
    pub fn enqueue(&mut self, item: WorkItem, now: DateTime<Utc>) -> Result<(), QueueError> {
        let key = item.key().sanitized();
        if self.entries.contains_key(&key) || self.pending.contains_key(&key) || self.running.contains_key(&key) {
            return Err(QueueError::DuplicateItem(key));
        }

        let cap = self.project_caps.get(&item.project_id).copied().unwrap_or(self.config.default_project_cap);
        if self.project_count(&item.project_id) >= cap {
            return Err(QueueError::AdmissionRefused {
                project: item.project_id.to_string(),
                cap,
            });
        }

        self.project_index.entry(item.project_id.clone()).or_default().insert(key.clone());
        self.entries.insert(
            key,
            Entry {
                item,
                enqueued_at: now,
                next_retry_at: now,
            },
        );
        Ok(())
    }

    /// Re-enqueue after a retry decision: preserves the original enqueue
    /// time for aging but applies the freshly-computed `next_retry_at`.
    pub fn re_enqueue(&mut self, item: WorkItem, original_enqueued_at: DateTime<Utc>, next_retry_at: DateTime<Utc>) {
        let key = item.key().sanitized();
        self.project_index.entry(item.project_id.clone()).or_default().insert(key.clone());
        self.entries.insert(
            key,
            Entry {
                item,
                enqueued_at: original_enqueued_at,
                next_retry_at,
            },
        );
    }

    fn effective_score(&self, entry: &Entry, now: DateTime<Utc>) -> f64 {
        let waiting_secs = (now - entry.enqueued_at).num_milliseconds().max(0) as f64 / 1000.0;
        let aging = fairness::aging_bonus(waiting_secs, &self.config.aging);
        let weight = self
            .project_weights
            .get(&entry.item.project_id)
            .copied()
            .unwrap_or(self.config.fairness.project_weight_default);
        let active_projects = self.project_index.len();
        let penalty = self
            .share_tracker
            .fairness_penalty(&entry.item.project_id, active_projects, weight, &self.config.fairness);
        entry.item.priority as f64 + aging - penalty
    }

    /// `dequeue_eligible() -> item | none`: the highest-effective-score item
    /// whose `next_retry_at <= now` and whose `(project, type)` breaker is
    /// not open. The item moves to a pending-dispatch holding area, not
    /// directly to `running` — call [`TaskQueue::mark_running`] once the
    /// Dispatcher has confirmed the lock, or [`TaskQueue::return_pending`] if
    /// the lock attempt failed.
    pub fn dequeue_eligible(&mut self, now: DateTime<Utc>, mut breaker_allows: impl FnMut(&CircuitBreakerKey) -> bool) -> Option<WorkItem> {
        let mut best_key: Option<String> = None;
        let mut best_score = f64::NEG_INFINITY;
        let mut best_enqueued_at = now;

        for (key, entry) in self.entries.iter() {
            if entry.next_retry_at > now {
                continue;
            }
            let breaker_key = CircuitBreakerKey::new(entry.item.project_id.clone(), entry.item.item_type);
            if !breaker_allows(&breaker_key) {
                continue;
            }
            let score = self.effective_score(entry, now);
            let better = score > best_score
                || (score == best_score && entry.enqueued_at < best_enqueued_at);
            if better {
                best_score = score;
                best_enqueued_at = entry.enqueued_at;
                best_key = Some(key.clone());
            }
        }

        let key = best_key?;
        let entry = self.entries.remove(&key)?;
        if let Some(set) = self.project_index.get_mut(&entry.item.project_id) {
            set.remove(&key);
        }
        self.share_tracker.record_dispatch(&entry.item.project_id, self.config.fairness.share_decay);
        let item = entry.item.clone();
        self.pending.insert(key, entry);
        Some(item)
    }

    /// The lock attempt for a popped item failed; put it back exactly where
    /// it was (same enqueue time, same `next_retry_at`).
    pub fn return_pending(&mut self, key: &ItemKeyRef) -> Result<(), QueueError> {
        let entry = self.pending.remove(&key.sanitized).ok_or_else(|| QueueError::NotFound(key.sanitized.clone()))?;
        self.project_index.entry(entry.item.project_id.clone()).or_default().insert(key.sanitized.clone());
        self.entries.insert(key.sanitized.clone(), entry);
        Ok(())
    }

    pub fn mark_running(&mut self, sanitized_key: &str, task_id: TaskId, now: DateTime<Utc>) -> Result<(), QueueError> {
        let entry = self.pending.remove(sanitized_key).ok_or_else(|| QueueError::NotFound(sanitized_key.to_string()))?;
        self.running.insert(
            sanitized_key.to_string(),
            RunningEntry {
                item: entry.item,
                task_id,
                started_at: now,
            },
        );
        Ok(())
    }

    pub fn mark_done(&mut self, sanitized_key: &str) -> Option<RunningEntry> {
        self.running.remove(sanitized_key)
    }

    pub fn size(&self) -> usize {
        self.entries.len() + self.pending.len()
    }

    pub fn running_count(&self) -> usize {
        self.running.len()
    }

    pub fn by_project(&self, project: &ProjectId) -> Vec<&WorkItem> {
        self.entries
            .values()
            .filter(|e| &e.item.project_id == project)
            .map(|e| &e.item)
            .collect()
    }

    pub fn by_type(&self, item_type: WorkItemType) -> Vec<&WorkItem> {
        self.entries.values().filter(|e| e.item.item_type == item_type).map(|e| &e.item).collect()
    }

    /// Rebuild the queue from a loaded snapshot (startup recovery).
    pub fn restore(&mut self, items: Vec<WorkItem>, running: HashMap<String, RunningEntry>, now: DateTime<Utc>) {
        self.entries.clear();
        self.pending.clear();
        self.project_index.clear();
        self.running = running;
        for item in items {
            // Preserve the item's original `created_at` as its enqueue time so
            // its accumulated aging bonus survives the restart, the same way
            // `re_enqueue` preserves `original_enqueued_at` across a retry.
            let enqueued_at = item.created_at.min(now);
            let _ = self.enqueue(item, enqueued_at);
        }
    }

    pub fn snapshot_queue(&self) -> Vec<WorkItem> {
        self.entries
            .values()
            .chain(self.pending.values())
            .map(|e| e.item.clone())
            .collect()
    }

    pub fn snapshot_running(&self) -> HashMap<String, RunningEntry> {
        self.running.clone()
    }
}

/// A thin wrapper so callers don't have to reconstruct `ItemKey` just to
/// return a pending item — the sanitized string is all the queue needs.
pub struct ItemKeyRef {
    pub sanitized: String,
}

impl From<&str> for ItemKeyRef {
    fn from(s: &str) -> Self {
        Self { sanitized: s.to_string() }
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
