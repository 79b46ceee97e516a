// SPDX-License-Identifier: MIT

//! The Lock Store (C1): exclusive, crash-safe per-work-item locks with TTL,
//! backed by one JSON file per sanitized item key.
//!
//! Acquisition uses `OpenOptions::create_new` for the atomic create-if-absent
//! guarantee; a collision (`EEXIST`) is contention, not an error. A losing
//! reader re-reads the existing file and reclaims it if stale (expired, or
//! the holder's pid is no longer alive on the same host) before retrying, up
//! to the caller's retry budget.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind as IoErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use poppo_core::{Clock, Holder, Lock};

use crate::config::LockStoreConfig;
use crate::error::LockStoreError;

/// Best-effort liveness probe, `kill(pid, 0)` semantics via `nix`. Returns
/// `true` on anything other than "no such process" — a permission error
/// still means the pid exists.
fn pid_alive(pid: u32) -> bool {
    match nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), None) {
        Ok(()) => true,
        Err(nix::errno::Errno::ESRCH) => false,
        Err(_) => true,
    }
}

fn local_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown-host".to_string())
}

/// Filesystem-backed implementation of the Lock Store contract.
pub struct LockStore<C: Clock> {
    config: LockStoreConfig,
    clock: C,
    hostname: String,
}

impl<C: Clock> LockStore<C> {
    pub fn new(config: LockStoreConfig, clock: C) -> Result<Self, LockStoreError> {
        fs::create_dir_all(&config.locks_dir).map_err(|source| LockStoreError::Io {
            path: config.locks_dir.display().to_string(),
            source,
        })?;
        Ok(Self {
            config,
            clock,
            hostname: local_hostname(),
        })
    }

    fn path_for(&self, sanitized_key: &str) -> PathBuf {
        self.config.locks_dir.join(format!("{sanitized_key}.lock"))
    }

    fn read_lock(&self, path: &Path) -> Result<Lock, LockStoreError> {
        let contents = fs::read_to_string(path).map_err(|source| LockStoreError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|e| LockStoreError::Corrupt {
            item_key: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Stale iff expired OR the holder's pid is gone on the same host.
    /// Cross-host pids are never considered dead — we cannot probe them.
    fn is_stale(&self, lock: &Lock, now: DateTime<Utc>) -> bool {
        if lock.expired_at(now) {
            return true;
        }
        lock.holder.hostname == self.hostname && !pid_alive(lock.holder.pid)
    }

    fn write_lock(&self, path: &Path, lock: &Lock) -> Result<(), LockStoreError> {
        let tmp_path = path.with_extension("lock.tmp");
        {
            let mut file = OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&tmp_path)
                .map_err(|source| LockStoreError::Io {
                    path: tmp_path.display().to_string(),
                    source,
                })?;
            let body = serde_json::to_vec(lock)?;
            file.write_all(&body).map_err(|source| LockStoreError::Io {
                path: tmp_path.display().to_string(),
                source,
            })?;
            file.sync_all().map_err(|source| LockStoreError::Io {
                path: tmp_path.display().to_string(),
                source,
            })?;
        }
        fs::rename(&tmp_path, path).map_err(|source| LockStoreError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(())
    }

    /// `acquire(item_key, holder, ttl) -> bool`: atomically creates a lock
    /// record iff none valid exists. Stale records are reclaimed and the
    /// attempt retried, up to the configured retry budget.
    pub fn acquire(&self, item_key: &str, holder: Holder, ttl: std::time::Duration) -> Result<bool, LockStoreError> {
        let path = self.path_for(item_key);
        let now = self.clock.now_utc();
        let lock = Lock::new(item_key.to_string(), holder, now, ttl);

        for _ in 0..=self.config.acquire_retry_budget {
            match create_exclusive(&path) {
                Ok(mut file) => {
                    let body = serde_json::to_vec(&lock)?;
                    file.write_all(&body).map_err(|source| LockStoreError::Io {
                        path: path.display().to_string(),
                        source,
                    })?;
                    file.sync_all().map_err(|source| LockStoreError::Io {
                        path: path.display().to_string(),
                        source,
                    })?;
                    return Ok(true);
                }
                Err(e) if e.kind() == IoErrorKind::AlreadyExists => {
                    let existing = match self.read_lock(&path) {
                        Ok(existing) => existing,
                        // A record that won't even parse is corrupt, not held; reclaim it.
                        Err(LockStoreError::Corrupt { .. }) => {
                            let _ = fs::remove_file(&path);
                            continue;
                        }
                        Err(other) => return Err(other),
                    };
                    if self.is_stale(&existing, now) {
                        let _ = fs::remove_file(&path);
                        continue;
                    }
                    return Ok(false);
                }
                Err(source) => {
                    return Err(LockStoreError::Io {
                        path: path.display().to_string(),
                        source,
                    })
                }
            }
        }
        Ok(false)
    }

    /// `release(item_key, holder) -> bool`: deletes the lock iff the caller
    /// owns it.
    pub fn release(&self, item_key: &str, holder: &Holder) -> Result<bool, LockStoreError> {
        let path = self.path_for(item_key);
        if !path.exists() {
            return Ok(false);
        }
        let existing = self.read_lock(&path)?;
        if &existing.holder != holder {
            return Ok(false);
        }
        fs::remove_file(&path).map_err(|source| LockStoreError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(true)
    }

    /// `renew(item_key, holder, extra_ttl) -> bool`: extends `expires_at` if
    /// the caller owns the lock.
    pub fn renew(&self, item_key: &str, holder: &Holder, extra_ttl: std::time::Duration) -> Result<bool, LockStoreError> {
        let path = self.path_for(item_key);
        if !path.exists() {
            return Ok(false);
        }
        let mut existing = self.read_lock(&path)?;
        if &existing.holder != holder {
            return Ok(false);
        }
        existing.renew(extra_ttl);
        self.write_lock(&path, &existing)?;
        Ok(true)
    }

    /// `release_all(pid)`: releases every lock whose holder pid matches,
    /// used on clean shutdown.
    pub fn release_all(&self, pid: u32) -> Result<usize, LockStoreError> {
        let mut released = 0;
        for entry in fs::read_dir(&self.config.locks_dir).map_err(|source| LockStoreError::Io {
            path: self.config.locks_dir.display().to_string(),
            source,
        })? {
            let entry = entry.map_err(|source| LockStoreError::Io {
                path: self.config.locks_dir.display().to_string(),
                source,
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("lock") {
                continue;
            }
            if let Ok(lock) = self.read_lock(&path) {
                if lock.holder.pid == pid && lock.holder.hostname == self.hostname {
                    if fs::remove_file(&path).is_ok() {
                        released += 1;
                    }
                }
            }
        }
        Ok(released)
    }

    /// `list_active() -> [Lock]`: valid locks only.
    pub fn list_active(&self) -> Result<Vec<Lock>, LockStoreError> {
        let now = self.clock.now_utc();
        let mut active = Vec::new();
        for entry in fs::read_dir(&self.config.locks_dir).map_err(|source| LockStoreError::Io {
            path: self.config.locks_dir.display().to_string(),
            source,
        })? {
            let entry = entry.map_err(|source| LockStoreError::Io {
                path: self.config.locks_dir.display().to_string(),
                source,
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("lock") {
                continue;
            }
            if let Ok(lock) = self.read_lock(&path) {
                if !self.is_stale(&lock, now) {
                    active.push(lock);
                }
            }
        }
        Ok(active)
    }

    /// Whether a valid lock currently exists for `item_key`. Used by startup
    /// reconciliation to check a single key without listing the whole directory.
    pub fn is_valid(&self, item_key: &str) -> Result<bool, LockStoreError> {
        let path = self.path_for(item_key);
        if !path.exists() {
            return Ok(false);
        }
        let lock = match self.read_lock(&path) {
            Ok(lock) => lock,
            Err(LockStoreError::Corrupt { .. }) => return Ok(false),
            Err(other) => return Err(other),
        };
        Ok(!self.is_stale(&lock, self.clock.now_utc()))
    }
}

fn create_exclusive(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().write(true).create_new(true).open(path)
}

#[cfg(test)]
#[path = "lock_store_tests.rs"]
mod tests;
