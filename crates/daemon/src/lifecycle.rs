// SPDX-License-Identifier: MIT

//! Daemon lifecycle: acquire the PID lock, build the Dispatcher, bind the
//! socket last, and tear it all down again on the way out.

use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use fs2::FileExt;
use poppo_core::SystemClock;
use poppo_engine::{Dispatcher, DispatchError, DispatcherCommand};
use thiserror::Error;
use tokio::net::UnixListener;
use tokio::sync::{mpsc, Notify};
use tracing::warn;

use crate::config::{Config, ConfigError};

pub const PROTOCOL_VERSION: &str = concat!(env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("could not determine state directory")]
    NoStateDir,

    #[error("failed to acquire lock: daemon already running?")]
    LockFailed(#[source] std::io::Error),

    #[error("failed to bind socket at {0}: {1}")]
    BindFailed(PathBuf, std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("dispatcher startup failed: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Everything `main` needs to hand off to the running daemon.
pub struct StartupResult {
    pub dispatcher: Dispatcher<SystemClock>,
    pub listener: UnixListener,
    /// Held only to keep the exclusive lock alive; released on drop.
    #[allow(dead_code)]
    pub lock_file: File,
    pub shutdown: Arc<Notify>,
    pub commands_tx: mpsc::UnboundedSender<DispatcherCommand>,
    pub commands_rx: mpsc::UnboundedReceiver<DispatcherCommand>,
}

/// Start the daemon: acquire the PID lock, load state, bind the socket.
pub async fn startup(config: &Config) -> Result<StartupResult, LifecycleError> {
    match startup_inner(config).await {
        Ok(result) => Ok(result),
        Err(e) => {
            // An already-running daemon's files must not be touched.
            if !matches!(e, LifecycleError::LockFailed(_)) {
                cleanup_on_failure(config);
            }
            Err(e)
        }
    }
}

async fn startup_inner(config: &Config) -> Result<StartupResult, LifecycleError> {
    std::fs::create_dir_all(&config.state_dir)?;

    // Acquire the lock file before truncating it, so a losing process never
    // wipes the winning daemon's PID.
    let lock_file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&config.lock_path)?;
    lock_file.try_lock_exclusive().map_err(LifecycleError::LockFailed)?;

    let mut lock_file = lock_file;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;
    let lock_file = lock_file;

    if let Some(parent) = config.engine.worker.log_dir.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::create_dir_all(&config.engine.worker.log_dir)?;

    std::fs::write(&config.version_path, PROTOCOL_VERSION)?;

    let dispatcher = Dispatcher::new(config.engine.clone(), SystemClock).await?;

    // Remove any stale socket and bind last, only after every fallible step
    // above has already succeeded.
    if config.socket_path.exists() {
        std::fs::remove_file(&config.socket_path)?;
    }
    let listener = UnixListener::bind(&config.socket_path)
        .map_err(|e| LifecycleError::BindFailed(config.socket_path.clone(), e))?;

    let (commands_tx, commands_rx) = mpsc::unbounded_channel();

    Ok(StartupResult {
        dispatcher,
        listener,
        lock_file,
        shutdown: Arc::new(Notify::new()),
        commands_tx,
        commands_rx,
    })
}

fn cleanup_on_failure(config: &Config) {
    let _ = std::fs::remove_file(&config.socket_path);
    let _ = std::fs::remove_file(&config.version_path);
}

/// Remove the socket, PID, and version files on a clean shutdown. The lock
/// file itself is released when `lock_file` is dropped.
pub fn remove_runtime_files(config: &Config) {
    if config.socket_path.exists() {
        if let Err(e) = std::fs::remove_file(&config.socket_path) {
            warn!(error = %e, "failed to remove socket file");
        }
    }
    if config.lock_path.exists() {
        if let Err(e) = std::fs::remove_file(&config.lock_path) {
            warn!(error = %e, "failed to remove pid file");
        }
    }
    if config.version_path.exists() {
        if let Err(e) = std::fs::remove_file(&config.version_path) {
            warn!(error = %e, "failed to remove version file");
        }
    }
}
