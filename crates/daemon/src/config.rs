// SPDX-License-Identifier: MIT

//! TOML-backed daemon configuration: fixed on-disk paths plus the engine's
//! [`EngineConfig`]. A config file is optional; missing sections fall back
//! to [`EngineConfig::default`]. A fixed subset of keys may be re-read on
//! `SIGHUP` without a restart; everything else is read once at startup.

use std::path::{Path, PathBuf};

use poppo_engine::EngineConfig;
use thiserror::Error;

use crate::env;

/// Top-level [`EngineConfig`] sections that `SIGHUP` re-reads. Everything
/// else, including the worker pool's concurrency caps, stays fixed for the
/// life of the process: the pool's semaphores are sized once at
/// construction, so raising or lowering them live is not supported and
/// requires a restart.
pub const RELOADABLE_KEYS: &[&str] = &["retry", "monitor"];

#[derive(Debug, Clone)]
pub struct Config {
    pub state_dir: PathBuf,
    pub socket_path: PathBuf,
    pub lock_path: PathBuf,
    pub version_path: PathBuf,
    pub log_path: PathBuf,
    pub config_path: PathBuf,
    pub engine: EngineConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },

    #[error("invalid configuration in {path}: {source}")]
    Toml { path: PathBuf, source: Box<toml::de::Error> },
}

impl Config {
    /// Resolve state-directory-relative paths and load `config.toml` if
    /// present. A malformed config file is a fatal startup error; a missing
    /// one is not.
    pub fn load() -> Result<Self, crate::lifecycle::LifecycleError> {
        let state_dir = env::state_dir()?;
        let config_path = state_dir.join("config.toml");
        let engine = load_engine_config(&config_path)?;

        Ok(Self {
            socket_path: state_dir.join("poppo.sock"),
            lock_path: state_dir.join("poppo.pid"),
            version_path: state_dir.join("poppo.version"),
            log_path: state_dir.join("poppo.log"),
            config_path,
            engine,
            state_dir,
        })
    }

    /// Re-read [`RELOADABLE_KEYS`] from disk. An invalid file is logged and
    /// the previous configuration is retained in full. Returns the freshly
    /// parsed retry/monitor sections so the caller can push them into the
    /// running Dispatcher; `self.engine` is updated to match in either case
    /// so later reads (e.g. on the next reload) stay consistent.
    pub fn reload(&mut self) -> Option<(poppo_retry::RetryConfig, poppo_engine::MonitorConfig)> {
        match load_engine_config(&self.config_path) {
            Ok(fresh) => {
                self.engine.retry = fresh.retry.clone();
                self.engine.monitor = fresh.monitor.clone();
                tracing::info!("configuration reloaded from {}", self.config_path.display());
                Some((fresh.retry, fresh.monitor))
            }
            Err(e) => {
                tracing::warn!(error = %e, "invalid configuration on reload, keeping previous values");
                None
            }
        }
    }
}

fn load_engine_config(path: &Path) -> Result<EngineConfig, ConfigError> {
    if !path.exists() {
        return Ok(EngineConfig::default());
    }
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| ConfigError::Toml {
        path: path.to_path_buf(),
        source: Box::new(source),
    })
}
