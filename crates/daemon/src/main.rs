// SPDX-License-Identifier: MIT

//! `poppod`: background daemon that owns the dispatch loop.
//!
//! Architecture:
//! - Listener task: spawned, handles socket I/O, forwards requests to the
//!   Dispatcher over a command channel.
//! - Dispatch loop: runs on the main task, owns all scheduling state.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

use std::sync::Arc;
use std::time::Instant;

use poppo_daemon::{lifecycle, Config, ListenCtx, Listener, LifecycleError};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;
const MAX_ROTATED_LOGS: u32 = 3;
const STARTUP_MARKER_PREFIX: &str = "--- poppod: starting (pid: ";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("poppod {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                println!("poppod {}", env!("CARGO_PKG_VERSION"));
                println!("Work-dispatch daemon");
                println!();
                println!("USAGE:");
                println!("    poppod");
                println!();
                println!("The daemon is typically started by the `poppo` CLI and should");
                println!("not be invoked directly. It listens on a Unix socket for");
                println!("commands from `poppo`.");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help       Print help information");
                println!("    -v, --version    Print version information");
                return Ok(());
            }
            _ => {
                eprintln!("error: unexpected argument '{arg}'");
                eprintln!("Usage: poppod [--help | --version]");
                std::process::exit(1);
            }
        }
    }

    let config = Config::load()?;

    rotate_log_if_needed(&config.log_path);
    write_startup_marker(&config)?;
    let log_guard = setup_logging(&config)?;

    info!("starting poppod");

    let lifecycle::StartupResult {
        dispatcher,
        listener: unix_listener,
        lock_file,
        shutdown,
        commands_tx,
        commands_rx,
    } = match lifecycle::startup(&config).await {
        Ok(r) => r,
        Err(LifecycleError::LockFailed(_)) => {
            let pid = std::fs::read_to_string(&config.lock_path).unwrap_or_default();
            let pid = pid.trim();
            eprintln!("poppod is already running");
            if !pid.is_empty() {
                eprintln!("  pid: {pid}");
            }
            std::process::exit(1);
        }
        Err(e) => {
            write_startup_error(&config, &e);
            error!(error = %e, "failed to start daemon");
            drop(log_guard);
            return Err(e.into());
        }
    };

    let reload_commands = commands_tx.clone();
    let ctx = Arc::new(ListenCtx {
        commands: commands_tx,
        log_dir: config.engine.worker.log_dir.clone(),
        shutdown: Arc::clone(&shutdown),
        start_time: Instant::now(),
    });
    let listener = Listener::new(unix_listener, ctx);
    tokio::spawn(listener.run());

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sighup = signal(SignalKind::hangup())?;

    {
        let shutdown = Arc::clone(&shutdown);
        tokio::spawn(async move {
            tokio::select! {
                _ = sigterm.recv() => info!("received SIGTERM"),
                _ = sigint.recv() => info!("received SIGINT"),
            }
            shutdown.notify_one();
        });
    }

    {
        let mut reload_config = config.clone();
        tokio::spawn(async move {
            loop {
                if sighup.recv().await.is_none() {
                    break;
                }
                if let Some((retry, monitor)) = reload_config.reload() {
                    let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
                    if reload_commands
                        .send(poppo_engine::DispatcherCommand::Reload { retry, monitor, reply: reply_tx })
                        .is_ok()
                    {
                        let _ = reply_rx.await;
                    }
                }
            }
        });
    }

    info!("daemon ready, listening on {}", config.socket_path.display());
    println!("READY");

    dispatcher.run(shutdown, commands_rx).await;

    drop(lock_file);
    info!("daemon shutting down");
    Ok(())
}

fn rotate_log_if_needed(log_path: &std::path::Path) {
    let size = match std::fs::metadata(log_path) {
        Ok(m) => m.len(),
        Err(_) => return,
    };
    if size < MAX_LOG_SIZE {
        return;
    }

    let log_str = log_path.display().to_string();
    for i in (1..MAX_ROTATED_LOGS).rev() {
        let from = format!("{log_str}.{i}");
        let to = format!("{log_str}.{}", i + 1);
        let _ = std::fs::rename(&from, &to);
    }
    let _ = std::fs::rename(log_path, format!("{log_str}.1"));
}

fn write_startup_marker(config: &Config) -> Result<(), LifecycleError> {
    use std::io::Write;

    if let Some(parent) = config.log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::OpenOptions::new().create(true).append(true).open(&config.log_path)?;
    writeln!(file, "{}{}) ---\n", STARTUP_MARKER_PREFIX, std::process::id())?;
    Ok(())
}

fn write_startup_error(config: &Config, error: &LifecycleError) {
    use std::io::Write;

    let Ok(mut file) = std::fs::OpenOptions::new().create(true).append(true).open(&config.log_path) else {
        return;
    };
    let _ = writeln!(file, "ERROR failed to start daemon: {error}");
}

fn setup_logging(config: &Config) -> Result<tracing_appender::non_blocking::WorkerGuard, LifecycleError> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    if let Some(parent) = config.log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file_appender = tracing_appender::rolling::never(
        config.log_path.parent().ok_or(LifecycleError::NoStateDir)?,
        config.log_path.file_name().ok_or(LifecycleError::NoStateDir)?,
    );
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry().with(filter).with(fmt::layer().with_writer(non_blocking)).init();

    Ok(guard)
}
