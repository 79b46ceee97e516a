// SPDX-License-Identifier: MIT

//! Listener task for handling socket I/O.
//!
//! Runs in its own spawned task per connection so a slow or stuck client
//! never blocks the dispatch loop; every request it can't answer itself is
//! forwarded to the Dispatcher as a [`DispatcherCommand`] and answered via
//! oneshot reply.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use poppo_engine::{DispatcherCommand, MaintenanceStatus};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, Notify};
use tracing::{debug, error, warn};

use crate::protocol::{self, Request, Response, StatusPayload, DEFAULT_TIMEOUT};

pub struct ListenCtx {
    pub commands: mpsc::UnboundedSender<DispatcherCommand>,
    pub log_dir: PathBuf,
    pub shutdown: Arc<Notify>,
    pub start_time: Instant,
}

pub struct Listener {
    socket: UnixListener,
    ctx: Arc<ListenCtx>,
}

impl Listener {
    pub fn new(socket: UnixListener, ctx: Arc<ListenCtx>) -> Self {
        Self { socket, ctx }
    }

    /// Accept connections until the process exits; each connection is
    /// handled on its own spawned task.
    pub async fn run(self) {
        loop {
            match self.socket.accept().await {
                Ok((stream, _)) => {
                    let ctx = Arc::clone(&self.ctx);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, &ctx).await {
                            match e {
                                protocol::ProtocolError::ConnectionClosed => debug!("client disconnected"),
                                protocol::ProtocolError::Timeout => warn!("connection timeout"),
                                other => error!(error = %other, "connection error"),
                            }
                        }
                    });
                }
                Err(e) => error!(error = %e, "accept error"),
            }
        }
    }
}

async fn handle_connection(stream: UnixStream, ctx: &ListenCtx) -> Result<(), protocol::ProtocolError> {
    let (mut reader, mut writer) = stream.into_split();
    let request = protocol::read_request(&mut reader, DEFAULT_TIMEOUT).await?;

    if matches!(request, Request::Status | Request::MaintenanceStatus) {
        debug!(?request, "received query");
    } else {
        tracing::info!(?request, "received request");
    }

    let response = handle_request(request, ctx).await;
    protocol::write_response(&mut writer, &response, DEFAULT_TIMEOUT).await
}

async fn handle_request(request: Request, ctx: &ListenCtx) -> Response {
    match request {
        Request::Ping => Response::Pong,

        Request::Status | Request::MaintenanceStatus => {
            let (tx, rx) = tokio::sync::oneshot::channel();
            if ctx.commands.send(DispatcherCommand::Status(tx)).is_err() {
                return Response::Error { message: "dispatcher unavailable".to_string() };
            }
            match rx.await {
                Ok(snapshot) => Response::Status(to_status_payload(snapshot, ctx.start_time)),
                Err(_) => Response::Error { message: "dispatcher did not respond".to_string() },
            }
        }

        Request::Kill { item_key, force: _ } => {
            let (tx, rx) = tokio::sync::oneshot::channel();
            if ctx.commands.send(DispatcherCommand::CancelTask { key: item_key, reply: tx }).is_err() {
                return Response::Error { message: "dispatcher unavailable".to_string() };
            }
            match rx.await {
                Ok(found) => Response::Killed { found },
                Err(_) => Response::Error { message: "dispatcher did not respond".to_string() },
            }
        }

        Request::Logs { item_key, lines, level: _ } => {
            let limit = lines.unwrap_or(200);
            match find_log_for(&ctx.log_dir, &item_key) {
                Some(path) => {
                    let content = tail_file(&path, limit).unwrap_or_default();
                    Response::Logs { content, log_path: Some(path.display().to_string()) }
                }
                None => Response::Logs { content: String::new(), log_path: None },
            }
        }

        Request::MaintenanceStart { duration_secs, allow } => {
            let allow = parse_item_types(&allow);
            let (tx, rx) = tokio::sync::oneshot::channel();
            let duration = std::time::Duration::from_secs(duration_secs);
            if ctx
                .commands
                .send(DispatcherCommand::EnterMaintenance { duration, allow, reply: tx })
                .is_err()
            {
                return Response::Error { message: "dispatcher unavailable".to_string() };
            }
            match rx.await {
                Ok(()) => Response::MaintenanceStarted,
                Err(_) => Response::Error { message: "dispatcher did not respond".to_string() },
            }
        }

        Request::MaintenanceExtend { duration_secs } => {
            // Extending re-enters with the same semantics: a fresh window
            // starting now, carrying forward the allow-list of the window
            // that's currently active rather than fabricating an empty one.
            let (status_tx, status_rx) = tokio::sync::oneshot::channel();
            if ctx.commands.send(DispatcherCommand::Status(status_tx)).is_err() {
                return Response::Error { message: "dispatcher unavailable".to_string() };
            }
            let allow = match status_rx.await {
                Ok(snapshot) => match snapshot.maintenance {
                    Some(m) => m.allow,
                    None => {
                        return Response::Error {
                            message: "no maintenance window is active to extend".to_string(),
                        }
                    }
                },
                Err(_) => return Response::Error { message: "dispatcher did not respond".to_string() },
            };

            let (tx, rx) = tokio::sync::oneshot::channel();
            let duration = std::time::Duration::from_secs(duration_secs);
            if ctx
                .commands
                .send(DispatcherCommand::EnterMaintenance { duration, allow, reply: tx })
                .is_err()
            {
                return Response::Error { message: "dispatcher unavailable".to_string() };
            }
            match rx.await {
                Ok(()) => Response::MaintenanceStarted,
                Err(_) => Response::Error { message: "dispatcher did not respond".to_string() },
            }
        }

        Request::MaintenanceStop => {
            let (tx, rx) = tokio::sync::oneshot::channel();
            if ctx.commands.send(DispatcherCommand::LeaveMaintenance { reply: tx }).is_err() {
                return Response::Error { message: "dispatcher unavailable".to_string() };
            }
            match rx.await {
                Ok(()) => Response::MaintenanceStopped,
                Err(_) => Response::Error { message: "dispatcher did not respond".to_string() },
            }
        }

        Request::RetryDeadLetter { id } => {
            let Ok(uuid) = id.parse() else {
                return Response::Error { message: format!("invalid dead letter id: {id}") };
            };
            let (tx, rx) = tokio::sync::oneshot::channel();
            if ctx.commands.send(DispatcherCommand::RetryDeadLetter { id: uuid, reply: tx }).is_err() {
                return Response::Error { message: "dispatcher unavailable".to_string() };
            }
            match rx.await {
                Ok(Ok(())) => Response::DeadLetterRetried,
                Ok(Err(e)) => Response::Error { message: e },
                Err(_) => Response::Error { message: "dispatcher did not respond".to_string() },
            }
        }
    }
}

fn to_status_payload(snapshot: poppo_engine::StatusSnapshot, start_time: Instant) -> StatusPayload {
    StatusPayload {
        uptime_secs: start_time.elapsed().as_secs().max(snapshot.uptime.as_secs()),
        queue_depth: snapshot.queue_depth,
        running_count: snapshot.running_count,
        dead_letter_count: snapshot.dead_letter_count,
        active_locks: snapshot.active_locks,
        in_maintenance: snapshot.maintenance.is_some(),
        maintenance_until_epoch_ms: snapshot.maintenance.as_ref().map(|m: &MaintenanceStatus| m.until.timestamp_millis()),
    }
}

fn parse_item_types(names: &[String]) -> std::collections::HashSet<poppo_core::WorkItemType> {
    names
        .iter()
        .filter_map(|name| match name.as_str() {
            "issue" => Some(poppo_core::WorkItemType::Issue),
            "comment" => Some(poppo_core::WorkItemType::Comment),
            "dogfooding" => Some(poppo_core::WorkItemType::Dogfooding),
            "documentation" => Some(poppo_core::WorkItemType::Documentation),
            "quality" => Some(poppo_core::WorkItemType::Quality),
            "review" => Some(poppo_core::WorkItemType::Review),
            "error-log" => Some(poppo_core::WorkItemType::ErrorLog),
            _ => None,
        })
        .collect()
}

/// Find the most recently modified log file whose sanitized name starts
/// with `{item_key}__`, matching the Worker Pool's naming convention.
fn find_log_for(log_dir: &Path, item_key: &str) -> Option<PathBuf> {
    let prefix = format!("{item_key}__");
    let mut candidates: Vec<(std::time::SystemTime, PathBuf)> = std::fs::read_dir(log_dir)
        .ok()?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().to_string();
            let sanitized: String = name
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.' { c } else { '_' })
                .collect();
            if !sanitized.starts_with(&prefix) {
                return None;
            }
            let modified = entry.metadata().ok()?.modified().ok()?;
            Some((modified, entry.path()))
        })
        .collect();
    candidates.sort_by_key(|(modified, _)| *modified);
    candidates.pop().map(|(_, path)| path)
}

fn tail_file(path: &Path, lines: usize) -> std::io::Result<String> {
    let content = std::fs::read_to_string(path)?;
    let all: Vec<&str> = content.lines().collect();
    let start = all.len().saturating_sub(lines);
    Ok(all[start..].join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_log_for_picks_newest_matching_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("org_repo__1__aaa.log"), "first").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(10));
        std::fs::write(dir.path().join("org_repo__1__bbb.log"), "second").unwrap();

        let found = find_log_for(dir.path(), "org_repo__1").unwrap();
        assert!(found.to_string_lossy().contains("bbb"));
    }

    #[test]
    fn find_log_for_returns_none_without_a_match() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("unrelated.log"), "x").unwrap();
        assert!(find_log_for(dir.path(), "org_repo__1").is_none());
    }

    #[test]
    fn tail_file_returns_last_n_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.log");
        std::fs::write(&path, "one\ntwo\nthree\nfour\n").unwrap();
        let tail = tail_file(&path, 2).unwrap();
        assert_eq!(tail, "three\nfour");
    }
}
