// SPDX-License-Identifier: MIT

//! Daemon client: connects to `poppod`'s Unix socket and speaks the
//! length-prefixed JSON protocol.

use std::path::PathBuf;
use std::time::Duration;

use poppo_daemon::protocol::{self, ProtocolError, Request, Response};
use thiserror::Error;
use tokio::net::UnixStream;

fn parse_duration_ms(var: &str) -> Option<Duration> {
    std::env::var(var).ok().and_then(|s| s.parse::<u64>().ok()).map(Duration::from_millis)
}

/// Timeout for a round-trip IPC request.
pub fn timeout_ipc() -> Duration {
    parse_duration_ms("POPPO_TIMEOUT_IPC_MS").unwrap_or(Duration::from_secs(5))
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("poppod is not running (no socket at {0})")]
    DaemonNotRunning(PathBuf),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("unexpected response from daemon")]
    UnexpectedResponse,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not determine state directory")]
    NoStateDir,
}

pub struct DaemonClient {
    socket_path: PathBuf,
}

impl DaemonClient {
    /// Connect to the running daemon. Does not auto-start `poppod`: an
    /// operator CLI invocation with no daemon running should fail loudly
    /// rather than silently spawn a background process.
    pub fn connect() -> Result<Self, ClientError> {
        let socket_path = poppo_daemon::env::state_dir()
            .map_err(|_| ClientError::NoStateDir)?
            .join("poppo.sock");

        if !socket_path.exists() {
            return Err(ClientError::DaemonNotRunning(socket_path));
        }
        Ok(Self { socket_path })
    }

    pub async fn send(&self, request: &Request) -> Result<Response, ClientError> {
        let stream = UnixStream::connect(&self.socket_path).await?;
        let (mut reader, mut writer) = stream.into_split();

        let data = protocol::encode(request)?;
        let timeout = timeout_ipc();
        tokio::time::timeout(timeout, protocol::write_message(&mut writer, &data))
            .await
            .map_err(|_| ProtocolError::Timeout)??;

        let response_bytes = tokio::time::timeout(timeout, protocol::read_message(&mut reader))
            .await
            .map_err(|_| ProtocolError::Timeout)??;

        Ok(protocol::decode(&response_bytes)?)
    }
}
