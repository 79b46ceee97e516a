// SPDX-License-Identifier: MIT

//! Subcommand implementations: each builds a [`Request`], sends it, and
//! renders the [`Response`].

use anyhow::{anyhow, Result};

use poppo_daemon::protocol::{Request, Response};

use crate::client::DaemonClient;

pub async fn status(json: bool) -> Result<()> {
    let client = DaemonClient::connect()?;
    match client.send(&Request::Status).await? {
        Response::Status(payload) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                println!("uptime:          {}s", payload.uptime_secs);
                println!("queue depth:     {}", payload.queue_depth);
                println!("running:         {}", payload.running_count);
                println!("dead letters:    {}", payload.dead_letter_count);
                println!("active locks:    {}", payload.active_locks);
                if payload.in_maintenance {
                    println!("maintenance:     active");
                } else {
                    println!("maintenance:     off");
                }
            }
            Ok(())
        }
        Response::Error { message } => Err(anyhow!(message)),
        _ => Err(anyhow!("unexpected response from daemon")),
    }
}

pub async fn kill(item_key: String, force: bool) -> Result<()> {
    let client = DaemonClient::connect()?;
    match client.send(&Request::Kill { item_key: item_key.clone(), force }).await? {
        Response::Killed { found: true } => {
            println!("cancelled {item_key}");
            Ok(())
        }
        Response::Killed { found: false } => Err(anyhow!("no running task for '{item_key}'")),
        Response::Error { message } => Err(anyhow!(message)),
        _ => Err(anyhow!("unexpected response from daemon")),
    }
}

pub async fn logs(item_key: String, lines: Option<usize>, level: Option<String>) -> Result<()> {
    let client = DaemonClient::connect()?;
    match client.send(&Request::Logs { item_key: item_key.clone(), lines, level }).await? {
        Response::Logs { content, log_path: Some(_) } => {
            println!("{content}");
            Ok(())
        }
        Response::Logs { log_path: None, .. } => Err(anyhow!("no logs found for '{item_key}'")),
        Response::Error { message } => Err(anyhow!(message)),
        _ => Err(anyhow!("unexpected response from daemon")),
    }
}

pub async fn maintenance_start(duration_secs: u64, allow: Vec<String>) -> Result<()> {
    let client = DaemonClient::connect()?;
    match client.send(&Request::MaintenanceStart { duration_secs, allow }).await? {
        Response::MaintenanceStarted => {
            println!("maintenance mode entered for {duration_secs}s");
            Ok(())
        }
        Response::Error { message } => Err(anyhow!(message)),
        _ => Err(anyhow!("unexpected response from daemon")),
    }
}

pub async fn maintenance_stop() -> Result<()> {
    let client = DaemonClient::connect()?;
    match client.send(&Request::MaintenanceStop).await? {
        Response::MaintenanceStopped => {
            println!("maintenance mode left");
            Ok(())
        }
        Response::Error { message } => Err(anyhow!(message)),
        _ => Err(anyhow!("unexpected response from daemon")),
    }
}

pub async fn maintenance_status() -> Result<()> {
    let client = DaemonClient::connect()?;
    match client.send(&Request::MaintenanceStatus).await? {
        Response::Status(payload) => {
            if payload.in_maintenance {
                println!("maintenance: active");
                if let Some(until_ms) = payload.maintenance_until_epoch_ms {
                    println!("until (epoch ms): {until_ms}");
                }
            } else {
                println!("maintenance: off");
            }
            Ok(())
        }
        Response::Error { message } => Err(anyhow!(message)),
        _ => Err(anyhow!("unexpected response from daemon")),
    }
}

pub async fn maintenance_extend(duration_secs: u64) -> Result<()> {
    let client = DaemonClient::connect()?;
    match client.send(&Request::MaintenanceExtend { duration_secs }).await? {
        Response::MaintenanceStarted => {
            println!("maintenance window extended by {duration_secs}s");
            Ok(())
        }
        Response::Error { message } => Err(anyhow!(message)),
        _ => Err(anyhow!("unexpected response from daemon")),
    }
}

pub async fn retry_dead_letter(id: String) -> Result<()> {
    let client = DaemonClient::connect()?;
    match client.send(&Request::RetryDeadLetter { id: id.clone() }).await? {
        Response::DeadLetterRetried => {
            println!("requeued dead letter {id}");
            Ok(())
        }
        Response::Error { message } => Err(anyhow!(message)),
        _ => Err(anyhow!("unexpected response from daemon")),
    }
}
