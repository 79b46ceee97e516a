// SPDX-License-Identifier: MIT

//! `poppo` — operator CLI for the `poppod` work-dispatch daemon.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

mod client;
mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "poppo", version, about = "Operator CLI for the poppod work-dispatch daemon")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print daemon, queue, and worker status
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Cooperatively cancel a running task
    Kill {
        /// Stable item key, e.g. `org__repo__42`
        item_key: String,
        /// Escalate to an immediate kill instead of a cooperative cancel
        #[arg(long)]
        force: bool,
    },
    /// View the most recent log for a task
    Logs {
        item_key: String,
        #[arg(short = 'n', long)]
        lines: Option<usize>,
        #[arg(long)]
        level: Option<String>,
    },
    /// Maintenance mode: restrict dispatch to allow-listed task types
    Maintenance {
        #[command(subcommand)]
        action: MaintenanceAction,
    },
}

#[derive(Subcommand)]
enum MaintenanceAction {
    /// Enter maintenance mode for a fixed duration
    Start {
        /// Duration in seconds
        duration_secs: u64,
        /// Task types still dispatched while in maintenance (repeatable)
        #[arg(long = "allow")]
        allow: Vec<String>,
    },
    /// Leave maintenance mode immediately
    Stop,
    /// Print whether maintenance mode is active
    Status,
    /// Extend an active maintenance window
    Extend {
        /// Additional duration in seconds
        duration_secs: u64,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Status { json } => commands::status(json).await,
        Commands::Kill { item_key, force } => commands::kill(item_key, force).await,
        Commands::Logs { item_key, lines, level } => commands::logs(item_key, lines, level).await,
        Commands::Maintenance { action } => match action {
            MaintenanceAction::Start { duration_secs, allow } => {
                commands::maintenance_start(duration_secs, allow).await
            }
            MaintenanceAction::Stop => commands::maintenance_stop().await,
            MaintenanceAction::Status => commands::maintenance_status().await,
            MaintenanceAction::Extend { duration_secs } => commands::maintenance_extend(duration_secs).await,
        },
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kill_parses_item_key_and_force_flag() {
        let cli = Cli::parse_from(["poppo", "kill", "org__repo__1", "--force"]);
        match cli.command {
            Commands::Kill { item_key, force } => {
                assert_eq!(item_key, "org__repo__1");
                assert!(force);
            }
            _ => panic!("expected Kill"),
        }
    }

    #[test]
    fn maintenance_start_collects_repeated_allow_flags() {
        let cli = Cli::parse_from([
            "poppo",
            "maintenance",
            "start",
            "3600",
            "--allow",
            "issue",
            "--allow",
            "comment",
        ]);
        match cli.command {
            Commands::Maintenance { action: MaintenanceAction::Start { duration_secs, allow } } => {
                assert_eq!(duration_secs, 3600);
                assert_eq!(allow, vec!["issue", "comment"]);
            }
            _ => panic!("expected Maintenance::Start"),
        }
    }

    #[test]
    fn status_defaults_json_to_false() {
        let cli = Cli::parse_from(["poppo", "status"]);
        match cli.command {
            Commands::Status { json } => assert!(!json),
            _ => panic!("expected Status"),
        }
    }
}
