// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon management commands

use std::path::Path;

use anyhow::Result;
use clap::Subcommand;
use rungate_core::RunnerId;
use rungate_daemon::lifecycle::Config as DaemonPaths;
use serde::Serialize;
use std::fmt;

use crate::client::{self, ClientError, DaemonClient};
use crate::output::{self, OutputFormat};

#[derive(clap::Args)]
pub struct DaemonArgs {
    #[command(subcommand)]
    pub command: DaemonCommand,
}

#[derive(Subcommand)]
pub enum DaemonCommand {
    /// Start the daemon in the background
    Start,
    /// Stop the daemon
    Stop,
    /// Show daemon status
    Status,
}

#[derive(Serialize)]
struct DaemonStatus {
    running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    uptime_secs: Option<u64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    runners: Vec<RunnerId>,
}

impl fmt::Display for DaemonStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.running {
            return write!(f, "Daemon not running");
        }
        writeln!(f, "Daemon running")?;
        if let Some(version) = &self.version {
            writeln!(f, "  Version: {}", version)?;
        }
        if let Some(uptime) = self.uptime_secs {
            writeln!(f, "  Uptime: {}s", uptime)?;
        }
        write!(f, "  Runners: {}", self.runners.len())?;
        for runner in &self.runners {
            write!(f, "\n    {}", runner)?;
        }
        Ok(())
    }
}

pub async fn handle(
    args: DaemonArgs,
    paths: &DaemonPaths,
    config_path: Option<&Path>,
    format: OutputFormat,
) -> Result<()> {
    match args.command {
        DaemonCommand::Start => {
            if DaemonClient::connect(&paths.socket_path).is_ok() {
                println!("Daemon already running");
                return Ok(());
            }
            let client = client::daemon_start(paths, config_path).await?;
            let version = client.hello().await?;
            println!("Daemon started ({})", version);
        }
        DaemonCommand::Stop => {
            if client::daemon_stop(paths).await? {
                println!("Daemon stopped");
            } else {
                println!("Daemon not running");
            }
        }
        DaemonCommand::Status => {
            let status = match DaemonClient::connect(&paths.socket_path) {
                Ok(client) => {
                    let version = client.hello().await?;
                    let (uptime_secs, runners) = client.status().await?;
                    DaemonStatus {
                        running: true,
                        version: Some(version),
                        uptime_secs: Some(uptime_secs),
                        runners,
                    }
                }
                Err(ClientError::DaemonNotRunning) => DaemonStatus {
                    running: false,
                    version: None,
                    uptime_secs: None,
                    runners: Vec::new(),
                },
                Err(e) => return Err(e.into()),
            };
            output::print(&status, format);
        }
    }
    Ok(())
}
