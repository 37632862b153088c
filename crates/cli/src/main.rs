// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! rungate - runner semaphore and run scheduler CLI

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod client;
mod commands;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{daemon, lease, run};
use rungate_daemon::lifecycle::Config as DaemonPaths;
use rungate_daemon::DaemonConfig;

use crate::client::DaemonClient;
use crate::output::OutputFormat;

#[derive(Parser)]
#[command(
    name = "rungate",
    version,
    about = "rungate - shared runner leases and run scheduling"
)]
struct Cli {
    /// Daemon config file (defaults to $RUNGATE_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Daemon socket (overrides the config file)
    #[arg(long, global = true)]
    socket: Option<PathBuf>,

    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Wait for a slot on a runner
    Acquire(lease::AcquireArgs),
    /// Give a slot back
    Release(lease::ReleaseArgs),
    /// Show holders and queue of a runner
    State(lease::StateArgs),
    /// Run ticket management
    Run(run::RunArgs),
    /// Daemon management
    Daemon(daemon::DaemonArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging();
    let cli = Cli::parse();

    let mut daemon_config = DaemonConfig::load(cli.config.as_deref())?;
    if let Some(socket) = cli.socket {
        daemon_config.daemon.socket_path = Some(socket);
    }
    let paths = DaemonPaths::from_daemon_config(&daemon_config)?;

    // Daemon commands manage the process themselves
    if let Commands::Daemon(args) = cli.command {
        return daemon::handle(args, &paths, cli.config.as_deref(), cli.format).await;
    }

    let client = DaemonClient::connect_or_start(&paths, cli.config.as_deref()).await?;

    match cli.command {
        Commands::Acquire(args) => lease::acquire(&client, args, cli.format).await?,
        Commands::Release(args) => lease::release(&client, args, cli.format).await?,
        Commands::State(args) => lease::state(&client, args, cli.format).await?,
        Commands::Run(args) => run::handle(&client, args.command, cli.format).await?,
        Commands::Daemon(_) => unreachable!(),
    }

    Ok(())
}

fn setup_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}
