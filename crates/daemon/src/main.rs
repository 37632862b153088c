// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! rungate daemon (rungated)
//!
//! Background process that owns every runner's coordinator and serves the
//! CLI over a Unix socket.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use std::path::PathBuf;
use std::sync::Arc;

use rungate_daemon::lifecycle::{self, Config, LifecycleError};
use rungate_daemon::server;
use rungate_daemon::DaemonConfig;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // First argument overrides RUNGATE_CONFIG
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let daemon_config = DaemonConfig::load(config_path.as_deref())?;
    let config = Config::from_daemon_config(&daemon_config)?;

    // Write startup marker to log (before tracing setup, so CLI can find it)
    write_startup_marker(&config)?;

    let log_guard = setup_logging(&config)?;

    info!("Starting rungated, state in {}", config.state_dir.display());

    let mut daemon = match lifecycle::startup(&daemon_config, &config).await {
        Ok(d) => d,
        Err(e) => {
            // Tracing is non-blocking and may not flush before exit
            let _ = append_log_line(&config, &format!("ERROR Failed to start daemon: {}", e));
            error!("Failed to start daemon: {}", e);
            drop(log_guard);
            return Err(e.into());
        }
    };

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut shutdown_rx = daemon.shutdown_rx.clone();

    info!(
        "Daemon ready, listening on {}",
        config.socket_path.display()
    );

    // Signal ready for parent process (e.g., systemd, CLI waiting for startup)
    println!("READY");

    loop {
        tokio::select! {
            result = daemon.listener.accept() => {
                match result {
                    Ok((stream, _)) => {
                        let ctx = Arc::clone(&daemon.context);
                        tokio::spawn(async move {
                            if let Err(e) = server::handle_connection(ctx, stream).await {
                                error!("Error handling connection: {}", e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                    }
                }
            }

            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    info!("Shutdown requested via IPC, shutting down...");
                    daemon.shutdown().await?;
                    break;
                }
            }

            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down...");
                daemon.shutdown().await?;
                break;
            }

            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down...");
                daemon.shutdown().await?;
                break;
            }
        }
    }

    info!("Daemon stopped");
    Ok(())
}

/// Prefix of the line that opens each startup attempt in the log; the CLI
/// reads startup errors from the last one.
/// Full format: "--- rungated: starting (pid: 12345) ---"
pub const STARTUP_MARKER_PREFIX: &str = "--- rungated: starting (pid: ";

/// Append one raw line to the log file, outside of tracing
fn append_log_line(config: &Config, line: &str) -> std::io::Result<()> {
    use std::io::Write;

    if let Some(parent) = config.log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_path)?;
    writeln!(file, "{}", line)
}

fn write_startup_marker(config: &Config) -> std::io::Result<()> {
    append_log_line(
        config,
        &format!("{}{}) ---", STARTUP_MARKER_PREFIX, std::process::id()),
    )
}

fn setup_logging(
    config: &Config,
) -> Result<tracing_appender::non_blocking::WorkerGuard, LifecycleError> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let invalid = || LifecycleError::InvalidLogPath(config.log_path.clone());
    let file_appender = tracing_appender::rolling::never(
        config.log_path.parent().ok_or_else(invalid)?,
        config.log_path.file_name().ok_or_else(invalid)?,
    );
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    Ok(guard)
}
