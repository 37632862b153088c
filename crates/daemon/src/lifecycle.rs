// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle management: startup, shutdown, recovery.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use fs2::FileExt;
use rungate_core::{SystemClock, UuidIdGen};
use rungate_engine::{EngineError, LocalLauncher, Registry};
use thiserror::Error;
use tokio::net::UnixListener;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::{ConfigError, DaemonConfig};
use crate::server::ServerContext;

pub type DaemonLauncher = LocalLauncher<UuidIdGen>;
pub type DaemonContext = ServerContext<SystemClock, DaemonLauncher>;

/// Resolved filesystem paths
#[derive(Debug, Clone)]
pub struct Config {
    /// Coordinator storage root
    pub state_dir: PathBuf,
    /// Path to Unix socket
    pub socket_path: PathBuf,
    /// Path to lock/PID file
    pub lock_path: PathBuf,
    /// Path to version file
    pub version_path: PathBuf,
    /// Path to daemon log file
    pub log_path: PathBuf,
}

impl Config {
    pub fn from_daemon_config(daemon: &DaemonConfig) -> Result<Self, LifecycleError> {
        let state_dir = daemon.state_dir()?;
        Ok(Self {
            socket_path: daemon.socket_path(),
            lock_path: state_dir.join("rungated.pid"),
            version_path: state_dir.join("rungated.version"),
            log_path: daemon.log_path()?,
            state_dir,
        })
    }
}

/// Daemon state during operation
pub struct DaemonState {
    pub config: Config,
    // NOTE(lifetime): Held to maintain exclusive file lock; released on drop
    #[allow(dead_code)]
    lock_file: File,
    pub listener: UnixListener,
    pub context: Arc<DaemonContext>,
    /// Flipped by a `Shutdown` request
    pub shutdown_rx: watch::Receiver<bool>,
}

impl DaemonState {
    /// Stop every coordinator, then remove the runtime files
    pub async fn shutdown(&mut self) -> Result<(), LifecycleError> {
        info!("Shutting down daemon...");

        // Pending acquires are answered with Canceled before the socket goes away
        self.context.registry.shutdown().await;

        for path in [
            &self.config.socket_path,
            &self.config.lock_path,
            &self.config.version_path,
        ] {
            if path.exists() {
                if let Err(e) = std::fs::remove_file(path) {
                    warn!("Failed to remove {}: {}", path.display(), e);
                }
            }
        }

        info!("Daemon shutdown complete");
        Ok(())
    }
}

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to acquire lock: daemon already running?")]
    LockFailed(#[source] std::io::Error),

    #[error("Failed to bind socket at {0}: {1}")]
    BindFailed(PathBuf, std::io::Error),

    #[error("Invalid log path: {0}")]
    InvalidLogPath(PathBuf),

    #[error("Recovery failed: {0}")]
    Recovery(#[from] EngineError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Start the daemon
pub async fn startup(daemon: &DaemonConfig, config: &Config) -> Result<DaemonState, LifecycleError> {
    match startup_inner(daemon, config).await {
        Ok(state) => Ok(state),
        // The files belong to the daemon holding the lock
        Err(e @ LifecycleError::LockFailed(_)) => Err(e),
        Err(e) => {
            cleanup_on_failure(config);
            Err(e)
        }
    }
}

async fn startup_inner(
    daemon: &DaemonConfig,
    config: &Config,
) -> Result<DaemonState, LifecycleError> {
    // 1. State directory holds the lock, so it comes first
    std::fs::create_dir_all(&config.state_dir)?;

    // 2. Acquire lock file before touching coordinator storage
    let mut lock_file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&config.lock_path)?;
    lock_file
        .try_lock_exclusive()
        .map_err(LifecycleError::LockFailed)?;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;

    // 3. Create directories
    if let Some(parent) = config.socket_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if let Some(parent) = config.log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    std::fs::write(&config.version_path, env!("CARGO_PKG_VERSION"))?;

    // 4. Recover every known runner BEFORE binding the socket
    let registry = Registry::start(
        daemon.registry_config()?,
        SystemClock,
        LocalLauncher::new(UuidIdGen),
    );
    let recovered = match registry.recover_all().await {
        Ok(recovered) => recovered,
        Err(e) => {
            registry.shutdown().await;
            return Err(e.into());
        }
    };
    info!(runners = recovered.len(), "Loaded coordinator state");

    // 5. Remove stale socket and bind (LAST - only after recovery succeeds)
    if config.socket_path.exists() {
        std::fs::remove_file(&config.socket_path)?;
    }
    let listener = match UnixListener::bind(&config.socket_path) {
        Ok(listener) => listener,
        Err(e) => {
            registry.shutdown().await;
            return Err(LifecycleError::BindFailed(config.socket_path.clone(), e));
        }
    };

    let (context, shutdown_rx) = ServerContext::new(registry);
    info!(
        socket = %config.socket_path.display(),
        state_dir = %config.state_dir.display(),
        "Daemon started"
    );

    Ok(DaemonState {
        config: config.clone(),
        lock_file,
        listener,
        context: Arc::new(context),
        shutdown_rx,
    })
}

/// Clean up resources on startup failure
fn cleanup_on_failure(config: &Config) {
    if config.socket_path.exists() {
        let _ = std::fs::remove_file(&config.socket_path);
    }
    if config.version_path.exists() {
        let _ = std::fs::remove_file(&config.version_path);
    }
    if config.lock_path.exists() {
        let _ = std::fs::remove_file(&config.lock_path);
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
