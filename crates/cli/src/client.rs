// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon client for CLI commands

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};

use rungate_core::{
    AcquireRequest, CoordinatorError, EnqueueRunRequest, EnqueueRunResponse, LeaseId, Permit,
    RunStatusView, RunnerId, SemaphoreStateView, TicketId,
};
use rungate_daemon::lifecycle::Config as DaemonPaths;
use rungate_daemon::protocol::{self, ProtocolError};
use rungate_daemon::{Request, Response};
use thiserror::Error;
use tokio::net::UnixStream;

// Timeout configuration (env vars in milliseconds)
fn parse_duration_ms(var: &str) -> Option<Duration> {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
}

/// Timeout for IPC requests that answer immediately
pub fn timeout_ipc() -> Duration {
    parse_duration_ms("RUNGATE_TIMEOUT_IPC_MS").unwrap_or(Duration::from_secs(5))
}

/// Timeout for waiting for daemon to start
pub fn timeout_connect() -> Duration {
    parse_duration_ms("RUNGATE_TIMEOUT_CONNECT_MS").unwrap_or(Duration::from_secs(5))
}

/// Timeout for waiting for process to exit
pub fn timeout_exit() -> Duration {
    parse_duration_ms("RUNGATE_TIMEOUT_EXIT_MS").unwrap_or(Duration::from_secs(2))
}

/// Polling interval for retries
pub fn poll_interval() -> Duration {
    parse_duration_ms("RUNGATE_POLL_INTERVAL_MS").unwrap_or(Duration::from_millis(50))
}

/// Client errors
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Daemon not running")]
    DaemonNotRunning,

    #[error("Failed to start daemon: {0}")]
    DaemonStartFailed(String),

    #[error("Connection timeout waiting for daemon to start")]
    DaemonStartTimeout,

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Rejected(CoordinatorError),

    #[error("Unexpected response from daemon")]
    UnexpectedResponse,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn unexpected(response: Response) -> ClientError {
    match response {
        Response::Error { error } => ClientError::Rejected(error),
        _ => ClientError::UnexpectedResponse,
    }
}

/// Daemon client
pub struct DaemonClient {
    socket_path: PathBuf,
}

impl DaemonClient {
    /// Connect to daemon, auto-starting if not running.
    ///
    /// `config_path` is handed to a freshly started daemon.
    pub async fn connect_or_start(
        paths: &DaemonPaths,
        config_path: Option<&Path>,
    ) -> Result<Self, ClientError> {
        // Restart a daemon left over from another version
        if let Ok(daemon_version) = std::fs::read_to_string(&paths.version_path) {
            if daemon_version.trim() != env!("CARGO_PKG_VERSION") {
                daemon_stop(paths).await?;
            }
        }

        match Self::connect(&paths.socket_path) {
            Ok(client) => Ok(client),
            Err(ClientError::DaemonNotRunning) => {
                tracing::info!(socket = %paths.socket_path.display(), "daemon not running, starting it");
                let child = start_daemon_background(config_path)?;
                Self::connect_with_retry(paths, timeout_connect(), child).await
            }
            Err(e) => Err(wrap_with_startup_error(e, &paths.log_path)),
        }
    }

    /// Connect to existing daemon (no auto-start)
    pub fn connect(socket_path: &Path) -> Result<Self, ClientError> {
        if !socket_path.exists() {
            return Err(ClientError::DaemonNotRunning);
        }
        Ok(Self {
            socket_path: socket_path.to_path_buf(),
        })
    }

    async fn connect_with_retry(
        paths: &DaemonPaths,
        timeout: Duration,
        mut child: std::process::Child,
    ) -> Result<Self, ClientError> {
        let start = Instant::now();
        while start.elapsed() < timeout {
            // Early exit means startup failed; the reason is in the log
            if let Ok(Some(status)) = child.try_wait() {
                return Err(startup_failure(&paths.log_path, status).await);
            }

            match Self::connect(&paths.socket_path) {
                Ok(client) => return Ok(client),
                Err(ClientError::DaemonNotRunning) => {
                    tokio::time::sleep(poll_interval()).await;
                }
                Err(e) => return Err(wrap_with_startup_error(e, &paths.log_path)),
            }
        }

        Err(wrap_with_startup_error(
            ClientError::DaemonStartTimeout,
            &paths.log_path,
        ))
    }

    /// Send a request and receive a response.
    ///
    /// `read_timeout` of `None` waits for the daemon indefinitely.
    async fn send_with_timeout(
        &self,
        request: Request,
        read_timeout: Option<Duration>,
        write_timeout: Duration,
    ) -> Result<Response, ClientError> {
        let stream = UnixStream::connect(&self.socket_path).await?;
        let (mut reader, mut writer) = stream.into_split();

        let data = protocol::encode(&request)?;
        tokio::time::timeout(write_timeout, protocol::write_message(&mut writer, &data))
            .await
            .map_err(|_| ProtocolError::Timeout)??;

        let response_bytes = match read_timeout {
            Some(timeout) => tokio::time::timeout(timeout, protocol::read_message(&mut reader))
                .await
                .map_err(|_| ProtocolError::Timeout)??,
            None => protocol::read_message(&mut reader).await?,
        };

        Ok(protocol::decode(&response_bytes)?)
    }

    /// Send a request and receive a response
    pub async fn send(&self, request: Request) -> Result<Response, ClientError> {
        self.send_with_timeout(request, Some(timeout_ipc()), timeout_ipc())
            .await
    }

    /// Get daemon version via Hello handshake
    pub async fn hello(&self) -> Result<String, ClientError> {
        match self
            .send(Request::Hello {
                version: env!("CARGO_PKG_VERSION").to_string(),
            })
            .await?
        {
            Response::Hello { version } => Ok(version),
            other => Err(unexpected(other)),
        }
    }

    /// Uptime and live runners
    pub async fn status(&self) -> Result<(u64, Vec<RunnerId>), ClientError> {
        match self.send(Request::Status).await? {
            Response::Status {
                uptime_secs,
                runners,
            } => Ok((uptime_secs, runners)),
            other => Err(unexpected(other)),
        }
    }

    /// Request daemon shutdown
    pub async fn shutdown(&self) -> Result<(), ClientError> {
        match self.send(Request::Shutdown).await? {
            Response::Ok | Response::ShuttingDown => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    /// Wait for a slot. Zero `wait_timeout` waits until granted.
    pub async fn acquire(
        &self,
        runner_id: RunnerId,
        request: AcquireRequest,
    ) -> Result<Permit, ClientError> {
        // The daemon enforces the wait timeout; allow it time to answer
        let read_timeout = (!request.wait_timeout.is_zero())
            .then(|| request.wait_timeout + timeout_ipc());
        match self
            .send_with_timeout(
                Request::Acquire { runner_id, request },
                read_timeout,
                timeout_ipc(),
            )
            .await?
        {
            Response::Permit { permit } => Ok(permit),
            other => Err(unexpected(other)),
        }
    }

    pub async fn release(&self, runner_id: RunnerId, lease_id: LeaseId) -> Result<bool, ClientError> {
        match self
            .send(Request::Release {
                runner_id,
                lease_id,
            })
            .await?
        {
            Response::Released { released } => Ok(released),
            other => Err(unexpected(other)),
        }
    }

    pub async fn state(&self, runner_id: RunnerId) -> Result<SemaphoreStateView, ClientError> {
        match self.send(Request::GetState { runner_id }).await? {
            Response::State { state } => Ok(state),
            other => Err(unexpected(other)),
        }
    }

    pub async fn enqueue_run(
        &self,
        request: EnqueueRunRequest,
    ) -> Result<EnqueueRunResponse, ClientError> {
        match self.send(Request::EnqueueRun { request }).await? {
            Response::Enqueued { response } => Ok(response),
            other => Err(unexpected(other)),
        }
    }

    pub async fn cancel_run(
        &self,
        runner_id: RunnerId,
        ticket_id: TicketId,
        owner_namespace: String,
    ) -> Result<RunStatusView, ClientError> {
        let request = Request::CancelRun {
            runner_id,
            ticket_id,
            owner_namespace,
        };
        self.run_view(request).await
    }

    pub async fn run_done(
        &self,
        runner_id: RunnerId,
        ticket_id: TicketId,
        owner_namespace: String,
    ) -> Result<RunStatusView, ClientError> {
        let request = Request::RunDone {
            runner_id,
            ticket_id,
            owner_namespace,
        };
        self.run_view(request).await
    }

    pub async fn run_status(
        &self,
        runner_id: RunnerId,
        owner_namespace: String,
        ticket_id: TicketId,
    ) -> Result<RunStatusView, ClientError> {
        let request = Request::GetRunStatus {
            runner_id,
            owner_namespace,
            ticket_id,
        };
        self.run_view(request).await
    }

    pub async fn list_queued_runs(
        &self,
        runner_id: RunnerId,
        owner_namespace: String,
    ) -> Result<Vec<RunStatusView>, ClientError> {
        match self
            .send(Request::ListQueuedRuns {
                runner_id,
                owner_namespace,
            })
            .await?
        {
            Response::Runs { runs } => Ok(runs),
            other => Err(unexpected(other)),
        }
    }

    async fn run_view(&self, request: Request) -> Result<RunStatusView, ClientError> {
        match self.send(request).await? {
            Response::Run { view } => Ok(view),
            other => Err(unexpected(other)),
        }
    }
}

/// Wait briefly for the exited daemon's error to reach its log
async fn startup_failure(log_path: &Path, status: std::process::ExitStatus) -> ClientError {
    let deadline = Instant::now() + timeout_exit();
    loop {
        if let Some(err) = read_startup_error(log_path) {
            return ClientError::DaemonStartFailed(err);
        }
        if Instant::now() >= deadline {
            return ClientError::DaemonStartFailed(format!("exited with {}", status));
        }
        tokio::time::sleep(poll_interval()).await;
    }
}

/// Start the daemon in the background, returning the child process handle
fn start_daemon_background(config_path: Option<&Path>) -> Result<std::process::Child, ClientError> {
    let binary = find_daemon_binary();
    tracing::debug!(binary = %binary.display(), "starting daemon");
    let mut command = Command::new(&binary);
    if let Some(path) = config_path {
        command.arg(path);
    }
    command
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
        .map_err(|e| ClientError::DaemonStartFailed(e.to_string()))
}

/// Start the daemon and wait until it accepts connections
pub async fn daemon_start(
    paths: &DaemonPaths,
    config_path: Option<&Path>,
) -> Result<DaemonClient, ClientError> {
    let child = start_daemon_background(config_path)?;
    DaemonClient::connect_with_retry(paths, timeout_connect(), child).await
}

/// Stop the daemon (graceful first, then forceful)
/// Returns true if daemon was stopped, false if it wasn't running
pub async fn daemon_stop(paths: &DaemonPaths) -> Result<bool, ClientError> {
    let client = match DaemonClient::connect(&paths.socket_path) {
        Ok(c) => c,
        Err(ClientError::DaemonNotRunning) => return Ok(false),
        Err(e) => return Err(e),
    };

    let shutdown_result = client.shutdown().await;

    if let Some(pid) = read_daemon_pid(&paths.lock_path) {
        if shutdown_result.is_ok() {
            wait_for_exit(pid, timeout_exit()).await;
        }
        if process_exists(pid) {
            force_kill_daemon(pid);
            wait_for_exit(pid, timeout_exit()).await;
        }
    }

    // A killed daemon leaves its files behind
    for path in [&paths.socket_path, &paths.version_path] {
        if path.exists() {
            let _ = std::fs::remove_file(path);
        }
    }

    Ok(true)
}

/// Wait for a process to exit
async fn wait_for_exit(pid: u32, timeout: Duration) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if !process_exists(pid) {
            return true;
        }
        tokio::time::sleep(poll_interval()).await;
    }
    false
}

/// Find the rungated binary
fn find_daemon_binary() -> PathBuf {
    // Explicit override (used by tests to ensure correct binary)
    if let Ok(path) = std::env::var("RUNGATE_DAEMON_BINARY") {
        return PathBuf::from(path);
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let sibling = dir.join("rungated");
            if sibling.exists() {
                return sibling;
            }
        }
    }

    PathBuf::from("rungated")
}

/// Get the PID from the daemon PID file, if it exists
pub fn read_daemon_pid(pid_path: &Path) -> Option<u32> {
    std::fs::read_to_string(pid_path)
        .ok()
        .and_then(|content| content.trim().parse::<u32>().ok())
}

/// Send `signal` to `pid` through kill(1); true if delivered
fn kill(pid: u32, signal: &str) -> bool {
    Command::new("kill")
        .arg(signal)
        .arg(pid.to_string())
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .is_ok_and(|status| status.success())
}

/// Signal 0 probes for the process without touching it
pub fn process_exists(pid: u32) -> bool {
    kill(pid, "-0")
}

pub fn force_kill_daemon(pid: u32) -> bool {
    kill(pid, "-9")
}

/// Startup marker prefix that the daemon writes to its log before anything else.
/// Full format: "--- rungated: starting (pid: 12345) ---"
const STARTUP_MARKER_PREFIX: &str = "--- rungated: starting (pid: ";

/// Error lines logged since the most recent startup marker.
///
/// Tracing lines look like `timestamp LEVEL target: message`; only the
/// message part is kept.
pub fn read_startup_error(log_path: &Path) -> Option<String> {
    let content = std::fs::read_to_string(log_path).ok()?;
    let attempt = &content[content.rfind(STARTUP_MARKER_PREFIX)?..];

    let messages: Vec<&str> = attempt
        .lines()
        .filter(|line| line.contains(" ERROR ") || line.contains("Failed to start"))
        .map(|line| line.split_once(": ").map_or(line, |(_, message)| message))
        .collect();

    (!messages.is_empty()).then(|| messages.join("\n"))
}

/// Replace `err` with the daemon's startup error when the log has one
fn wrap_with_startup_error(err: ClientError, log_path: &Path) -> ClientError {
    if matches!(err, ClientError::DaemonStartFailed(_)) {
        return err;
    }

    match read_startup_error(log_path) {
        Some(startup_error) => ClientError::DaemonStartFailed(startup_error),
        None => err,
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
