// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CLI integration tests that need no running daemon

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(deprecated)]

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// `rungate` with socket and state isolated in `dir`
fn rungate(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("rungate").unwrap();
    cmd.env_remove("RUNGATE_CONFIG")
        .env("RUNGATE_SOCKET", dir.path().join("rungated.sock"))
        .env("RUNGATE_STATE_DIR", dir.path().join("state"))
        // Auto-start must fail fast and visibly
        .env("RUNGATE_DAEMON_BINARY", dir.path().join("no-such-rungated"))
        .env("RUNGATE_TIMEOUT_CONNECT_MS", "500");
    cmd
}

#[test]
fn help_lists_commands() {
    Command::cargo_bin("rungate")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("acquire"))
        .stdout(predicate::str::contains("release"))
        .stdout(predicate::str::contains("state"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("daemon"));
}

#[test]
fn run_help_lists_ticket_commands() {
    Command::cargo_bin("rungate")
        .unwrap()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("enqueue"))
        .stdout(predicate::str::contains("cancel"))
        .stdout(predicate::str::contains("done"))
        .stdout(predicate::str::contains("status"))
        .stdout(predicate::str::contains("list"));
}

#[test]
fn daemon_status_when_not_running() {
    let dir = TempDir::new().unwrap();
    rungate(&dir)
        .args(["daemon", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Daemon not running"));
}

#[test]
fn daemon_status_json_when_not_running() {
    let dir = TempDir::new().unwrap();
    rungate(&dir)
        .args(["--format", "json", "daemon", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"running\": false"));
}

#[test]
fn daemon_stop_when_not_running() {
    let dir = TempDir::new().unwrap();
    rungate(&dir)
        .args(["daemon", "stop"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Daemon not running"));
}

#[test]
fn acquire_fails_when_daemon_cannot_start() {
    let dir = TempDir::new().unwrap();
    rungate(&dir)
        .args(["acquire", "emu-a", "job-1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to start daemon"));
}

#[test]
fn acquire_rejects_bad_timeout() {
    let dir = TempDir::new().unwrap();
    rungate(&dir)
        .args(["acquire", "emu-a", "job-1", "--timeout", "soon"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--timeout"));
}

#[test]
fn enqueue_requires_namespace() {
    let dir = TempDir::new().unwrap();
    rungate(&dir)
        .args(["run", "enqueue", "emu-a", "t-1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--namespace"));
}
