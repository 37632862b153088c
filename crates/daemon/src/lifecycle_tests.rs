// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::config::DaemonSection;

fn daemon_config(dir: &std::path::Path) -> DaemonConfig {
    DaemonConfig {
        daemon: DaemonSection {
            socket_path: Some(dir.join("rungated.sock")),
            state_dir: Some(dir.join("state")),
            log_path: None,
        },
        ..DaemonConfig::default()
    }
}

#[test]
fn paths_derive_from_state_dir() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::from_daemon_config(&daemon_config(dir.path())).unwrap();

    assert_eq!(config.lock_path, dir.path().join("state/rungated.pid"));
    assert_eq!(config.version_path, dir.path().join("state/rungated.version"));
    assert_eq!(config.log_path, dir.path().join("state/rungated.log"));
}

#[tokio::test]
async fn startup_writes_runtime_files_and_shutdown_removes_them() {
    let dir = tempfile::tempdir().unwrap();
    let daemon = daemon_config(dir.path());
    let config = Config::from_daemon_config(&daemon).unwrap();

    let mut state = startup(&daemon, &config).await.unwrap();
    assert!(config.socket_path.exists());
    let pid = std::fs::read_to_string(&config.lock_path).unwrap();
    assert_eq!(pid.trim(), std::process::id().to_string());
    assert!(config.version_path.exists());

    state.shutdown().await.unwrap();
    assert!(!config.socket_path.exists());
    assert!(!config.lock_path.exists());
    assert!(!config.version_path.exists());
}

#[tokio::test]
async fn second_startup_fails_on_lock_and_leaves_files() {
    let dir = tempfile::tempdir().unwrap();
    let daemon = daemon_config(dir.path());
    let config = Config::from_daemon_config(&daemon).unwrap();

    let mut first = startup(&daemon, &config).await.unwrap();
    let err = startup(&daemon, &config).await.err().unwrap();
    assert!(matches!(err, LifecycleError::LockFailed(_)));
    assert!(config.socket_path.exists());
    assert!(config.lock_path.exists());

    first.shutdown().await.unwrap();
}

#[tokio::test]
async fn startup_recovers_stored_runners() {
    let dir = tempfile::tempdir().unwrap();
    let daemon = daemon_config(dir.path());
    let config = Config::from_daemon_config(&daemon).unwrap();

    let mut first = startup(&daemon, &config).await.unwrap();
    first
        .context
        .registry
        .coordinator(&"emu-a".into())
        .await
        .unwrap();
    first.shutdown().await.unwrap();
    drop(first);

    let mut second = startup(&daemon, &config).await.unwrap();
    assert_eq!(
        second.context.registry.runners().await,
        vec![rungate_core::RunnerId::new("emu-a")]
    );
    second.shutdown().await.unwrap();
}
