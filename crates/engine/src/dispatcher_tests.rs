// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::actor::CoordinatorHandle;
use crate::launcher::{FakeLauncher, LauncherCall};
use crate::registry::RegistryConfig;
use rungate_core::{CoordinatorConfig, EnqueueRunRequest, RunStatusView, SystemClock};
use std::path::Path;
use std::time::Duration;

type TestRegistry = Arc<Registry<SystemClock, FakeLauncher>>;

fn registry(dir: &Path, launcher: FakeLauncher) -> TestRegistry {
    registry_with_timeout(dir, launcher, Duration::from_millis(50))
}

fn registry_with_timeout(dir: &Path, launcher: FakeLauncher, timeout: Duration) -> TestRegistry {
    let config = RegistryConfig::new(dir)
        .with_defaults(CoordinatorConfig::with_capacity(1))
        .with_follower_grant_timeout(timeout);
    Registry::start(config, SystemClock, launcher)
}

fn ticket(id: &str, followers: &[&str]) -> EnqueueRunRequest {
    hosted_ticket(id, "emu-a", followers)
}

fn hosted_ticket(id: &str, host: &str, followers: &[&str]) -> EnqueueRunRequest {
    EnqueueRunRequest::new(id, "team-a", host, chrono::Utc::now())
        .with_followers(followers.iter().map(|f| RunnerId::new(*f)))
}

async fn wait_for_status(
    handle: &CoordinatorHandle,
    ticket_id: &str,
    status: RunStatus,
) -> RunStatusView {
    for _ in 0..500 {
        let view = handle
            .run_status("team-a", ticket_id.into())
            .await
            .unwrap();
        if view.status == status {
            return view;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("ticket {} never reached {}", ticket_id, status);
}

async fn wait_for_holders(handle: &CoordinatorHandle, count: usize) {
    for _ in 0..500 {
        if handle.state().await.unwrap().holders.len() == count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("runner {} never reached {} holders", handle.runner_id(), count);
}

#[tokio::test]
async fn single_runner_ticket_is_launched() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = FakeLauncher::new();
    let registry = registry(dir.path(), launcher.clone());
    let host = registry.coordinator(&"emu-a".into()).await.unwrap();

    host.enqueue_run(ticket("t-1", &[])).await.unwrap();
    let view = wait_for_status(&host, "t-1", RunStatus::Running).await;

    assert_eq!(view.workflow_id, "wf-t-1");
    assert_eq!(
        launcher.calls(),
        vec![LauncherCall::Launch {
            ticket_id: "t-1".into()
        }]
    );
}

#[tokio::test]
async fn follower_leases_are_held_while_running_and_released_on_cancel() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = FakeLauncher::new();
    let registry = registry(dir.path(), launcher.clone());
    let host = registry.coordinator(&"emu-a".into()).await.unwrap();

    host.enqueue_run(ticket("t-1", &["emu-c", "emu-b"]))
        .await
        .unwrap();
    wait_for_status(&host, "t-1", RunStatus::Running).await;

    for follower in ["emu-b", "emu-c"] {
        let handle = registry.coordinator(&follower.into()).await.unwrap();
        let state = handle.state().await.unwrap();
        assert_eq!(
            state.current_holder.map(|h| h.lease_id),
            Some(LeaseId::new("run/t-1"))
        );
    }

    let view = host.cancel_run("t-1".into(), "team-a").await.unwrap();
    assert!(view.cancel_requested);
    wait_for_status(&host, "t-1", RunStatus::Canceled).await;

    for follower in ["emu-b", "emu-c"] {
        let handle = registry.coordinator(&follower.into()).await.unwrap();
        wait_for_holders(&handle, 0).await;
    }
    assert!(launcher
        .calls()
        .iter()
        .any(|call| matches!(call, LauncherCall::Cancel { .. })));
}

#[tokio::test]
async fn busy_follower_fails_the_ticket() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry(dir.path(), FakeLauncher::new());
    let follower = registry.coordinator(&"emu-b".into()).await.unwrap();
    follower
        .acquire(AcquireRequest::new("other", "other-lease"))
        .await
        .unwrap();
    let host = registry.coordinator(&"emu-a".into()).await.unwrap();

    host.enqueue_run(ticket("t-1", &["emu-b"])).await.unwrap();
    let view = wait_for_status(&host, "t-1", RunStatus::Failed).await;

    assert!(
        view.error_message.contains("follower emu-b"),
        "{}",
        view.error_message
    );
}

#[tokio::test]
async fn launch_failure_fails_the_ticket_and_frees_the_slot() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = FakeLauncher::new();
    launcher.fail_launches("no emulator image");
    let registry = registry(dir.path(), launcher);
    let host = registry.coordinator(&"emu-a".into()).await.unwrap();

    host.enqueue_run(ticket("t-1", &[])).await.unwrap();
    host.enqueue_run(ticket("t-2", &[])).await.unwrap();
    let view = wait_for_status(&host, "t-1", RunStatus::Failed).await;

    assert_eq!(view.error_message, "launch failed: no emulator image");
    wait_for_status(&host, "t-2", RunStatus::Failed).await;
}

#[tokio::test]
async fn run_done_releases_follower_leases() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry(dir.path(), FakeLauncher::new());
    let host = registry.coordinator(&"emu-a".into()).await.unwrap();

    host.enqueue_run(ticket("t-1", &["emu-b"])).await.unwrap();
    wait_for_status(&host, "t-1", RunStatus::Running).await;
    let follower = registry.coordinator(&"emu-b".into()).await.unwrap();
    wait_for_holders(&follower, 1).await;

    let view = host.run_done("t-1".into(), "team-a").await.unwrap();
    assert_eq!(view.status, RunStatus::NotFound);
    wait_for_holders(&follower, 0).await;
}

#[tokio::test]
async fn running_ticket_holds_its_host_slot() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry(dir.path(), FakeLauncher::new());
    let host = registry.coordinator(&"emu-a".into()).await.unwrap();

    host.enqueue_run(ticket("t-1", &[])).await.unwrap();
    wait_for_status(&host, "t-1", RunStatus::Running).await;

    let err = host
        .acquire(AcquireRequest::new("r-1", "l-1").with_wait_timeout(Duration::from_millis(20)))
        .await
        .unwrap_err();
    assert!(matches!(err, CoordinatorError::Timeout { .. }));

    host.run_done("t-1".into(), "team-a").await.unwrap();
    let permit = host.acquire(AcquireRequest::new("r-2", "l-2")).await.unwrap();
    assert_eq!(permit.lease_id, LeaseId::new("l-2"));
}

#[tokio::test]
async fn lower_follower_is_leased_before_the_host_slot() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry(dir.path(), FakeLauncher::new());
    let host = registry.coordinator(&"emu-b".into()).await.unwrap();
    let lower = registry.coordinator(&"emu-a".into()).await.unwrap();

    host.enqueue_run(hosted_ticket("t-1", "emu-b", &["emu-a"]))
        .await
        .unwrap();
    wait_for_status(&host, "t-1", RunStatus::Running).await;

    for handle in [&host, &lower] {
        let state = handle.state().await.unwrap();
        assert_eq!(
            state.current_holder.map(|h| h.lease_id),
            Some(LeaseId::new("run/t-1"))
        );
    }
}

#[tokio::test]
async fn crossing_tickets_run_one_after_another() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry_with_timeout(dir.path(), FakeLauncher::new(), Duration::from_secs(10));
    let emu_a = registry.coordinator(&"emu-a".into()).await.unwrap();
    let emu_b = registry.coordinator(&"emu-b".into()).await.unwrap();

    emu_a
        .enqueue_run(hosted_ticket("t-1", "emu-a", &["emu-b"]))
        .await
        .unwrap();
    emu_b
        .enqueue_run(hosted_ticket("t-2", "emu-b", &["emu-a"]))
        .await
        .unwrap();

    // Exactly one of them gets both runners; the other waits in line
    let mut attempts = 0;
    let (first, first_host, second, second_host) = loop {
        attempts += 1;
        assert!(attempts < 1000, "neither crossing ticket started");
        let one = emu_a.run_status("team-a", "t-1".into()).await.unwrap();
        let two = emu_b.run_status("team-a", "t-2".into()).await.unwrap();
        if one.status == RunStatus::Running {
            assert_ne!(two.status, RunStatus::Running);
            break ("t-1", &emu_a, "t-2", &emu_b);
        }
        if two.status == RunStatus::Running {
            assert_ne!(one.status, RunStatus::Running);
            break ("t-2", &emu_b, "t-1", &emu_a);
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    };

    first_host.run_done(first.into(), "team-a").await.unwrap();
    wait_for_status(second_host, second, RunStatus::Running).await;
}
