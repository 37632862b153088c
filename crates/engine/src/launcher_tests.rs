// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::DateTime;
use rungate_core::{EnqueueRunRequest, RunStatus, SequentialIdGen};
use std::collections::BTreeSet;

fn ticket() -> RunTicketState {
    let enqueued_at = DateTime::from_timestamp(1_767_225_600, 0).unwrap();
    let request = EnqueueRunRequest::new("t-1", "team-a", "emu-a", enqueued_at)
        .with_followers([RunnerId::new("emu-b")]);
    RunTicketState {
        request,
        status: RunStatus::Starting,
        workflow_id: String::new(),
        run_id: String::new(),
        workflow_namespace: String::new(),
        granted_runner_ids: BTreeSet::new(),
        cancel_requested: false,
        error_message: String::new(),
        started_at: None,
        reserved: false,
    }
}

#[test]
fn launch_request_carries_ticket_fields() {
    let request = LaunchRequest::from(&ticket());
    assert_eq!(request.ticket_id, TicketId::new("t-1"));
    assert_eq!(request.leader_runner_id, RunnerId::new("emu-a"));
    assert_eq!(
        request.required_runner_ids,
        vec![RunnerId::new("emu-a"), RunnerId::new("emu-b")]
    );
}

#[tokio::test]
async fn local_launcher_uses_ticket_as_workflow() {
    let launcher = LocalLauncher::new(SequentialIdGen::new("run"));
    let launched = launcher
        .launch(LaunchRequest::from(&ticket()))
        .await
        .unwrap();

    assert_eq!(launched.workflow_id, "t-1");
    assert_eq!(launched.run_id, "run-1");
    assert_eq!(launched.workflow_namespace, "team-a");
}

#[tokio::test]
async fn fake_launcher_records_and_fails_on_demand() {
    let launcher = FakeLauncher::new();
    launcher
        .launch(LaunchRequest::from(&ticket()))
        .await
        .unwrap();
    launcher.fail_launches("no emulator image");
    let err = launcher
        .launch(LaunchRequest::from(&ticket()))
        .await
        .unwrap_err();

    assert_eq!(err, LaunchError("no emulator image".to_string()));
    assert_eq!(launcher.calls().len(), 2);
}
