// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::time::Duration;

fn at() -> DateTime<Utc> {
    DateTime::from_timestamp(1_767_225_600, 0).unwrap()
}

#[test]
fn operations_are_tagged_by_name() {
    let op = Operation::Release {
        lease_id: LeaseId::new("lease-1"),
        at: at(),
    };

    let json: serde_json::Value = serde_json::to_value(&op).unwrap();
    assert_eq!(json["op"], "release");
    assert_eq!(json["lease_id"], "lease-1");
    assert_eq!(op.name(), "release");
}

#[test]
fn acquire_wait_timeout_is_human_readable() {
    let op = Operation::Acquire {
        request: AcquireRequest::new("req-1", "lease-1").with_wait_timeout(Duration::from_secs(90)),
        at: at(),
    };

    let json = serde_json::to_value(&op).unwrap();
    assert_eq!(json["request"]["wait_timeout"], "1m 30s");

    let parsed: Operation = serde_json::from_value(json).unwrap();
    assert_eq!(parsed, op);
}

#[test]
fn acquire_without_optional_fields_parses() {
    let json = r#"{"op":"acquire","request":{"request_id":"r","lease_id":"l"},"at":"2026-01-01T00:00:00Z"}"#;

    let op: Operation = serde_json::from_str(json).unwrap();
    match op {
        Operation::Acquire { request, .. } => {
            assert_eq!(request.wait_timeout, Duration::ZERO);
            assert!(request.owner_namespace.is_empty());
        }
        other => panic!("expected acquire, got {:?}", other),
    }
}

#[test]
fn run_outcome_failed_carries_message() {
    let op = Operation::RunFinished {
        ticket_id: TicketId::new("t-1"),
        outcome: RunOutcome::Failed {
            message: "follower runner-b: timed out".to_string(),
        },
        at: at(),
    };

    let json = serde_json::to_value(&op).unwrap();
    assert_eq!(json["outcome"]["kind"], "failed");
    assert_eq!(op.at(), at());
}
