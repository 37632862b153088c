// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::Utc;
use rungate_core::{
    AcquireRequest, CoordinatorConfig, EnqueueRunRequest, LeaseId, SystemClock, TicketId,
};
use rungate_engine::{FakeLauncher, RegistryConfig};
use std::time::Duration;

type TestContext = ServerContext<SystemClock, FakeLauncher>;

fn context(dir: &std::path::Path) -> (Arc<TestContext>, watch::Receiver<bool>) {
    let config = RegistryConfig::new(dir).with_defaults(CoordinatorConfig::with_capacity(1));
    let registry = Registry::start(config, SystemClock, FakeLauncher::new());
    let (ctx, rx) = ServerContext::new(registry);
    (Arc::new(ctx), rx)
}

fn acquire(request_id: &str, lease_id: &str) -> Request {
    Request::Acquire {
        runner_id: "emu-a".into(),
        request: AcquireRequest::new(request_id, lease_id),
    }
}

#[tokio::test]
async fn ping_and_hello() {
    let dir = tempfile::tempdir().unwrap();
    let (ctx, _rx) = context(dir.path());

    assert_eq!(handle_request(&ctx, Request::Ping).await, Response::Pong);
    let hello = handle_request(
        &ctx,
        Request::Hello {
            version: "0.0.0".to_string(),
        },
    )
    .await;
    assert_eq!(
        hello,
        Response::Hello {
            version: PROTOCOL_VERSION.to_string()
        }
    );
}

#[tokio::test]
async fn acquire_state_release() {
    let dir = tempfile::tempdir().unwrap();
    let (ctx, _rx) = context(dir.path());

    let Response::Permit { permit } = handle_request(&ctx, acquire("r1", "l1")).await else {
        panic!("expected permit");
    };
    assert_eq!(permit.lease_id, LeaseId::new("l1"));

    let Response::State { state } = handle_request(
        &ctx,
        Request::GetState {
            runner_id: "emu-a".into(),
        },
    )
    .await
    else {
        panic!("expected state");
    };
    assert_eq!(state.holders.len(), 1);

    let released = handle_request(
        &ctx,
        Request::Release {
            runner_id: "emu-a".into(),
            lease_id: "l1".into(),
        },
    )
    .await;
    assert_eq!(released, Response::Released { released: true });

    let Response::Status { runners, .. } = handle_request(&ctx, Request::Status).await else {
        panic!("expected status");
    };
    assert_eq!(runners, vec![RunnerId::new("emu-a")]);
}

#[tokio::test]
async fn acquire_timeout_is_reported_as_error() {
    let dir = tempfile::tempdir().unwrap();
    let (ctx, _rx) = context(dir.path());

    handle_request(&ctx, acquire("r1", "l1")).await;
    let mut request = AcquireRequest::new("r2", "l2");
    request.wait_timeout = Duration::from_millis(20);
    let response = handle_request(
        &ctx,
        Request::Acquire {
            runner_id: "emu-a".into(),
            request,
        },
    )
    .await;

    assert!(matches!(
        response,
        Response::Error {
            error: CoordinatorError::Timeout { .. }
        }
    ));
}

#[tokio::test]
async fn blank_runner_is_invalid() {
    let dir = tempfile::tempdir().unwrap();
    let (ctx, _rx) = context(dir.path());

    let response = handle_request(
        &ctx,
        Request::GetState {
            runner_id: "".into(),
        },
    )
    .await;
    assert!(matches!(
        response,
        Response::Error {
            error: CoordinatorError::InvalidRequest { .. }
        }
    ));
}

#[tokio::test]
async fn enqueue_and_query_run() {
    let dir = tempfile::tempdir().unwrap();
    let (ctx, _rx) = context(dir.path());

    let request = EnqueueRunRequest::new("t-1", "team-a", "emu-a", Utc::now());
    let Response::Enqueued { response } =
        handle_request(&ctx, Request::EnqueueRun { request }).await
    else {
        panic!("expected enqueued");
    };
    assert_eq!(response.ticket_id, TicketId::new("t-1"));

    let Response::Run { view } = handle_request(
        &ctx,
        Request::GetRunStatus {
            runner_id: "emu-a".into(),
            owner_namespace: "team-a".to_string(),
            ticket_id: "t-1".into(),
        },
    )
    .await
    else {
        panic!("expected run");
    };
    assert_eq!(view.ticket_id, TicketId::new("t-1"));
}

#[tokio::test]
async fn shutdown_request_flips_watch() {
    let dir = tempfile::tempdir().unwrap();
    let (ctx, mut rx) = context(dir.path());

    assert_eq!(
        handle_request(&ctx, Request::Shutdown).await,
        Response::ShuttingDown
    );
    rx.changed().await.unwrap();
    assert!(*rx.borrow());
    assert!(ctx.shutdown_requested());
}

#[tokio::test]
async fn connection_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let (ctx, _rx) = context(dir.path());
    let (client, server) = UnixStream::pair().unwrap();

    let task = tokio::spawn(handle_connection(Arc::clone(&ctx), server));
    let (mut reader, mut writer) = client.into_split();
    let bytes = protocol::encode(&Request::Ping).unwrap();
    protocol::write_message(&mut writer, &bytes).await.unwrap();
    let reply = protocol::read_message(&mut reader).await.unwrap();

    assert_eq!(protocol::decode::<Response>(&reply).unwrap(), Response::Pong);
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn connection_closed_before_request_is_ok() {
    let dir = tempfile::tempdir().unwrap();
    let (ctx, _rx) = context(dir.path());
    let (client, server) = UnixStream::pair().unwrap();
    drop(client);

    handle_connection(ctx, server).await.unwrap();
}
