// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Socket server and connection handling.

use std::sync::Arc;
use std::time::Instant;

use rungate_core::{Clock, CoordinatorError, RunnerId};
use rungate_engine::{CoordinatorHandle, EngineError, Registry, RunLauncher};
use tokio::net::UnixStream;
use tokio::sync::watch;
use tracing::{debug, error};

use crate::protocol::{self, Request, Response, DEFAULT_TIMEOUT, PROTOCOL_VERSION};

/// Shared by every connection task
pub struct ServerContext<C: Clock, L: RunLauncher> {
    pub registry: Arc<Registry<C, L>>,
    pub start_time: Instant,
    shutdown: watch::Sender<bool>,
}

impl<C: Clock, L: RunLauncher> ServerContext<C, L> {
    pub fn new(registry: Arc<Registry<C, L>>) -> (Self, watch::Receiver<bool>) {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let context = Self {
            registry,
            start_time: Instant::now(),
            shutdown,
        };
        (context, shutdown_rx)
    }

    pub fn shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }
}

/// Handle a single client connection.
///
/// Runs on its own task: an `Acquire` holds the connection open until the
/// lease is granted, so the request is read with a timeout but answered
/// without one.
pub async fn handle_connection<C: Clock, L: RunLauncher>(
    ctx: Arc<ServerContext<C, L>>,
    stream: UnixStream,
) -> Result<(), ServerError> {
    let (mut reader, mut writer) = stream.into_split();

    let request = match protocol::read_request(&mut reader, DEFAULT_TIMEOUT).await {
        Ok(req) => req,
        Err(protocol::ProtocolError::Timeout) => {
            error!("request read timeout");
            return Err(ServerError::Timeout);
        }
        Err(protocol::ProtocolError::ConnectionClosed) => {
            debug!("client disconnected before sending request");
            return Ok(());
        }
        Err(e) => {
            error!("failed to read request: {}", e);
            return Err(ServerError::Protocol(e));
        }
    };

    debug!(?request, "received request");
    let response = handle_request(&ctx, request).await;
    debug!(?response, "sending response");

    protocol::write_response(&mut writer, &response, DEFAULT_TIMEOUT)
        .await
        .map_err(ServerError::Protocol)?;

    Ok(())
}

/// Handle a single request and return a response
pub async fn handle_request<C: Clock, L: RunLauncher>(
    ctx: &ServerContext<C, L>,
    request: Request,
) -> Response {
    match request {
        Request::Ping => Response::Pong,

        Request::Hello { version: _ } => Response::Hello {
            version: PROTOCOL_VERSION.to_string(),
        },

        Request::Status => Response::Status {
            uptime_secs: ctx.start_time.elapsed().as_secs(),
            runners: ctx.registry.runners().await,
        },

        Request::Shutdown => {
            let _ = ctx.shutdown.send(true);
            Response::ShuttingDown
        }

        Request::Acquire { runner_id, request } => {
            respond(ctx, &runner_id, |h| async move { h.acquire(request).await }, |permit| {
                Response::Permit { permit }
            })
            .await
        }

        Request::Release {
            runner_id,
            lease_id,
        } => {
            respond(ctx, &runner_id, |h| async move { h.release(lease_id).await }, |r| {
                Response::Released {
                    released: r.released,
                }
            })
            .await
        }

        Request::EnqueueRun { request } => {
            let runner_id = request.runner_id.clone();
            respond(ctx, &runner_id, |h| async move { h.enqueue_run(request).await }, |response| {
                Response::Enqueued { response }
            })
            .await
        }

        Request::CancelRun {
            runner_id,
            ticket_id,
            owner_namespace,
        } => {
            respond(
                ctx,
                &runner_id,
                |h| async move { h.cancel_run(ticket_id, owner_namespace).await },
                |view| Response::Run { view },
            )
            .await
        }

        Request::RunDone {
            runner_id,
            ticket_id,
            owner_namespace,
        } => {
            respond(
                ctx,
                &runner_id,
                |h| async move { h.run_done(ticket_id, owner_namespace).await },
                |view| Response::Run { view },
            )
            .await
        }

        Request::GetState { runner_id } => {
            respond(ctx, &runner_id, |h| async move { h.state().await }, |state| {
                Response::State { state }
            })
            .await
        }

        Request::GetRunStatus {
            runner_id,
            owner_namespace,
            ticket_id,
        } => {
            respond(
                ctx,
                &runner_id,
                |h| async move { h.run_status(owner_namespace, ticket_id).await },
                |view| Response::Run { view },
            )
            .await
        }

        Request::ListQueuedRuns {
            runner_id,
            owner_namespace,
        } => {
            respond(
                ctx,
                &runner_id,
                |h| async move { h.list_queued_runs(owner_namespace).await },
                |runs| Response::Runs { runs },
            )
            .await
        }
    }
}

/// Resolve the runner's coordinator, run `call` on it and wrap the result
async fn respond<C, L, T, F, Fut>(
    ctx: &ServerContext<C, L>,
    runner_id: &RunnerId,
    call: F,
    ok: impl FnOnce(T) -> Response,
) -> Response
where
    C: Clock,
    L: RunLauncher,
    F: FnOnce(CoordinatorHandle) -> Fut,
    Fut: std::future::Future<Output = Result<T, CoordinatorError>>,
{
    let handle = match ctx.registry.coordinator(runner_id).await {
        Ok(handle) => handle,
        Err(e) => return error_response(e, runner_id),
    };
    match call(handle).await {
        Ok(value) => ok(value),
        Err(error) => Response::Error { error },
    }
}

fn error_response(error: EngineError, runner_id: &RunnerId) -> Response {
    Response::Error {
        error: error.into_coordinator_error(runner_id),
    }
}

/// Server errors
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] protocol::ProtocolError),

    #[error("Request timeout")]
    Timeout,
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
