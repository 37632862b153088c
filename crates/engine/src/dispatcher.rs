// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Leader/follower run dispatch
//!
//! Coordinators announce run transitions as [`RunSignal`]s. The dispatcher
//! collects follower leases in runner-id order (the hosting coordinator
//! takes its own slot between them), launches ready tickets, and releases
//! follower leases once a ticket gives up its slots. Followers only grant or
//! refuse; the hosting coordinator decides the outcome.

use crate::error::EngineError;
use crate::launcher::{LaunchRequest, LaunchedRun, RunLauncher};
use crate::registry::Registry;
use rungate_core::{
    run_lease_id, run_request_id, AcquireRequest, Clock, CoordinatorError, Event, LeaseId,
    RunOutcome, RunStatus, RunnerId, TicketId,
};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;

/// A run event from the coordinator hosting the ticket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSignal {
    pub runner_id: RunnerId,
    pub event: Event,
}

pub(crate) async fn run<C: Clock, L: RunLauncher>(
    registry: Weak<Registry<C, L>>,
    mut signals: mpsc::UnboundedReceiver<RunSignal>,
) {
    while let Some(signal) = signals.recv().await {
        let Some(registry) = registry.upgrade() else {
            break;
        };
        tokio::spawn(dispatch(registry, signal));
    }
}

async fn dispatch<C: Clock, L: RunLauncher>(registry: Arc<Registry<C, L>>, signal: RunSignal) {
    let RunSignal { runner_id, event } = signal;
    let result = match event {
        Event::RunReserving {
            ticket_id,
            owner_namespace,
            pending,
        }
        | Event::RunAdmitted {
            ticket_id,
            owner_namespace,
            pending,
        } => grant_followers(&registry, &runner_id, ticket_id, &owner_namespace, pending).await,
        Event::RunReady {
            ticket_id,
            cancel_requested,
        } => launch(&registry, &runner_id, ticket_id, cancel_requested).await,
        Event::RunCancelRequested { ticket_id } => cancel(&registry, &runner_id, ticket_id).await,
        Event::ReleaseRunLeases {
            ticket_id,
            runner_ids,
        } => release_followers(&registry, &ticket_id, runner_ids).await,
        _ => Ok(()),
    };
    if let Err(e) = result {
        tracing::warn!(runner = %runner_id, error = %e, "run signal not handled");
    }
}

/// Collect follower leases in runner order, countersigning each on the host
async fn grant_followers<C: Clock, L: RunLauncher>(
    registry: &Registry<C, L>,
    host_id: &RunnerId,
    ticket_id: TicketId,
    owner_namespace: &str,
    mut pending: Vec<RunnerId>,
) -> Result<(), EngineError> {
    let host = registry.coordinator(host_id).await?;
    pending.sort();
    pending.dedup();

    for follower in pending {
        let lease_id = run_lease_id(&ticket_id);
        let request = AcquireRequest::new(run_request_id(&ticket_id, &follower), lease_id.clone())
            .with_owner(owner_namespace, ticket_id.as_str(), "")
            .with_wait_timeout(registry.config().follower_grant_timeout);
        let acquired = match registry.coordinator(&follower).await {
            Ok(handle) => handle.acquire(request).await.map_err(EngineError::from),
            Err(e) => Err(e),
        };

        if let Err(e) = acquired {
            tracing::warn!(
                runner = %host_id,
                ticket = %ticket_id,
                %follower,
                error = %e,
                "follower grant failed"
            );
            let outcome = RunOutcome::Failed {
                message: format!("follower {}: {}", follower, e),
            };
            host.finish_run(ticket_id, outcome).await?;
            return Ok(());
        }

        if !host.grant_run(ticket_id.clone(), follower.clone()).await? {
            let engaged = host
                .ticket(ticket_id.clone())
                .await?
                .is_some_and(|ticket| ticket.is_engaged());
            if !engaged {
                // Ticket gave up its slots while we waited
                release_lease(registry, &follower, lease_id).await?;
                return Ok(());
            }
        }
        tracing::info!(runner = %host_id, ticket = %ticket_id, %follower, "follower granted");
    }
    Ok(())
}

async fn launch<C: Clock, L: RunLauncher>(
    registry: &Registry<C, L>,
    host_id: &RunnerId,
    ticket_id: TicketId,
    cancel_requested: bool,
) -> Result<(), EngineError> {
    let host = registry.coordinator(host_id).await?;
    if cancel_requested {
        host.finish_run(ticket_id, RunOutcome::Canceled).await?;
        return Ok(());
    }
    let Some(ticket) = host.ticket(ticket_id.clone()).await? else {
        return Ok(());
    };
    if ticket.status != RunStatus::Starting {
        return Ok(());
    }

    match registry.launcher().launch(LaunchRequest::from(&ticket)).await {
        Ok(launched) => match host.run_started(ticket_id.clone(), launched.clone()).await {
            Ok(_) => Ok(()),
            Err(CoordinatorError::InvalidRequest { message }) => {
                // Canceled or finished while launching
                tracing::info!(runner = %host_id, ticket = %ticket_id, %message, "stopping launched run");
                if let Err(e) = registry.launcher().cancel(&ticket_id, &launched).await {
                    tracing::warn!(ticket = %ticket_id, error = %e, "launcher cancel failed");
                }
                Ok(())
            }
            Err(e) => Err(e.into()),
        },
        Err(e) => {
            tracing::warn!(runner = %host_id, ticket = %ticket_id, error = %e, "launch failed");
            let outcome = RunOutcome::Failed {
                message: e.to_string(),
            };
            host.finish_run(ticket_id, outcome).await?;
            Ok(())
        }
    }
}

async fn cancel<C: Clock, L: RunLauncher>(
    registry: &Registry<C, L>,
    host_id: &RunnerId,
    ticket_id: TicketId,
) -> Result<(), EngineError> {
    let host = registry.coordinator(host_id).await?;
    let Some(ticket) = host.ticket(ticket_id.clone()).await? else {
        return Ok(());
    };
    match ticket.status {
        RunStatus::Starting => {
            host.finish_run(ticket_id, RunOutcome::Canceled).await?;
        }
        RunStatus::Running => {
            let launched = LaunchedRun {
                workflow_id: ticket.workflow_id,
                run_id: ticket.run_id,
                workflow_namespace: ticket.workflow_namespace,
            };
            match registry.launcher().cancel(&ticket_id, &launched).await {
                Ok(()) => {
                    host.finish_run(ticket_id, RunOutcome::Canceled).await?;
                }
                Err(e) => {
                    tracing::warn!(runner = %host_id, ticket = %ticket_id, error = %e, "launcher cancel failed");
                }
            }
        }
        _ => {}
    }
    Ok(())
}

async fn release_followers<C: Clock, L: RunLauncher>(
    registry: &Registry<C, L>,
    ticket_id: &TicketId,
    runner_ids: Vec<RunnerId>,
) -> Result<(), EngineError> {
    for runner_id in runner_ids {
        release_lease(registry, &runner_id, run_lease_id(ticket_id)).await?;
    }
    Ok(())
}

async fn release_lease<C: Clock, L: RunLauncher>(
    registry: &Registry<C, L>,
    runner_id: &RunnerId,
    lease_id: LeaseId,
) -> Result<(), EngineError> {
    let handle = registry.coordinator(runner_id).await?;
    let response = handle.release(lease_id.clone()).await?;
    tracing::debug!(runner = %runner_id, lease = %lease_id, released = response.released, "follower lease release");
    Ok(())
}

#[cfg(test)]
#[path = "dispatcher_tests.rs"]
mod tests;
