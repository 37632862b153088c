// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run launcher seam
//!
//! A ticket whose required runners have all countersigned is handed to a
//! [`RunLauncher`], which starts the actual test run and reports the
//! workflow identity back to the hosting coordinator.

use crate::error::LaunchError;
use async_trait::async_trait;
use rungate_core::{IdGen, RunTicketState, RunnerId, TicketId, UuidIdGen};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// Everything a launcher needs to start a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    pub ticket_id: TicketId,
    pub owner_namespace: String,
    /// Coordinator hosting the ticket
    pub runner_id: RunnerId,
    pub leader_runner_id: RunnerId,
    pub required_runner_ids: Vec<RunnerId>,
    pub pipeline_config: serde_json::Value,
    pub memo: BTreeMap<String, serde_json::Value>,
}

impl From<&RunTicketState> for LaunchRequest {
    fn from(ticket: &RunTicketState) -> Self {
        let request = &ticket.request;
        Self {
            ticket_id: request.ticket_id.clone(),
            owner_namespace: request.owner_namespace.clone(),
            runner_id: request.runner_id.clone(),
            leader_runner_id: request.leader_runner_id.clone(),
            required_runner_ids: request.required_runner_ids.clone(),
            pipeline_config: request.pipeline_config.clone(),
            memo: request.memo.clone(),
        }
    }
}

/// Identity of a launched run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchedRun {
    pub workflow_id: String,
    pub run_id: String,
    pub workflow_namespace: String,
}

/// Starts and stops runs for admitted tickets
#[async_trait]
pub trait RunLauncher: Clone + Send + Sync + 'static {
    async fn launch(&self, request: LaunchRequest) -> Result<LaunchedRun, LaunchError>;

    /// Ask a running run to stop. Launchers without remote control ignore it.
    async fn cancel(&self, ticket_id: &TicketId, run: &LaunchedRun) -> Result<(), LaunchError> {
        let _ = (ticket_id, run);
        Ok(())
    }
}

/// In-process launcher: the ticket becomes the workflow, with a fresh run ID
#[derive(Clone, Default)]
pub struct LocalLauncher<I: IdGen = UuidIdGen> {
    ids: I,
}

impl<I: IdGen> LocalLauncher<I> {
    pub fn new(ids: I) -> Self {
        Self { ids }
    }
}

#[async_trait]
impl<I: IdGen + 'static> RunLauncher for LocalLauncher<I> {
    async fn launch(&self, request: LaunchRequest) -> Result<LaunchedRun, LaunchError> {
        let launched = LaunchedRun {
            workflow_id: request.ticket_id.to_string(),
            run_id: self.ids.next(),
            workflow_namespace: request.owner_namespace,
        };
        tracing::info!(
            ticket = %request.ticket_id,
            workflow_id = %launched.workflow_id,
            run_id = %launched.run_id,
            "run launched"
        );
        Ok(launched)
    }
}

/// Recorded call to a [`FakeLauncher`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LauncherCall {
    Launch { ticket_id: TicketId },
    Cancel { ticket_id: TicketId, run_id: String },
}

#[derive(Default)]
struct FakeLauncherState {
    calls: Vec<LauncherCall>,
    fail_with: Option<String>,
}

/// Launcher for tests: records calls and can be told to fail
#[derive(Clone, Default)]
pub struct FakeLauncher {
    state: Arc<Mutex<FakeLauncherState>>,
}

impl FakeLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later launch fail with `message`
    pub fn fail_launches(&self, message: impl Into<String>) {
        self.lock().fail_with = Some(message.into());
    }

    pub fn calls(&self) -> Vec<LauncherCall> {
        self.lock().calls.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeLauncherState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl RunLauncher for FakeLauncher {
    async fn launch(&self, request: LaunchRequest) -> Result<LaunchedRun, LaunchError> {
        let mut state = self.lock();
        state.calls.push(LauncherCall::Launch {
            ticket_id: request.ticket_id.clone(),
        });
        if let Some(message) = &state.fail_with {
            return Err(LaunchError(message.clone()));
        }
        Ok(LaunchedRun {
            workflow_id: format!("wf-{}", request.ticket_id),
            run_id: format!("run-{}", state.calls.len()),
            workflow_namespace: request.owner_namespace,
        })
    }

    async fn cancel(&self, ticket_id: &TicketId, run: &LaunchedRun) -> Result<(), LaunchError> {
        self.lock().calls.push(LauncherCall::Cancel {
            ticket_id: ticket_id.clone(),
            run_id: run.run_id.clone(),
        });
        Ok(())
    }
}

#[cfg(test)]
#[path = "launcher_tests.rs"]
mod tests;
