// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run-ticket queue with leader/follower grant coordination
//!
//! Tickets wait in `run_queue`, ordered by `(enqueued_at, ticket_id)`. Every
//! required runner, the host included, gives a ticket one semaphore slot
//! under [`run_lease_id`]. Slots are collected in runner-id order: while the
//! ticket is still queued it is `reserved` and collects the runners ordered
//! before its host; once the host slot is granted it becomes `Starting`. It
//! may become `Running` only once every required runner has countersigned.

use crate::id::{LeaseId, RequestId, RunnerId, TicketId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Ticket status. `NotFound` is only ever returned in views, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    Starting,
    Running,
    Failed,
    Canceled,
    NotFound,
}

/// Lease a ticket holds on each of its required runners
pub fn run_lease_id(ticket_id: &TicketId) -> LeaseId {
    LeaseId::new(format!("run/{}", ticket_id))
}

/// Idempotency key of a ticket's lease on `runner_id`
pub fn run_request_id(ticket_id: &TicketId, runner_id: &RunnerId) -> RequestId {
    RequestId::new(format!("run/{}/{}", ticket_id, runner_id))
}

impl RunStatus {
    /// Starting and Running tickets hold their host slot
    pub fn is_active(self) -> bool {
        matches!(self, RunStatus::Starting | RunStatus::Running)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunStatus::Queued => "queued",
            RunStatus::Starting => "starting",
            RunStatus::Running => "running",
            RunStatus::Failed => "failed",
            RunStatus::Canceled => "canceled",
            RunStatus::NotFound => "not_found",
        };
        f.write_str(s)
    }
}

/// A request to queue a (possibly multi-runner) run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnqueueRunRequest {
    pub ticket_id: TicketId,
    pub owner_namespace: String,
    /// Coordinator the ticket is submitted to
    pub runner_id: RunnerId,
    /// Must be non-empty and contain `leader_runner_id`
    pub required_runner_ids: Vec<RunnerId>,
    pub leader_runner_id: RunnerId,
    pub enqueued_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub pipeline_config: serde_json::Value,
    #[serde(default)]
    pub memo: BTreeMap<String, serde_json::Value>,
    /// Zero disables the per-owner queue limit
    #[serde(default)]
    pub max_pipelines_in_queue: u32,
}

impl EnqueueRunRequest {
    /// Single-runner ticket led by `runner_id`
    pub fn new(
        ticket_id: impl Into<TicketId>,
        owner_namespace: impl Into<String>,
        runner_id: impl Into<RunnerId>,
        enqueued_at: DateTime<Utc>,
    ) -> Self {
        let runner_id = runner_id.into();
        Self {
            ticket_id: ticket_id.into(),
            owner_namespace: owner_namespace.into(),
            runner_id: runner_id.clone(),
            required_runner_ids: vec![runner_id.clone()],
            leader_runner_id: runner_id,
            enqueued_at: Some(enqueued_at),
            pipeline_config: serde_json::Value::Null,
            memo: BTreeMap::new(),
            max_pipelines_in_queue: 0,
        }
    }

    /// Add follower runners to the required set
    pub fn with_followers(mut self, followers: impl IntoIterator<Item = RunnerId>) -> Self {
        for follower in followers {
            if !self.required_runner_ids.contains(&follower) {
                self.required_runner_ids.push(follower);
            }
        }
        self
    }

    pub fn with_queue_limit(mut self, limit: u32) -> Self {
        self.max_pipelines_in_queue = limit;
        self
    }

    pub fn with_pipeline_config(mut self, config: serde_json::Value) -> Self {
        self.pipeline_config = config;
        self
    }

    /// Required runners other than the leader
    pub fn followers(&self) -> Vec<RunnerId> {
        self.required_runner_ids
            .iter()
            .filter(|id| **id != self.leader_runner_id)
            .cloned()
            .collect()
    }
}

/// A queued or admitted run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTicketState {
    pub request: EnqueueRunRequest,
    pub status: RunStatus,
    #[serde(default)]
    pub workflow_id: String,
    #[serde(default)]
    pub run_id: String,
    #[serde(default)]
    pub workflow_namespace: String,
    #[serde(default)]
    pub granted_runner_ids: BTreeSet<RunnerId>,
    /// Queued ticket that has started collecting slots
    #[serde(default)]
    pub reserved: bool,
    #[serde(default)]
    pub cancel_requested: bool,
    #[serde(default)]
    pub error_message: String,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
}

impl RunTicketState {
    fn queued(request: EnqueueRunRequest) -> Self {
        Self {
            request,
            status: RunStatus::Queued,
            workflow_id: String::new(),
            run_id: String::new(),
            workflow_namespace: String::new(),
            granted_runner_ids: BTreeSet::new(),
            reserved: false,
            cancel_requested: false,
            error_message: String::new(),
            started_at: None,
        }
    }

    pub fn ticket_id(&self) -> &TicketId {
        &self.request.ticket_id
    }

    fn queue_key(&self) -> (DateTime<Utc>, &TicketId) {
        (
            self.request.enqueued_at.unwrap_or_default(),
            &self.request.ticket_id,
        )
    }

    /// Every required runner has countersigned
    pub fn fully_granted(&self) -> bool {
        self.request
            .required_runner_ids
            .iter()
            .all(|id| self.granted_runner_ids.contains(id))
    }

    /// Required runners that have not countersigned yet
    pub fn pending_runner_ids(&self) -> Vec<RunnerId> {
        self.request
            .required_runner_ids
            .iter()
            .filter(|id| !self.granted_runner_ids.contains(*id))
            .cloned()
            .collect()
    }

    /// Pending runners that must grant before `host` takes its slot
    pub fn pending_before(&self, host: &RunnerId) -> Vec<RunnerId> {
        let mut pending: Vec<RunnerId> = self
            .pending_runner_ids()
            .into_iter()
            .filter(|id| id < host)
            .collect();
        pending.sort();
        pending
    }

    /// May hold leases: active, or queued while collecting slots
    pub fn is_engaged(&self) -> bool {
        self.status.is_active() || (self.status == RunStatus::Queued && self.reserved)
    }

    pub fn is_owned_by(&self, owner_namespace: &str) -> bool {
        self.request.owner_namespace == owner_namespace
    }
}

/// Read-only view of one ticket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStatusView {
    pub ticket_id: TicketId,
    pub status: RunStatus,
    #[serde(default)]
    pub leader_runner_id: RunnerId,
    #[serde(default)]
    pub required_runner_ids: Vec<RunnerId>,
    #[serde(default)]
    pub workflow_id: String,
    #[serde(default)]
    pub run_id: String,
    #[serde(default)]
    pub workflow_namespace: String,
    #[serde(default)]
    pub error_message: String,
    #[serde(default)]
    pub cancel_requested: bool,
    /// 1-based position in the run queue; 0 when not queued
    #[serde(default)]
    pub position: usize,
    #[serde(default)]
    pub line_len: usize,
}

impl RunStatusView {
    pub fn not_found(ticket_id: &TicketId) -> Self {
        Self {
            ticket_id: ticket_id.clone(),
            status: RunStatus::NotFound,
            leader_runner_id: RunnerId::default(),
            required_runner_ids: Vec::new(),
            workflow_id: String::new(),
            run_id: String::new(),
            workflow_namespace: String::new(),
            error_message: String::new(),
            cancel_requested: false,
            position: 0,
            line_len: 0,
        }
    }
}

/// Result of an enqueue call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnqueueRunResponse {
    pub ticket_id: TicketId,
    pub status: RunStatus,
    pub position: usize,
    pub line_len: usize,
}

impl From<RunStatusView> for EnqueueRunResponse {
    fn from(view: RunStatusView) -> Self {
        Self {
            ticket_id: view.ticket_id,
            status: view.status,
            position: view.position,
            line_len: view.line_len,
        }
    }
}

/// Run-ticket queue and slot collection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunScheduler {
    run_queue: Vec<TicketId>,
    tickets: BTreeMap<TicketId, RunTicketState>,
}

impl RunScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from checkpointed parts, re-sorting the queue defensively
    pub fn restore(run_queue: Vec<TicketId>, tickets: BTreeMap<TicketId, RunTicketState>) -> Self {
        let mut scheduler = Self { run_queue, tickets };
        scheduler.sort_queue();
        scheduler
    }

    pub fn run_queue(&self) -> &[TicketId] {
        &self.run_queue
    }

    pub fn tickets(&self) -> &BTreeMap<TicketId, RunTicketState> {
        &self.tickets
    }

    pub fn ticket(&self, ticket_id: &TicketId) -> Option<&RunTicketState> {
        self.tickets.get(ticket_id)
    }

    /// A ticket visible to `owner_namespace`
    pub fn authorized(&self, ticket_id: &TicketId, owner_namespace: &str) -> Option<&RunTicketState> {
        self.tickets
            .get(ticket_id)
            .filter(|ticket| ticket.is_owned_by(owner_namespace))
    }

    /// 1-based queue position
    pub fn position(&self, ticket_id: &TicketId) -> Option<usize> {
        self.run_queue
            .iter()
            .position(|queued| queued == ticket_id)
            .map(|idx| idx + 1)
    }

    /// Queued tickets belonging to `owner_namespace`
    pub fn queued_for_namespace(&self, owner_namespace: &str) -> usize {
        self.run_queue
            .iter()
            .filter_map(|id| self.tickets.get(id))
            .filter(|ticket| ticket.is_owned_by(owner_namespace))
            .count()
    }

    pub fn view(&self, ticket: &RunTicketState) -> RunStatusView {
        let (position, line_len) = if ticket.status == RunStatus::Queued {
            (
                self.position(ticket.ticket_id()).unwrap_or(0),
                self.run_queue.len(),
            )
        } else {
            (0, 0)
        };
        RunStatusView {
            ticket_id: ticket.ticket_id().clone(),
            status: ticket.status,
            leader_runner_id: ticket.request.leader_runner_id.clone(),
            required_runner_ids: ticket.request.required_runner_ids.clone(),
            workflow_id: ticket.workflow_id.clone(),
            run_id: ticket.run_id.clone(),
            workflow_namespace: ticket.workflow_namespace.clone(),
            error_message: ticket.error_message.clone(),
            cancel_requested: ticket.cancel_requested,
            position,
            line_len,
        }
    }

    /// Status as seen by `owner_namespace`; foreign tickets are `NotFound`
    pub fn status_view(&self, owner_namespace: &str, ticket_id: &TicketId) -> RunStatusView {
        match self.authorized(ticket_id, owner_namespace) {
            Some(ticket) => self.view(ticket),
            None => RunStatusView::not_found(ticket_id),
        }
    }

    /// Queued tickets of `owner_namespace` in queue order
    pub fn list_queued(&self, owner_namespace: &str) -> Vec<RunStatusView> {
        self.run_queue
            .iter()
            .filter_map(|id| self.tickets.get(id))
            .filter(|ticket| ticket.is_owned_by(owner_namespace))
            .map(|ticket| self.view(ticket))
            .collect()
    }

    /// Insert a validated request as `Queued`, keeping queue order
    pub fn insert(&mut self, request: EnqueueRunRequest) {
        let ticket = RunTicketState::queued(request);
        let ticket_id = ticket.ticket_id().clone();
        let key = (ticket.request.enqueued_at.unwrap_or_default(), ticket_id.clone());
        let idx = self.run_queue.partition_point(|queued| {
            self.tickets
                .get(queued)
                .is_some_and(|t| t.queue_key() < (key.0, &key.1))
        });
        self.run_queue.insert(idx, ticket_id.clone());
        self.tickets.insert(ticket_id, ticket);
    }

    /// Drop a ticket from queue and table
    pub fn remove(&mut self, ticket_id: &TicketId) -> Option<RunTicketState> {
        self.run_queue.retain(|queued| queued != ticket_id);
        self.tickets.remove(ticket_id)
    }

    /// Flag an active ticket for cooperative cancellation.
    ///
    /// Returns false when nothing changed.
    pub fn request_cancel(&mut self, ticket_id: &TicketId) -> bool {
        match self.tickets.get_mut(ticket_id) {
            Some(ticket) if ticket.status.is_active() && !ticket.cancel_requested => {
                ticket.cancel_requested = true;
                true
            }
            _ => false,
        }
    }

    /// The queued ticket collecting slots, else the queue head
    pub fn candidate(&self) -> Option<&RunTicketState> {
        self.run_queue
            .iter()
            .filter_map(|id| self.tickets.get(id))
            .find(|ticket| ticket.reserved)
            .or_else(|| self.run_queue.first().and_then(|id| self.tickets.get(id)))
    }

    /// Start collecting slots for a queued ticket. Returns false if it
    /// already was.
    pub fn reserve(&mut self, ticket_id: &TicketId) -> bool {
        match self.tickets.get_mut(ticket_id) {
            Some(ticket) if ticket.status == RunStatus::Queued && !ticket.reserved => {
                ticket.reserved = true;
                true
            }
            _ => false,
        }
    }

    /// Move a queued ticket holding its host slot to `Starting`.
    ///
    /// `host` countersigns when it is a required runner.
    pub fn admit(&mut self, ticket_id: &TicketId, host: &RunnerId) -> Option<&RunTicketState> {
        let ticket = self.tickets.get_mut(ticket_id)?;
        if ticket.status != RunStatus::Queued {
            return None;
        }
        ticket.status = RunStatus::Starting;
        ticket.reserved = false;
        if ticket.request.required_runner_ids.contains(host) {
            ticket.granted_runner_ids.insert(host.clone());
        }
        self.run_queue.retain(|queued| queued != ticket_id);
        self.tickets.get(ticket_id)
    }

    /// Record a runner's countersign on an engaged ticket.
    ///
    /// Returns false when the grant is not applicable or already recorded.
    pub fn grant(&mut self, ticket_id: &TicketId, runner_id: &RunnerId) -> bool {
        match self.tickets.get_mut(ticket_id) {
            Some(ticket)
                if ticket.is_engaged()
                    && ticket.request.required_runner_ids.contains(runner_id) =>
            {
                ticket.granted_runner_ids.insert(runner_id.clone())
            }
            _ => false,
        }
    }

    /// `Starting` → `Running` for a fully granted ticket
    pub fn mark_running(
        &mut self,
        ticket_id: &TicketId,
        workflow_id: &str,
        run_id: &str,
        workflow_namespace: &str,
        now: DateTime<Utc>,
    ) -> bool {
        match self.tickets.get_mut(ticket_id) {
            Some(ticket) if ticket.status == RunStatus::Starting && ticket.fully_granted() => {
                ticket.status = RunStatus::Running;
                ticket.workflow_id = workflow_id.to_string();
                ticket.run_id = run_id.to_string();
                ticket.workflow_namespace = workflow_namespace.to_string();
                ticket.started_at = Some(now);
                true
            }
            _ => false,
        }
    }

    /// Move an engaged ticket to a terminal status, returning its state
    /// before the change
    pub fn finish(
        &mut self,
        ticket_id: &TicketId,
        status: RunStatus,
        error_message: &str,
    ) -> Option<RunTicketState> {
        let ticket = self.tickets.get_mut(ticket_id)?;
        if !ticket.is_engaged() {
            return None;
        }
        let before = ticket.clone();
        ticket.status = status;
        ticket.reserved = false;
        ticket.error_message = error_message.to_string();
        self.run_queue.retain(|queued| queued != ticket_id);
        Some(before)
    }

    fn sort_queue(&mut self) {
        let tickets = &self.tickets;
        self.run_queue.retain(|id| {
            tickets
                .get(id)
                .is_some_and(|ticket| ticket.status == RunStatus::Queued)
        });
        self.run_queue.sort_by(|a, b| {
            let ka = tickets.get(a).map(RunTicketState::queue_key);
            let kb = tickets.get(b).map(RunTicketState::queue_key);
            ka.cmp(&kb)
        });
    }
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
