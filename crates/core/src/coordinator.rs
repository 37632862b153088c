// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-runner coordinator state machine
//!
//! The coordinator validates each call, turns accepted mutations into an
//! [`Operation`], applies it, and queues [`Effect`]s for the host:
//! operations to persist, events to deliver, and a checkpoint request once
//! the mutation threshold is reached. Calls that would not change state
//! (idempotent replays, unknown leases, foreign tickets) record nothing.

use crate::checkpoint::{Checkpoint, CheckpointState, CHECKPOINT_VERSION};
use crate::config::CoordinatorConfig;
use crate::effect::{Effect, Event};
use crate::error::CoordinatorError;
use crate::id::{LeaseId, RequestId, RunnerId, TicketId};
use crate::operation::{Operation, RunOutcome};
use crate::query::SemaphoreStateView;
use crate::run::{
    run_lease_id, run_request_id, EnqueueRunRequest, EnqueueRunResponse, RunScheduler, RunStatus,
    RunStatusView, RunTicketState,
};
use crate::semaphore::{
    AcquireRequest, Holder, Permit, ReleaseResponse, RequestState, RequestStatus, SemaphoreCore,
};
use chrono::{DateTime, Utc};

/// Immediate answer to an acquire call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireOutcome {
    Granted(Permit),
    /// The caller must wait for a `LeaseGranted` or `RequestTimedOut` event
    Queued {
        request_id: RequestId,
        deadline: Option<DateTime<Utc>>,
    },
}

#[derive(Debug, Clone)]
pub struct Coordinator {
    runner_id: RunnerId,
    config: CoordinatorConfig,
    semaphore: SemaphoreCore,
    runs: RunScheduler,
    update_count: u64,
    outbox: Vec<Effect>,
}

impl Coordinator {
    /// Fresh state for a runner seen for the first time
    pub fn new(runner_id: RunnerId, config: CoordinatorConfig) -> Self {
        let semaphore = SemaphoreCore::new(
            config.effective_capacity(),
            config.resolved_request_retention,
        );
        Self {
            runner_id,
            config,
            semaphore,
            runs: RunScheduler::new(),
            update_count: 0,
            outbox: Vec::new(),
        }
    }

    /// Rebuild from a checkpoint with the mutation counter reset.
    ///
    /// The configured capacity wins over the recorded one so operators can
    /// resize a runner across restarts. When it shrinks below the number of
    /// restored holders, those holders keep their leases and nothing is
    /// granted until releases bring the count under the new capacity.
    pub fn from_checkpoint(checkpoint: Checkpoint, config: CoordinatorConfig) -> Self {
        let capacity = config.effective_capacity();
        if capacity != checkpoint.capacity {
            tracing::info!(
                runner = %checkpoint.runner_id,
                recorded = checkpoint.capacity,
                configured = capacity,
                "capacity changed since checkpoint"
            );
        }
        let state = checkpoint.state;
        if state.holders.len() > capacity {
            tracing::warn!(
                runner = %checkpoint.runner_id,
                holders = state.holders.len(),
                capacity,
                "restored holders exceed capacity, grants wait until they drain"
            );
        }
        let semaphore = SemaphoreCore::restore(
            capacity,
            config.resolved_request_retention,
            state.holders,
            state.queue.into(),
            state.requests,
            state.resolved.into(),
            state.last_grant_at,
        );
        Self {
            runner_id: checkpoint.runner_id,
            config,
            semaphore,
            runs: RunScheduler::restore(state.run_queue, state.run_tickets),
            update_count: 0,
            outbox: Vec::new(),
        }
    }

    pub fn runner_id(&self) -> &RunnerId {
        &self.runner_id
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn semaphore(&self) -> &SemaphoreCore {
        &self.semaphore
    }

    pub fn runs(&self) -> &RunScheduler {
        &self.runs
    }

    pub fn update_count(&self) -> u64 {
        self.update_count
    }

    pub fn checkpoint_due(&self) -> bool {
        self.update_count >= self.config.effective_checkpoint_threshold()
    }

    /// Drain effects queued since the last call
    pub fn take_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.outbox)
    }

    // ---- semaphore ----------------------------------------------------

    pub fn acquire(
        &mut self,
        request: AcquireRequest,
        now: DateTime<Utc>,
    ) -> Result<AcquireOutcome, CoordinatorError> {
        request.validate()?;

        if let Some(existing) = self.semaphore.request(&request.request_id) {
            if existing.request.lease_id != request.lease_id {
                return Err(CoordinatorError::invalid(format!(
                    "request {} was submitted for lease {}",
                    request.request_id, existing.request.lease_id
                )));
            }
            return self.acquire_outcome(existing);
        }
        if let Some(holding) = self.semaphore.lease_conflict(&request) {
            return Err(CoordinatorError::invalid(format!(
                "lease {} is in use by request {}",
                request.lease_id, holding
            )));
        }

        let request_id = request.request_id.clone();
        self.commit(Operation::Acquire { request, at: now });
        let state = self.semaphore.request(&request_id).ok_or_else(|| {
            CoordinatorError::invalid(format!("request {} was not recorded", request_id))
        })?;
        self.acquire_outcome(state)
    }

    fn acquire_outcome(&self, state: &RequestState) -> Result<AcquireOutcome, CoordinatorError> {
        let request_id = &state.request.request_id;
        match state.status {
            RequestStatus::TimedOut => Err(CoordinatorError::Timeout {
                request_id: request_id.clone(),
            }),
            RequestStatus::Granted if state.is_released() => Err(CoordinatorError::invalid(
                format!("request {} was already released", request_id),
            )),
            RequestStatus::Granted => state
                .permit(&self.runner_id)
                .map(AcquireOutcome::Granted)
                .ok_or_else(|| {
                    CoordinatorError::invalid(format!("request {} has no grant time", request_id))
                }),
            RequestStatus::Queued => Ok(AcquireOutcome::Queued {
                request_id: request_id.clone(),
                deadline: state.deadline,
            }),
        }
    }

    /// Release a lease; unknown leases are a no-op.
    ///
    /// Slots held by tickets hosted here are freed by finishing the ticket,
    /// not by a release.
    pub fn release(&mut self, lease_id: &LeaseId, now: DateTime<Utc>) -> ReleaseResponse {
        if self.semaphore.holder(lease_id).is_none() || self.is_host_slot(lease_id) {
            return ReleaseResponse { released: false };
        }
        self.commit(Operation::Release {
            lease_id: lease_id.clone(),
            at: now,
        });
        ReleaseResponse { released: true }
    }

    /// Time out a waiting request. Returns false if it is no longer queued.
    pub fn expire(&mut self, request_id: &RequestId, now: DateTime<Utc>) -> bool {
        let queued = self
            .semaphore
            .request(request_id)
            .is_some_and(|state| state.status == RequestStatus::Queued);
        if queued {
            self.commit(Operation::ExpireRequest {
                request_id: request_id.clone(),
                at: now,
            });
        }
        queued
    }

    // ---- runs ---------------------------------------------------------

    pub fn enqueue_run(
        &mut self,
        request: EnqueueRunRequest,
        now: DateTime<Utc>,
    ) -> Result<EnqueueRunResponse, CoordinatorError> {
        self.validate_run(&request)?;

        if let Some(existing) = self.runs.ticket(&request.ticket_id) {
            if !existing.is_owned_by(&request.owner_namespace) {
                return Err(CoordinatorError::invalid(format!(
                    "ticket {} belongs to another namespace",
                    request.ticket_id
                )));
            }
            return Ok(self.runs.view(existing).into());
        }

        if request.max_pipelines_in_queue > 0 {
            let queued = self.runs.queued_for_namespace(&request.owner_namespace);
            if queued >= request.max_pipelines_in_queue as usize {
                return Err(CoordinatorError::QueueLimitExceeded {
                    owner_namespace: request.owner_namespace.clone(),
                    limit: request.max_pipelines_in_queue,
                });
            }
        }

        let ticket_id = request.ticket_id.clone();
        let owner_namespace = request.owner_namespace.clone();
        self.commit(Operation::EnqueueRun { request, at: now });
        Ok(self.runs.status_view(&owner_namespace, &ticket_id).into())
    }

    fn validate_run(&self, request: &EnqueueRunRequest) -> Result<(), CoordinatorError> {
        if request.ticket_id.is_blank() {
            return Err(CoordinatorError::invalid("ticket_id is required"));
        }
        if request.owner_namespace.trim().is_empty() {
            return Err(CoordinatorError::invalid("owner_namespace is required"));
        }
        if request.runner_id != self.runner_id {
            return Err(CoordinatorError::invalid(format!(
                "runner_id {} does not match coordinator {}",
                request.runner_id, self.runner_id
            )));
        }
        if request.leader_runner_id != request.runner_id {
            return Err(CoordinatorError::invalid(format!(
                "ticket must be submitted to its leader {}",
                request.leader_runner_id
            )));
        }
        if request.enqueued_at.is_none() {
            return Err(CoordinatorError::invalid("enqueued_at is required"));
        }
        if request.required_runner_ids.is_empty() {
            return Err(CoordinatorError::invalid("required_runner_ids is empty"));
        }
        if request.required_runner_ids.iter().any(RunnerId::is_blank) {
            return Err(CoordinatorError::invalid(
                "required_runner_ids contains a blank runner",
            ));
        }
        if !request
            .required_runner_ids
            .contains(&request.leader_runner_id)
        {
            return Err(CoordinatorError::invalid(format!(
                "leader {} is not a required runner",
                request.leader_runner_id
            )));
        }
        Ok(())
    }

    /// Cancel a ticket owned by `owner_namespace`.
    ///
    /// Queued tickets disappear; active ones are flagged and keep their status.
    pub fn cancel_run(
        &mut self,
        ticket_id: &TicketId,
        owner_namespace: &str,
        now: DateTime<Utc>,
    ) -> RunStatusView {
        let changes = match self.runs.authorized(ticket_id, owner_namespace) {
            Some(ticket) => match ticket.status {
                RunStatus::Queued => true,
                RunStatus::Starting | RunStatus::Running => !ticket.cancel_requested,
                _ => false,
            },
            None => return RunStatusView::not_found(ticket_id),
        };
        if changes {
            self.commit(Operation::CancelRun {
                ticket_id: ticket_id.clone(),
                owner_namespace: owner_namespace.to_string(),
                at: now,
            });
        }
        self.runs.status_view(owner_namespace, ticket_id)
    }

    /// Forget a ticket regardless of status
    pub fn run_done(
        &mut self,
        ticket_id: &TicketId,
        owner_namespace: &str,
        now: DateTime<Utc>,
    ) -> RunStatusView {
        if self.runs.authorized(ticket_id, owner_namespace).is_some() {
            self.commit(Operation::RunDone {
                ticket_id: ticket_id.clone(),
                owner_namespace: owner_namespace.to_string(),
                at: now,
            });
        }
        RunStatusView::not_found(ticket_id)
    }

    /// Record a follower's countersign. Returns false if nothing changed.
    ///
    /// The host countersigns itself when the ticket takes its slot.
    pub fn grant_run(
        &mut self,
        ticket_id: &TicketId,
        runner_id: &RunnerId,
        now: DateTime<Utc>,
    ) -> bool {
        let applicable = self.runs.ticket(ticket_id).is_some_and(|ticket| {
            ticket.is_engaged()
                && *runner_id != self.runner_id
                && ticket.request.required_runner_ids.contains(runner_id)
                && !ticket.granted_runner_ids.contains(runner_id)
        });
        if applicable {
            self.commit(Operation::GrantRun {
                ticket_id: ticket_id.clone(),
                runner_id: runner_id.clone(),
                at: now,
            });
        }
        applicable
    }

    /// `Starting` → `Running`; every required runner must have countersigned
    pub fn run_started(
        &mut self,
        ticket_id: &TicketId,
        workflow_id: &str,
        run_id: &str,
        workflow_namespace: &str,
        now: DateTime<Utc>,
    ) -> Result<RunStatusView, CoordinatorError> {
        let Some(ticket) = self.runs.ticket(ticket_id) else {
            return Err(CoordinatorError::invalid(format!(
                "unknown ticket {}",
                ticket_id
            )));
        };
        if ticket.status != RunStatus::Starting {
            return Err(CoordinatorError::invalid(format!(
                "ticket {} is {}, not starting",
                ticket_id, ticket.status
            )));
        }
        if !ticket.fully_granted() {
            let pending: Vec<String> = ticket
                .pending_runner_ids()
                .iter()
                .map(ToString::to_string)
                .collect();
            return Err(CoordinatorError::invalid(format!(
                "ticket {} is waiting for grants from {}",
                ticket_id,
                pending.join(", ")
            )));
        }

        self.commit(Operation::RunStarted {
            ticket_id: ticket_id.clone(),
            workflow_id: workflow_id.to_string(),
            run_id: run_id.to_string(),
            workflow_namespace: workflow_namespace.to_string(),
            at: now,
        });
        match self.runs.ticket(ticket_id) {
            Some(ticket) => Ok(self.runs.view(ticket)),
            None => Ok(RunStatusView::not_found(ticket_id)),
        }
    }

    /// Fail or cancel a ticket that holds or is collecting slots. Returns
    /// false if it was neither.
    pub fn finish_run(
        &mut self,
        ticket_id: &TicketId,
        outcome: RunOutcome,
        now: DateTime<Utc>,
    ) -> bool {
        let active = self
            .runs
            .ticket(ticket_id)
            .is_some_and(RunTicketState::is_engaged);
        if active {
            self.commit(Operation::RunFinished {
                ticket_id: ticket_id.clone(),
                outcome,
                at: now,
            });
        }
        active
    }

    // ---- queries ------------------------------------------------------

    pub fn state(&self) -> SemaphoreStateView {
        SemaphoreStateView::build(
            &self.runner_id,
            &self.semaphore,
            self.config.queue_preview_len,
        )
    }

    pub fn run_status(&self, owner_namespace: &str, ticket_id: &TicketId) -> RunStatusView {
        self.runs.status_view(owner_namespace, ticket_id)
    }

    pub fn list_queued_runs(&self, owner_namespace: &str) -> Vec<RunStatusView> {
        self.runs.list_queued(owner_namespace)
    }

    /// Deadlines of requests still waiting, for re-arming timers
    pub fn queued_deadlines(&self) -> Vec<(RequestId, DateTime<Utc>)> {
        self.semaphore
            .queue()
            .iter()
            .filter_map(|id| self.semaphore.request(id))
            .filter_map(|state| {
                state
                    .deadline
                    .map(|deadline| (state.request.request_id.clone(), deadline))
            })
            .collect()
    }

    /// Run signals needed to resume in-flight tickets after a restart
    pub fn run_signals(&self) -> Vec<Event> {
        let mut signals = Vec::new();
        for ticket in self.runs.tickets().values() {
            match ticket.status {
                RunStatus::Queued if ticket.reserved => {
                    let pending = ticket.pending_before(&self.runner_id);
                    if !pending.is_empty() {
                        signals.push(Event::RunReserving {
                            ticket_id: ticket.ticket_id().clone(),
                            owner_namespace: ticket.request.owner_namespace.clone(),
                            pending,
                        });
                    }
                }
                RunStatus::Starting if ticket.fully_granted() => signals.push(Event::RunReady {
                    ticket_id: ticket.ticket_id().clone(),
                    cancel_requested: ticket.cancel_requested,
                }),
                RunStatus::Starting => signals.push(Event::RunAdmitted {
                    ticket_id: ticket.ticket_id().clone(),
                    owner_namespace: ticket.request.owner_namespace.clone(),
                    pending: ticket.pending_runner_ids(),
                }),
                RunStatus::Failed | RunStatus::Canceled => {
                    let runner_ids = remote_runners(&self.runner_id, ticket);
                    if !runner_ids.is_empty() {
                        signals.push(Event::ReleaseRunLeases {
                            ticket_id: ticket.ticket_id().clone(),
                            runner_ids,
                        });
                    }
                }
                _ => {}
            }
        }
        signals
    }

    // ---- checkpoint ---------------------------------------------------

    /// Detached copy of the full state
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            version: CHECKPOINT_VERSION,
            runner_id: self.runner_id.clone(),
            capacity: self.semaphore.capacity(),
            state: CheckpointState {
                holders: self.semaphore.holders().clone(),
                queue: self.semaphore.queue().iter().cloned().collect(),
                requests: self.semaphore.requests().clone(),
                resolved: self.semaphore.resolved().iter().cloned().collect(),
                run_queue: self.runs.run_queue().to_vec(),
                run_tickets: self.runs.tickets().clone(),
                last_grant_at: self.semaphore.last_grant_at(),
                update_count: self.update_count,
            },
        }
    }

    // ---- apply --------------------------------------------------------

    fn commit(&mut self, op: Operation) {
        tracing::debug!(runner = %self.runner_id, op = op.name(), "commit");
        let mark = self.outbox.len();
        self.apply(&op);
        self.outbox.insert(mark, Effect::Persist(op));
        if self.checkpoint_due() {
            self.outbox.push(Effect::Checkpoint);
        }
    }

    /// Apply a recorded operation. Used for live calls and WAL replay alike.
    pub fn apply(&mut self, op: &Operation) {
        match op {
            Operation::Acquire { request, at } => {
                let granted = self.semaphore.enqueue(request.clone(), *at);
                self.emit_grants(granted);
            }
            Operation::Release { lease_id, at } => {
                if let Some((holder, granted)) = self.semaphore.release(lease_id, *at) {
                    tracing::info!(runner = %self.runner_id, lease = %holder.lease_id, "lease released");
                    self.emit(Event::LeaseReleased {
                        lease_id: holder.lease_id,
                        request_id: holder.request_id,
                    });
                    self.emit_grants(granted);
                }
            }
            Operation::ExpireRequest { request_id, at } => {
                if let Some(granted) = self.semaphore.expire(request_id, *at) {
                    tracing::info!(runner = %self.runner_id, request = %request_id, "acquire timed out");
                    self.emit(Event::RequestTimedOut {
                        request_id: request_id.clone(),
                    });
                    self.emit_grants(granted);
                }
            }
            Operation::EnqueueRun { request, .. } => {
                let ticket_id = request.ticket_id.clone();
                self.runs.insert(request.clone());
                let position = self.runs.position(&ticket_id).unwrap_or(0);
                tracing::info!(runner = %self.runner_id, ticket = %ticket_id, position, "run enqueued");
                self.emit(Event::RunEnqueued {
                    ticket_id,
                    position,
                });
            }
            Operation::CancelRun {
                ticket_id,
                owner_namespace,
                at,
            } => {
                let status = self
                    .runs
                    .authorized(ticket_id, owner_namespace)
                    .map(|ticket| ticket.status);
                match status {
                    Some(RunStatus::Queued) => {
                        if let Some(ticket) = self.runs.remove(ticket_id) {
                            tracing::info!(runner = %self.runner_id, ticket = %ticket_id, "queued run canceled");
                            if ticket.reserved {
                                self.free_host_slot(ticket_id, *at);
                                self.emit_lease_release(&ticket);
                            }
                        }
                    }
                    Some(status) if status.is_active() => {
                        if self.runs.request_cancel(ticket_id) {
                            tracing::info!(runner = %self.runner_id, ticket = %ticket_id, "run cancel requested");
                            self.emit(Event::RunCancelRequested {
                                ticket_id: ticket_id.clone(),
                            });
                        }
                    }
                    _ => {}
                }
            }
            Operation::RunDone {
                ticket_id,
                owner_namespace,
                at,
            } => {
                if self.runs.authorized(ticket_id, owner_namespace).is_some() {
                    if let Some(ticket) = self.runs.remove(ticket_id) {
                        tracing::info!(runner = %self.runner_id, ticket = %ticket_id, status = %ticket.status, "run done");
                        if ticket.is_engaged() {
                            self.free_host_slot(ticket_id, *at);
                            self.emit_lease_release(&ticket);
                        }
                    }
                }
            }
            Operation::GrantRun {
                ticket_id,
                runner_id,
                ..
            } => {
                if self.runs.grant(ticket_id, runner_id) {
                    let ready = self
                        .runs
                        .ticket(ticket_id)
                        .filter(|ticket| ticket.status == RunStatus::Starting)
                        .filter(|ticket| ticket.fully_granted())
                        .map(|ticket| ticket.cancel_requested);
                    if let Some(cancel_requested) = ready {
                        tracing::info!(runner = %self.runner_id, ticket = %ticket_id, "run fully granted");
                        self.emit(Event::RunReady {
                            ticket_id: ticket_id.clone(),
                            cancel_requested,
                        });
                    }
                }
            }
            Operation::RunStarted {
                ticket_id,
                workflow_id,
                run_id,
                workflow_namespace,
                at,
            } => {
                if self
                    .runs
                    .mark_running(ticket_id, workflow_id, run_id, workflow_namespace, *at)
                {
                    tracing::info!(runner = %self.runner_id, ticket = %ticket_id, %workflow_id, %run_id, "run started");
                    self.emit(Event::RunStarted {
                        ticket_id: ticket_id.clone(),
                        workflow_id: workflow_id.clone(),
                        run_id: run_id.clone(),
                    });
                }
            }
            Operation::RunFinished {
                ticket_id,
                outcome,
                at,
            } => {
                let (status, message) = match outcome {
                    RunOutcome::Failed { message } => (RunStatus::Failed, message.as_str()),
                    RunOutcome::Canceled => (RunStatus::Canceled, ""),
                };
                self.finish_ticket(ticket_id, status, message, *at);
            }
        }

        self.admit_runs(op.at());
        self.update_count += 1;
    }

    fn finish_ticket(
        &mut self,
        ticket_id: &TicketId,
        status: RunStatus,
        message: &str,
        at: DateTime<Utc>,
    ) {
        if let Some(ticket) = self.runs.finish(ticket_id, status, message) {
            tracing::info!(runner = %self.runner_id, ticket = %ticket_id, %status, "run finished");
            self.free_host_slot(ticket_id, at);
            self.emit(Event::RunFinished {
                ticket_id: ticket_id.clone(),
                status,
            });
            self.emit_lease_release(&ticket);
        }
    }

    /// Move run-queue tickets toward `Starting`.
    ///
    /// The candidate first collects grants from runners ordered before this
    /// one, then queues for its host slot behind earlier acquires, and is
    /// admitted once the slot is granted. One queued ticket collects slots
    /// at a time.
    fn admit_runs(&mut self, now: DateTime<Utc>) {
        while let Some(ticket) = self.runs.candidate() {
            let ticket_id = ticket.ticket_id().clone();
            let owner_namespace = ticket.request.owner_namespace.clone();
            let reserved = ticket.reserved;
            let before = ticket.pending_before(&self.runner_id);

            if !reserved {
                self.runs.reserve(&ticket_id);
                if !before.is_empty() {
                    tracing::info!(runner = %self.runner_id, ticket = %ticket_id, pending = before.len(), "run reserving");
                    self.emit(Event::RunReserving {
                        ticket_id: ticket_id.clone(),
                        owner_namespace: owner_namespace.clone(),
                        pending: before.clone(),
                    });
                }
            }
            if !before.is_empty() {
                break;
            }

            let request_id = run_request_id(&ticket_id, &self.runner_id);
            let lease_id = run_lease_id(&ticket_id);
            let requested = self
                .semaphore
                .request(&request_id)
                .is_some_and(|state| !state.is_resolved());
            if !requested {
                let request = AcquireRequest::new(request_id.clone(), lease_id.clone())
                    .with_owner(owner_namespace.clone(), ticket_id.as_str(), "");
                if let Some(holding) = self.semaphore.lease_conflict(&request).cloned() {
                    let message = format!("lease {} is in use by request {}", lease_id, holding);
                    self.finish_ticket(&ticket_id, RunStatus::Failed, &message, now);
                    continue;
                }
                let granted = self.semaphore.enqueue(request, now);
                self.emit_grants(granted);
            }

            let holds_slot = self
                .semaphore
                .holder(&lease_id)
                .is_some_and(|holder| holder.request_id == request_id);
            if !holds_slot {
                break;
            }
            let Some(admitted) = self.runs.admit(&ticket_id, &self.runner_id) else {
                break;
            };
            let pending = admitted.pending_runner_ids();
            let ready = admitted.fully_granted().then_some(admitted.cancel_requested);

            tracing::info!(runner = %self.runner_id, ticket = %ticket_id, pending = pending.len(), "run admitted");
            self.emit(Event::RunAdmitted {
                ticket_id: ticket_id.clone(),
                owner_namespace,
                pending,
            });
            if let Some(cancel_requested) = ready {
                self.emit(Event::RunReady {
                    ticket_id,
                    cancel_requested,
                });
            }
        }
    }

    /// Give back a hosted ticket's slot, or drop its pending slot request
    fn free_host_slot(&mut self, ticket_id: &TicketId, at: DateTime<Utc>) {
        let request_id = run_request_id(ticket_id, &self.runner_id);
        if self.semaphore.withdraw(&request_id) {
            return;
        }
        let lease_id = run_lease_id(ticket_id);
        let owned = self
            .semaphore
            .holder(&lease_id)
            .is_some_and(|holder| holder.request_id == request_id);
        if !owned {
            return;
        }
        if let Some((holder, granted)) = self.semaphore.release(&lease_id, at) {
            tracing::info!(runner = %self.runner_id, ticket = %ticket_id, "run slot released");
            self.emit(Event::LeaseReleased {
                lease_id: holder.lease_id,
                request_id: holder.request_id,
            });
            self.emit_grants(granted);
        }
    }

    /// A lease held by a ticket hosted on this coordinator
    fn is_host_slot(&self, lease_id: &LeaseId) -> bool {
        self.runs.tickets().values().any(|ticket| {
            ticket.is_engaged()
                && run_lease_id(ticket.ticket_id()) == *lease_id
                && self
                    .semaphore
                    .holder(lease_id)
                    .is_some_and(|holder| {
                        holder.request_id == run_request_id(ticket.ticket_id(), &self.runner_id)
                    })
        })
    }

    fn emit(&mut self, event: Event) {
        self.outbox.push(Effect::Emit(event));
    }

    fn emit_grants(&mut self, granted: Vec<Holder>) {
        for holder in granted {
            tracing::info!(
                runner = %self.runner_id,
                lease = %holder.lease_id,
                request = %holder.request_id,
                queue_wait_ms = holder.queue_wait_ms,
                "lease granted"
            );
            let permit = holder.permit(&self.runner_id);
            self.emit(Event::LeaseGranted {
                request_id: holder.request_id,
                permit,
            });
        }
    }

    fn emit_lease_release(&mut self, ticket: &RunTicketState) {
        let runner_ids = remote_runners(&self.runner_id, ticket);
        if !runner_ids.is_empty() {
            self.emit(Event::ReleaseRunLeases {
                ticket_id: ticket.ticket_id().clone(),
                runner_ids,
            });
        }
    }
}

/// Required runners other than the coordinator hosting the ticket
fn remote_runners(own: &RunnerId, ticket: &RunTicketState) -> Vec<RunnerId> {
    ticket
        .request
        .required_runner_ids
        .iter()
        .filter(|id| *id != own)
        .cloned()
        .collect()
}

#[cfg(test)]
#[path = "coordinator_tests.rs"]
mod tests;
