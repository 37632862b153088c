// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Coordinator actor
//!
//! One task owns a [`Coordinator`] and serves commands from a single ordered
//! inbox. Acquire callers that must wait are parked as waiters and answered
//! when a `LeaseGranted` or `RequestTimedOut` event for their request is
//! emitted; the actor itself never blocks on them.

use crate::dispatcher::RunSignal;
use crate::launcher::LaunchedRun;
use crate::timers::DeadlineTimers;
use rungate_core::{
    AcquireOutcome, AcquireRequest, Checkpoint, Clock, Coordinator, CoordinatorError, Effect,
    EnqueueRunRequest, EnqueueRunResponse, Event, LeaseId, Permit, ReleaseResponse, RequestId,
    RunOutcome, RunStatusView, RunTicketState, RunnerId, SemaphoreStateView, TicketId,
};
use rungate_storage::{RunnerStore, StorageError};
use std::collections::HashMap;
use tokio::sync::{mpsc, oneshot, watch};

pub(crate) type Reply<T> = oneshot::Sender<Result<T, CoordinatorError>>;

/// Inbox capacity of one coordinator
pub const INBOX_CAPACITY: usize = 256;

/// Commands served by a coordinator actor
pub(crate) enum Command {
    Acquire {
        request: AcquireRequest,
        reply: Reply<Permit>,
    },
    Release {
        lease_id: LeaseId,
        reply: Reply<ReleaseResponse>,
    },
    EnqueueRun {
        request: EnqueueRunRequest,
        reply: Reply<EnqueueRunResponse>,
    },
    CancelRun {
        ticket_id: TicketId,
        owner_namespace: String,
        reply: Reply<RunStatusView>,
    },
    RunDone {
        ticket_id: TicketId,
        owner_namespace: String,
        reply: Reply<RunStatusView>,
    },
    GrantRun {
        ticket_id: TicketId,
        runner_id: RunnerId,
        reply: Reply<bool>,
    },
    RunStarted {
        ticket_id: TicketId,
        launched: LaunchedRun,
        reply: Reply<RunStatusView>,
    },
    FinishRun {
        ticket_id: TicketId,
        outcome: RunOutcome,
        reply: Reply<bool>,
    },
    GetState {
        reply: Reply<SemaphoreStateView>,
    },
    GetRunStatus {
        owner_namespace: String,
        ticket_id: TicketId,
        reply: Reply<RunStatusView>,
    },
    ListQueuedRuns {
        owner_namespace: String,
        reply: Reply<Vec<RunStatusView>>,
    },
    Ticket {
        ticket_id: TicketId,
        reply: Reply<Option<RunTicketState>>,
    },
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Acquire { .. } => "acquire",
            Command::Release { .. } => "release",
            Command::EnqueueRun { .. } => "enqueue_run",
            Command::CancelRun { .. } => "cancel_run",
            Command::RunDone { .. } => "run_done",
            Command::GrantRun { .. } => "grant_run",
            Command::RunStarted { .. } => "run_started",
            Command::FinishRun { .. } => "finish_run",
            Command::GetState { .. } => "get_state",
            Command::GetRunStatus { .. } => "get_run_status",
            Command::ListQueuedRuns { .. } => "list_queued_runs",
            Command::Ticket { .. } => "ticket",
        }
    }

    /// Answer the command with an error without running it
    fn refuse(self, error: CoordinatorError) {
        match self {
            Command::Acquire { reply, .. } => {
                let _ = reply.send(Err(error));
            }
            Command::Release { reply, .. } => {
                let _ = reply.send(Err(error));
            }
            Command::EnqueueRun { reply, .. } => {
                let _ = reply.send(Err(error));
            }
            Command::CancelRun { reply, .. } | Command::RunDone { reply, .. } => {
                let _ = reply.send(Err(error));
            }
            Command::GrantRun { reply, .. } | Command::FinishRun { reply, .. } => {
                let _ = reply.send(Err(error));
            }
            Command::RunStarted { reply, .. } | Command::GetRunStatus { reply, .. } => {
                let _ = reply.send(Err(error));
            }
            Command::GetState { reply } => {
                let _ = reply.send(Err(error));
            }
            Command::ListQueuedRuns { reply, .. } => {
                let _ = reply.send(Err(error));
            }
            Command::Ticket { reply, .. } => {
                let _ = reply.send(Err(error));
            }
        }
    }
}

/// Cloneable client side of a coordinator actor
#[derive(Clone)]
pub struct CoordinatorHandle {
    runner_id: RunnerId,
    tx: mpsc::Sender<Command>,
}

impl CoordinatorHandle {
    pub(crate) fn new(runner_id: RunnerId, tx: mpsc::Sender<Command>) -> Self {
        Self { runner_id, tx }
    }

    pub fn runner_id(&self) -> &RunnerId {
        &self.runner_id
    }

    /// True once the actor has exited
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn call<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, CoordinatorError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| self.canceled())?;
        rx.await.map_err(|_| self.canceled())?
    }

    fn canceled(&self) -> CoordinatorError {
        CoordinatorError::Canceled {
            runner_id: self.runner_id.clone(),
        }
    }

    /// Acquire a slot, waiting until granted, timed out or canceled
    pub async fn acquire(&self, request: AcquireRequest) -> Result<Permit, CoordinatorError> {
        self.call(|reply| Command::Acquire { request, reply }).await
    }

    pub async fn release(&self, lease_id: LeaseId) -> Result<ReleaseResponse, CoordinatorError> {
        self.call(|reply| Command::Release { lease_id, reply }).await
    }

    pub async fn enqueue_run(
        &self,
        request: EnqueueRunRequest,
    ) -> Result<EnqueueRunResponse, CoordinatorError> {
        self.call(|reply| Command::EnqueueRun { request, reply })
            .await
    }

    pub async fn cancel_run(
        &self,
        ticket_id: TicketId,
        owner_namespace: impl Into<String>,
    ) -> Result<RunStatusView, CoordinatorError> {
        let owner_namespace = owner_namespace.into();
        self.call(|reply| Command::CancelRun {
            ticket_id,
            owner_namespace,
            reply,
        })
        .await
    }

    pub async fn run_done(
        &self,
        ticket_id: TicketId,
        owner_namespace: impl Into<String>,
    ) -> Result<RunStatusView, CoordinatorError> {
        let owner_namespace = owner_namespace.into();
        self.call(|reply| Command::RunDone {
            ticket_id,
            owner_namespace,
            reply,
        })
        .await
    }

    pub async fn grant_run(
        &self,
        ticket_id: TicketId,
        runner_id: RunnerId,
    ) -> Result<bool, CoordinatorError> {
        self.call(|reply| Command::GrantRun {
            ticket_id,
            runner_id,
            reply,
        })
        .await
    }

    pub async fn run_started(
        &self,
        ticket_id: TicketId,
        launched: LaunchedRun,
    ) -> Result<RunStatusView, CoordinatorError> {
        self.call(|reply| Command::RunStarted {
            ticket_id,
            launched,
            reply,
        })
        .await
    }

    pub async fn finish_run(
        &self,
        ticket_id: TicketId,
        outcome: RunOutcome,
    ) -> Result<bool, CoordinatorError> {
        self.call(|reply| Command::FinishRun {
            ticket_id,
            outcome,
            reply,
        })
        .await
    }

    pub async fn state(&self) -> Result<SemaphoreStateView, CoordinatorError> {
        self.call(|reply| Command::GetState { reply }).await
    }

    pub async fn run_status(
        &self,
        owner_namespace: impl Into<String>,
        ticket_id: TicketId,
    ) -> Result<RunStatusView, CoordinatorError> {
        let owner_namespace = owner_namespace.into();
        self.call(|reply| Command::GetRunStatus {
            owner_namespace,
            ticket_id,
            reply,
        })
        .await
    }

    pub async fn list_queued_runs(
        &self,
        owner_namespace: impl Into<String>,
    ) -> Result<Vec<RunStatusView>, CoordinatorError> {
        let owner_namespace = owner_namespace.into();
        self.call(|reply| Command::ListQueuedRuns {
            owner_namespace,
            reply,
        })
        .await
    }

    /// Full ticket record, regardless of namespace
    pub async fn ticket(
        &self,
        ticket_id: TicketId,
    ) -> Result<Option<RunTicketState>, CoordinatorError> {
        self.call(|reply| Command::Ticket { ticket_id, reply })
            .await
    }
}

/// Why the actor loop returned
#[derive(Debug)]
pub enum ActorExit {
    /// Stop signal or every handle dropped
    Stopped,
    /// A checkpoint was persisted; continue from it
    Handoff(Checkpoint),
    /// The WAL could not be written; state on disk is authoritative
    Failed(StorageError),
}

pub(crate) struct CoordinatorActor<C: Clock> {
    pub(crate) coordinator: Coordinator,
    store: RunnerStore,
    clock: C,
    inbox: mpsc::Receiver<Command>,
    stop: watch::Receiver<bool>,
    signals: mpsc::UnboundedSender<RunSignal>,
    waiters: HashMap<RequestId, Vec<Reply<Permit>>>,
    timers: DeadlineTimers,
}

impl<C: Clock> CoordinatorActor<C> {
    pub(crate) fn new(
        coordinator: Coordinator,
        store: RunnerStore,
        clock: C,
        inbox: mpsc::Receiver<Command>,
        stop: watch::Receiver<bool>,
        signals: mpsc::UnboundedSender<RunSignal>,
    ) -> Self {
        Self {
            coordinator,
            store,
            clock,
            inbox,
            stop,
            signals,
            waiters: HashMap::new(),
            timers: DeadlineTimers::new(),
        }
    }

    pub(crate) fn runner_id(&self) -> &RunnerId {
        self.coordinator.runner_id()
    }

    /// Arm timers and re-announce in-flight tickets after (re)starting.
    ///
    /// Returns a handoff when the recovered state already reached the
    /// checkpoint threshold.
    pub(crate) fn resume(&mut self) -> Option<ActorExit> {
        for (request_id, deadline) in self.coordinator.queued_deadlines() {
            self.timers.schedule(request_id, deadline);
        }
        for event in self.coordinator.run_signals() {
            self.signal(event);
        }
        if self.coordinator.checkpoint_due() {
            return self.try_checkpoint();
        }
        None
    }

    /// Serve until stopped, failed or a checkpoint handoff is due
    pub(crate) async fn run(&mut self) -> ActorExit {
        loop {
            if *self.stop.borrow() {
                return ActorExit::Stopped;
            }
            let wait = self.timers.next_wait(self.clock.now());
            let sleep = async move {
                match wait {
                    Some(wait) => tokio::time::sleep(wait).await,
                    None => std::future::pending::<()>().await,
                }
            };

            let exit = tokio::select! {
                biased;
                changed = self.stop.changed() => {
                    if changed.is_err() || *self.stop.borrow() {
                        return ActorExit::Stopped;
                    }
                    None
                }
                _ = sleep => self.expire_due(),
                command = self.inbox.recv() => match command {
                    Some(command) => self.handle(command),
                    None => return ActorExit::Stopped,
                },
            };
            if let Some(exit) = exit {
                return exit;
            }
        }
    }

    fn expire_due(&mut self) -> Option<ActorExit> {
        let now = self.clock.now();
        for request_id in self.timers.poll(now) {
            self.coordinator.expire(&request_id, now);
        }
        self.flush()
    }

    fn handle(&mut self, command: Command) -> Option<ActorExit> {
        let now = self.clock.now();
        tracing::debug!(runner = %self.runner_id(), command = command.name(), "command");
        match command {
            Command::Acquire { request, reply } => {
                let outcome = self.coordinator.acquire(request, now);
                // Persist before the caller can observe a grant
                let exit = self.flush();
                if exit.as_ref().is_some_and(ActorExit::is_failed) {
                    let _ = reply.send(Err(durability_error(&exit)));
                    return exit;
                }
                match outcome {
                    Ok(AcquireOutcome::Granted(permit)) => {
                        let _ = reply.send(Ok(permit));
                    }
                    Ok(AcquireOutcome::Queued {
                        request_id,
                        deadline,
                    }) => {
                        if let Some(deadline) = deadline {
                            self.timers.schedule(request_id.clone(), deadline);
                        }
                        self.waiters.entry(request_id).or_default().push(reply);
                    }
                    Err(e) => {
                        let _ = reply.send(Err(e));
                    }
                }
                exit
            }
            Command::Release { lease_id, reply } => {
                let response = self.coordinator.release(&lease_id, now);
                self.answer(reply, Ok(response))
            }
            Command::EnqueueRun { request, reply } => {
                let response = self.coordinator.enqueue_run(request, now);
                self.answer(reply, response)
            }
            Command::CancelRun {
                ticket_id,
                owner_namespace,
                reply,
            } => {
                let view = self
                    .coordinator
                    .cancel_run(&ticket_id, &owner_namespace, now);
                self.answer(reply, Ok(view))
            }
            Command::RunDone {
                ticket_id,
                owner_namespace,
                reply,
            } => {
                let view = self.coordinator.run_done(&ticket_id, &owner_namespace, now);
                self.answer(reply, Ok(view))
            }
            Command::GrantRun {
                ticket_id,
                runner_id,
                reply,
            } => {
                let recorded = self.coordinator.grant_run(&ticket_id, &runner_id, now);
                self.answer(reply, Ok(recorded))
            }
            Command::RunStarted {
                ticket_id,
                launched,
                reply,
            } => {
                let view = self.coordinator.run_started(
                    &ticket_id,
                    &launched.workflow_id,
                    &launched.run_id,
                    &launched.workflow_namespace,
                    now,
                );
                self.answer(reply, view)
            }
            Command::FinishRun {
                ticket_id,
                outcome,
                reply,
            } => {
                let finished = self.coordinator.finish_run(&ticket_id, outcome, now);
                self.answer(reply, Ok(finished))
            }
            Command::GetState { reply } => {
                let _ = reply.send(Ok(self.coordinator.state()));
                None
            }
            Command::GetRunStatus {
                owner_namespace,
                ticket_id,
                reply,
            } => {
                let view = self.coordinator.run_status(&owner_namespace, &ticket_id);
                let _ = reply.send(Ok(view));
                None
            }
            Command::ListQueuedRuns {
                owner_namespace,
                reply,
            } => {
                let _ = reply.send(Ok(self.coordinator.list_queued_runs(&owner_namespace)));
                None
            }
            Command::Ticket { ticket_id, reply } => {
                let ticket = self.coordinator.runs().ticket(&ticket_id).cloned();
                let _ = reply.send(Ok(ticket));
                None
            }
        }
    }

    /// Flush effects, then answer; a WAL failure replaces the answer
    fn answer<T>(
        &mut self,
        reply: Reply<T>,
        result: Result<T, CoordinatorError>,
    ) -> Option<ActorExit> {
        let exit = self.flush();
        if exit.as_ref().is_some_and(ActorExit::is_failed) {
            let _ = reply.send(Err(durability_error(&exit)));
        } else {
            let _ = reply.send(result);
        }
        exit
    }

    /// Persist operations, deliver events and checkpoint when due
    fn flush(&mut self) -> Option<ActorExit> {
        let mut checkpoint_due = false;
        for effect in self.coordinator.take_effects() {
            match effect {
                Effect::Persist(op) => {
                    if let Err(e) = self.store.append(&op) {
                        tracing::error!(
                            runner = %self.runner_id(),
                            op = op.name(),
                            error = %e,
                            "failed to persist operation"
                        );
                        return Some(ActorExit::Failed(e));
                    }
                }
                Effect::Emit(event) => self.deliver(event),
                Effect::Checkpoint => checkpoint_due = true,
            }
        }
        if checkpoint_due {
            return self.try_checkpoint();
        }
        None
    }

    fn deliver(&mut self, event: Event) {
        match event {
            Event::LeaseGranted { request_id, permit } => {
                self.timers.cancel(&request_id);
                for waiter in self.waiters.remove(&request_id).unwrap_or_default() {
                    let _ = waiter.send(Ok(permit.clone()));
                }
            }
            Event::RequestTimedOut { request_id } => {
                for waiter in self.waiters.remove(&request_id).unwrap_or_default() {
                    let _ = waiter.send(Err(CoordinatorError::Timeout {
                        request_id: request_id.clone(),
                    }));
                }
            }
            event if event.is_run_signal() => self.signal(event),
            _ => {}
        }
    }

    fn signal(&self, event: Event) {
        let signal = RunSignal {
            runner_id: self.runner_id().clone(),
            event,
        };
        if self.signals.send(signal).is_err() {
            tracing::warn!(runner = %self.runner_id(), "run dispatcher is gone");
        }
    }

    /// Persist a checkpoint. Failure keeps serving; the coordinator asks again
    /// on its next mutation.
    fn try_checkpoint(&mut self) -> Option<ActorExit> {
        let checkpoint = self.coordinator.checkpoint();
        match self.store.commit_checkpoint(&checkpoint, self.clock.now()) {
            Ok(sequence) => {
                tracing::info!(
                    runner = %self.runner_id(),
                    sequence,
                    updates = self.coordinator.update_count(),
                    "checkpoint persisted"
                );
                Some(ActorExit::Handoff(checkpoint))
            }
            Err(e) => {
                tracing::error!(runner = %self.runner_id(), error = %e, "checkpoint failed, handoff deferred");
                None
            }
        }
    }

    /// Answer every parked waiter and queued command with `error`
    pub(crate) fn drain(&mut self, error: CoordinatorError) {
        self.inbox.close();
        for (_, waiters) in self.waiters.drain() {
            for waiter in waiters {
                let _ = waiter.send(Err(error.clone()));
            }
        }
        while let Ok(command) = self.inbox.try_recv() {
            command.refuse(error.clone());
        }
    }
}

impl ActorExit {
    fn is_failed(&self) -> bool {
        matches!(self, ActorExit::Failed(_))
    }
}

fn durability_error(exit: &Option<ActorExit>) -> CoordinatorError {
    match exit {
        Some(ActorExit::Failed(e)) => CoordinatorError::Durability {
            message: e.to_string(),
        },
        _ => CoordinatorError::Durability {
            message: "operation not persisted".to_string(),
        },
    }
}
