// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Effects and events for coordinator orchestration

use crate::id::{LeaseId, RequestId, RunnerId, TicketId};
use crate::operation::Operation;
use crate::run::RunStatus;
use crate::semaphore::Permit;
use serde::{Deserialize, Serialize};

/// Side effects the coordinator asks its host to perform
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Append an operation to durable storage before answering the caller
    Persist(Operation),
    /// Notify waiters and the run dispatcher
    Emit(Event),
    /// The mutation threshold was reached; snapshot and hand off
    Checkpoint,
}

/// Events emitted by the coordinator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    LeaseGranted {
        request_id: RequestId,
        permit: Permit,
    },
    LeaseReleased {
        lease_id: LeaseId,
        request_id: RequestId,
    },
    RequestTimedOut {
        request_id: RequestId,
    },
    RunEnqueued {
        ticket_id: TicketId,
        position: usize,
    },
    /// A queued ticket started collecting slots; `pending` runners are
    /// ordered before the host and must grant first
    RunReserving {
        ticket_id: TicketId,
        owner_namespace: String,
        pending: Vec<RunnerId>,
    },
    /// A ticket took its host slot; `pending` runners still owe a grant
    RunAdmitted {
        ticket_id: TicketId,
        owner_namespace: String,
        pending: Vec<RunnerId>,
    },
    /// Every required runner has countersigned
    RunReady {
        ticket_id: TicketId,
        cancel_requested: bool,
    },
    RunStarted {
        ticket_id: TicketId,
        workflow_id: String,
        run_id: String,
    },
    RunCancelRequested {
        ticket_id: TicketId,
    },
    RunFinished {
        ticket_id: TicketId,
        status: RunStatus,
    },
    /// Leases held on other runners for this ticket must be released
    ReleaseRunLeases {
        ticket_id: TicketId,
        runner_ids: Vec<RunnerId>,
    },
}

impl Event {
    /// Events the run dispatcher reacts to
    pub fn is_run_signal(&self) -> bool {
        matches!(
            self,
            Event::RunReserving { .. }
                | Event::RunAdmitted { .. }
                | Event::RunReady { .. }
                | Event::RunCancelRequested { .. }
                | Event::ReleaseRunLeases { .. }
        )
    }
}
