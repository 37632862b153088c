// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operations for the write-ahead log
//!
//! Every state change of a coordinator is one `Operation`. Applying the same
//! operations to the same seed state always yields the same state.

use crate::id::{LeaseId, RequestId, RunnerId, TicketId};
use crate::run::EnqueueRunRequest;
use crate::semaphore::AcquireRequest;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How an admitted run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunOutcome {
    Failed { message: String },
    Canceled,
}

/// Operations that can be persisted to the WAL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    /// Queue an acquire request (and grant it when a slot is free)
    Acquire {
        request: AcquireRequest,
        at: DateTime<Utc>,
    },

    /// Release a held lease
    Release { lease_id: LeaseId, at: DateTime<Utc> },

    /// Time out a still-queued acquire request
    ExpireRequest {
        request_id: RequestId,
        at: DateTime<Utc>,
    },

    /// Insert a new run ticket
    EnqueueRun {
        request: EnqueueRunRequest,
        at: DateTime<Utc>,
    },

    /// Remove a queued ticket or flag an active one for cancellation
    CancelRun {
        ticket_id: TicketId,
        owner_namespace: String,
        at: DateTime<Utc>,
    },

    /// Drop a ticket regardless of status
    RunDone {
        ticket_id: TicketId,
        owner_namespace: String,
        at: DateTime<Utc>,
    },

    /// Record a runner's countersign on a starting ticket
    GrantRun {
        ticket_id: TicketId,
        runner_id: RunnerId,
        at: DateTime<Utc>,
    },

    /// A fully granted ticket was launched
    RunStarted {
        ticket_id: TicketId,
        workflow_id: String,
        run_id: String,
        workflow_namespace: String,
        at: DateTime<Utc>,
    },

    /// An admitted ticket failed or was canceled
    RunFinished {
        ticket_id: TicketId,
        outcome: RunOutcome,
        at: DateTime<Utc>,
    },
}

impl Operation {
    /// Timestamp the operation was recorded at
    pub fn at(&self) -> DateTime<Utc> {
        match self {
            Operation::Acquire { at, .. }
            | Operation::Release { at, .. }
            | Operation::ExpireRequest { at, .. }
            | Operation::EnqueueRun { at, .. }
            | Operation::CancelRun { at, .. }
            | Operation::RunDone { at, .. }
            | Operation::GrantRun { at, .. }
            | Operation::RunStarted { at, .. }
            | Operation::RunFinished { at, .. } => *at,
        }
    }

    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Acquire { .. } => "acquire",
            Operation::Release { .. } => "release",
            Operation::ExpireRequest { .. } => "expire_request",
            Operation::EnqueueRun { .. } => "enqueue_run",
            Operation::CancelRun { .. } => "cancel_run",
            Operation::RunDone { .. } => "run_done",
            Operation::GrantRun { .. } => "grant_run",
            Operation::RunStarted { .. } => "run_started",
            Operation::RunFinished { .. } => "run_finished",
        }
    }
}

#[cfg(test)]
#[path = "operation_tests.rs"]
mod tests;
