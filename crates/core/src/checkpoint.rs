// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Checkpoint payload carried across coordinator restarts

use crate::id::{LeaseId, RequestId, RunnerId, TicketId};
use crate::run::RunTicketState;
use crate::semaphore::{Holder, RequestState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Current checkpoint format version
pub const CHECKPOINT_VERSION: u32 = 1;

/// Full coordinator state, owned and detached from the live instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub version: u32,
    pub runner_id: RunnerId,
    pub capacity: usize,
    pub state: CheckpointState,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointState {
    pub holders: BTreeMap<LeaseId, Holder>,
    /// FIFO order of queued request IDs
    pub queue: Vec<RequestId>,
    pub requests: BTreeMap<RequestId, RequestState>,
    /// Resolved request IDs, oldest first
    #[serde(default)]
    pub resolved: Vec<RequestId>,
    pub run_queue: Vec<TicketId>,
    pub run_tickets: BTreeMap<TicketId, RunTicketState>,
    pub last_grant_at: Option<DateTime<Utc>>,
    pub update_count: u64,
}

impl Checkpoint {
    pub fn is_supported(&self) -> bool {
        self.version == CHECKPOINT_VERSION
    }
}
