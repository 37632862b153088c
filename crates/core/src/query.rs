// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Read-only views of coordinator state

use crate::id::{LeaseId, RequestId, RunnerId};
use crate::semaphore::{Holder, RequestState, SemaphoreCore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HolderView {
    pub lease_id: LeaseId,
    pub request_id: RequestId,
    pub owner_namespace: String,
    pub owner_workflow_id: String,
    pub owner_run_id: String,
    pub granted_at: DateTime<Utc>,
    pub queue_wait_ms: u64,
}

impl From<&Holder> for HolderView {
    fn from(holder: &Holder) -> Self {
        Self {
            lease_id: holder.lease_id.clone(),
            request_id: holder.request_id.clone(),
            owner_namespace: holder.owner_namespace.clone(),
            owner_workflow_id: holder.owner_workflow_id.clone(),
            owner_run_id: holder.owner_run_id.clone(),
            granted_at: holder.granted_at,
            queue_wait_ms: holder.queue_wait_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedRequestView {
    pub request_id: RequestId,
    pub lease_id: LeaseId,
    pub owner_namespace: String,
    pub requested_at: DateTime<Utc>,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
}

impl From<&RequestState> for QueuedRequestView {
    fn from(state: &RequestState) -> Self {
        Self {
            request_id: state.request.request_id.clone(),
            lease_id: state.request.lease_id.clone(),
            owner_namespace: state.request.owner_namespace.clone(),
            requested_at: state.requested_at,
            deadline: state.deadline,
        }
    }
}

/// Snapshot answered by `GetState`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SemaphoreStateView {
    pub runner_id: RunnerId,
    pub capacity: usize,
    /// Oldest holder, if any
    pub current_holder: Option<HolderView>,
    /// All holders, oldest grant first
    pub holders: Vec<HolderView>,
    pub queue_len: usize,
    pub queue_preview: Vec<QueuedRequestView>,
    pub last_grant_at: Option<DateTime<Utc>>,
}

impl SemaphoreStateView {
    pub fn build(runner_id: &RunnerId, semaphore: &SemaphoreCore, preview_len: usize) -> Self {
        let holders: Vec<HolderView> = semaphore
            .holders_by_grant()
            .into_iter()
            .map(HolderView::from)
            .collect();
        let queue_preview = semaphore
            .queue()
            .iter()
            .filter_map(|id| semaphore.request(id))
            .take(preview_len)
            .map(QueuedRequestView::from)
            .collect();

        Self {
            runner_id: runner_id.clone(),
            capacity: semaphore.capacity(),
            current_holder: holders.first().cloned(),
            holders,
            queue_len: semaphore.queue().len(),
            queue_preview,
            last_grant_at: semaphore.last_grant_at(),
        }
    }
}
