// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Counting semaphore with a strict FIFO wait queue
//!
//! Slots are granted only by [`SemaphoreCore::grant_pass`], which runs after
//! every enqueue, release and expiry. A request is granted at most once and
//! never ahead of an earlier request that is still waiting.

use crate::clock::millis_between;
use crate::error::CoordinatorError;
use crate::id::{LeaseId, RequestId, RunnerId};
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

/// An acquire call as submitted by a caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquireRequest {
    pub request_id: RequestId,
    pub lease_id: LeaseId,
    #[serde(default)]
    pub owner_namespace: String,
    #[serde(default)]
    pub owner_workflow_id: String,
    #[serde(default)]
    pub owner_run_id: String,
    /// Zero waits until granted
    #[serde(with = "humantime_serde", default)]
    pub wait_timeout: Duration,
}

impl AcquireRequest {
    pub fn new(request_id: impl Into<RequestId>, lease_id: impl Into<LeaseId>) -> Self {
        Self {
            request_id: request_id.into(),
            lease_id: lease_id.into(),
            owner_namespace: String::new(),
            owner_workflow_id: String::new(),
            owner_run_id: String::new(),
            wait_timeout: Duration::ZERO,
        }
    }

    pub fn with_owner(
        mut self,
        namespace: impl Into<String>,
        workflow_id: impl Into<String>,
        run_id: impl Into<String>,
    ) -> Self {
        self.owner_namespace = namespace.into();
        self.owner_workflow_id = workflow_id.into();
        self.owner_run_id = run_id.into();
        self
    }

    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }

    /// Reject requests missing their identity keys
    pub fn validate(&self) -> Result<(), CoordinatorError> {
        if self.request_id.is_blank() {
            return Err(CoordinatorError::invalid("request_id is required"));
        }
        if self.lease_id.is_blank() {
            return Err(CoordinatorError::invalid("lease_id is required"));
        }
        Ok(())
    }
}

/// Proof that a lease was granted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permit {
    pub runner_id: RunnerId,
    pub lease_id: LeaseId,
    pub granted_at: DateTime<Utc>,
    pub queue_wait_ms: u64,
}

/// Result of a release call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseResponse {
    pub released: bool,
}

/// A granted semaphore slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holder {
    pub lease_id: LeaseId,
    pub request_id: RequestId,
    pub owner_namespace: String,
    pub owner_workflow_id: String,
    pub owner_run_id: String,
    pub granted_at: DateTime<Utc>,
    pub queue_wait_ms: u64,
}

impl Holder {
    pub fn permit(&self, runner_id: &RunnerId) -> Permit {
        Permit {
            runner_id: runner_id.clone(),
            lease_id: self.lease_id.clone(),
            granted_at: self.granted_at,
            queue_wait_ms: self.queue_wait_ms,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Queued,
    Granted,
    TimedOut,
}

/// One acquire request, pending or resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestState {
    pub request: AcquireRequest,
    pub status: RequestStatus,
    pub requested_at: DateTime<Utc>,
    pub granted_at: Option<DateTime<Utc>>,
    pub queue_wait_ms: u64,
    /// When a queued request times out; `None` waits indefinitely
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub released_at: Option<DateTime<Utc>>,
}

impl RequestState {
    fn queued(request: AcquireRequest, now: DateTime<Utc>) -> Self {
        let deadline = if request.wait_timeout.is_zero() {
            None
        } else {
            TimeDelta::from_std(request.wait_timeout)
                .ok()
                .and_then(|delta| now.checked_add_signed(delta))
        };
        Self {
            request,
            status: RequestStatus::Queued,
            requested_at: now,
            granted_at: None,
            queue_wait_ms: 0,
            deadline,
            released_at: None,
        }
    }

    /// The permit for a granted request
    pub fn permit(&self, runner_id: &RunnerId) -> Option<Permit> {
        match (self.status, self.granted_at) {
            (RequestStatus::Granted, Some(granted_at)) => Some(Permit {
                runner_id: runner_id.clone(),
                lease_id: self.request.lease_id.clone(),
                granted_at,
                queue_wait_ms: self.queue_wait_ms,
            }),
            _ => None,
        }
    }

    pub fn is_released(&self) -> bool {
        self.released_at.is_some()
    }

    /// Released and timed-out records only matter for idempotent replays
    pub fn is_resolved(&self) -> bool {
        self.status == RequestStatus::TimedOut || self.is_released()
    }
}

/// Counting semaphore over `capacity` slots
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SemaphoreCore {
    capacity: usize,
    retention: usize,
    holders: BTreeMap<LeaseId, Holder>,
    queue: VecDeque<RequestId>,
    requests: BTreeMap<RequestId, RequestState>,
    /// Resolved request IDs, oldest first, for bounded retention
    resolved: VecDeque<RequestId>,
    last_grant_at: Option<DateTime<Utc>>,
}

impl SemaphoreCore {
    pub fn new(capacity: usize, retention: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            retention,
            holders: BTreeMap::new(),
            queue: VecDeque::new(),
            requests: BTreeMap::new(),
            resolved: VecDeque::new(),
            last_grant_at: None,
        }
    }

    /// Rebuild from checkpointed parts
    pub fn restore(
        capacity: usize,
        retention: usize,
        holders: BTreeMap<LeaseId, Holder>,
        queue: VecDeque<RequestId>,
        requests: BTreeMap<RequestId, RequestState>,
        resolved: VecDeque<RequestId>,
        last_grant_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            capacity: capacity.max(1),
            retention,
            holders,
            queue,
            requests,
            resolved,
            last_grant_at,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn holders(&self) -> &BTreeMap<LeaseId, Holder> {
        &self.holders
    }

    pub fn holder(&self, lease_id: &LeaseId) -> Option<&Holder> {
        self.holders.get(lease_id)
    }

    pub fn queue(&self) -> &VecDeque<RequestId> {
        &self.queue
    }

    pub fn requests(&self) -> &BTreeMap<RequestId, RequestState> {
        &self.requests
    }

    pub fn request(&self, request_id: &RequestId) -> Option<&RequestState> {
        self.requests.get(request_id)
    }

    pub fn resolved(&self) -> &VecDeque<RequestId> {
        &self.resolved
    }

    pub fn last_grant_at(&self) -> Option<DateTime<Utc>> {
        self.last_grant_at
    }

    pub fn available_slots(&self) -> usize {
        self.capacity.saturating_sub(self.holders.len())
    }

    /// Holders ordered by grant time, oldest first
    pub fn holders_by_grant(&self) -> Vec<&Holder> {
        let mut holders: Vec<_> = self.holders.values().collect();
        holders.sort_by(|a, b| {
            a.granted_at
                .cmp(&b.granted_at)
                .then_with(|| a.lease_id.cmp(&b.lease_id))
        });
        holders
    }

    /// The request currently using `lease_id` under a different request ID
    pub fn lease_conflict(&self, request: &AcquireRequest) -> Option<&RequestId> {
        if let Some(holder) = self.holders.get(&request.lease_id) {
            if holder.request_id != request.request_id {
                return Some(&holder.request_id);
            }
        }
        self.queue.iter().find(|queued| {
            **queued != request.request_id
                && self
                    .requests
                    .get(*queued)
                    .is_some_and(|state| state.request.lease_id == request.lease_id)
        })
    }

    /// Queue a new request and try to grant immediately.
    ///
    /// Returns every holder created by the grant pass.
    pub fn enqueue(&mut self, request: AcquireRequest, now: DateTime<Utc>) -> Vec<Holder> {
        let request_id = request.request_id.clone();
        self.requests
            .insert(request_id.clone(), RequestState::queued(request, now));
        self.queue.push_back(request_id);
        self.grant_pass(now)
    }

    /// Grant free slots to queued requests in arrival order
    pub fn grant_pass(&mut self, now: DateTime<Utc>) -> Vec<Holder> {
        let mut granted = Vec::new();

        while self.holders.len() < self.capacity {
            let Some(request_id) = self.queue.pop_front() else {
                break;
            };
            let Some(state) = self.requests.get_mut(&request_id) else {
                continue;
            };
            // Stale entry: already resolved elsewhere
            if state.status != RequestStatus::Queued {
                continue;
            }

            state.status = RequestStatus::Granted;
            state.granted_at = Some(now);
            state.queue_wait_ms = millis_between(state.requested_at, now);

            let holder = Holder {
                lease_id: state.request.lease_id.clone(),
                request_id: request_id.clone(),
                owner_namespace: state.request.owner_namespace.clone(),
                owner_workflow_id: state.request.owner_workflow_id.clone(),
                owner_run_id: state.request.owner_run_id.clone(),
                granted_at: now,
                queue_wait_ms: state.queue_wait_ms,
            };
            self.holders.insert(holder.lease_id.clone(), holder.clone());
            self.last_grant_at = Some(now);
            granted.push(holder);
        }

        granted
    }

    /// Release a held lease, cascading the slot to the next waiter.
    ///
    /// Returns `None` for unknown leases without touching state.
    pub fn release(
        &mut self,
        lease_id: &LeaseId,
        now: DateTime<Utc>,
    ) -> Option<(Holder, Vec<Holder>)> {
        let holder = self.holders.remove(lease_id)?;
        if let Some(state) = self.requests.get_mut(&holder.request_id) {
            state.released_at = Some(now);
        }
        self.remember_resolved(holder.request_id.clone());
        let granted = self.grant_pass(now);
        Some((holder, granted))
    }

    /// Time out a still-queued request.
    ///
    /// Returns `None` when the request is unknown or no longer queued, which
    /// makes an expiry racing a grant a no-op.
    pub fn expire(&mut self, request_id: &RequestId, now: DateTime<Utc>) -> Option<Vec<Holder>> {
        let state = self.requests.get_mut(request_id)?;
        if state.status != RequestStatus::Queued {
            return None;
        }
        state.status = RequestStatus::TimedOut;
        let lease_id = state.request.lease_id.clone();

        self.queue.retain(|queued| queued != request_id);
        if self
            .holders
            .get(&lease_id)
            .is_some_and(|holder| &holder.request_id == request_id)
        {
            self.holders.remove(&lease_id);
        }
        self.remember_resolved(request_id.clone());
        Some(self.grant_pass(now))
    }

    /// Forget a still-queued request without recording an outcome.
    ///
    /// Returns false when the request is unknown or no longer queued.
    pub fn withdraw(&mut self, request_id: &RequestId) -> bool {
        if !self
            .requests
            .get(request_id)
            .is_some_and(|state| state.status == RequestStatus::Queued)
        {
            return false;
        }
        self.requests.remove(request_id);
        self.queue.retain(|queued| queued != request_id);
        true
    }

    fn remember_resolved(&mut self, request_id: RequestId) {
        self.resolved.push_back(request_id);
        while self.resolved.len() > self.retention {
            let Some(evicted) = self.resolved.pop_front() else {
                break;
            };
            if self
                .requests
                .get(&evicted)
                .is_some_and(RequestState::is_resolved)
            {
                self.requests.remove(&evicted);
            }
        }
    }
}

#[cfg(test)]
#[path = "semaphore_tests.rs"]
mod tests;
