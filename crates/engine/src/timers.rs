// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Acquire deadline timers

use chrono::{DateTime, Utc};
use rungate_core::RequestId;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::Duration;

/// Min-heap of request deadlines.
///
/// Cancellation is lazy: a popped entry only fires if its request is still
/// armed with the same deadline.
#[derive(Debug, Default)]
pub struct DeadlineTimers {
    items: BinaryHeap<Reverse<(DateTime<Utc>, RequestId)>>,
    armed: HashMap<RequestId, DateTime<Utc>>,
}

impl DeadlineTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a deadline; re-arming an armed request with the same deadline is a no-op
    pub fn schedule(&mut self, request_id: RequestId, deadline: DateTime<Utc>) {
        if self.armed.get(&request_id) == Some(&deadline) {
            return;
        }
        self.armed.insert(request_id.clone(), deadline);
        self.items.push(Reverse((deadline, request_id)));
    }

    pub fn cancel(&mut self, request_id: &RequestId) {
        self.armed.remove(request_id);
    }

    pub fn len(&self) -> usize {
        self.armed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.armed.is_empty()
    }

    /// Earliest armed deadline
    pub fn next_deadline(&mut self) -> Option<DateTime<Utc>> {
        while let Some(Reverse((deadline, request_id))) = self.items.peek() {
            if self.armed.get(request_id) == Some(deadline) {
                return Some(*deadline);
            }
            self.items.pop();
        }
        None
    }

    /// Time left until the earliest deadline, zero if already due
    pub fn next_wait(&mut self, now: DateTime<Utc>) -> Option<Duration> {
        self.next_deadline()
            .map(|deadline| (deadline - now).to_std().unwrap_or(Duration::ZERO))
    }

    /// Disarm and return every request whose deadline is at or before `now`
    pub fn poll(&mut self, now: DateTime<Utc>) -> Vec<RequestId> {
        let mut due = Vec::new();
        while let Some(deadline) = self.next_deadline() {
            if deadline > now {
                break;
            }
            let Some(Reverse((_, request_id))) = self.items.pop() else {
                break;
            };
            self.armed.remove(&request_id);
            due.push(request_id);
        }
        due
    }
}

#[cfg(test)]
#[path = "timers_tests.rs"]
mod tests;
