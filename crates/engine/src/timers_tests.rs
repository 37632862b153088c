// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::TimeDelta;

fn t(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_767_225_600, 0).unwrap() + TimeDelta::milliseconds(ms)
}

#[test]
fn poll_returns_due_requests_in_deadline_order() {
    let mut timers = DeadlineTimers::new();
    timers.schedule(RequestId::new("late"), t(30));
    timers.schedule(RequestId::new("early"), t(10));
    timers.schedule(RequestId::new("future"), t(100));

    assert_eq!(
        timers.poll(t(50)),
        vec![RequestId::new("early"), RequestId::new("late")]
    );
    assert_eq!(timers.next_deadline(), Some(t(100)));
    assert_eq!(timers.len(), 1);
}

#[test]
fn cancelled_requests_never_fire() {
    let mut timers = DeadlineTimers::new();
    timers.schedule(RequestId::new("a"), t(10));
    timers.schedule(RequestId::new("b"), t(20));
    timers.cancel(&RequestId::new("a"));

    assert_eq!(timers.next_deadline(), Some(t(20)));
    assert_eq!(timers.poll(t(50)), vec![RequestId::new("b")]);
    assert!(timers.is_empty());
}

#[test]
fn rescheduling_same_deadline_fires_once() {
    let mut timers = DeadlineTimers::new();
    timers.schedule(RequestId::new("a"), t(10));
    timers.schedule(RequestId::new("a"), t(10));

    assert_eq!(timers.poll(t(10)), vec![RequestId::new("a")]);
    assert!(timers.poll(t(10)).is_empty());
}

#[test]
fn cancel_then_rearm_uses_new_deadline() {
    let mut timers = DeadlineTimers::new();
    timers.schedule(RequestId::new("a"), t(10));
    timers.cancel(&RequestId::new("a"));
    timers.schedule(RequestId::new("a"), t(40));

    assert!(timers.poll(t(20)).is_empty());
    assert_eq!(timers.poll(t(40)), vec![RequestId::new("a")]);
}

#[test]
fn next_wait_is_zero_when_overdue() {
    let mut timers = DeadlineTimers::new();
    timers.schedule(RequestId::new("a"), t(10));

    assert_eq!(timers.next_wait(t(50)), Some(Duration::ZERO));
    assert_eq!(timers.next_wait(t(0)), Some(Duration::from_millis(10)));
}
