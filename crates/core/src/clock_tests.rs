// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn system_clock_does_not_go_backwards() {
    let clock = SystemClock;
    let t1 = clock.now();
    std::thread::sleep(Duration::from_millis(1));
    let t2 = clock.now();
    assert!(t2 >= t1);
}

#[test]
fn fake_clock_can_be_advanced() {
    let clock = FakeClock::new();
    let t1 = clock.now();
    clock.advance(Duration::from_millis(250));
    let t2 = clock.now();
    assert_eq!(millis_between(t1, t2), 250);
}

#[test]
fn fake_clock_is_cloneable_and_shared() {
    let clock1 = FakeClock::new();
    let clock2 = clock1.clone();
    let t1 = clock1.now();
    clock2.advance(Duration::from_secs(30));
    assert_eq!(millis_between(t1, clock1.now()), 30_000);
}

#[test]
fn millis_between_clamps_negative_spans() {
    let clock = FakeClock::new();
    let earlier = clock.now();
    clock.advance(Duration::from_secs(1));
    assert_eq!(millis_between(clock.now(), earlier), 0);
}
