// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! rungate-core: runner semaphore and run scheduler state machines
//!
//! This crate provides:
//! - A counting semaphore with a strict FIFO wait queue ([`SemaphoreCore`])
//! - A multi-runner run-ticket queue with leader/follower grants ([`RunScheduler`])
//! - The per-runner [`Coordinator`] that validates calls, records
//!   [`Operation`]s and decides when to checkpoint
//! - Serializable [`Checkpoint`] payloads and read-only query views
//!
//! Nothing here performs IO or spawns tasks; hosting lives in `rungate-engine`.

pub mod checkpoint;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod effect;
pub mod error;
pub mod id;
pub mod operation;
pub mod query;
pub mod run;
pub mod semaphore;

pub use checkpoint::{Checkpoint, CheckpointState};
pub use clock::{Clock, FakeClock, SystemClock};
pub use config::CoordinatorConfig;
pub use coordinator::{AcquireOutcome, Coordinator};
pub use effect::{Effect, Event};
pub use error::CoordinatorError;
pub use id::{IdGen, LeaseId, RequestId, RunnerId, SequentialIdGen, TicketId, UuidIdGen};
pub use operation::{Operation, RunOutcome};
pub use query::{HolderView, QueuedRequestView, SemaphoreStateView};
pub use run::{
    run_lease_id, run_request_id, EnqueueRunRequest, EnqueueRunResponse, RunScheduler, RunStatus,
    RunStatusView, RunTicketState,
};
pub use semaphore::{
    AcquireRequest, Holder, Permit, ReleaseResponse, RequestState, RequestStatus, SemaphoreCore,
};
