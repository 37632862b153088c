// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! rungate-engine: async hosting for runner coordinators

mod actor;
pub mod dispatcher;
pub mod error;
pub mod launcher;
pub mod registry;
mod supervisor;
pub mod timers;

pub use actor::{CoordinatorHandle, INBOX_CAPACITY};
pub use dispatcher::RunSignal;
pub use error::{EngineError, LaunchError};
pub use launcher::{
    FakeLauncher, LaunchRequest, LaunchedRun, LauncherCall, LocalLauncher, RunLauncher,
};
pub use registry::{Registry, RegistryConfig, DEFAULT_FOLLOWER_GRANT_TIMEOUT};
pub use supervisor::restore_coordinator;
pub use timers::DeadlineTimers;
