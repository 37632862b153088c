// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! rungate daemon library
//!
//! Hosts one coordinator per runner behind a Unix socket. The binary in
//! `main.rs` wires these modules together; the CLI links against
//! [`protocol`] to talk to it.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod config;
pub mod lifecycle;
pub mod protocol;
pub mod server;

pub use config::DaemonConfig;
pub use protocol::{Request, Response};
