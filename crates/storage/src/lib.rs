// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! rungate-storage: durable per-runner coordinator storage
//!
//! Each runner gets its own directory holding a checksummed write-ahead log
//! of [`rungate_core::Operation`]s and a set of checkpoint files. Recovery
//! loads the newest checkpoint and replays the WAL entries recorded after it.

mod checkpoint;
mod error;
mod runner_store;
mod wal;

pub use checkpoint::{CheckpointStore, StoredCheckpoint};
pub use error::StorageError;
pub use runner_store::{runner_hash, Recovered, RunnerStore};
pub use wal::{Wal, WalEntry, WalReplay};
