// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use rungate_core::RunnerId;
use thiserror::Error;

/// Errors that can occur in storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported checkpoint version: {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },
    #[error("checkpoint belongs to runner {found}, expected {expected}")]
    RunnerMismatch { expected: RunnerId, found: RunnerId },
    #[error("recovered state ends at sequence {covered} but the next recorded operation is {next}; a newer checkpoint is unreadable")]
    MissingOperations { covered: u64, next: u64 },
}
