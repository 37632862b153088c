// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the coordinator engine

use rungate_core::{CoordinatorError, RunnerId};
use rungate_storage::StorageError;
use thiserror::Error;

/// Errors that can occur while hosting coordinators
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("storage error for runner {runner_id}: {source}")]
    Storage {
        runner_id: RunnerId,
        #[source]
        source: StorageError,
    },
    #[error("failed to scan runner storage: {0}")]
    Scan(#[source] StorageError),
    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),
    #[error("registry is shutting down")]
    ShuttingDown,
}

impl EngineError {
    /// Collapse into the caller-facing taxonomy
    pub fn into_coordinator_error(self, runner_id: &RunnerId) -> CoordinatorError {
        match self {
            EngineError::Coordinator(e) => e,
            EngineError::ShuttingDown => CoordinatorError::Canceled {
                runner_id: runner_id.clone(),
            },
            EngineError::Storage { source, .. } | EngineError::Scan(source) => {
                CoordinatorError::Durability {
                    message: source.to_string(),
                }
            }
        }
    }
}

/// A run could not be launched
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("launch failed: {0}")]
pub struct LaunchError(pub String);
