// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Errors surfaced to coordinator callers

use crate::id::{RequestId, RunnerId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure outcomes of coordinator calls.
///
/// A missing or foreign run ticket is not an error: queries and run mutations
/// answer with [`crate::RunStatus::NotFound`] instead.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CoordinatorError {
    /// Malformed or unauthorized input; rejected before any state change
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    /// The acquire wait timeout elapsed before a slot was granted
    #[error("acquire timed out: {request_id}")]
    Timeout { request_id: RequestId },

    /// The owner already has the maximum number of queued runs
    #[error("queue limit exceeded for {owner_namespace}: limit {limit}")]
    QueueLimitExceeded { owner_namespace: String, limit: u32 },

    /// The coordinator was stopped while the call was pending
    #[error("coordinator {runner_id} canceled")]
    Canceled { runner_id: RunnerId },

    /// Persisting the WAL or a checkpoint failed
    #[error("durability failure: {message}")]
    Durability { message: String },
}

impl CoordinatorError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// True for the external-stop outcome, as opposed to a failed request
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled { .. })
    }
}
