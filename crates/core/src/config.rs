// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-coordinator configuration

use serde::{Deserialize, Serialize};

/// Default number of mutations between checkpoints
pub const DEFAULT_CHECKPOINT_THRESHOLD: u64 = 1000;

/// Default number of queued requests shown in state previews
pub const DEFAULT_QUEUE_PREVIEW_LEN: usize = 5;

/// Default number of resolved request records kept for idempotent replays
pub const DEFAULT_RESOLVED_REQUEST_RETENTION: usize = 1024;

/// Coordinator tuning knobs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Number of semaphore slots (and concurrent runs); values <= 0 mean 1
    pub capacity: i64,
    /// Mutations between checkpoint handoffs
    pub checkpoint_threshold: u64,
    /// Maximum entries in `GetState().queue_preview`
    pub queue_preview_len: usize,
    /// Released/timed-out request records kept for idempotency
    pub resolved_request_retention: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            capacity: 1,
            checkpoint_threshold: DEFAULT_CHECKPOINT_THRESHOLD,
            queue_preview_len: DEFAULT_QUEUE_PREVIEW_LEN,
            resolved_request_retention: DEFAULT_RESOLVED_REQUEST_RETENTION,
        }
    }
}

impl CoordinatorConfig {
    pub fn with_capacity(capacity: i64) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    pub fn with_checkpoint_threshold(mut self, threshold: u64) -> Self {
        self.checkpoint_threshold = threshold;
        self
    }

    pub fn with_resolved_request_retention(mut self, retention: usize) -> Self {
        self.resolved_request_retention = retention;
        self
    }

    /// Capacity after applying the `<= 0 means 1` rule
    pub fn effective_capacity(&self) -> usize {
        normalize_capacity(self.capacity)
    }

    /// Threshold clamped to at least one mutation
    pub fn effective_checkpoint_threshold(&self) -> u64 {
        self.checkpoint_threshold.max(1)
    }
}

/// Apply the `<= 0 means 1` capacity rule
pub fn normalize_capacity(capacity: i64) -> usize {
    if capacity <= 0 {
        1
    } else {
        usize::try_from(capacity).unwrap_or(usize::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yare::parameterized;

    #[parameterized(
        negative_defaults_to_one = { -3, 1 },
        zero_defaults_to_one = { 0, 1 },
        one_is_one = { 1, 1 },
        four_is_four = { 4, 4 },
    )]
    fn capacity_normalization(configured: i64, expected: usize) {
        assert_eq!(
            CoordinatorConfig::with_capacity(configured).effective_capacity(),
            expected
        );
    }

    #[test]
    fn zero_checkpoint_threshold_is_clamped() {
        let config = CoordinatorConfig::default().with_checkpoint_threshold(0);
        assert_eq!(config.effective_checkpoint_threshold(), 1);
    }

    #[test]
    fn missing_fields_use_defaults() {
        let config: CoordinatorConfig = serde_json::from_str(r#"{"capacity": 3}"#).unwrap();
        assert_eq!(config.capacity, 3);
        assert_eq!(config.checkpoint_threshold, DEFAULT_CHECKPOINT_THRESHOLD);
        assert_eq!(config.queue_preview_len, DEFAULT_QUEUE_PREVIEW_LEN);
    }
}
