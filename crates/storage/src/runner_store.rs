// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-runner storage directory
//!
//! ```text
//! <state_dir>/runners/<hash>/runner.json     identity of the runner
//!                            wal.jsonl       operations since the last checkpoint
//!                            checkpoints/    <sequence>-<timestamp>.json
//! ```

use crate::checkpoint::{CheckpointStore, StoredCheckpoint};
use crate::error::StorageError;
use crate::wal::Wal;
use chrono::{DateTime, Utc};
use rungate_core::{Checkpoint, Operation, RunnerId};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

/// Checkpoint files kept per runner
pub const DEFAULT_CHECKPOINT_RETENTION: usize = 2;

const META_FILE: &str = "runner.json";
const WAL_FILE: &str = "wal.jsonl";

#[derive(Debug, Serialize, Deserialize)]
struct RunnerMeta {
    runner_id: RunnerId,
}

/// What recovery found on disk
#[derive(Debug, Default)]
pub struct Recovered {
    pub checkpoint: Option<Checkpoint>,
    /// WAL operations recorded after the checkpoint, in order
    pub operations: Vec<Operation>,
    /// A corrupt or torn WAL tail was cut off
    pub corrupt_tail: bool,
}

pub struct RunnerStore {
    runner_id: RunnerId,
    dir: PathBuf,
    wal: Wal,
    checkpoints: CheckpointStore,
    keep_checkpoints: usize,
}

impl RunnerStore {
    /// Directory for `runner_id` under `base_dir`
    pub fn runner_dir(base_dir: &Path, runner_id: &RunnerId) -> PathBuf {
        base_dir.join("runners").join(runner_hash(runner_id))
    }

    /// Open (creating if needed) and recover a runner's storage
    pub fn open(base_dir: &Path, runner_id: &RunnerId) -> Result<(Self, Recovered), StorageError> {
        let dir = Self::runner_dir(base_dir, runner_id);
        fs::create_dir_all(&dir)?;
        let meta_path = dir.join(META_FILE);
        if !meta_path.exists() {
            let meta = RunnerMeta {
                runner_id: runner_id.clone(),
            };
            fs::write(&meta_path, serde_json::to_vec(&meta)?)?;
        }

        let checkpoints = CheckpointStore::new(&dir.join("checkpoints"));
        let newest_listed = checkpoints
            .list()?
            .first()
            .map(|(sequence, _)| *sequence)
            .unwrap_or(0);
        let stored = checkpoints.latest()?;
        if let Some(stored) = &stored {
            if stored.checkpoint.runner_id != *runner_id {
                return Err(StorageError::RunnerMismatch {
                    expected: runner_id.clone(),
                    found: stored.checkpoint.runner_id.clone(),
                });
            }
        }
        let covered = stored.as_ref().map(|s| s.sequence).unwrap_or(0);

        let wal_path = dir.join(WAL_FILE);
        let replay = Wal::replay(&wal_path)?;
        if replay.corrupt {
            tracing::warn!(
                runner = %runner_id,
                valid_len = replay.valid_len,
                "WAL corruption detected, truncating at last valid entry"
            );
            Wal::truncate_at(&wal_path, replay.valid_len)?;
        }
        let corrupt_tail = replay.corrupt;
        let pending: Vec<_> = replay
            .entries
            .into_iter()
            .filter(|entry| entry.sequence > covered)
            .collect();

        // The WAL is emptied at every checkpoint, so falling back past an
        // unreadable checkpoint leaves operations that exist nowhere else.
        let next = pending
            .first()
            .map(|entry| entry.sequence)
            .unwrap_or_else(|| newest_listed.max(covered) + 1);
        if next != covered + 1 {
            tracing::error!(
                runner = %runner_id,
                covered,
                next,
                "operations between checkpoint and WAL are missing"
            );
            return Err(StorageError::MissingOperations { covered, next });
        }
        let operations: Vec<Operation> = pending.into_iter().map(|entry| entry.operation).collect();

        let wal = Wal::open(&wal_path, covered + 1)?;
        tracing::info!(
            runner = %runner_id,
            checkpoint_sequence = covered,
            replayed = operations.len(),
            "recovered runner storage"
        );

        let store = Self {
            runner_id: runner_id.clone(),
            dir,
            wal,
            checkpoints,
            keep_checkpoints: DEFAULT_CHECKPOINT_RETENTION,
        };
        let recovered = Recovered {
            checkpoint: stored.map(|s| s.checkpoint),
            operations,
            corrupt_tail,
        };
        Ok((store, recovered))
    }

    pub fn with_checkpoint_retention(mut self, keep: usize) -> Self {
        self.keep_checkpoints = keep.max(1);
        self
    }

    pub fn runner_id(&self) -> &RunnerId {
        &self.runner_id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Durably record one operation
    pub fn append(&mut self, operation: &Operation) -> Result<u64, StorageError> {
        self.wal.append(operation)
    }

    /// Persist a checkpoint covering everything appended so far, then
    /// empty the WAL.
    pub fn commit_checkpoint(
        &mut self,
        checkpoint: &Checkpoint,
        now: DateTime<Utc>,
    ) -> Result<u64, StorageError> {
        let sequence = self.wal.last_sequence();
        let stored = StoredCheckpoint {
            sequence,
            saved_at: now,
            checkpoint: checkpoint.clone(),
        };
        self.checkpoints.save(&stored)?;
        self.wal.clear()?;
        if let Err(e) = self.checkpoints.cleanup(self.keep_checkpoints) {
            tracing::warn!(runner = %self.runner_id, error = %e, "checkpoint cleanup failed");
        }
        Ok(sequence)
    }

    /// Runners that have a storage directory under `base_dir`
    pub fn list_runners(base_dir: &Path) -> Result<Vec<RunnerId>, StorageError> {
        let root = base_dir.join("runners");
        if !root.exists() {
            return Ok(Vec::new());
        }
        let mut runners = Vec::new();
        for entry in fs::read_dir(&root)? {
            let meta_path = entry?.path().join(META_FILE);
            let Ok(bytes) = fs::read(&meta_path) else {
                continue;
            };
            match serde_json::from_slice::<RunnerMeta>(&bytes) {
                Ok(meta) => runners.push(meta.runner_id),
                Err(e) => {
                    tracing::warn!(path = %meta_path.display(), error = %e, "unreadable runner metadata");
                }
            }
        }
        runners.sort();
        Ok(runners)
    }
}

/// Stable directory name for a runner
pub fn runner_hash(runner_id: &RunnerId) -> String {
    let mut hasher = Sha256::new();
    hasher.update(runner_id.as_str().as_bytes());
    let result = hasher.finalize();
    // First 16 hex chars
    hex_encode(&result[..8])
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
#[path = "runner_store_tests.rs"]
mod tests;
