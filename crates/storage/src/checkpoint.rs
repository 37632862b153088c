// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Checkpoint files for WAL compaction
//!
//! A checkpoint captures the full coordinator state together with the WAL
//! sequence it covers. Files are written to a temporary path and renamed, so
//! a reader sees either the previous checkpoint or the complete new one.

use crate::error::StorageError;
use chrono::{DateTime, Utc};
use rungate_core::checkpoint::CHECKPOINT_VERSION;
use rungate_core::Checkpoint;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// A checkpoint as written to disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCheckpoint {
    /// Last WAL sequence folded into this checkpoint
    pub sequence: u64,
    pub saved_at: DateTime<Utc>,
    pub checkpoint: Checkpoint,
}

/// Manages checkpoint creation, discovery and cleanup in one directory
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    /// File stem from sequence number and timestamp
    pub fn generate_id(sequence: u64, timestamp: DateTime<Utc>) -> String {
        format!("{:08}-{}", sequence, timestamp.format("%Y%m%d%H%M%S"))
    }

    /// Atomically write a checkpoint
    pub fn save(&self, stored: &StoredCheckpoint) -> Result<PathBuf, StorageError> {
        fs::create_dir_all(&self.dir)?;

        let id = Self::generate_id(stored.sequence, stored.saved_at);
        let path = self.dir.join(format!("{}.json", id));
        let tmp = self.dir.join(format!("{}.json.tmp", id));

        {
            let file = File::create(&tmp)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, stored)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        // Make the rename itself durable
        if let Ok(dir) = File::open(&self.dir) {
            let _ = dir.sync_all();
        }

        Ok(path)
    }

    /// Checkpoint files ordered by sequence, newest first
    pub fn list(&self) -> Result<Vec<(u64, PathBuf)>, StorageError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut found = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let sequence = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| stem.split_once('-'))
                .and_then(|(seq, _)| seq.parse::<u64>().ok());
            if let Some(sequence) = sequence {
                found.push((sequence, path));
            }
        }
        found.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(found)
    }

    /// Load one checkpoint file, rejecting unknown versions
    pub fn load(path: &Path) -> Result<StoredCheckpoint, StorageError> {
        let reader = BufReader::new(File::open(path)?);
        let stored: StoredCheckpoint = serde_json::from_reader(reader)?;
        if !stored.checkpoint.is_supported() {
            return Err(StorageError::UnsupportedVersion {
                found: stored.checkpoint.version,
                expected: CHECKPOINT_VERSION,
            });
        }
        Ok(stored)
    }

    /// Newest readable checkpoint.
    ///
    /// Unreadable files are skipped with a warning so a damaged newest file
    /// falls back to the previous one; version mismatches are fatal.
    pub fn latest(&self) -> Result<Option<StoredCheckpoint>, StorageError> {
        for (_, path) in self.list()? {
            match Self::load(&path) {
                Ok(stored) => return Ok(Some(stored)),
                Err(e @ StorageError::UnsupportedVersion { .. }) => return Err(e),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable checkpoint");
                }
            }
        }
        Ok(None)
    }

    /// Delete all but the newest `keep` checkpoints and any stray temp files
    pub fn cleanup(&self, keep: usize) -> Result<usize, StorageError> {
        let mut deleted = 0;
        for (_, path) in self.list()?.into_iter().skip(keep.max(1)) {
            fs::remove_file(&path)?;
            deleted += 1;
        }
        if self.dir.exists() {
            for entry in fs::read_dir(&self.dir)? {
                let path = entry?.path();
                if path.extension().is_some_and(|ext| ext == "tmp") {
                    fs::remove_file(&path)?;
                }
            }
        }
        Ok(deleted)
    }
}

#[cfg(test)]
#[path = "checkpoint_tests.rs"]
mod tests;
