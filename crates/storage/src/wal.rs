// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Checksummed write-ahead log of coordinator operations
//!
//! One JSON object per line. Every append is fsync'd before returning, so an
//! operation acknowledged to a caller survives a crash. A torn or corrupt
//! tail is detected by the CRC32 checksum and cut off on recovery.

use crate::error::StorageError;
use rungate_core::Operation;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// A single entry in the write-ahead log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalEntry {
    /// Monotonically increasing, starting at 1
    pub sequence: u64,
    pub operation: Operation,
    /// CRC32 of the serialized operation
    pub checksum: u32,
}

impl WalEntry {
    pub fn new(sequence: u64, operation: Operation) -> Result<Self, StorageError> {
        let checksum = checksum(&operation)?;
        Ok(Self {
            sequence,
            operation,
            checksum,
        })
    }

    /// Verify the checksum matches the operation
    pub fn verify(&self) -> bool {
        checksum(&self.operation).is_ok_and(|sum| sum == self.checksum)
    }

    pub fn to_line(&self) -> Result<String, StorageError> {
        serde_json::to_string(self).map_err(StorageError::from)
    }

    pub fn from_line(line: &str) -> Result<Self, StorageError> {
        serde_json::from_str(line).map_err(StorageError::from)
    }
}

fn checksum(operation: &Operation) -> Result<u32, StorageError> {
    let json = serde_json::to_string(operation)?;
    Ok(crc32fast::hash(json.as_bytes()))
}

/// Result of scanning a WAL file
#[derive(Debug, Default)]
pub struct WalReplay {
    /// Valid entries in file order
    pub entries: Vec<WalEntry>,
    /// Byte length of the valid prefix
    pub valid_len: u64,
    /// True when scanning stopped at a corrupt or torn line
    pub corrupt: bool,
}

impl WalReplay {
    pub fn last_sequence(&self) -> Option<u64> {
        self.entries.last().map(|entry| entry.sequence)
    }
}

/// Append-only WAL file
pub struct Wal {
    path: PathBuf,
    file: File,
    next_sequence: u64,
}

impl Wal {
    /// Open or create the WAL.
    ///
    /// The next sequence is at least `min_next_sequence`, so numbering keeps
    /// increasing across truncations.
    pub fn open(path: &Path, min_next_sequence: u64) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let last = Self::replay(path)?.last_sequence();
        let next_sequence = last.map(|s| s + 1).unwrap_or(1).max(min_next_sequence);

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            next_sequence,
        })
    }

    /// Scan the WAL, stopping at the first unreadable or mismatched entry
    pub fn replay(path: &Path) -> Result<WalReplay, StorageError> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(WalReplay::default()),
            Err(e) => return Err(e.into()),
        };

        let mut reader = BufReader::new(file);
        let mut replay = WalReplay::default();
        let mut line = String::new();

        loop {
            line.clear();
            let read = match reader.read_line(&mut line) {
                Ok(0) => break,
                Ok(n) => n as u64,
                Err(_) => {
                    replay.corrupt = true;
                    break;
                }
            };
            // A final line without newline is a torn write
            if !line.ends_with('\n') {
                replay.corrupt = true;
                break;
            }
            let trimmed = line.trim_end();
            if trimmed.is_empty() {
                replay.valid_len += read;
                continue;
            }
            match WalEntry::from_line(trimmed) {
                Ok(entry) if entry.verify() => {
                    replay.valid_len += read;
                    replay.entries.push(entry);
                }
                _ => {
                    replay.corrupt = true;
                    break;
                }
            }
        }

        Ok(replay)
    }

    /// Cut the file back to `len` bytes
    pub fn truncate_at(path: &Path, len: u64) -> Result<(), StorageError> {
        let file = OpenOptions::new().write(true).open(path)?;
        file.set_len(len)?;
        file.sync_all()?;
        tracing::info!(path = %path.display(), len, "WAL truncated");
        Ok(())
    }

    /// Append an operation; durable before returning
    pub fn append(&mut self, operation: &Operation) -> Result<u64, StorageError> {
        let sequence = self.next_sequence;
        let entry = WalEntry::new(sequence, operation.clone())?;
        let mut line = entry.to_line()?;
        line.push('\n');

        self.file.write_all(line.as_bytes())?;
        self.file.sync_all()?;

        self.next_sequence += 1;
        Ok(sequence)
    }

    /// Drop every entry; sequence numbering continues
    pub fn clear(&mut self) -> Result<(), StorageError> {
        self.file.set_len(0)?;
        self.file.sync_all()?;
        Ok(())
    }

    /// Sequence the next append will receive
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Sequence of the last append, 0 if none
    pub fn last_sequence(&self) -> u64 {
        self.next_sequence.saturating_sub(1)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
#[path = "wal_tests.rs"]
mod tests;
