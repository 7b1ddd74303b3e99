//! Core types for the output tap and log buffer

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of leading bytes of each chunk rendered in a tee summary
pub const SUMMARY_BYTES: usize = 32;

/// Hex rendering of the first [`SUMMARY_BYTES`] bytes of a chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeeSummary {
    hex: String,
    chunk_len: usize,
}

impl TeeSummary {
    pub fn of(chunk: &[u8]) -> Self {
        let head = &chunk[..chunk.len().min(SUMMARY_BYTES)];
        Self {
            hex: hex::encode(head),
            chunk_len: chunk.len(),
        }
    }

    pub fn hex(&self) -> &str {
        &self.hex
    }

    /// Size of the chunk this summary was taken from
    pub fn chunk_len(&self) -> usize {
        self.chunk_len
    }
}

impl fmt::Display for TeeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Raw Data: {}", self.hex)
    }
}

/// One line in the operator log, numbered in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub seq: u64,
    pub text: String,
}

/// Retention policy for the operator log.
///
/// Once an append pushes the length past `capacity`, the oldest
/// `evict_batch` entries are removed together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogCapacity {
    pub capacity: usize,
    pub evict_batch: usize,
}

impl Default for LogCapacity {
    fn default() -> Self {
        Self {
            capacity: 20,
            evict_batch: 10,
        }
    }
}
