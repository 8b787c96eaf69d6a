// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Write-ahead log - Error types
//
// Defines all error conditions that can arise during WAL operations including
// I/O failures, data corruption, and invalid state transitions.

use thiserror::Error;

/// Errors that can occur during WAL operations.
#[derive(Debug, Error)]
pub enum WalError {
    /// An I/O error occurred while reading or writing a WAL segment file.
    #[error("WAL I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The frame length prefix or record body could not be parsed.
    #[error("corrupted frame at offset {offset} in segment {segment}: {reason}")]
    CorruptedFrame {
        /// The byte offset where the corruption was detected.
        offset: u64,
        /// The segment file path or identifier.
        segment: String,
        /// A short description of what failed to parse.
        reason: String,
    },

    /// CRC32 checksum mismatch detected during record validation outside of
    /// `repair()`. This indicates data corruption, either from disk failure
    /// or an incomplete write (crash mid-flush).
    #[error("CRC mismatch at sequence {sequence}: expected {expected:#010x}, got {actual:#010x}")]
    CrcMismatch {
        /// The sequence number of the corrupted record.
        sequence: u64,
        /// The CRC32 value stored in the record header.
        expected: u32,
        /// The CRC32 value computed from the record payload.
        actual: u32,
    },

    /// A directory entry named like a segment file (`segment-*`) has a
    /// suffix that does not parse as a `u64` index.
    #[error("malformed segment file name: {0}")]
    MalformedSegmentName(String),

    /// Operation attempted on a WAL instance that has already been closed.
    #[error("WAL instance is closed")]
    Closed,

    /// The configured WAL directory does not exist or is not accessible.
    #[error("WAL directory not found or inaccessible: {0}")]
    DirectoryNotFound(String),

    /// The supplied `WalConfig` failed validation.
    #[error("invalid WAL configuration: {0}")]
    InvalidConfig(#[from] crate::config::WalConfigError),
}

/// Convenience type alias for WAL results.
pub type WalResult<T> = Result<T, WalError>;
