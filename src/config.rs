// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Write-ahead log - Configuration
//
// Validated constructor options for a `Wal` instance.

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

/// Default maximum segment size in bytes (64,000,000, the reference value
/// used in the source test suite).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 64_000_000;

/// Default retained segment count.
pub const DEFAULT_MAX_SEGMENTS: u64 = 3;

/// Default background syncer period.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_millis(200);

/// Configuration for opening a [`crate::Wal`].
#[derive(Debug, Clone)]
pub struct WalConfig {
    /// Root directory for segment files. Created (mode `0o755`) if absent.
    pub directory: PathBuf,
    /// When true, every `sync()` calls `File::sync_all` on the active
    /// segment.
    pub enable_fsync: bool,
    /// Rotation threshold in bytes.
    pub max_file_size: u64,
    /// Retention bound: once exceeded, the oldest segment is deleted at
    /// rotation time.
    pub max_segments: u64,
    /// Period of the background syncer thread.
    pub sync_interval: Duration,
}

impl WalConfig {
    /// Start a configuration with defaults, rooted at `directory`.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            enable_fsync: true,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            max_segments: DEFAULT_MAX_SEGMENTS,
            sync_interval: DEFAULT_SYNC_INTERVAL,
        }
    }

    /// A configuration tuned for fast, deterministic tests: small segments,
    /// a short sync interval, and fsync left on.
    pub fn for_testing(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            enable_fsync: true,
            max_file_size: 64 * 1024,
            max_segments: 3,
            sync_interval: Duration::from_millis(20),
        }
    }

    /// Builder: set `enable_fsync`.
    pub fn with_fsync(mut self, enabled: bool) -> Self {
        self.enable_fsync = enabled;
        self
    }

    /// Builder: set `max_file_size`.
    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    /// Builder: set `max_segments`.
    pub fn with_max_segments(mut self, count: u64) -> Self {
        self.max_segments = count;
        self
    }

    /// Builder: set `sync_interval`.
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    /// Validate that this configuration is internally consistent.
    pub fn validate(&self) -> Result<(), WalConfigError> {
        if self.max_file_size == 0 {
            return Err(WalConfigError::MaxFileSizeZero);
        }
        if self.max_segments == 0 {
            return Err(WalConfigError::MaxSegmentsZero);
        }
        if self.sync_interval.is_zero() {
            return Err(WalConfigError::SyncIntervalZero);
        }
        Ok(())
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

/// Errors raised by [`WalConfig::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WalConfigError {
    /// `max_file_size` was zero; no segment could ever hold a record.
    #[error("max_file_size must be greater than zero")]
    MaxFileSizeZero,
    /// `max_segments` was zero; there would be nowhere to write.
    #[error("max_segments must be at least 1")]
    MaxSegmentsZero,
    /// `sync_interval` was zero; the background syncer would spin.
    #[error("sync_interval must be greater than zero")]
    SyncIntervalZero,
}
