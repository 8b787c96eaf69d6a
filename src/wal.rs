// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Write-ahead log - Public entry point
//
// `Wal` ties together the writer, the background syncer, and the
// directory-scanning reader behind one instance mutex and an
// open/closing/closed state flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tracing::info;

use crate::config::WalConfig;
use crate::error::{WalError, WalResult};
use crate::reader;
use crate::record::Record;
use crate::syncer::Syncer;
use crate::writer::WriterState;

/// A crash-safe, append-only write-ahead log.
///
/// Every operation acquires the same internal mutex, so appends,
/// checkpoints, manual syncs, and the background syncer's ticks never
/// interleave. Reads and `repair()` open fresh, independent file handles and
/// do not take this mutex.
pub struct Wal {
    inner: Arc<Mutex<WriterState>>,
    last_sync: Arc<Mutex<Instant>>,
    syncer: Option<Syncer>,
    directory: std::path::PathBuf,
    closed: AtomicBool,
}

impl Wal {
    /// Validate `config` and open (or resume) a WAL rooted at
    /// `config.directory`, starting its background syncer thread.
    pub fn open(config: WalConfig) -> WalResult<Self> {
        config.validate()?;

        let writer = WriterState::open(&config)?;
        let inner = Arc::new(Mutex::new(writer));
        let last_sync = Arc::new(Mutex::new(Instant::now()));

        let syncer = Syncer::spawn(inner.clone(), config.sync_interval, last_sync.clone());

        info!(dir = %config.directory.display(), "WAL opened");

        Ok(Self {
            inner,
            last_sync,
            syncer: Some(syncer),
            directory: config.directory,
            closed: AtomicBool::new(false),
        })
    }

    /// Append an ordinary record and return its assigned sequence number.
    pub fn append_entry(&self, payload: Vec<u8>) -> WalResult<u64> {
        self.ensure_open()?;
        let mut guard = self.inner.lock().unwrap();
        let record = guard.append(payload)?;
        Ok(record.seq)
    }

    /// Flush all prior records, then append a checkpoint record, and return
    /// its assigned sequence number.
    pub fn create_checkpoint(&self, payload: Vec<u8>) -> WalResult<u64> {
        self.ensure_open()?;
        let mut guard = self.inner.lock().unwrap();
        let record = guard.create_checkpoint(payload)?;
        Ok(record.seq)
    }

    /// Flush (and, if enabled, fsync) the active segment, resetting the
    /// background syncer's timer.
    pub fn sync(&self) -> WalResult<()> {
        self.ensure_open()?;
        let mut guard = self.inner.lock().unwrap();
        guard.sync()?;
        drop(guard);
        *self.last_sync.lock().unwrap() = Instant::now();
        Ok(())
    }

    /// Replay the active segment, optionally starting from its most recent
    /// checkpoint.
    pub fn read_all(&self, from_checkpoint: bool) -> WalResult<Vec<Record>> {
        self.ensure_open()?;
        reader::read_all(&self.directory, from_checkpoint)
    }

    /// Replay every segment at or past `min_segment_index`, in raw
    /// directory-listing order, optionally starting from the most recent
    /// checkpoint encountered.
    pub fn read_all_from_offset(
        &self,
        min_segment_index: u64,
        from_checkpoint: bool,
    ) -> WalResult<Vec<Record>> {
        self.ensure_open()?;
        reader::read_all_from_offset(&self.directory, min_segment_index, from_checkpoint)
    }

    /// Scan the active segment for the first corruption or truncation and,
    /// if found, atomically rewrite the segment to drop everything from
    /// that point on. Returns the verified records that survive.
    pub fn repair(&self) -> WalResult<Vec<Record>> {
        self.ensure_open()?;
        reader::repair(&self.directory)
    }

    /// Stop the background syncer and mark this instance closed. Further
    /// operations return [`WalError::Closed`].
    pub fn close(&mut self) -> WalResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(mut syncer) = self.syncer.take() {
            syncer.stop();
        }
        let mut guard = self.inner.lock().unwrap();
        guard.sync()?;
        info!(dir = %self.directory.display(), "WAL closed");
        Ok(())
    }

    fn ensure_open(&self) -> WalResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(WalError::Closed);
        }
        Ok(())
    }
}

impl Drop for Wal {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
