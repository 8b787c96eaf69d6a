// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Write-ahead log - Background syncer
//
// A cooperative thread that periodically flushes (and, if enabled, fsyncs)
// the active segment without callers having to invoke `sync()` themselves.
// It shares the same instance mutex as every other WAL operation, so a
// tick never races an in-flight append.

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::warn;

use crate::writer::WriterState;

/// Handle to a running background syncer thread.
///
/// Dropping or calling [`Syncer::stop`] signals the thread to exit; the
/// signal is observed within at most one `sync_interval`.
pub struct Syncer {
    cancel_tx: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl Syncer {
    /// Spawn the background thread. `last_sync` is shared with the writer so
    /// that an explicit, caller-initiated `sync()` resets the timer the
    /// syncer waits against.
    pub fn spawn(
        writer: Arc<Mutex<WriterState>>,
        interval: Duration,
        last_sync: Arc<Mutex<Instant>>,
    ) -> Self {
        let (cancel_tx, cancel_rx) = mpsc::channel::<()>();

        let handle = thread::Builder::new()
            .name("wal-syncer".into())
            .spawn(move || loop {
                let wait = {
                    let last = *last_sync.lock().unwrap();
                    interval.saturating_sub(last.elapsed())
                };

                match cancel_rx.recv_timeout(wait) {
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    Err(RecvTimeoutError::Timeout) => {
                        let mut guard = writer.lock().unwrap();
                        if let Err(err) = guard.sync() {
                            warn!(error = %err, "background sync failed");
                        }
                        drop(guard);
                        *last_sync.lock().unwrap() = Instant::now();
                    }
                }
            })
            .expect("failed to spawn wal-syncer thread");

        Self {
            cancel_tx,
            handle: Some(handle),
        }
    }

    /// Signal the background thread to stop and block until it exits.
    pub fn stop(&mut self) {
        let _ = self.cancel_tx.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Syncer {
    fn drop(&mut self) {
        self.stop();
    }
}
