// SPDX-License-Identifier: PMPL-1.0-or-later
//
// durable-wal - a crash-safe, append-only write-ahead log
//
// A `Wal` accepts opaque byte payloads, assigns each a monotonically
// increasing sequence number, and persists it with a CRC32 checksum to a
// series of rotating segment files on disk. It supports:
//
//   - buffered, append-only writes with configurable segment rotation and
//     retention (`WalConfig::max_file_size` / `max_segments`)
//   - checkpoint records, which flush all prior writes before being
//     written themselves, and let readers skip straight to the latest
//     known-good point
//   - a background thread that periodically flushes and (optionally)
//     fsyncs the active segment, so callers don't need to sync on every
//     write
//   - replay of committed records (`read_all`, `read_all_from_offset`)
//   - `repair()`, which scans the active segment for the first sign of a
//     torn write or corrupted checksum and atomically truncates the
//     segment back to its last verified record
//
// # Example
//
// ```no_run
// use durable_wal::{Wal, WalConfig};
//
// let config = WalConfig::new("/var/lib/myapp/wal");
// let wal = Wal::open(config)?;
//
// let seq = wal.append_entry(b"hello".to_vec())?;
// wal.sync()?;
//
// let records = wal.read_all(false)?;
// assert_eq!(records[0].seq, seq);
// # Ok::<(), durable_wal::WalError>(())
// ```
//
// # On-disk format
//
// Segments are named `segment-<N>` (decimal, unpadded) inside the
// configured directory. Each record is a 4-byte little-endian length prefix
// followed by a field-tagged body (`seq`, `payload`, `crc`, and an optional
// `is_checkpoint` flag) -- see [`record`] for the exact wire format.

pub mod config;
pub mod error;
pub mod reader;
pub mod record;
pub mod segment;
pub mod syncer;
pub mod wal;
pub mod writer;

pub use config::{WalConfig, WalConfigError};
pub use error::{WalError, WalResult};
pub use record::Record;
pub use wal::Wal;
