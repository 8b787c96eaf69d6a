// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Write-ahead log - Reader and repair
//
// The reader never holds the writer's mutex: it always opens a fresh,
// read-only handle onto whichever segment(s) it needs, so it only ever
// observes data that has already been flushed to the OS.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{WalError, WalResult};
use crate::record::Record;
use crate::segment::{self, parse_segment_filename, segment_path, SegmentInfo};

/// Replay all records in the active (highest-indexed) segment.
///
/// If `from_checkpoint` is true, only the records at or after the most
/// recent checkpoint found *in that segment* are returned; if no
/// checkpoint is found, the result is empty.
pub fn read_all(wal_dir: &Path, from_checkpoint: bool) -> WalResult<Vec<Record>> {
    let segments = segment::list_segments(wal_dir)?;
    let Some(active) = segment::find_newest(&segments) else {
        return Ok(Vec::new());
    };

    let records = read_segment_records(&active.path)?;
    Ok(accumulate_from_checkpoint(records.into_iter(), from_checkpoint))
}

/// Replay all segments whose index is `>= min_segment_index`, concatenated
/// in filesystem directory-listing order (*not* sorted numerically — this
/// mirrors the reference implementation and is documented as a preserved
/// quirk; see `DESIGN.md`).
///
/// If `from_checkpoint` is true, each checkpoint encountered whose sequence
/// number exceeds the previous highest resets the accumulator. If no
/// checkpoint is ever found, the full concatenation is returned instead of
/// an empty sequence — unlike [`read_all`], this asymmetry is preserved
/// from the source behavior.
pub fn read_all_from_offset(
    wal_dir: &Path,
    min_segment_index: u64,
    from_checkpoint: bool,
) -> WalResult<Vec<Record>> {
    let segments = list_segments_directory_order(wal_dir, min_segment_index)?;

    let mut accumulated: Vec<Record> = Vec::new();
    let mut last_checkpoint_seq: Option<u64> = None;
    let mut found_any_checkpoint = false;

    for segment in &segments {
        let records = read_segment_records(&segment.path)?;
        for record in records {
            if from_checkpoint && record.is_checkpoint {
                let is_newer = last_checkpoint_seq.map(|s| record.seq > s).unwrap_or(true);
                if is_newer {
                    accumulated.clear();
                    last_checkpoint_seq = Some(record.seq);
                    found_any_checkpoint = true;
                }
            }
            accumulated.push(record);
        }
    }

    if from_checkpoint && !found_any_checkpoint {
        // Preserved asymmetry with `read_all`: no checkpoint found means
        // "return everything", not "return nothing".
        return Ok(accumulated);
    }

    Ok(accumulated)
}

/// Scan the active segment, verifying every record's CRC, and stop at the
/// first corruption or truncation. If the stop was anything other than a
/// clean end-of-file, atomically replace the segment with one containing
/// exactly the verified prefix.
///
/// Returns the verified records (the prefix that survives).
pub fn repair(wal_dir: &Path) -> WalResult<Vec<Record>> {
    let segments = segment::list_segments(wal_dir)?;
    let Some(active) = segment::find_newest(&segments) else {
        return Ok(Vec::new());
    };

    let data = fs::read(&active.path)?;
    let segment_name = active
        .path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let mut offset = 0usize;
    let mut records = Vec::new();
    let mut clean_eof = false;

    loop {
        if offset == data.len() {
            clean_eof = true;
            break;
        }
        if offset + 4 > data.len() {
            warn!(offset, segment = %segment_name, "repair: short read of frame length");
            break;
        }
        let frame_len = u32::from_le_bytes(data[offset..offset + 4].try_into().unwrap()) as usize;
        let body_start = offset + 4;
        if body_start + frame_len > data.len() {
            warn!(offset, segment = %segment_name, "repair: short read of frame body");
            break;
        }

        let body = &data[body_start..body_start + frame_len];
        let record = match Record::decode_body(body, &segment_name, offset as u64) {
            Ok(record) => record,
            Err(err) => {
                warn!(offset, segment = %segment_name, error = %err, "repair: decode failure");
                break;
            }
        };

        if !record.verify_crc() {
            warn!(
                offset,
                sequence = record.seq,
                segment = %segment_name,
                "repair: CRC mismatch"
            );
            break;
        }

        offset = body_start + frame_len;
        records.push(record);
    }

    if !clean_eof {
        rewrite_segment(&active.path, &records)?;
    }

    Ok(records)
}

/// Write `records` to a temp file beside `path` and atomically rename it
/// over `path`.
fn rewrite_segment(path: &Path, records: &[Record]) -> WalResult<()> {
    let tmp_path = tmp_path_for(path);
    {
        let mut tmp = File::create(&tmp_path)?;
        for record in records {
            tmp.write_all(&record.encode_frame())?;
        }
        tmp.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Parse every frame in a single segment file, stopping silently at the
/// first corruption or truncation (expected after a crash; callers that
/// need the exact stop reason should use [`repair`] instead).
fn read_segment_records(path: &Path) -> WalResult<Vec<Record>> {
    let data = fs::read(path)?;
    let segment_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let mut offset = 0usize;
    let mut records = Vec::new();

    while offset + 4 <= data.len() {
        let frame_len = u32::from_le_bytes(data[offset..offset + 4].try_into().unwrap()) as usize;
        let body_start = offset + 4;
        if body_start + frame_len > data.len() {
            break;
        }
        let body = &data[body_start..body_start + frame_len];
        match Record::decode_body(body, &segment_name, offset as u64) {
            Ok(record) if record.verify_crc() => {
                offset = body_start + frame_len;
                records.push(record);
            }
            Ok(record) => {
                warn!(sequence = record.seq, segment = %segment_name, "skipping record with CRC mismatch");
                break;
            }
            Err(err) => {
                warn!(segment = %segment_name, error = %err, "stopping read at unparsable frame");
                break;
            }
        }
    }

    Ok(records)
}

/// Discard records preceding the last checkpoint when `from_checkpoint` is
/// requested; if requested but no checkpoint is present, yield nothing.
fn accumulate_from_checkpoint(
    records: impl Iterator<Item = Record>,
    from_checkpoint: bool,
) -> Vec<Record> {
    if !from_checkpoint {
        return records.collect();
    }

    let mut accumulated = Vec::new();
    let mut seen_checkpoint = false;
    for record in records {
        if record.is_checkpoint {
            accumulated.clear();
            seen_checkpoint = true;
        }
        accumulated.push(record);
    }
    if seen_checkpoint {
        accumulated
    } else {
        Vec::new()
    }
}

/// List segments with index `>= min_segment_index`, in raw `fs::read_dir`
/// order. Deliberately unsorted; see module docs on [`read_all_from_offset`].
fn list_segments_directory_order(
    wal_dir: &Path,
    min_segment_index: u64,
) -> WalResult<Vec<SegmentInfo>> {
    if !wal_dir.is_dir() {
        return Err(WalError::DirectoryNotFound(wal_dir.display().to_string()));
    }

    let mut segments = Vec::new();
    for dir_entry in fs::read_dir(wal_dir)? {
        let dir_entry = dir_entry?;
        let name = dir_entry.file_name().to_string_lossy().to_string();
        if let Some(index) = parse_segment_filename(&name)? {
            if index >= min_segment_index {
                let metadata = dir_entry.metadata()?;
                segments.push(SegmentInfo {
                    path: segment_path(wal_dir, index),
                    index,
                    file_size: metadata.len(),
                });
            }
        }
    }
    Ok(segments)
}
