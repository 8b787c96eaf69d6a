// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Write-ahead log - Segment management
//
// Each WAL segment is a single append-only file named `segment-<N>`, where
// `N` is a non-negative decimal index (no zero-padding). Segments are
// rotated when they exceed the configured maximum size, and the oldest
// segment is pruned once the retained count exceeds `max_segments`.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{WalError, WalResult};

/// The prefix used for WAL segment file names.
pub const SEGMENT_PREFIX: &str = "segment-";

/// Metadata about a single WAL segment file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentInfo {
    /// The full path to the segment file on disk.
    pub path: PathBuf,
    /// The segment's index, parsed from its file name.
    pub index: u64,
    /// Current file size in bytes.
    pub file_size: u64,
}

impl PartialOrd for SegmentInfo {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SegmentInfo {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.index.cmp(&other.index)
    }
}

/// Build the canonical file name for a segment at the given index.
pub fn segment_filename(index: u64) -> String {
    format!("{SEGMENT_PREFIX}{index}")
}

/// Build the full path for a segment file in the given WAL directory.
pub fn segment_path(wal_dir: &Path, index: u64) -> PathBuf {
    wal_dir.join(segment_filename(index))
}

/// Parse the index from a segment file name.
///
/// Returns `Ok(None)` if the name does not start with the segment prefix at
/// all (it belongs to something else and should be ignored). Returns
/// `Err(MalformedSegmentName)` if the name has the prefix but the suffix
/// does not parse as a `u64` index.
pub fn parse_segment_filename(name: &str) -> WalResult<Option<u64>> {
    let Some(suffix) = name.strip_prefix(SEGMENT_PREFIX) else {
        return Ok(None);
    };
    suffix
        .parse::<u64>()
        .map(Some)
        .map_err(|_| WalError::MalformedSegmentName(name.to_string()))
}

/// Scan a WAL directory and return metadata for all segment files, sorted
/// ascending by index. Each call rescans the directory; nothing is cached.
///
/// Non-segment files are ignored. A `segment-*` file with an unparsable
/// suffix is a hard error (see [`parse_segment_filename`]).
pub fn list_segments(wal_dir: &Path) -> WalResult<Vec<SegmentInfo>> {
    if !wal_dir.is_dir() {
        return Err(WalError::DirectoryNotFound(wal_dir.display().to_string()));
    }

    let mut segments = Vec::new();

    for dir_entry in fs::read_dir(wal_dir)? {
        let dir_entry = dir_entry?;
        let file_name = dir_entry.file_name();
        let name = file_name.to_string_lossy();

        if let Some(index) = parse_segment_filename(&name)? {
            let metadata = dir_entry.metadata()?;
            segments.push(SegmentInfo {
                path: dir_entry.path(),
                index,
                file_size: metadata.len(),
            });
        }
    }

    segments.sort();
    Ok(segments)
}

/// Create a brand new, empty segment file at the given index, truncating
/// any pre-existing file at that path.
pub fn create_segment(wal_dir: &Path, index: u64) -> WalResult<(PathBuf, File)> {
    let path = segment_path(wal_dir, index);
    let file = File::create(&path)?;
    Ok((path, file))
}

/// Return the highest-indexed segment, if any exist.
pub fn find_newest(segments: &[SegmentInfo]) -> Option<&SegmentInfo> {
    segments.iter().max_by_key(|s| s.index)
}

/// Return the lowest-indexed segment, if any exist.
pub fn find_oldest(segments: &[SegmentInfo]) -> Option<&SegmentInfo> {
    segments.iter().min_by_key(|s| s.index)
}

/// Delete a segment file from disk.
pub fn delete_segment(path: &Path) -> WalResult<()> {
    debug!(path = %path.display(), "Deleting WAL segment");
    fs::remove_file(path)?;
    Ok(())
}
