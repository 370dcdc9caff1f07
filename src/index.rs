//! Line-offset index: a single forward scan that turns a file's physical
//! lines into randomly-addressable byte ranges.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use crate::error::{Result, StoreError};
use crate::grammar;

/// How often (in physical lines) the index build reports progress and
/// checks for cancellation.
pub const DEFAULT_PROGRESS_INTERVAL_LINES: u64 = 10_000;

/// Read buffer size used while scanning for newlines.
const SCAN_BUFFER_SIZE: usize = 64 * 1024;

/// A cooperative cancellation flag shared between a caller and a
/// long-running scan or filter job. Polled at checkpoint boundaries,
/// never preemptive.
#[derive(Debug, Default)]
pub struct CancelToken(AtomicBool);

impl CancelToken {
    pub fn new() -> Self {
        CancelToken(AtomicBool::new(false))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// An immutable ordered sequence of byte offsets, one per physical line,
/// built by a single linear scan over the file.
#[derive(Debug, Clone)]
pub struct FileIndex {
    path: PathBuf,
    /// `offsets[i]` is the byte at which physical line `i` starts.
    /// `offsets[line_count]` is the file size (terminal sentinel).
    offsets: Vec<u64>,
    line_count: u64,
    file_size: u64,
    /// Decoded (grammar-accepted) record count per `chunk_size`-line
    /// window, tallied during the same forward scan that builds
    /// `offsets` rather than by a second pass over the file.
    chunk_record_counts: Vec<u64>,
}

/// Outcome of [`FileIndex::build`]: either a completed index, or an
/// acknowledgment that cancellation was observed before completion.
pub enum BuildOutcome {
    Completed(FileIndex),
    Cancelled,
}

impl FileIndex {
    /// Performs the single forward scan described in §4.2. Reports
    /// progress every `progress_interval_lines` physical lines through
    /// `on_progress`, and polls `cancel` at the same cadence.
    ///
    /// Also tallies, per `chunk_size`-line window, how many of those lines
    /// the grammar decoder accepts as records — this rides along on the
    /// same byte-by-byte pass rather than requiring a second decode pass
    /// over the file once the index is built.
    pub fn build(
        path: &Path,
        chunk_size: u64,
        progress_interval_lines: u64,
        on_progress: Option<&dyn Fn(u64)>,
        cancel: Option<&CancelToken>,
    ) -> Result<BuildOutcome> {
        let chunk_size = chunk_size.max(1);
        let file = File::open(path).map_err(|e| StoreError::from_open_error(path, e))?;
        let file_size = file
            .metadata()
            .map_err(|e| StoreError::FileReadFailed { path: path.to_path_buf(), source: e })?
            .len();

        let mut reader = BufReader::with_capacity(SCAN_BUFFER_SIZE, file);
        let mut offsets = vec![0u64];
        let mut buf = [0u8; SCAN_BUFFER_SIZE];
        let mut offset: u64 = 0;
        let mut line_count: u64 = 0;
        let mut line_buf: Vec<u8> = Vec::new();
        let mut chunk_record_counts: Vec<u64> = Vec::new();
        let mut current_chunk_record_count: u64 = 0;

        loop {
            let read = reader
                .read(&mut buf)
                .map_err(|e| StoreError::FileReadFailed { path: path.to_path_buf(), source: e })?;
            if read == 0 {
                break;
            }
            for &byte in &buf[..read] {
                offset += 1;
                if byte == b'\n' {
                    offsets.push(offset);

                    if line_count != 0 && line_count % chunk_size == 0 {
                        chunk_record_counts.push(current_chunk_record_count);
                        current_chunk_record_count = 0;
                    }
                    let text = String::from_utf8_lossy(&line_buf);
                    if grammar::decode_line(&text, None).is_some() {
                        current_chunk_record_count += 1;
                    }
                    line_buf.clear();

                    line_count += 1;

                    if line_count % progress_interval_lines == 0 {
                        if let Some(cb) = on_progress {
                            invoke_progress_callback(cb, line_count);
                        }
                        if cancel.is_some_and(CancelToken::is_cancelled) {
                            debug!(lines_scanned = line_count, "file index build cancelled");
                            return Ok(BuildOutcome::Cancelled);
                        }
                    }
                } else {
                    line_buf.push(byte);
                }
            }
        }

        // The terminal sentinel is the file size; a trailing partial line
        // (no final newline) is addressable through it even though it
        // wasn't counted in `line_count`.
        if *offsets.last().unwrap() != file_size {
            offsets.push(file_size);
        }
        chunk_record_counts.push(current_chunk_record_count);

        debug!(lines = line_count, bytes = file_size, "file index built");

        Ok(BuildOutcome::Completed(FileIndex {
            path: path.to_path_buf(),
            offsets,
            line_count,
            file_size,
            chunk_record_counts,
        }))
    }

    /// Total physical lines in the file, including lines that the
    /// grammar decoder will reject as non-records.
    pub fn line_count(&self) -> u64 {
        self.line_count
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Decoded record count per chunk, in chunk order, as tallied during
    /// the build scan. Length equals the chunk count at the `chunk_size`
    /// the index was built with.
    pub fn chunk_record_counts(&self) -> &[u64] {
        &self.chunk_record_counts
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The contiguous byte range covering up to `count` physical lines
    /// starting at `start_line`, clamped to file boundaries. A returned
    /// size of zero means no lines are available at `start_line`.
    pub fn line_range(&self, start_line: u64, count: u64) -> (u64, u64) {
        if start_line >= self.line_count {
            return (0, 0);
        }
        let end_line = (start_line + count).min(self.line_count);
        let start_offset = self.offsets[start_line as usize];
        let end_offset = self.offsets[end_line as usize];
        (start_offset, end_offset - start_offset)
    }
}

fn invoke_progress_callback(cb: &dyn Fn(u64), lines: u64) {
    // Progress callbacks are host code and must never be allowed to
    // bring down a scan in progress.
    let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| cb(lines)));
}
