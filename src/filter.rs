//! Parallel evaluation of a [`Predicate`] across an entire indexed file.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;

use parking_lot::Mutex;
use rayon::prelude::*;

use crate::error::Result;
use crate::grammar;
use crate::index::{CancelToken, FileIndex};
use crate::predicate::Predicate;
use crate::resolver::{InterfaceResolver, RuleLabelResolver};

/// Outcome of a full-file filter pass.
pub struct FilterOutcome {
    /// Ascending, globally-unique record indices that matched, counting
    /// only records the grammar decoder accepted.
    pub matches: Vec<u64>,
    /// Per-chunk decoded record counts, in chunk order. Combined with the
    /// file index this lets a virtual store translate a global record
    /// index back into a chunk id and offset without redecoding the file.
    pub chunk_record_counts: Vec<u64>,
    pub cancelled: bool,
}

/// Runs `predicate` over every line `index` knows about, fanning chunk
/// jobs out across a `rayon` thread pool sized by `worker_count`. Falls
/// back to running the same per-job logic on the current thread if the
/// pool cannot be built.
pub fn run(
    path: &Path,
    index: &FileIndex,
    chunk_size: u64,
    worker_count: usize,
    predicate: &Predicate,
    interface_resolver: Option<&dyn InterfaceResolver>,
    rule_label_resolver: Option<&dyn RuleLabelResolver>,
    cancel: Option<&CancelToken>,
    on_progress: Option<&dyn Fn(f64)>,
) -> Result<FilterOutcome> {
    let chunk_count = index.line_count().div_ceil(chunk_size).max(1);
    let progress_guard = Mutex::new(());

    let run_job = |chunk_id: u64| -> Result<(Vec<u64>, u64)> {
        job(path, index, chunk_size, chunk_id, predicate, interface_resolver, rule_label_resolver)
    };

    let report_progress = |completed: u64| {
        if let Some(cb) = on_progress {
            let percent = (completed as f64 / chunk_count as f64) * 100.0;
            let _guard = progress_guard.lock();
            let _ = catch_unwind(AssertUnwindSafe(|| cb(percent)));
        }
    };

    let results: Vec<Option<Result<(Vec<u64>, u64)>>> = match rayon::ThreadPoolBuilder::new()
        .num_threads(worker_count.max(1))
        .build()
    {
        Ok(pool) => pool.install(|| {
            (0..chunk_count)
                .into_par_iter()
                .map(|chunk_id| {
                    if cancel.is_some_and(CancelToken::is_cancelled) {
                        return None;
                    }
                    let result = run_job(chunk_id);
                    report_progress(chunk_id + 1);
                    Some(result)
                })
                .collect()
        }),
        Err(_) => {
            tracing::warn!("rayon thread pool unavailable, falling back to single-worker filtering");
            (0..chunk_count)
                .map(|chunk_id| {
                    if cancel.is_some_and(CancelToken::is_cancelled) {
                        return None;
                    }
                    let result = run_job(chunk_id);
                    report_progress(chunk_id + 1);
                    Some(result)
                })
                .collect()
        }
    };

    if results.iter().any(Option::is_none) {
        return Ok(FilterOutcome { matches: Vec::new(), chunk_record_counts: Vec::new(), cancelled: true });
    }

    // Jobs report chunk-relative match offsets because the global base for
    // chunk N (the sum of decoded-record counts of chunks 0..N) isn't known
    // until every chunk has finished decoding. Results are collected here in
    // chunk-id order regardless of completion order, so a prefix sum over
    // `chunk_record_counts` recovers each chunk's base in one pass.
    let mut per_chunk = Vec::with_capacity(chunk_count as usize);
    let mut chunk_record_counts = Vec::with_capacity(chunk_count as usize);
    for result in results {
        let (chunk_matches, record_count) = result.expect("checked above")?;
        per_chunk.push(chunk_matches);
        chunk_record_counts.push(record_count);
    }

    let mut matches = Vec::new();
    let mut base: u64 = 0;
    for (chunk_matches, record_count) in per_chunk.into_iter().zip(&chunk_record_counts) {
        matches.extend(chunk_matches.into_iter().map(|rel| base + rel));
        base += record_count;
    }
    matches.sort_unstable();

    Ok(FilterOutcome { matches, chunk_record_counts, cancelled: false })
}

/// Decodes and evaluates one chunk, returning its matching global record
/// indices (relative to the whole file) and its total decoded record
/// count.
fn job(
    path: &Path,
    index: &FileIndex,
    chunk_size: u64,
    chunk_id: u64,
    predicate: &Predicate,
    interface_resolver: Option<&dyn InterfaceResolver>,
    rule_label_resolver: Option<&dyn RuleLabelResolver>,
) -> Result<(Vec<u64>, u64)> {
    let start_line = chunk_id * chunk_size;
    let (offset, size) = index.line_range(start_line, chunk_size);
    if size == 0 {
        return Ok((Vec::new(), 0));
    }

    let raw = crate::chunk::read_range(path, offset, size)?;
    let text = String::from_utf8_lossy(&raw);

    // Chunk-relative: index 0 is this chunk's first decoded record. `run`
    // rewrites these against the global base once all chunks are counted.
    let mut matches = Vec::new();
    let mut record_count: u64 = 0;
    for line in text.lines() {
        let Some(record) = grammar::decode_line(line, interface_resolver) else {
            continue;
        };
        if predicate.matches(&record, rule_label_resolver) {
            matches.push(record_count);
        }
        record_count += 1;
    }

    Ok((matches, record_count))
}
