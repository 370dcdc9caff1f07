//! The facade a host drives: load a file, page through it, filter it,
//! and keep resolvers current.

use std::collections::hash_map::DefaultHasher;
use std::fs::File;
use std::hash::{Hash, Hasher};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tracing::{debug, info};

use crate::cache::{ChunkCache, FileIdentity};
use crate::chunk::ChunkLoader;
use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::filter;
use crate::grammar;
use crate::index::{BuildOutcome, CancelToken, FileIndex};
use crate::predicate::Predicate;
use crate::record::Record;
use crate::resolver::{AliasResolver, InterfaceResolver, RuleLabelResolver};

/// The store's addressing mode, per §4.7's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Unfiltered,
    Filtered,
}

/// Cumulative decoded-record counts per chunk, used to translate a global
/// record index into a chunk id and in-chunk offset without redecoding.
struct RecordLayout {
    /// `cumulative[i]` = total records in chunks `0..i`. Length = chunk_count + 1.
    cumulative: Vec<u64>,
}

impl RecordLayout {
    fn from_chunk_counts(chunk_record_counts: &[u64]) -> Self {
        let mut cumulative = Vec::with_capacity(chunk_record_counts.len() + 1);
        cumulative.push(0);
        let mut total = 0u64;
        for &count in chunk_record_counts {
            total += count;
            cumulative.push(total);
        }
        RecordLayout { cumulative }
    }

    fn total_records(&self) -> u64 {
        *self.cumulative.last().unwrap_or(&0)
    }

    /// Finds the chunk containing global record index `global`, returning
    /// `(chunk_id, offset_within_chunk)`.
    fn locate(&self, global: u64) -> Option<(u64, u64)> {
        if global >= self.total_records() {
            return None;
        }
        // `cumulative` is non-decreasing; partition_point finds the first
        // chunk boundary strictly greater than `global`.
        let chunk_id = self.cumulative.partition_point(|&c| c <= global) - 1;
        let offset = global - self.cumulative[chunk_id];
        Some((chunk_id as u64, offset))
    }
}

/// The full external-facing occupancy report from §6's `memory_info`,
/// combining the chunk cache's view with the store's own record counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryInfo {
    pub chunks_in_memory: usize,
    pub records_cached: usize,
    pub estimated_bytes: u64,
    pub total_records: u64,
    pub filtered_records: u64,
    pub chunk_size: u64,
}

/// Live resolver state, hot-swappable without interrupting in-flight reads.
#[derive(Default)]
struct Resolvers {
    interface: ArcSwapOption<dyn InterfaceResolver>,
    rule_label: ArcSwapOption<dyn RuleLabelResolver>,
    alias: ArcSwapOption<dyn AliasResolver>,
}

/// The streaming, filterable record store.
pub struct VirtualStore {
    config: StoreConfig,
    cache: ChunkCache,
    resolvers: Resolvers,
    loaded: Option<LoadedFile>,
}

struct LoadedFile {
    path: PathBuf,
    identity: FileIdentity,
    index: FileIndex,
    layout: RecordLayout,
    mode: Mode,
    matches: Vec<u64>,
}

impl Default for VirtualStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

impl VirtualStore {
    pub fn new(config: StoreConfig) -> Self {
        VirtualStore {
            cache: ChunkCache::new(config.cache_chunks),
            resolvers: Resolvers::default(),
            loaded: None,
            config,
        }
    }

    /// Opens `path` and builds its line index in a single forward scan,
    /// which also tallies decoded-record counts per chunk along the way so
    /// unfiltered addressing never needs to redecode the file on `get`.
    /// Resets the store to UNFILTERED with an empty cache.
    pub fn load(&mut self, path: &Path, on_progress: Option<&dyn Fn(u64)>, cancel: Option<&CancelToken>) -> Result<()> {
        info!(path = %path.display(), "loading file");
        self.cache.clear();

        let index = match FileIndex::build(path, self.config.chunk_size, self.config.progress_interval_lines, on_progress, cancel)? {
            BuildOutcome::Completed(idx) => idx,
            BuildOutcome::Cancelled => return Err(StoreError::Cancelled),
        };

        let identity = file_identity(path);
        let layout = RecordLayout::from_chunk_counts(index.chunk_record_counts());

        info!(records = layout.total_records(), "file loaded");

        self.loaded = Some(LoadedFile {
            path: path.to_path_buf(),
            identity,
            index,
            layout,
            mode: Mode::Unfiltered,
            matches: Vec::new(),
        });
        Ok(())
    }

    /// Discards the loaded file's index, matches, and cached chunks.
    pub fn close(&mut self) {
        self.cache.clear();
        self.loaded = None;
    }

    /// Total addressable records in the current mode.
    pub fn total(&self) -> u64 {
        match &self.loaded {
            None => 0,
            Some(loaded) => match loaded.mode {
                Mode::Unfiltered => loaded.layout.total_records(),
                Mode::Filtered => loaded.matches.len() as u64,
            },
        }
    }

    /// Returns up to `count` records starting at logical index `start`,
    /// addressed according to the current mode.
    pub fn get(&self, start: u64, count: u64) -> Result<Vec<Record>> {
        let loaded = self.loaded.as_ref().ok_or(StoreError::IndexUnbuilt)?;
        match loaded.mode {
            Mode::Unfiltered => self.get_unfiltered(loaded, start, count),
            Mode::Filtered => self.get_filtered(loaded, start, count),
        }
    }

    fn get_unfiltered(&self, loaded: &LoadedFile, start: u64, count: u64) -> Result<Vec<Record>> {
        let total = loaded.layout.total_records();
        if start >= total {
            return Ok(Vec::new());
        }
        let end = (start + count).min(total);
        let mut out = Vec::with_capacity((end - start) as usize);

        let mut global = start;
        while global < end {
            let (chunk_id, offset) = loaded.layout.locate(global).expect("within total_records");
            let chunk = self.load_chunk(loaded, chunk_id)?;
            let take = ((end - global) as usize).min(chunk.len() - offset as usize);
            out.extend(chunk[offset as usize..offset as usize + take].iter().cloned());
            global += take as u64;
        }
        Ok(out)
    }

    fn get_filtered(&self, loaded: &LoadedFile, start: u64, count: u64) -> Result<Vec<Record>> {
        let total = loaded.matches.len() as u64;
        if start >= total {
            return Ok(Vec::new());
        }
        let end = (start + count).min(total);
        let window = &loaded.matches[start as usize..end as usize];

        // Group by chunk id for locality: consecutive matches frequently
        // share a chunk, so this avoids redundant cache lookups.
        let mut out = Vec::with_capacity(window.len());
        let mut current_chunk_id: Option<u64> = None;
        let mut current_chunk: Option<Arc<Vec<Record>>> = None;

        for &global in window {
            let (chunk_id, offset) = loaded.layout.locate(global).expect("match indices are always in range");
            if current_chunk_id != Some(chunk_id) {
                current_chunk = Some(self.load_chunk(loaded, chunk_id)?);
                current_chunk_id = Some(chunk_id);
            }
            let chunk = current_chunk.as_ref().unwrap();
            out.push(chunk[offset as usize].clone());
        }
        Ok(out)
    }

    fn load_chunk(&self, loaded: &LoadedFile, chunk_id: u64) -> Result<Arc<Vec<Record>>> {
        let loader = ChunkLoader::new(&loaded.path, &loaded.index, &self.cache, loaded.identity, self.config.chunk_size);
        let resolver = self.resolvers.interface.load();
        loader.load(chunk_id, resolver.as_deref())
    }

    /// Runs `predicate` over the whole file in parallel and switches the
    /// store into FILTERED mode with the resulting match list.
    pub fn apply_filter(
        &mut self,
        predicate: &Predicate,
        on_progress: Option<&dyn Fn(f64)>,
        cancel: Option<&CancelToken>,
    ) -> Result<()> {
        let loaded = self.loaded.as_mut().ok_or(StoreError::IndexUnbuilt)?;
        let interface_resolver = self.resolvers.interface.load();
        let rule_label_resolver = self.resolvers.rule_label.load();

        let outcome = filter::run(
            &loaded.path,
            &loaded.index,
            self.config.chunk_size,
            self.config.worker_count,
            predicate,
            interface_resolver.as_deref(),
            rule_label_resolver.as_deref(),
            cancel,
            on_progress,
        )?;

        if outcome.cancelled {
            return Err(StoreError::Cancelled);
        }

        debug!(matches = outcome.matches.len(), "filter applied");
        loaded.matches = outcome.matches;
        loaded.mode = Mode::Filtered;
        Ok(())
    }

    /// Returns to UNFILTERED mode, discarding the match list.
    pub fn clear_filter(&mut self) {
        if let Some(loaded) = self.loaded.as_mut() {
            loaded.mode = Mode::Unfiltered;
            loaded.matches.clear();
        }
    }

    pub fn set_interface_resolver(&self, resolver: Option<Arc<dyn InterfaceResolver>>) {
        self.resolvers.interface.store(resolver);
        self.cache.clear();
    }

    pub fn set_rule_label_resolver(&self, resolver: Option<Arc<dyn RuleLabelResolver>>) {
        self.resolvers.rule_label.store(resolver);
        self.cache.clear();
    }

    pub fn set_alias_resolver(&self, resolver: Option<Arc<dyn AliasResolver>>) {
        self.resolvers.alias.store(resolver);
        self.cache.clear();
    }

    /// Reports current cache occupancy alongside total and filtered record
    /// counts, per §6's `memory_info` operation.
    pub fn memory_info(&self) -> MemoryInfo {
        let cache = self.cache.memory_info();
        let (total_records, filtered_records) = match &self.loaded {
            None => (0, 0),
            Some(loaded) => {
                let total = loaded.layout.total_records();
                let filtered = if loaded.mode == Mode::Filtered { loaded.matches.len() as u64 } else { 0 };
                (total, filtered)
            }
        };
        MemoryInfo {
            chunks_in_memory: cache.resident_chunks,
            records_cached: cache.resident_records,
            estimated_bytes: cache.estimated_bytes,
            total_records,
            filtered_records,
            chunk_size: self.config.chunk_size,
        }
    }

    /// The alias resolver currently installed, if any. Not consulted by
    /// the core itself; exposed so a host can enrich fields for display.
    pub fn alias_resolver(&self) -> Option<Arc<dyn AliasResolver>> {
        self.resolvers.alias.load_full()
    }

    /// Reads the last `n` decoded records without requiring a built index,
    /// by seeking backward from EOF in fixed-size blocks. Does not touch
    /// the LRU cache or the current filtered state.
    pub fn tail(&self, n: usize) -> Result<Vec<Record>> {
        let loaded = self.loaded.as_ref().ok_or(StoreError::IndexUnbuilt)?;
        let interface_resolver = self.resolvers.interface.load();
        tail_read(&loaded.path, n, self.config.tail_block_size, interface_resolver.as_deref())
    }
}

/// A simple, process-local identity for a file path. Good enough to key
/// the chunk cache; does not attempt to detect hardlinks or renames.
fn file_identity(path: &Path) -> FileIdentity {
    let mut hasher = DefaultHasher::new();
    path.hash(&mut hasher);
    hasher.finish()
}

fn tail_read(
    path: &Path,
    n: usize,
    block_size: usize,
    interface_resolver: Option<&dyn InterfaceResolver>,
) -> Result<Vec<Record>> {
    if n == 0 {
        return Ok(Vec::new());
    }

    let mut file = File::open(path).map_err(|e| StoreError::from_open_error(path, e))?;
    let file_size = file
        .metadata()
        .map_err(|e| StoreError::FileReadFailed { path: path.to_path_buf(), source: e })?
        .len();

    let mut collected = Vec::new();
    let mut newline_count = 0usize;
    let mut position = file_size;

    while position > 0 && newline_count <= n {
        let read_size = block_size.min(position as usize);
        position -= read_size as u64;

        file.seek(SeekFrom::Start(position))
            .map_err(|e| StoreError::FileReadFailed { path: path.to_path_buf(), source: e })?;
        let mut block = vec![0u8; read_size];
        file.read_exact(&mut block)
            .map_err(|e| StoreError::FileReadFailed { path: path.to_path_buf(), source: e })?;

        newline_count += block.iter().filter(|&&b| b == b'\n').count();
        block.extend_from_slice(&collected);
        collected = block;
    }

    let text = String::from_utf8_lossy(&collected);
    let decoded: Vec<Record> = text
        .lines()
        .filter_map(|line| grammar::decode_line(line, interface_resolver))
        .collect();

    let start = decoded.len().saturating_sub(n);
    Ok(decoded[start..].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn line(action: &str) -> String {
        format!(
            "2024-01-15T10:30:45 host filterlog: 0,0,,0,em0,match,{action},in,4,0x0,64,1,0,none,6,tcp,60,10.0.0.1,10.0.0.2,1000,80,0,S,0,0,0,"
        )
    }

    fn fixture(n: usize) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        for i in 0..n {
            let action = if i % 2 == 0 { "pass" } else { "block" };
            writeln!(file, "{}", line(action)).unwrap();
        }
        file.flush().unwrap();
        file
    }

    #[test]
    fn load_then_total_reports_record_count() {
        let file = fixture(10);
        let mut store = VirtualStore::new(StoreConfig { chunk_size: 3, ..StoreConfig::default() });
        store.load(file.path(), None, None).unwrap();
        assert_eq!(store.total(), 10);
    }

    #[test]
    fn unfiltered_get_returns_requested_range_in_order() {
        let file = fixture(10);
        let mut store = VirtualStore::new(StoreConfig { chunk_size: 3, ..StoreConfig::default() });
        store.load(file.path(), None, None).unwrap();
        let records = store.get(2, 4).unwrap();
        assert_eq!(records.len(), 4);
    }

    #[test]
    fn apply_filter_switches_mode_and_total() {
        let file = fixture(10);
        let mut store = VirtualStore::new(StoreConfig { chunk_size: 3, ..StoreConfig::default() });
        store.load(file.path(), None, None).unwrap();

        let predicate = Predicate::new(
            vec![crate::predicate::Condition::new("action", crate::predicate::Operator::Eq, "pass", true).unwrap()],
            Vec::new(),
            None,
        );
        store.apply_filter(&predicate, None, None).unwrap();
        assert_eq!(store.total(), 5);

        store.clear_filter();
        assert_eq!(store.total(), 10);
    }

    #[test]
    fn get_before_load_is_index_unbuilt() {
        let store = VirtualStore::default();
        let err = store.get(0, 1).unwrap_err();
        assert!(matches!(err, StoreError::IndexUnbuilt));
    }

    #[test]
    fn tail_returns_last_n_records_without_loading() {
        let file = fixture(20);
        let mut store = VirtualStore::default();
        store.load(file.path(), None, None).unwrap();
        let tail = store.tail(3).unwrap();
        assert_eq!(tail.len(), 3);
    }

    #[test]
    fn tail_works_even_with_more_requested_than_available() {
        let file = fixture(2);
        let mut store = VirtualStore::default();
        store.load(file.path(), None, None).unwrap();
        let tail = store.tail(100).unwrap();
        assert_eq!(tail.len(), 2);
    }

    #[test]
    fn resolver_swap_clears_cache() {
        let file = fixture(5);
        let mut store = VirtualStore::new(StoreConfig { chunk_size: 2, ..StoreConfig::default() });
        store.load(file.path(), None, None).unwrap();
        store.get(0, 2).unwrap();
        assert!(store.memory_info().chunks_in_memory > 0);

        store.set_interface_resolver(None);
        assert_eq!(store.memory_info().chunks_in_memory, 0);
    }

    #[test]
    fn record_layout_locates_global_index_across_chunks() {
        let layout = RecordLayout::from_chunk_counts(&[3, 2, 0, 4]);
        assert_eq!(layout.locate(0), Some((0, 0)));
        assert_eq!(layout.locate(2), Some((0, 2)));
        assert_eq!(layout.locate(3), Some((1, 0)));
        assert_eq!(layout.locate(5), Some((3, 0)));
        assert_eq!(layout.total_records(), 9);
        assert_eq!(layout.locate(9), None);
    }
}
