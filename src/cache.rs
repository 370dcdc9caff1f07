//! Thread-safe, size-bounded LRU cache of decoded chunks.
//!
//! Keyed on `(file identity, chunk id)` so a cache built against one file
//! is never accidentally served to another — important once a store's
//! `load`/`close` cycle reuses the same in-process cache instance across
//! files.

use std::hash::Hash;
use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::Mutex;

use crate::record::Record;

/// Identifies which file a cached chunk belongs to. Two loads of the same
/// path are treated as the same identity; a `close`/`load` cycle against a
/// different path gets a fresh identity and so never serves stale chunks.
pub type FileIdentity = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CacheKey {
    file: FileIdentity,
    chunk_id: u64,
}

struct Entry {
    key: CacheKey,
    records: Arc<Vec<Record>>,
}

/// A bounded least-recently-used cache of decoded chunks.
///
/// Internally backed by an insertion-ordered `Vec` of entries plus a hash
/// index; `capacity` is expected to stay in the tens, so a linear move of
/// the touched entry to the back is cheaper in practice than maintaining
/// an intrusive linked list.
pub struct ChunkCache {
    inner: Mutex<Inner>,
}

struct Inner {
    capacity: usize,
    entries: Vec<Entry>,
    index: AHashMap<CacheKey, usize>,
}

/// A snapshot of cache occupancy, for [`crate::store::VirtualStore::memory_info`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheMemoryInfo {
    pub resident_chunks: usize,
    pub capacity_chunks: usize,
    pub resident_records: usize,
    /// Heuristic estimate of resident bytes: each record's raw line plus a
    /// fixed per-record overhead for its field map and bookkeeping.
    pub estimated_bytes: u64,
}

/// Fixed per-record overhead assumed on top of `raw_line.len()` when
/// estimating resident bytes: the decoded field map, the digest string,
/// and struct/allocator bookkeeping. Not exact, only a ballpark for
/// `memory_info` callers deciding whether to shrink `cache_chunks`.
const ESTIMATED_OVERHEAD_PER_RECORD: u64 = 256;

impl ChunkCache {
    pub fn new(capacity: usize) -> Self {
        ChunkCache {
            inner: Mutex::new(Inner {
                capacity: capacity.max(1),
                entries: Vec::with_capacity(capacity),
                index: AHashMap::default(),
            }),
        }
    }

    /// Returns the cached chunk if present, marking it most-recently-used.
    pub fn get(&self, file: FileIdentity, chunk_id: u64) -> Option<Arc<Vec<Record>>> {
        let key = CacheKey { file, chunk_id };
        let mut inner = self.inner.lock();
        let pos = *inner.index.get(&key)?;
        let entry = inner.entries.remove(pos);
        let records = entry.records.clone();
        inner.entries.push(entry);
        inner.reindex_from(pos);
        Some(records)
    }

    /// Inserts or replaces a chunk, evicting the least-recently-used
    /// entry if the cache is at capacity.
    pub fn put(&self, file: FileIdentity, chunk_id: u64, records: Arc<Vec<Record>>) {
        let key = CacheKey { file, chunk_id };
        let mut inner = self.inner.lock();

        if let Some(&pos) = inner.index.get(&key) {
            inner.entries.remove(pos);
            inner.reindex_from(pos);
        } else if inner.entries.len() >= inner.capacity {
            inner.entries.remove(0);
            inner.reindex_from(0);
        }

        inner.entries.push(Entry { key, records });
        let new_pos = inner.entries.len() - 1;
        inner.index.insert(key, new_pos);
    }

    /// Drops every cached chunk. Called whenever a resolver is hot-swapped
    /// (resolved fields like `interface_display` would otherwise go stale)
    /// and whenever a store is `close`d.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.index.clear();
    }

    pub fn memory_info(&self) -> CacheMemoryInfo {
        let inner = self.inner.lock();
        let mut resident_records = 0usize;
        let mut estimated_bytes = 0u64;
        for entry in &inner.entries {
            resident_records += entry.records.len();
            for record in entry.records.iter() {
                estimated_bytes += record.raw_line.len() as u64 + ESTIMATED_OVERHEAD_PER_RECORD;
            }
        }
        CacheMemoryInfo {
            resident_chunks: inner.entries.len(),
            capacity_chunks: inner.capacity,
            resident_records,
            estimated_bytes,
        }
    }
}

impl Inner {
    /// Rebuilds index entries for everything at or after `from`, since a
    /// removal or move shifts every later position down by one.
    fn reindex_from(&mut self, from: usize) {
        for (i, entry) in self.entries.iter().enumerate().skip(from) {
            self.index.insert(entry.key, i);
        }
    }
}
