//! Resolves a chunk id to decoded records, reading through the LRU cache.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;

use crate::cache::{ChunkCache, FileIdentity};
use crate::error::{Result, StoreError};
use crate::grammar;
use crate::index::FileIndex;
use crate::record::Record;
use crate::resolver::InterfaceResolver;

/// Loads chunks of decoded records from a file, transparently caching
/// them. Non-record lines within a chunk's byte range are decoded and
/// silently dropped; they never surface as errors or placeholders.
pub struct ChunkLoader<'a> {
    path: &'a Path,
    index: &'a FileIndex,
    cache: &'a ChunkCache,
    file_identity: FileIdentity,
    chunk_size: u64,
}

impl<'a> ChunkLoader<'a> {
    pub fn new(
        path: &'a Path,
        index: &'a FileIndex,
        cache: &'a ChunkCache,
        file_identity: FileIdentity,
        chunk_size: u64,
    ) -> Self {
        ChunkLoader { path, index, cache, file_identity, chunk_size }
    }

    /// Number of chunks covering the whole file at the configured chunk size.
    pub fn chunk_count(&self) -> u64 {
        self.index.line_count().div_ceil(self.chunk_size).max(1)
    }

    /// Returns the decoded records for `chunk_id`, using the interface
    /// resolver in effect at call time. A cache hit skips the read and
    /// decode entirely.
    pub fn load(
        &self,
        chunk_id: u64,
        interface_resolver: Option<&dyn InterfaceResolver>,
    ) -> Result<Arc<Vec<Record>>> {
        if let Some(cached) = self.cache.get(self.file_identity, chunk_id) {
            return Ok(cached);
        }

        let start_line = chunk_id * self.chunk_size;
        let (offset, size) = self.index.line_range(start_line, self.chunk_size);
        let records = if size == 0 {
            Arc::new(Vec::new())
        } else {
            let raw = read_range(self.path, offset, size)?;
            let text = String::from_utf8_lossy(&raw);
            let decoded: Vec<Record> = text
                .lines()
                .filter_map(|line| grammar::decode_line(line, interface_resolver))
                .collect();
            Arc::new(decoded)
        };

        self.cache.put(self.file_identity, chunk_id, records.clone());
        Ok(records)
    }
}

pub(crate) fn read_range(path: &Path, offset: u64, size: u64) -> Result<Vec<u8>> {
    let mut file = File::open(path).map_err(|e| StoreError::from_open_error(path, e))?;
    file.seek(SeekFrom::Start(offset))
        .map_err(|e| StoreError::FileReadFailed { path: path.to_path_buf(), source: e })?;
    let mut buf = vec![0u8; size as usize];
    file.read_exact(&mut buf)
        .map_err(|e| StoreError::FileReadFailed { path: path.to_path_buf(), source: e })?;
    Ok(buf)
}
