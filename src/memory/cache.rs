//! Bounded cache of previously read remote ranges

use super::buffer::MemoryBuffer;
use crate::core::types::{Address, MemoryResult};
use crate::process::ProcessHandle;
use std::collections::VecDeque;
use tracing::trace;

/// Cache entry for one read range
#[derive(Debug, Clone)]
struct CacheEntry {
    address: Address,
    data: Vec<u8>,
}

impl CacheEntry {
    fn slice(&self, address: Address, size: usize) -> Option<&[u8]> {
        let start = address.distance_from(self.address)? as usize;
        let end = start.checked_add(size)?;
        self.data.get(start..end)
    }
}

/// Cache of read ranges, bounded by entry count.
///
/// A lookup hits when one entry fully covers the requested range. When
/// full, the oldest inserted entry is dropped. Entries never expire on
/// their own; call [`RegionCache::clear`] to start a fresh pass.
#[derive(Debug)]
pub struct RegionCache {
    entries: VecDeque<CacheEntry>,
    max_entries: usize,
    hits: u64,
    misses: u64,
}

impl RegionCache {
    /// Create a new cache holding at most `max_entries` ranges
    pub fn new(max_entries: usize) -> Self {
        RegionCache {
            entries: VecDeque::new(),
            max_entries: max_entries.max(1),
            hits: 0,
            misses: 0,
        }
    }

    /// Get cached bytes if one entry covers `[address, address + size)`
    pub fn get(&mut self, address: Address, size: usize) -> Option<&[u8]> {
        let found = self
            .entries
            .iter()
            .position(|e| e.slice(address, size).is_some());

        match found {
            Some(index) => {
                self.hits += 1;
                self.entries[index].slice(address, size)
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Store a range, evicting the oldest entry if the cache is full
    pub fn put(&mut self, address: Address, data: Vec<u8>) {
        self.entries.retain(|e| e.address != address);
        if self.entries.len() >= self.max_entries {
            if let Some(evicted) = self.entries.pop_front() {
                trace!("Evicted cached range at {}", evicted.address);
            }
        }
        self.entries.push_back(CacheEntry { address, data });
    }

    /// Returns a buffer for the range, reading the target only on a miss
    pub fn load_buffer(
        &mut self,
        handle: &ProcessHandle,
        address: Address,
        size: usize,
    ) -> MemoryResult<MemoryBuffer> {
        let pointer_size = handle.pointer_size();
        if let Some(bytes) = self.get(address, size) {
            return Ok(MemoryBuffer::from_bytes(address, bytes.to_vec(), pointer_size));
        }

        let buffer = MemoryBuffer::load(handle, address, size)?;
        self.put(address, buffer.as_bytes().to_vec());
        Ok(buffer)
    }

    /// Clear the cache
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(hits, misses)` since creation
    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }
}
