//! Record Cache
//!
//! Bounded LRU map from a store offset to the raw frame written there.
//!
//! The cache mirrors the log and is never the source of truth. The store
//! patches cached frames whenever it patches a header field on disk, so a
//! cached frame always decodes to what a fresh read would return.

use std::num::NonZeroUsize;

use lru::LruCache;

/// LRU cache of encoded record frames keyed by store offset
pub struct Cache {
    entries: LruCache<u64, Vec<u8>>,
}

impl Cache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: LruCache::new(capacity),
        }
    }

    /// Insert or overwrite, marking the entry most recently used.
    /// Inserting a new key at capacity evicts the least recently used entry.
    pub fn put(&mut self, key: u64, value: Vec<u8>) {
        self.entries.put(key, value);
    }

    /// Look up an entry and mark it most recently used
    pub fn get(&mut self, key: u64) -> Option<&[u8]> {
        self.entries.get(&key).map(Vec::as_slice)
    }

    /// Overwrite the first `partial.len()` bytes of a cached value.
    /// No-op when the key is not cached.
    pub fn partial_update_from_zero_index(&mut self, key: u64, partial: &[u8]) {
        self.partial_update_at(key, 0, partial);
    }

    /// Overwrite `partial.len()` bytes of a cached value starting at `offset`.
    /// No-op when the key is not cached; recency is left untouched.
    pub fn partial_update_at(&mut self, key: u64, offset: usize, partial: &[u8]) {
        let Some(value) = self.entries.peek_mut(&key) else {
            return;
        };

        let end = offset + partial.len();
        if end > value.len() {
            // A shorter cached value cannot mirror the patched frame.
            tracing::warn!(
                "Dropping cached entry {}: patch [{}..{}) exceeds {} bytes",
                key,
                offset,
                end,
                value.len()
            );
            self.entries.pop(&key);
            return;
        }

        value[offset..end].copy_from_slice(partial);
    }

    /// Lengths of all cached values, most recently used first
    pub fn size_list(&self) -> Vec<usize> {
        self.entries.iter().map(|(_, v)| v.len()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }

    pub fn contains(&self, key: u64) -> bool {
        self.entries.contains(&key)
    }
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("len", &self.entries.len())
            .field("capacity", &self.entries.cap())
            .finish()
    }
}
