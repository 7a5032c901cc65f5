//! Shard scanner
//!
//! Sequential iteration over every live record of one or more shards.

use crate::error::Result;
use crate::record::Record;
use crate::store::Store;

use super::chain::{materialize, read_chain_node};
use super::shard::Index;

/// Lazy, single-pass iterator over live records
///
/// Shards are visited in slice order, cells in slot order, chains head to
/// tail. Each record comes back with its value chain materialized. The
/// iterator ends after the first error.
pub struct Scanner<'a> {
    shards: &'a [Index],
    store: &'a mut Store,

    /// Shard currently being walked
    shard: usize,

    /// Next slot to look at in that shard
    slot: u64,

    /// Next node of the chain being walked
    next: Option<u64>,

    failed: bool,
}

impl<'a> Scanner<'a> {
    pub(crate) fn new(shards: &'a [Index], store: &'a mut Store) -> Self {
        Self {
            shards,
            store,
            shard: 0,
            slot: 0,
            next: None,
            failed: false,
        }
    }

    /// Move to the head of the next non-empty slot; `false` when exhausted
    fn advance(&mut self) -> bool {
        while let Some(index) = self.shards.get(self.shard) {
            while self.slot < index.capacity() {
                let slot = self.slot;
                self.slot += 1;
                if let Some(head) = index.head(slot) {
                    self.next = Some(head);
                    return true;
                }
            }
            self.shard += 1;
            self.slot = 0;
        }
        false
    }

    fn step(&mut self, position: u64) -> Result<Option<Record>> {
        let record = read_chain_node(self.store, position)?;
        self.next = record.key_link();
        if record.tombstone {
            return Ok(None);
        }
        materialize(self.store, record).map(Some)
    }
}

impl<'a> Iterator for Scanner<'a> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.failed {
            let position = match self.next {
                Some(position) => position,
                None => {
                    if self.advance() {
                        continue;
                    }
                    return None;
                }
            };

            match self.step(position) {
                Ok(Some(record)) => return Some(Ok(record)),
                Ok(None) => continue,
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }
        None
    }
}
