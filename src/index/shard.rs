//! Index shard
//!
//! One fixed-capacity slot table persisted as a file of `u64` cells.

use std::collections::BTreeSet;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use bytes::{Buf, BufMut};

use crate::config::Config;
use crate::error::{ChainError, Result};
use crate::record::Record;
use crate::store::Store;

use super::chain::{materialize, Chain, ChainLink};
use super::scanner::Scanner;
use super::{slot_for, CELL_SIZE, EMPTY_CELL};

/// How `Index::put` placed a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insertion {
    /// The slot was empty; the record is the whole chain
    NewSlot { slot: u64 },
    /// A new key joined an occupied slot as its new head
    Chained { slot: u64 },
    /// The key existed; the record at `previous` was unlinked and the new one
    /// became the head
    Replaced { slot: u64, previous: u64 },
    /// The record was already the indexed version of the key
    Unchanged { slot: u64 },
}

impl Insertion {
    pub fn slot(&self) -> u64 {
        match *self {
            Insertion::NewSlot { slot }
            | Insertion::Chained { slot }
            | Insertion::Replaced { slot, .. }
            | Insertion::Unchanged { slot } => slot,
        }
    }

    /// Whether the key was not indexed before
    pub fn is_new_key(&self) -> bool {
        matches!(self, Insertion::NewSlot { .. } | Insertion::Chained { .. })
    }
}

/// A hash index shard
///
/// Cells are mirrored in memory and written through to the shard file on
/// every change; `flush` makes the writes durable. While the store is
/// batching, changed cells stay in memory until the next `flush`, so the file
/// never points at a record that is not yet in the log file.
pub struct Index {
    id: u64,
    path: PathBuf,
    file: File,
    cells: Vec<u64>,
    capacity: u64,

    /// Distinct keys the shard accepts before refusing new ones
    max_keys: u64,

    /// Live keys currently indexed
    load: u64,

    /// Cell writes since the last fsync
    dirty: bool,

    /// Slots changed during a batch and not yet written to the file
    pending: BTreeSet<u64>,
}

impl Index {
    /// Create a new shard file with every cell empty
    pub fn create(path: &Path, id: u64, config: &Config) -> Result<Self> {
        let capacity = checked_capacity(config)?;
        let mut file = OpenOptions::new()
            .create_new(true)
            .read(true)
            .write(true)
            .open(path)?;

        let mut bytes = Vec::with_capacity(capacity as usize * CELL_SIZE);
        for _ in 0..capacity {
            bytes.put_u64_le(EMPTY_CELL);
        }
        file.write_all(&bytes)?;
        file.sync_all()?;

        tracing::info!(
            "Created index shard {} at {} ({} slots, {} keys max)",
            id,
            path.display(),
            capacity,
            config.max_keys_per_shard()
        );

        Ok(Self {
            id,
            path: path.to_path_buf(),
            file,
            cells: vec![EMPTY_CELL; capacity as usize],
            capacity,
            max_keys: config.max_keys_per_shard(),
            load: 0,
            dirty: false,
            pending: BTreeSet::new(),
        })
    }

    /// Open an existing shard file and recount its keys from the store
    pub fn open(path: &Path, id: u64, config: &Config, store: &mut Store) -> Result<Self> {
        let capacity = checked_capacity(config)?;
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;

        let expected = capacity * CELL_SIZE as u64;
        let actual = file.metadata()?.len();
        if actual != expected {
            return Err(ChainError::Config(format!(
                "shard {} is {} bytes but a capacity of {} needs {}",
                path.display(),
                actual,
                capacity,
                expected
            )));
        }

        let mut raw = Vec::with_capacity(expected as usize);
        file.read_to_end(&mut raw)?;
        let mut reader = raw.as_slice();
        let cells: Vec<u64> = (0..capacity).map(|_| reader.get_u64_le()).collect();

        let mut index = Self {
            id,
            path: path.to_path_buf(),
            file,
            cells,
            capacity,
            max_keys: config.max_keys_per_shard(),
            load: 0,
            dirty: false,
            pending: BTreeSet::new(),
        };
        index.load = index.count_live(store)?;

        tracing::info!(
            "Opened index shard {} at {} ({} keys)",
            id,
            path.display(),
            index.load
        );
        Ok(index)
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Slot of `key` in this shard
    pub fn get_index(&self, key: &str) -> u64 {
        slot_for(key, self.capacity)
    }

    /// Publish the record at `position` as the newest version of `key`.
    ///
    /// The record must already be in the store, after every record in the
    /// slot's chain.
    pub fn put(&mut self, key: &str, position: u64, store: &mut Store) -> Result<Insertion> {
        let slot = self.get_index(key);
        let head = self.head(slot);

        let Some(head_position) = head else {
            self.ensure_room()?;
            self.write_cell(slot, position, store)?;
            self.load += 1;
            return Ok(Insertion::NewSlot { slot });
        };

        match self.find(key, slot, store)? {
            Some(existing) if existing.position == position => Ok(Insertion::Unchanged { slot }),
            Some(existing) => {
                let tail = existing.record.key_link();
                match existing.predecessor {
                    // The old version was the head: the new record takes its place.
                    None => store.update_record_link_inplace(position, tail)?,
                    Some(predecessor) => {
                        store.update_record_link_inplace(predecessor, tail)?;
                        store.update_record_link_inplace(position, Some(head_position))?;
                    }
                }
                self.write_cell(slot, position, store)?;

                tracing::trace!(
                    "Replaced {} in shard {} slot {}: {} -> {}",
                    key,
                    self.id,
                    slot,
                    existing.position,
                    position
                );
                Ok(Insertion::Replaced {
                    slot,
                    previous: existing.position,
                })
            }
            None => {
                self.ensure_room()?;
                store.update_record_link_inplace(position, Some(head_position))?;
                self.write_cell(slot, position, store)?;
                self.load += 1;
                Ok(Insertion::Chained { slot })
            }
        }
    }

    /// Newest live record of `key` with its value chain materialized
    pub fn get(&self, key: &str, store: &mut Store) -> Result<Option<Record>> {
        match self.find(key, self.get_index(key), store)? {
            Some(link) => Ok(Some(materialize(store, link.record)?)),
            None => Ok(None),
        }
    }

    /// Newest live record of `key` exactly as stored, with its offset
    pub fn get_head_only(&self, key: &str, store: &mut Store) -> Result<Option<(Record, u64)>> {
        Ok(self
            .find(key, self.get_index(key), store)?
            .map(|link| (link.record, link.position)))
    }

    pub fn contains(&self, key: &str, store: &mut Store) -> Result<bool> {
        Ok(self.find(key, self.get_index(key), store)?.is_some())
    }

    /// Unlink `key` from its chain and tombstone its record.
    /// Returns `false` when the key is not indexed here.
    pub fn delete(&mut self, key: &str, store: &mut Store) -> Result<bool> {
        let slot = self.get_index(key);
        let Some(target) = self.find(key, slot, store)? else {
            return Ok(false);
        };

        let tail = target.record.key_link();
        match target.predecessor {
            None => self.write_cell(slot, tail.unwrap_or(EMPTY_CELL), store)?,
            Some(predecessor) => store.update_record_link_inplace(predecessor, tail)?,
        }
        store.mark_tombstone(target.position)?;
        self.load = self.load.saturating_sub(1);

        tracing::trace!(
            "Deleted {} at {} from shard {} slot {}",
            key,
            target.position,
            self.id,
            slot
        );
        Ok(true)
    }

    /// Live records of this shard, cells in order and each chain head to tail
    pub fn scanner<'a>(&'a self, store: &'a mut Store) -> Scanner<'a> {
        Scanner::new(std::slice::from_ref(self), store)
    }

    /// Write held cells and make every cell write durable
    pub fn flush(&mut self) -> Result<()> {
        self.write_pending()?;
        if self.dirty {
            self.file.sync_data()?;
            self.dirty = false;
        }
        Ok(())
    }

    /// Drop held cell changes without writing them
    pub(crate) fn discard_pending(&mut self) {
        if !self.pending.is_empty() {
            tracing::warn!(
                "Discarding {} held cells of shard {}",
                self.pending.len(),
                self.id
            );
            self.pending.clear();
        }
    }

    pub fn close(mut self) -> Result<()> {
        self.flush()?;
        tracing::debug!("Closed index shard {} ({} keys)", self.id, self.load);
        Ok(())
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Offset of the chain head at `slot`
    pub(crate) fn head(&self, slot: u64) -> Option<u64> {
        self.cells
            .get(slot as usize)
            .copied()
            .filter(|&cell| cell != EMPTY_CELL)
    }

    /// First live node of `key` in the chain at `slot`
    fn find(&self, key: &str, slot: u64, store: &mut Store) -> Result<Option<ChainLink>> {
        for link in Chain::new(store, self.head(slot)) {
            let link = link?;
            if !link.record.tombstone && link.record.key == key {
                return Ok(Some(link));
            }
        }
        Ok(None)
    }

    fn ensure_room(&self) -> Result<()> {
        if self.load >= self.max_keys {
            return Err(ChainError::CapacityExhausted { shard: self.id });
        }
        Ok(())
    }

    fn write_cell(&mut self, slot: u64, value: u64, store: &Store) -> Result<()> {
        self.cells[slot as usize] = value;
        if store.is_batching() {
            self.pending.insert(slot);
            return Ok(());
        }
        self.pending.remove(&slot);
        self.store_cell(slot)
    }

    /// Copy the in-memory cell at `slot` to the file
    fn store_cell(&mut self, slot: u64) -> Result<()> {
        let value = self.cells[slot as usize];
        self.file.seek(SeekFrom::Start(slot * CELL_SIZE as u64))?;
        self.file.write_all(&value.to_le_bytes())?;
        self.dirty = true;
        Ok(())
    }

    fn write_pending(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let count = self.pending.len();
        while let Some(&slot) = self.pending.first() {
            self.store_cell(slot)?;
            self.pending.remove(&slot);
        }
        tracing::debug!("Wrote {} held cells of shard {}", count, self.id);
        Ok(())
    }

    fn count_live(&self, store: &mut Store) -> Result<u64> {
        let mut live = 0;
        for slot in 0..self.capacity {
            for link in Chain::new(store, self.head(slot)) {
                if !link?.record.tombstone {
                    live += 1;
                }
            }
        }
        Ok(live)
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn load(&self) -> u64 {
        self.load
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn max_keys(&self) -> u64 {
        self.max_keys
    }

    pub fn is_full(&self) -> bool {
        self.load >= self.max_keys
    }

    /// Cells changed in memory but not yet written to the file
    pub fn pending_cells(&self) -> usize {
        self.pending.len()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn checked_capacity(config: &Config) -> Result<u64> {
    if config.shard_capacity == 0 {
        return Err(ChainError::Config("shard_capacity must be > 0".to_string()));
    }
    Ok(config.shard_capacity)
}

impl Drop for Index {
    fn drop(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        tracing::warn!(
            "Index shard {} dropped without flush; writing {} held cells",
            self.id,
            self.pending.len()
        );
        if let Err(e) = self.write_pending() {
            tracing::error!("Failed to write cells of {}: {}", self.path.display(), e);
        }
    }
}

impl std::fmt::Debug for Index {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Index")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("capacity", &self.capacity)
            .field("load", &self.load)
            .field("max_keys", &self.max_keys)
            .field("pending", &self.pending.len())
            .finish()
    }
}
