//! Engine Module
//!
//! One table: a record log plus the sharded index over it.
//!
//! ## Responsibilities
//! - Append records to the store before publishing them in the index
//! - Build list and set value chains from single-item writes
//! - Route reads, deletes and scans through the indexer
//! - Batch mode and durability boundaries

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::Result;
use crate::index::{Indexer, Scanner};
use crate::record::{Record, ValueType};
use crate::store::Store;

/// A named key-value table
///
/// ## Write Path
/// 1. Append the record to the store (`value_link` set for list/set items)
/// 2. Patch its `key_link` and publish its offset in an index cell
///
/// ## Read Path
/// Index cell → collision chain → newest live record → value chain.
///
/// Every operation takes `&mut self`; callers sharing a table serialize
/// access themselves (see [`crate::Database`]).
pub struct Table {
    name: String,

    /// Directory holding the log and the shard files
    dir: PathBuf,

    store: Store,
    indexer: Indexer,
}

impl Table {
    /// Open or create the table `name` of the configured database
    ///
    /// On startup:
    /// 1. Validate the config
    /// 2. Create the table directory
    /// 3. Open the record log
    /// 4. Open existing shards (recounting keys from the log)
    pub fn open(config: &Config, name: &str) -> Result<Self> {
        config.validate()?;

        let dir = config.table_dir(name);
        fs::create_dir_all(&dir)?;

        let mut store = Store::open(&config.store_path(name), config)?;
        let indexer = Indexer::open(&dir, config, &mut store)?;

        tracing::info!(
            "Opened table {} ({} shards, {} keys)",
            name,
            indexer.shard_count(),
            indexer.key_count()
        );

        Ok(Self {
            name: name.to_string(),
            dir,
            store,
            indexer,
        })
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Store `record` as the new value of its key and return its offset.
    /// Any previous value, including a list or set chain, is replaced.
    pub fn put(&mut self, record: Record) -> Result<u64> {
        self.append_item(record, None)
    }

    /// Push `item` onto the list stored at `key`
    ///
    /// A key holding anything but a list starts a new list.
    pub fn put_list(&mut self, key: &str, item: &str) -> Result<u64> {
        let prior = self.multi_valued_head(key, ValueType::List)?;
        self.append_item(Record::list_item(key, item), prior)
    }

    /// Add `member` to the set stored at `key`
    ///
    /// Adding a member that is already present writes nothing and returns
    /// the offset of the current set head.
    pub fn put_set(&mut self, key: &str, member: &str) -> Result<u64> {
        let prior = self.multi_valued_head(key, ValueType::Set)?;

        if let Some(head) = prior {
            if let Some(current) = self.indexer.get(key, &mut self.store)? {
                let present = current
                    .value
                    .items()
                    .is_some_and(|members| members.iter().any(|m| m == member));
                if present {
                    tracing::trace!("{} already holds member {}", key, member);
                    return Ok(head);
                }
            }
        }

        self.append_item(Record::set_member(key, member), prior)
    }

    /// Remove `key`. Returns `false` when it is not present.
    pub fn delete(&mut self, key: &str) -> Result<bool> {
        self.indexer.delete(key, &mut self.store)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Current value of `key`; lists and sets come back with every item
    pub fn get(&mut self, key: &str) -> Result<Option<Record>> {
        self.indexer.get(key, &mut self.store)
    }

    /// The newest record of `key` without following its value chain
    pub fn get_head_only(&mut self, key: &str) -> Result<Option<(Record, u64)>> {
        self.indexer.get_head_only(key, &mut self.store)
    }

    /// Iterate over every live key once
    pub fn scanner(&mut self) -> Scanner<'_> {
        self.indexer.scanner(&mut self.store)
    }

    // =========================================================================
    // Batching and Durability
    // =========================================================================

    pub fn begin_batch(&mut self) {
        self.store.begin_batch();
    }

    /// Drain the batch to the log, then write the shard cells it changed
    pub fn end_batch(&mut self) -> Result<()> {
        self.store.end_batch()?;
        self.indexer.flush()
    }

    /// Make every prior write durable (log first, then shards)
    pub fn sync(&mut self) -> Result<()> {
        self.store.sync()?;
        self.indexer.flush()
    }

    /// Flush and release every file of the table
    pub fn close(mut self) -> Result<()> {
        if let Err(e) = self.store.close() {
            // Held cells may point at records that never reached the log.
            self.indexer.discard_pending();
            return Err(e);
        }
        self.indexer.close()?;
        tracing::info!("Closed table {}", self.name);
        Ok(())
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Offset of the current head when it holds a value of `value_type`
    fn multi_valued_head(&mut self, key: &str, value_type: ValueType) -> Result<Option<u64>> {
        Ok(self
            .indexer
            .get_head_only(key, &mut self.store)?
            .filter(|(head, _)| head.value_type() == value_type)
            .map(|(_, position)| position))
    }

    fn append_item(&mut self, mut record: Record, prior: Option<u64>) -> Result<u64> {
        let position = self.store.save(&mut record, prior)?;
        self.indexer.put(&record.key, position, &mut self.store)?;
        Ok(position)
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn shard_count(&self) -> usize {
        self.indexer.shard_count()
    }

    /// Live keys across all shards
    pub fn key_count(&self) -> u64 {
        self.indexer.key_count()
    }

    pub fn indexer(&self) -> &Indexer {
        &self.indexer
    }

    pub fn store(&self) -> &Store {
        &self.store
    }
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.name)
            .field("dir", &self.dir)
            .field("store", &self.store)
            .field("indexer", &self.indexer)
            .finish()
    }
}
