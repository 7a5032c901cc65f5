//! Indexer
//!
//! Manages the shards of one table and routes keys between them.
//!
//! ## Responsibilities
//! - Discover existing shard files on startup
//! - Search shards newest → oldest for reads and deletes
//! - Keep updates in the shard that already holds the key
//! - Allocate a new shard when the live one refuses new keys

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::{ChainError, Result};
use crate::record::Record;
use crate::store::Store;

use super::scanner::Scanner;
use super::shard::{Index, Insertion};

/// Growable, ordered set of index shards
///
/// Shards are kept oldest → newest; the last one is the live shard that
/// receives new keys. A key lives in exactly one shard.
pub struct Indexer {
    /// Directory where shard files are stored
    dir: PathBuf,

    config: Config,

    /// Open shards, ordered oldest → newest
    shards: Vec<Index>,

    /// Id given to the next shard created
    next_shard_id: u64,
}

impl Indexer {
    /// Open or create the shards in `dir`
    ///
    /// On startup:
    /// 1. Create directory if it doesn't exist
    /// 2. Discover existing shard files
    /// 3. Open each (recounting its keys from the store)
    /// 4. Order by ID ascending (oldest first)
    ///
    /// No shard file is created until the first `put`.
    pub fn open(dir: &Path, config: &Config, store: &mut Store) -> Result<Self> {
        fs::create_dir_all(dir)?;

        let mut shard_ids: Vec<u64> = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let file_path = entry.path();

            if file_path.is_file() {
                if let Some(id) = Self::parse_shard_id(&file_path) {
                    shard_ids.push(id);
                }
            }
        }
        shard_ids.sort_unstable();

        let mut shards = Vec::with_capacity(shard_ids.len());
        for &id in &shard_ids {
            let path = Self::shard_path_with_dir(dir, id);
            shards.push(Index::open(&path, id, config, store)?);
        }

        let next_shard_id = shard_ids.last().map(|&id| id + 1).unwrap_or(0);

        tracing::info!(
            "Opened indexer in {} with {} shard(s)",
            dir.display(),
            shards.len()
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            config: config.clone(),
            shards,
            next_shard_id,
        })
    }

    /// Publish the record at `position` as the newest version of `key`
    pub fn put(&mut self, key: &str, position: u64, store: &mut Store) -> Result<Insertion> {
        // Updates stay in the shard that already holds the key.
        let older = self.shards.len().saturating_sub(1);
        for index in self.shards[..older].iter_mut().rev() {
            if index.contains(key, store)? {
                return index.put(key, position, store);
            }
        }

        let result = self.live_shard()?.put(key, position, store);
        match result {
            Err(ChainError::CapacityExhausted { shard }) => {
                tracing::info!("Shard {} is full, allocating a new shard", shard);
                // Held cells of a batch are written once the log catches up.
                if !store.is_batching() {
                    self.live_shard()?.flush()?;
                }
                self.allocate_shard()?.put(key, position, store)
            }
            other => other,
        }
    }

    /// Newest live record of `key` with its value chain materialized
    pub fn get(&self, key: &str, store: &mut Store) -> Result<Option<Record>> {
        for index in self.shards.iter().rev() {
            if let Some(record) = index.get(key, store)? {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    /// Newest live record of `key` as stored, with its offset
    pub fn get_head_only(&self, key: &str, store: &mut Store) -> Result<Option<(Record, u64)>> {
        for index in self.shards.iter().rev() {
            if let Some(found) = index.get_head_only(key, store)? {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    /// Remove `key` from whichever shard holds it
    pub fn delete(&mut self, key: &str, store: &mut Store) -> Result<bool> {
        for index in self.shards.iter_mut().rev() {
            if index.delete(key, store)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Every live record, oldest shard first
    pub fn scanner<'a>(&'a self, store: &'a mut Store) -> Scanner<'a> {
        Scanner::new(&self.shards, store)
    }

    /// Make every shard's cell writes durable
    pub fn flush(&mut self) -> Result<()> {
        for index in &mut self.shards {
            index.flush()?;
        }
        Ok(())
    }

    /// Forget held cell changes of every shard
    pub(crate) fn discard_pending(&mut self) {
        for index in &mut self.shards {
            index.discard_pending();
        }
    }

    pub fn close(self) -> Result<()> {
        let count = self.shards.len();
        for index in self.shards {
            index.close()?;
        }
        tracing::debug!("Closed indexer in {} ({} shards)", self.dir.display(), count);
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Open shards, oldest first
    pub fn shards(&self) -> &[Index] {
        &self.shards
    }

    /// Live keys across all shards
    pub fn key_count(&self) -> u64 {
        self.shards.iter().map(Index::load).sum()
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn next_shard_id(&self) -> u64 {
        self.next_shard_id
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// The newest shard, created on first use
    fn live_shard(&mut self) -> Result<&mut Index> {
        if self.shards.is_empty() {
            return self.allocate_shard();
        }
        let last = self.shards.len() - 1;
        Ok(&mut self.shards[last])
    }

    fn allocate_shard(&mut self) -> Result<&mut Index> {
        let id = self.next_shard_id;
        let path = Self::shard_path_with_dir(&self.dir, id);
        let index = Index::create(&path, id, &self.config)?;

        self.next_shard_id += 1;
        self.shards.push(index);

        let last = self.shards.len() - 1;
        Ok(&mut self.shards[last])
    }

    /// Generate shard path given a directory and ID
    fn shard_path_with_dir(dir: &Path, id: u64) -> PathBuf {
        dir.join(format!("index_{:06}.idx", id))
    }

    /// Parse shard ID from filename
    /// "index_000042.idx" → Some(42)
    fn parse_shard_id(path: &Path) -> Option<u64> {
        if path.extension()? != "idx" {
            return None;
        }
        let name = path.file_stem()?.to_string_lossy();
        let id_str = name.strip_prefix("index_")?;
        id_str.parse().ok()
    }
}

impl std::fmt::Debug for Indexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Indexer")
            .field("dir", &self.dir)
            .field("shards", &self.shards.len())
            .field("next_shard_id", &self.next_shard_id)
            .finish()
    }
}
