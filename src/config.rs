//! Configuration for ChainKV
//!
//! Centralized configuration with sensible defaults. Every component receives
//! its settings from a `Config` value; nothing is read from global state.

use std::path::PathBuf;

use crate::error::{ChainError, Result};

/// Main configuration for a ChainKV instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all data files
    /// Internal structure:
    ///   {data_dir}/
    ///     └── {database}/
    ///         └── {table}/
    ///             ├── store.log          (append-only record log)
    ///             ├── index_000000.idx   (shard 0 slot table)
    ///             └── index_000001.idx   (shard 1, created on demand)
    pub data_dir: PathBuf,

    /// Database (namespace) directory under `data_dir`
    pub database: String,

    // -------------------------------------------------------------------------
    // Index Configuration
    // -------------------------------------------------------------------------
    /// Number of slots in every shard's slot table
    pub shard_capacity: u64,

    /// Average chain length a shard may reach before new keys go to a new shard
    pub shard_load_factor: f64,

    // -------------------------------------------------------------------------
    // Store Configuration
    // -------------------------------------------------------------------------
    /// Batch mode: drain the write buffer every N records.
    /// Direct mode: fsync the log every N records.
    pub flush_interval: usize,

    /// Max number of record frames held by the LRU cache (0 disables it)
    pub cache_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./chainkv_data"),
            database: "default".to_string(),
            shard_capacity: 100_003,
            shard_load_factor: 2.0,
            flush_interval: 1,
            cache_capacity: 10_000,
        }
    }
}

impl Config {
    // =========================================================================
    // Internal Path Constants
    // =========================================================================
    const STORE_FILENAME: &'static str = "store.log";

    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check that the settings describe a usable store
    pub fn validate(&self) -> Result<()> {
        if self.shard_capacity == 0 {
            return Err(ChainError::Config("shard_capacity must be > 0".to_string()));
        }
        if !(self.shard_load_factor.is_finite() && self.shard_load_factor > 0.0) {
            return Err(ChainError::Config(format!(
                "shard_load_factor must be a positive number, got {}",
                self.shard_load_factor
            )));
        }
        if self.flush_interval == 0 {
            return Err(ChainError::Config("flush_interval must be > 0".to_string()));
        }
        if self.database.is_empty() {
            return Err(ChainError::Config("database name must not be empty".to_string()));
        }
        Ok(())
    }

    /// Number of distinct keys a shard accepts before the indexer opens a new one
    pub fn max_keys_per_shard(&self) -> u64 {
        let max = (self.shard_capacity as f64 * self.shard_load_factor).ceil() as u64;
        max.max(1)
    }

    /// Directory holding every table of the configured database
    pub fn database_dir(&self) -> PathBuf {
        self.data_dir.join(&self.database)
    }

    /// Directory holding one table's log and shard files
    pub fn table_dir(&self, table: &str) -> PathBuf {
        self.database_dir().join(table)
    }

    /// Path of a table's record log
    pub fn store_path(&self, table: &str) -> PathBuf {
        self.table_dir(table).join(Self::STORE_FILENAME)
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the database (namespace) name
    pub fn database(mut self, name: impl Into<String>) -> Self {
        self.config.database = name.into();
        self
    }

    /// Set the number of slots per shard
    pub fn shard_capacity(mut self, capacity: u64) -> Self {
        self.config.shard_capacity = capacity;
        self
    }

    /// Set the shard load factor (distinct keys per slot before a new shard)
    pub fn shard_load_factor(mut self, factor: f64) -> Self {
        self.config.shard_load_factor = factor;
        self
    }

    /// Set the flush interval (in records)
    pub fn flush_interval(mut self, records: usize) -> Self {
        self.config.flush_interval = records;
        self
    }

    /// Set the cache capacity (in record frames, 0 disables the cache)
    pub fn cache_capacity(mut self, entries: usize) -> Self {
        self.config.cache_capacity = entries;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
