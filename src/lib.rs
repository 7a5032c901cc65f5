//! # ChainKV
//!
//! An embedded, log-structured key-value store for graph workloads with:
//! - An append-only record log as the single source of truth
//! - A hash index whose collision chains live inside the log itself
//! - Index shards added on demand as the key count grows
//! - List and set values built from single-item writes (value chains)
//! - A bounded LRU cache of recently used records
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Database                              │
//! │              (tables by name, Mutex per table)               │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                         Table                                │
//! │          put / put_list / put_set / get / delete             │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │   Indexer   │─────────►│    Store    │
//!   │  (shards)   │  chains  │ (log+cache) │
//!   └─────────────┘          └─────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use chainkv::{Config, Record, Table};
//!
//! let config = Config::builder().data_dir("/tmp/chainkv").build();
//! let mut table = Table::open(&config, "nodes")?;
//!
//! table.put(Record::new("node:1", "alice"))?;
//! table.put_list("node:1:edges", "node:2")?;
//!
//! assert!(table.get("node:1")?.is_some());
//! table.close()?;
//! # Ok::<(), chainkv::ChainError>(())
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod record;
pub mod cache;
pub mod store;
pub mod index;
pub mod engine;
pub mod database;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{ChainError, Result};
pub use config::Config;
pub use record::{Record, Value, ValueType};
pub use cache::Cache;
pub use store::Store;
pub use index::{Index, Indexer, Insertion, Scanner};
pub use engine::Table;
pub use database::{Database, SharedTable};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of ChainKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
