//! Index Module
//!
//! Hash index over the record log.
//!
//! ## Responsibilities
//! - Map a key to the store offset of its newest live record
//! - Resolve slot collisions by chaining records through their `key_link`
//! - Spread keys over shards once a shard reaches its key budget
//!
//! ## Shard File Format
//! ```text
//! ┌──────────────┬──────────────┬─────┬────────────────┐
//! │ Cell 0 (u64) │ Cell 1 (u64) │ ... │ Cell C-1 (u64) │
//! └──────────────┴──────────────┴─────┴────────────────┘
//! ```
//! Each cell is little-endian and holds the offset of a chain head, or
//! `u64::MAX` when the slot is empty.
//!
//! ## Chain Layout
//! ```text
//!   cell ──► newest record ──key_link──► older record ──key_link──► ... ──► none
//! ```
//! Every link points to a smaller offset than the record holding it, so a walk
//! always terminates.

mod chain;
mod indexer;
mod scanner;
mod shard;

pub use indexer::Indexer;
pub use scanner::Scanner;
pub use shard::{Index, Insertion};

/// Encoded empty cell
pub const EMPTY_CELL: u64 = u64::MAX;

/// Width of one cell on disk
pub const CELL_SIZE: usize = 8;

/// Slot of `key` in a table of `capacity` cells
pub fn slot_for(key: &str, capacity: u64) -> u64 {
    u64::from(crc32fast::hash(key.as_bytes())) % capacity
}
