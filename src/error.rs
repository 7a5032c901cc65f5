//! Error types for ChainKV
//!
//! Provides a unified error type for all operations.
//!
//! A missing key is never an error: lookups return `Option`/`bool`.

use thiserror::Error;

/// Result type alias using ChainError
pub type Result<T> = std::result::Result<T, ChainError>;

/// Unified error type for ChainKV operations
#[derive(Debug, Error)]
pub enum ChainError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Store Errors
    // -------------------------------------------------------------------------
    /// Bytes are present at an offset but do not form a valid record, or a
    /// published link points past the end of the log.
    #[error("Corruption detected: {0}")]
    Corruption(String),

    /// A value that must be a store offset is not representable as one.
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    // -------------------------------------------------------------------------
    // Index Errors
    // -------------------------------------------------------------------------
    /// The shard refuses new keys; the indexer reacts by allocating a new shard.
    #[error("Shard {shard} cannot accept new keys")]
    CapacityExhausted { shard: u64 },

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<bincode::Error> for ChainError {
    fn from(e: bincode::Error) -> Self {
        ChainError::Serialization(e.to_string())
    }
}
