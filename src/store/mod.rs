//! Store Module
//!
//! Append-only record log.
//!
//! ## Responsibilities
//! - Append record frames and hand back their byte offsets
//! - Read the frame at an offset (from the file, the batch buffer or the cache)
//! - Patch the fixed-width header fields in place (key link, tombstone)
//! - Batch mode: buffer frames in memory and drain them in order
//!
//! ## File Format
//! ```text
//! ┌──────────────────────────────┐ offset 0
//! │ Frame 1                      │
//! ├──────────────────────────────┤ offset len(frame 1)
//! │ Frame 2                      │
//! ├──────────────────────────────┤
//! │ ...                          │
//! └──────────────────────────────┘
//! ```
//! Frames are laid out back to back with no file header; see
//! [`crate::record`] for the frame layout. Nothing is ever removed.

mod buffer;
mod log;

pub use log::Store;
