//! Record log
//!
//! Owns the log file of one table, its batch buffer and its record cache.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use crate::cache::Cache;
use crate::config::Config;
use crate::error::{ChainError, Result};
use crate::record::{encode_link, to_offset, FrameHeader, Record, HEADER_SIZE, TOMBSTONE_OFFSET};

use super::buffer::WriteBuffer;

/// Append-only log of record frames
///
/// ## Modes
/// - **Direct** (default): every `save` writes the frame to the file; the file
///   is fsynced every `flush_interval` saves.
/// - **Batch** (`begin_batch` .. `end_batch`): frames are buffered in memory
///   and drained to the file every `flush_interval` saves and at `end_batch`.
///   Reads and link patches see buffered frames. Header patches to frames
///   already in the file are held in memory until `end_batch` or `sync`, so
///   the file keeps its pre-batch chains if the process dies mid-batch.
pub struct Store {
    /// Path of the log file
    path: PathBuf,

    /// Log file handle (read + write, positioned explicitly)
    file: File,

    /// Number of bytes already handed to the file
    file_len: u64,

    /// Frames saved in batch mode but not yet drained
    buffer: WriteBuffer,

    /// Header bytes patched during a batch, by file offset, not yet written
    held: BTreeMap<u64, Vec<u8>>,

    /// Whether `save` currently buffers
    batching: bool,

    /// Records per drain (batch) or per fsync (direct)
    flush_interval: usize,

    /// Direct-mode saves since the last fsync
    unsynced: usize,

    /// Hot frames by offset
    cache: Option<Cache>,

    /// Set by `close` so that `Drop` stays quiet
    closed: bool,
}

impl Store {
    /// Open or create the log at `path`
    pub fn open(path: &Path, config: &Config) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)?;
        let file_len = file.metadata()?.len();

        let cache = NonZeroUsize::new(config.cache_capacity).map(Cache::new);

        tracing::info!(
            "Opened store {} ({} bytes, flush interval {}, cache {})",
            path.display(),
            file_len,
            config.flush_interval,
            config.cache_capacity
        );

        Ok(Self {
            path: path.to_path_buf(),
            file,
            file_len,
            buffer: WriteBuffer::new(file_len),
            held: BTreeMap::new(),
            batching: false,
            flush_interval: config.flush_interval.max(1),
            unsynced: 0,
            cache,
            closed: false,
        })
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Append a record and return its offset
    ///
    /// The record's key link and tombstone are reset (the index owns them).
    /// When `prior_position` is given it becomes the record's value link,
    /// chaining this record in front of the previous version of its key.
    pub fn save(&mut self, record: &mut Record, prior_position: Option<u64>) -> Result<u64> {
        let position = self.len();

        if let Some(prior) = prior_position {
            if prior >= position {
                return Err(ChainError::TypeMismatch(format!(
                    "value link {} does not point to an earlier record (log end {})",
                    prior, position
                )));
            }
        }

        record.prepare_for_save(prior_position);
        let frame = record.marshal()?;

        if self.batching {
            self.buffer.push(&frame);
            if self.buffer.records() >= self.flush_interval {
                self.drain()?;
            }
        } else {
            self.write_at(position, &frame)?;
            self.file_len += frame.len() as u64;
            self.buffer = WriteBuffer::new(self.file_len);

            self.unsynced += 1;
            if self.unsynced >= self.flush_interval {
                self.file.sync_data()?;
                self.unsynced = 0;
            }
        }

        record.assign_position(position);
        if let Some(cache) = self.cache.as_mut() {
            cache.put(position, frame);
        }

        tracing::trace!("Saved {} at {}", record.key, position);
        Ok(position)
    }

    /// Overwrite the key link of the record at `position`
    ///
    /// Only the fixed-width link field changes. Fails with `TypeMismatch` when
    /// `new_link` is not a store offset, and with `Corruption` when it would
    /// not point to an earlier record.
    pub fn update_record_link_inplace<L>(&mut self, position: u64, new_link: Option<L>) -> Result<()>
    where
        L: TryInto<u64> + Copy + fmt::Display,
    {
        let link = new_link.map(|l| to_offset(l, "key_link")).transpose()?;

        if let Some(target) = link {
            if target >= position {
                return Err(ChainError::Corruption(format!(
                    "key link {} of record {} does not point backward",
                    target, position
                )));
            }
        }

        self.patch(position, 0, &encode_link(link))
    }

    /// Set the tombstone flag of the record at `position`
    pub fn mark_tombstone(&mut self, position: u64) -> Result<()> {
        self.patch(position, TOMBSTONE_OFFSET, &[1])
    }

    /// Write header bytes of an existing frame, in the file or the buffer,
    /// and mirror them into the cache.
    fn patch(&mut self, position: u64, offset: usize, data: &[u8]) -> Result<()> {
        let at = position + offset as u64;
        let end = at + data.len() as u64;
        if end > self.len() || position + HEADER_SIZE as u64 > self.len() {
            return Err(ChainError::Corruption(format!(
                "no record frame at offset {} (log end {})",
                position,
                self.len()
            )));
        }

        if at >= self.file_len {
            self.buffer.patch(at, data);
        } else if self.batching {
            self.held.insert(at, data.to_vec());
        } else {
            self.write_at(at, data)?;
        }

        if let Some(cache) = self.cache.as_mut() {
            cache.partial_update_at(position, offset, data);
        }
        Ok(())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Read the record at `position`
    ///
    /// Returns:
    /// - `Ok(Some(record))`: a complete, valid frame
    /// - `Ok(None)`: `position` is at/after the end of the log, or the frame
    ///   is cut short (truncated file)
    /// - `Err(Corruption)`: bytes are present but malformed
    pub fn read(&mut self, position: u64) -> Result<Option<Record>> {
        if let Some(cache) = self.cache.as_mut() {
            if let Some(frame) = cache.get(position) {
                let mut record = Record::unmarshal(frame)?;
                record.assign_position(position);
                return Ok(Some(record));
            }
        }

        let frame = match self.read_frame(position)? {
            Some(frame) => frame,
            None => return Ok(None),
        };

        let mut record = Record::unmarshal(&frame)?;
        record.assign_position(position);

        if let Some(cache) = self.cache.as_mut() {
            cache.put(position, frame);
        }
        Ok(Some(record))
    }

    /// Raw frame bytes at `position`, or `None` on a short read
    fn read_frame(&mut self, position: u64) -> Result<Option<Vec<u8>>> {
        if position >= self.len() {
            return Ok(None);
        }

        // Buffered frames are never split across file and buffer.
        if position >= self.buffer.start() {
            let available = self.buffer.slice_from(position);
            if available.len() < HEADER_SIZE {
                return Ok(None);
            }
            let header = FrameHeader::parse(available)?;
            return Ok(available
                .get(..header.frame_len())
                .map(|frame| frame.to_vec()));
        }

        if position + HEADER_SIZE as u64 > self.file_len {
            tracing::debug!("Short header read at {} in {}", position, self.path.display());
            return Ok(None);
        }

        let mut header_bytes = [0u8; HEADER_SIZE];
        if !self.read_exact_at(position, &mut header_bytes)? {
            return Ok(None);
        }
        let header = FrameHeader::parse(&header_bytes)?;

        let frame_len = header.frame_len();
        if position + frame_len as u64 > self.file_len {
            tracing::debug!(
                "Short frame read at {}: needs {} bytes, {} available",
                position,
                frame_len,
                self.file_len - position
            );
            return Ok(None);
        }

        let mut frame = vec![0u8; frame_len];
        frame[..HEADER_SIZE].copy_from_slice(&header_bytes);
        if !self.read_exact_at(position + HEADER_SIZE as u64, &mut frame[HEADER_SIZE..])? {
            return Ok(None);
        }

        // Held patches only touch the link and tombstone fields.
        for (&at, data) in self.held.range(position..position + HEADER_SIZE as u64) {
            let offset = (at - position) as usize;
            frame[offset..offset + data.len()].copy_from_slice(data);
        }
        Ok(Some(frame))
    }

    // =========================================================================
    // Batching and Durability
    // =========================================================================

    /// Start buffering saves in memory
    pub fn begin_batch(&mut self) {
        if !self.batching {
            tracing::debug!("Batch mode on for {}", self.path.display());
            self.batching = true;
        }
    }

    /// Drain the batch buffer in order and leave batch mode
    pub fn end_batch(&mut self) -> Result<()> {
        self.drain()?;
        self.write_held()?;
        if self.batching {
            tracing::debug!("Batch mode off for {}", self.path.display());
            self.batching = false;
        }
        Ok(())
    }

    /// Force every prior save to disk, in either mode
    pub fn sync(&mut self) -> Result<()> {
        self.drain()?;
        self.write_held()?;
        self.file.sync_data()?;
        self.unsynced = 0;
        Ok(())
    }

    /// Flush pending writes and release the file
    pub fn close(mut self) -> Result<()> {
        self.sync()?;
        self.closed = true;
        tracing::info!("Closed store {} ({} bytes)", self.path.display(), self.file_len);
        Ok(())
    }

    /// Write the whole batch buffer to the file in one pass
    fn drain(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let records = self.buffer.records();
        let start = self.buffer.start();
        debug_assert_eq!(start, self.file_len);

        // The buffer keeps its bytes until the write succeeds, so a failed
        // drain can be retried and reads keep finding the frames.
        self.file.seek(SeekFrom::Start(start))?;
        self.file.write_all(self.buffer.as_bytes())?;
        self.file.flush()?;

        let written = self.buffer.clear();
        self.file_len += written as u64;

        tracing::debug!(
            "Drained {} records ({} bytes) to {}",
            records,
            written,
            self.path.display()
        );
        Ok(())
    }

    /// Write header patches held during a batch. On failure every patch stays
    /// held; writing one twice is harmless.
    fn write_held(&mut self) -> Result<()> {
        if self.held.is_empty() {
            return Ok(());
        }
        let held = std::mem::take(&mut self.held);
        let result = held.iter().try_for_each(|(&at, data)| self.write_at(at, data));
        if let Err(e) = result {
            self.held = held;
            return Err(e);
        }
        self.file.flush()?;
        tracing::debug!("Wrote {} held patches to {}", held.len(), self.path.display());
        Ok(())
    }

    // =========================================================================
    // File Helpers
    // =========================================================================

    fn write_at(&mut self, position: u64, data: &[u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(position))?;
        self.file.write_all(data)?;
        Ok(())
    }

    /// Fill `buf` from `position`; `false` if the file ends first
    fn read_exact_at(&mut self, position: u64, buf: &mut [u8]) -> Result<bool> {
        self.file.seek(SeekFrom::Start(position))?;
        match self.file.read_exact(buf) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Logical end of the log (file plus batch buffer)
    pub fn len(&self) -> u64 {
        self.buffer.end()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes waiting in the batch buffer
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_batching(&self) -> bool {
        self.batching
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn cache(&self) -> Option<&Cache> {
        self.cache.as_ref()
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        if self.closed || (self.buffer.is_empty() && self.held.is_empty()) {
            return;
        }
        tracing::warn!(
            "Store {} dropped without close; draining {} pending bytes",
            self.path.display(),
            self.buffer.len()
        );
        if let Err(e) = self.drain().and_then(|()| self.write_held()) {
            tracing::error!("Failed to drain {}: {}", self.path.display(), e);
        }
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.path)
            .field("file_len", &self.file_len)
            .field("pending", &self.buffer.len())
            .field("held", &self.held.len())
            .field("batching", &self.batching)
            .finish()
    }
}
