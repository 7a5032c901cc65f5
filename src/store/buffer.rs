//! Batch write buffer
//!
//! Holds frames saved in batch mode until they are drained to the log file.
//! The buffer always starts at the current end of the file, so a log offset
//! maps to either the file or the buffer, never both.

use bytes::BytesMut;

/// Frames appended to the log but not yet written to the file
pub(crate) struct WriteBuffer {
    /// Log offset of the first buffered byte
    start: u64,
    bytes: BytesMut,
    records: usize,
}

impl WriteBuffer {
    pub(crate) fn new(start: u64) -> Self {
        Self {
            start,
            bytes: BytesMut::new(),
            records: 0,
        }
    }

    /// Append a frame and return its log offset
    pub(crate) fn push(&mut self, frame: &[u8]) -> u64 {
        let position = self.end();
        self.bytes.extend_from_slice(frame);
        self.records += 1;
        position
    }

    /// Log offset one past the last buffered byte
    pub(crate) fn end(&self) -> u64 {
        self.start + self.bytes.len() as u64
    }

    pub(crate) fn start(&self) -> u64 {
        self.start
    }

    pub(crate) fn len(&self) -> usize {
        self.bytes.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub(crate) fn records(&self) -> usize {
        self.records
    }

    /// Buffered bytes from `position` to the end of the buffer
    pub(crate) fn slice_from(&self, position: u64) -> &[u8] {
        let from = (position.saturating_sub(self.start) as usize).min(self.bytes.len());
        &self.bytes[from..]
    }

    /// Overwrite buffered bytes at a log offset. The caller checks bounds.
    pub(crate) fn patch(&mut self, position: u64, data: &[u8]) {
        let from = (position - self.start) as usize;
        self.bytes[from..from + data.len()].copy_from_slice(data);
    }

    /// Every buffered byte, in log order
    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Forget the buffered bytes once they are in the file. The buffer then
    /// starts where they ended. Returns the number of bytes released.
    pub(crate) fn clear(&mut self) -> usize {
        let released = self.bytes.len();
        self.bytes.clear();
        self.start += released as u64;
        self.records = 0;
        released
    }
}
