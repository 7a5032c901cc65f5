//! Record Module
//!
//! Binary framing of one logical entry of the store.
//!
//! ## Frame Format
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Header (19 bytes)                                            │
//! │   KeyLink: u64 (8) | Tombstone (1) | ValueType (1)           │
//! │   PayloadLen: u32 (4) | PayloadCRC: u32 (4) | UNIT_SEP (1)   │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Payload (PayloadLen bytes)                                   │
//! │   bincode(key, value, value_link)                            │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Trailer (1 byte)                                             │
//! │   RECORD_SEP                                                 │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The payload end is found from `PayloadLen` alone. `UNIT_SEP` and
//! `RECORD_SEP` are checked at their fixed positions and may occur anywhere
//! inside the payload (serialized floats regularly contain both).
//!
//! `KeyLink` and `Tombstone` are the only fields patched after a write; they
//! sit at the front of the frame so a patch of a cached frame starts at byte 0.

mod value;

use std::fmt;

use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};

use crate::error::{ChainError, Result};

pub use value::{Value, ValueType};

// =============================================================================
// Shared Constants (used by store, index and cache patches)
// =============================================================================

/// Frame separator written after the header
pub const UNIT_SEP: u8 = 0xAC;

/// Terminator written after the payload
pub const RECORD_SEP: u8 = 0xFD;

/// Width of an encoded link field
pub const RECORD_LINK_LEN: usize = 8;

/// Byte offset of the tombstone flag inside a frame
pub const TOMBSTONE_OFFSET: usize = RECORD_LINK_LEN;

/// KeyLink (8) + Tombstone (1) + ValueType (1) + Len (4) + CRC (4) + UNIT_SEP (1)
pub const HEADER_SIZE: usize = 19;

/// RECORD_SEP (1)
pub const TRAILER_SIZE: usize = 1;

/// Encoded "no link"; never a valid store offset
pub const NO_LINK: u64 = u64::MAX;

// =============================================================================
// Link Helpers
// =============================================================================

/// Convert any integer into a store offset.
///
/// Fails with `TypeMismatch` for negative values, values wider than `u64`,
/// and the reserved `NO_LINK` sentinel.
pub fn to_offset<T>(value: T, field: &str) -> Result<u64>
where
    T: TryInto<u64> + Copy + fmt::Display,
{
    match value.try_into() {
        Ok(offset) if offset != NO_LINK => Ok(offset),
        _ => Err(ChainError::TypeMismatch(format!(
            "{} must be a store offset, got {}",
            field, value
        ))),
    }
}

/// Fixed-width encoding of an optional link
pub fn encode_link(link: Option<u64>) -> [u8; RECORD_LINK_LEN] {
    link.unwrap_or(NO_LINK).to_le_bytes()
}

fn decode_link(raw: u64) -> Option<u64> {
    (raw != NO_LINK).then_some(raw)
}

// =============================================================================
// Frame Header
// =============================================================================

/// Decoded fixed-width part of a frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameHeader {
    pub key_link: Option<u64>,
    pub tombstone: bool,
    pub value_type: ValueType,
    pub payload_len: u32,
    pub payload_crc: u32,
}

impl FrameHeader {
    /// Parse and validate the first `HEADER_SIZE` bytes of a frame
    pub fn parse(mut bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(ChainError::Corruption(format!(
                "frame header needs {} bytes, got {}",
                HEADER_SIZE,
                bytes.len()
            )));
        }

        let key_link = decode_link(bytes.get_u64_le());
        let tombstone = match bytes.get_u8() {
            0 => false,
            1 => true,
            other => {
                return Err(ChainError::Corruption(format!(
                    "invalid tombstone byte 0x{:02X}",
                    other
                )))
            }
        };
        let value_type = ValueType::from_byte(bytes.get_u8())?;
        let payload_len = bytes.get_u32_le();
        let payload_crc = bytes.get_u32_le();

        let separator = bytes.get_u8();
        if separator != UNIT_SEP {
            return Err(ChainError::Corruption(format!(
                "expected frame separator 0x{:02X}, found 0x{:02X}",
                UNIT_SEP, separator
            )));
        }

        Ok(Self {
            key_link,
            tombstone,
            value_type,
            payload_len,
            payload_crc,
        })
    }

    /// Total frame size including header and trailer
    pub fn frame_len(&self) -> usize {
        HEADER_SIZE + self.payload_len as usize + TRAILER_SIZE
    }
}

// =============================================================================
// Payload
// =============================================================================

#[derive(Serialize)]
struct PayloadRef<'a> {
    key: &'a str,
    value: &'a Value,
    value_link: Option<u64>,
}

#[derive(Deserialize)]
struct Payload {
    key: String,
    value: Value,
    value_link: Option<u64>,
}

// =============================================================================
// Record
// =============================================================================

/// A single logical entry of the store
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub key: String,
    pub value: Value,

    /// Logical deletion marker
    pub tombstone: bool,

    /// Offset of this record in the log, set once when saved or read
    store_position: Option<u64>,

    /// Next record in the same slot's collision chain
    key_link: Option<u64>,

    /// Previous version of this key (list/set value chain)
    value_link: Option<u64>,
}

impl Record {
    pub fn new(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            tombstone: false,
            store_position: None,
            key_link: None,
            value_link: None,
        }
    }

    /// A list record carrying one new item
    pub fn list_item(key: impl Into<String>, item: impl Into<String>) -> Self {
        Self::new(key, Value::List(vec![item.into()]))
    }

    /// A set record carrying one new member
    pub fn set_member(key: impl Into<String>, member: impl Into<String>) -> Self {
        Self::new(key, Value::Set(vec![member.into()]))
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn value_type(&self) -> ValueType {
        self.value.value_type()
    }

    pub fn store_position(&self) -> Option<u64> {
        self.store_position
    }

    pub fn key_link(&self) -> Option<u64> {
        self.key_link
    }

    pub fn value_link(&self) -> Option<u64> {
        self.value_link
    }

    pub fn get_kv_tuple(&self) -> (&str, &Value) {
        (&self.key, &self.value)
    }

    pub fn is_empty(&self) -> bool {
        self.key.is_empty() && self.value.is_empty()
    }

    /// Same key and same value, ignoring bookkeeping fields
    pub fn is_equal_val(&self, other: &Record) -> bool {
        self.key == other.key && self.value == other.value
    }

    // -------------------------------------------------------------------------
    // Setters
    // -------------------------------------------------------------------------

    pub fn set_store_position<T>(&mut self, position: T) -> Result<()>
    where
        T: TryInto<u64> + Copy + fmt::Display,
    {
        self.store_position = Some(to_offset(position, "store_position")?);
        Ok(())
    }

    pub fn set_key_link<T>(&mut self, link: T) -> Result<()>
    where
        T: TryInto<u64> + Copy + fmt::Display,
    {
        self.key_link = Some(to_offset(link, "key_link")?);
        Ok(())
    }

    pub fn set_value_link<T>(&mut self, link: T) -> Result<()>
    where
        T: TryInto<u64> + Copy + fmt::Display,
    {
        self.value_link = Some(to_offset(link, "value_link")?);
        Ok(())
    }

    pub fn set_value(&mut self, value: impl Into<Value>) {
        self.value = value.into();
    }

    /// Reset the fields owned by the index and the store before a fresh write
    pub(crate) fn prepare_for_save(&mut self, value_link: Option<u64>) {
        self.tombstone = false;
        self.store_position = None;
        self.key_link = None;
        self.value_link = value_link;
    }

    pub(crate) fn assign_position(&mut self, position: u64) {
        self.store_position = Some(position);
    }

    // -------------------------------------------------------------------------
    // Encoding
    // -------------------------------------------------------------------------

    /// Encode this record as a complete frame
    pub fn marshal(&self) -> Result<Vec<u8>> {
        let payload = bincode::serialize(&PayloadRef {
            key: &self.key,
            value: &self.value,
            value_link: self.value_link,
        })?;

        let payload_len = u32::try_from(payload.len()).map_err(|_| {
            ChainError::Serialization(format!(
                "payload of {} bytes exceeds the frame limit",
                payload.len()
            ))
        })?;

        let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len() + TRAILER_SIZE);
        buf.put_slice(&encode_link(self.key_link));
        buf.put_u8(u8::from(self.tombstone));
        buf.put_u8(self.value_type().as_byte());
        buf.put_u32_le(payload_len);
        buf.put_u32_le(crc32fast::hash(&payload));
        buf.put_u8(UNIT_SEP);
        buf.put_slice(&payload);
        buf.put_u8(RECORD_SEP);

        Ok(buf)
    }

    /// Decode a complete frame. `store_position` is left unset.
    pub fn unmarshal(bytes: &[u8]) -> Result<Self> {
        let header = FrameHeader::parse(bytes)?;
        let frame_len = header.frame_len();

        if bytes.len() < frame_len {
            return Err(ChainError::Corruption(format!(
                "frame needs {} bytes, got {}",
                frame_len,
                bytes.len()
            )));
        }

        let payload = &bytes[HEADER_SIZE..frame_len - TRAILER_SIZE];
        let terminator = bytes[frame_len - TRAILER_SIZE];
        if terminator != RECORD_SEP {
            return Err(ChainError::Corruption(format!(
                "expected record terminator 0x{:02X}, found 0x{:02X}",
                RECORD_SEP, terminator
            )));
        }

        let actual_crc = crc32fast::hash(payload);
        if actual_crc != header.payload_crc {
            return Err(ChainError::Corruption(format!(
                "payload checksum mismatch: stored {:08x}, computed {:08x}",
                header.payload_crc, actual_crc
            )));
        }

        let decoded: Payload = bincode::deserialize(payload)
            .map_err(|e| ChainError::Corruption(format!("undecodable payload: {}", e)))?;

        if decoded.value.value_type() != header.value_type {
            return Err(ChainError::Corruption(format!(
                "value type tag {:?} does not match payload {:?}",
                header.value_type,
                decoded.value.value_type()
            )));
        }

        Ok(Self {
            key: decoded.key,
            value: decoded.value,
            tombstone: header.tombstone,
            store_position: None,
            key_link: header.key_link,
            value_link: decoded.value_link,
        })
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn link(l: Option<u64>) -> String {
            l.map_or_else(|| "-".to_string(), |v| v.to_string())
        }
        write!(
            f,
            "Record(key={}, value={}, tombstone={}, position={}, value_type={:?}, key_link={}, value_link={})",
            self.key,
            self.value,
            self.tombstone,
            link(self.store_position),
            self.value_type(),
            link(self.key_link),
            link(self.value_link)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let mut record = Record::new("rocket", "saturn-v");
        record.set_key_link(5u64).unwrap();
        let bytes = record.marshal().unwrap();

        assert_eq!(&bytes[..RECORD_LINK_LEN], &5u64.to_le_bytes());
        assert_eq!(bytes[TOMBSTONE_OFFSET], 0);
        assert_eq!(bytes[9], b's');
        assert_eq!(bytes[HEADER_SIZE - 1], UNIT_SEP);
        assert_eq!(*bytes.last().unwrap(), RECORD_SEP);
    }

    #[test]
    fn test_absent_link_encodes_sentinel() {
        let bytes = Record::new("k", "v").marshal().unwrap();
        assert_eq!(&bytes[..RECORD_LINK_LEN], &NO_LINK.to_le_bytes());
        assert_eq!(Record::unmarshal(&bytes).unwrap().key_link(), None);
    }

    #[test]
    fn test_to_offset_rejects_sentinel() {
        assert!(matches!(
            to_offset(NO_LINK, "key_link"),
            Err(ChainError::TypeMismatch(_))
        ));
        assert_eq!(to_offset(7i32, "key_link").unwrap(), 7);
    }

    #[test]
    fn test_bad_tombstone_byte_is_corruption() {
        let mut bytes = Record::new("k", "v").marshal().unwrap();
        bytes[TOMBSTONE_OFFSET] = 7;
        assert!(matches!(
            Record::unmarshal(&bytes),
            Err(ChainError::Corruption(_))
        ));
    }
}
