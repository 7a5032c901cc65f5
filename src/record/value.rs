//! Record values
//!
//! The value union is an explicit tagged enum; the on-disk tag byte is derived
//! from the variant and checked against it on decode.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ChainError, Result};

/// Value stored in a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// A plain string
    Scalar(String),

    /// Items of a list-typed key. A stored record holds the items it added;
    /// reads materialize the whole value chain, newest first.
    List(Vec<String>),

    /// Members of a set-typed key, deduplicated when materialized
    Set(Vec<String>),

    /// Fixed-length float vector (embeddings)
    Vector(Vec<f64>),
}

/// Tag byte selecting the active `Value` variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ValueType {
    Scalar = b's',
    List = b'l',
    Set = b'u',
    Vector = b'v',
}

impl ValueType {
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            b's' => Ok(ValueType::Scalar),
            b'l' => Ok(ValueType::List),
            b'u' => Ok(ValueType::Set),
            b'v' => Ok(ValueType::Vector),
            other => Err(ChainError::Corruption(format!(
                "unknown value type tag 0x{:02X}",
                other
            ))),
        }
    }

    /// List and set keys grow a value chain; the others overwrite
    pub fn is_multi_valued(self) -> bool {
        matches!(self, ValueType::List | ValueType::Set)
    }
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Scalar(_) => ValueType::Scalar,
            Value::List(_) => ValueType::List,
            Value::Set(_) => ValueType::Set,
            Value::Vector(_) => ValueType::Vector,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Value::Scalar(s) => s.is_empty(),
            Value::List(items) | Value::Set(items) => items.is_empty(),
            Value::Vector(v) => v.is_empty(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// Items of a list or set value
    pub fn items(&self) -> Option<&[String]> {
        match self {
            Value::List(items) | Value::Set(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_vector(&self) -> Option<&[f64]> {
        match self {
            Value::Vector(v) => Some(v),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Scalar(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Scalar(s)
    }
}

impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Self {
        Value::Vector(v)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Scalar(s) => write!(f, "{}", s),
            Value::List(items) => write!(f, "[{}]", items.join(", ")),
            Value::Set(items) => write!(f, "{{{}}}", items.join(", ")),
            Value::Vector(v) => {
                let parts: Vec<String> = v.iter().map(|x| x.to_string()).collect();
                write!(f, "<{}>", parts.join(", "))
            }
        }
    }
}
