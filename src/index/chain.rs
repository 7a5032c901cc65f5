//! Chain walking
//!
//! Collision chains follow `key_link`; value chains follow `value_link`.
//! Both are only entered through published offsets (a cell or a link), so a
//! missing or truncated frame along the way is corruption, not absence.

use std::collections::HashSet;

use crate::error::{ChainError, Result};
use crate::record::{Record, Value, ValueType};
use crate::store::Store;

/// One node visited by a [`Chain`] walk
#[derive(Debug)]
pub(crate) struct ChainLink {
    pub record: Record,
    pub position: u64,
    /// Offset of the node that links here, `None` for the head
    pub predecessor: Option<u64>,
}

/// Cursor over one collision chain, head to tail
pub(crate) struct Chain<'a> {
    store: &'a mut Store,
    next: Option<u64>,
    predecessor: Option<u64>,
    failed: bool,
}

impl<'a> Chain<'a> {
    pub(crate) fn new(store: &'a mut Store, head: Option<u64>) -> Self {
        Self {
            store,
            next: head,
            predecessor: None,
            failed: false,
        }
    }
}

impl<'a> Iterator for Chain<'a> {
    type Item = Result<ChainLink>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let position = self.next?;

        match read_chain_node(self.store, position) {
            Ok(record) => {
                let predecessor = self.predecessor.replace(position);
                self.next = record.key_link();
                Some(Ok(ChainLink {
                    record,
                    position,
                    predecessor,
                }))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

/// Read a record reached through a published offset and check its key link
pub(crate) fn read_chain_node(store: &mut Store, position: u64) -> Result<Record> {
    let record = read_linked(store, position)?;

    if let Some(next) = record.key_link() {
        if next >= position {
            tracing::warn!("Key link {} -> {} does not point backward", position, next);
            return Err(ChainError::Corruption(format!(
                "key link of record {} points forward to {}",
                position, next
            )));
        }
    }
    Ok(record)
}

fn read_linked(store: &mut Store, position: u64) -> Result<Record> {
    match store.read(position)? {
        Some(record) => Ok(record),
        None => {
            tracing::warn!(
                "Dangling link to {} (log end {})",
                position,
                store.len()
            );
            Err(ChainError::Corruption(format!(
                "link points to missing record at {}",
                position
            )))
        }
    }
}

/// Fold the value chain behind a list or set head into the head record.
///
/// Items are ordered newest first; set members keep their first (newest)
/// occurrence. Scalars and vectors are returned as they are.
pub(crate) fn materialize(store: &mut Store, mut head: Record) -> Result<Record> {
    let value_type = head.value_type();
    if !value_type.is_multi_valued() {
        return Ok(head);
    }

    let mut items: Vec<String> = head.value.items().unwrap_or(&[]).to_vec();
    let mut current = head.store_position();
    let mut link = head.value_link();

    while let Some(position) = link {
        if let Some(from) = current {
            if position >= from {
                return Err(ChainError::Corruption(format!(
                    "value link of record {} points forward to {}",
                    from, position
                )));
            }
        }

        let older = read_linked(store, position)?;
        if older.value_type() != value_type {
            return Err(ChainError::Corruption(format!(
                "value chain of {} mixes {:?} with {:?} at {}",
                head.key,
                value_type,
                older.value_type(),
                position
            )));
        }

        tracing::trace!("Value chain of {} continues at {}", head.key, position);
        items.extend(older.value.items().unwrap_or(&[]).iter().cloned());
        current = Some(position);
        link = older.value_link();
    }

    head.value = if value_type == ValueType::List {
        Value::List(items)
    } else {
        let mut seen = HashSet::new();
        Value::Set(items.into_iter().filter(|m| seen.insert(m.clone())).collect())
    };
    Ok(head)
}
