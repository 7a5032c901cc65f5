//! Tests for Store
//!
//! These tests verify:
//! - Save/read in direct and batch mode
//! - Reads past the end or of a truncated log return None
//! - Malformed bytes are reported as corruption
//! - In-place link and tombstone patches, mirrored into the cache
//! - Persistence across reopen

use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::path::PathBuf;

use chainkv::record::{Record, HEADER_SIZE};
use chainkv::{ChainError, Config, Store};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_store() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("store.log");
    (temp_dir, path)
}

fn open_with(path: &PathBuf, flush_interval: usize, cache_capacity: usize) -> Store {
    let config = Config::builder()
        .flush_interval(flush_interval)
        .cache_capacity(cache_capacity)
        .build();
    Store::open(path, &config).unwrap()
}

fn file_len(path: &PathBuf) -> u64 {
    std::fs::metadata(path).unwrap().len()
}

// =============================================================================
// Save/Read Tests
// =============================================================================

#[test]
fn test_open_creates_file() {
    let (_temp, path) = setup_temp_store();
    let store = open_with(&path, 1, 16);

    assert!(path.exists());
    assert!(store.is_empty());
    assert_eq!(store.path(), path.as_path());
}

#[test]
fn test_save_returns_consecutive_offsets() {
    let (_temp, path) = setup_temp_store();
    let mut store = open_with(&path, 1, 0);

    let mut first = Record::new("a", "1");
    let mut second = Record::new("b", "2");
    let p1 = store.save(&mut first, None).unwrap();
    let p2 = store.save(&mut second, None).unwrap();

    assert_eq!(p1, 0);
    assert_eq!(p2, first.marshal().unwrap().len() as u64);
    assert_eq!(first.store_position(), Some(p1));
    assert_eq!(second.store_position(), Some(p2));
    assert_eq!(file_len(&path), store.len());
}

#[test]
fn test_read_back() {
    let (_temp, path) = setup_temp_store();
    let mut store = open_with(&path, 1, 0);

    let position = store.save(&mut Record::new("key", "value"), None).unwrap();
    let record = store.read(position).unwrap().unwrap();

    assert_eq!(record.key, "key");
    assert_eq!(record.value.as_str(), Some("value"));
    assert_eq!(record.store_position(), Some(position));
    assert!(!record.tombstone);
}

#[test]
fn test_save_clears_index_owned_fields() {
    let (_temp, path) = setup_temp_store();
    let mut store = open_with(&path, 1, 0);
    store.save(&mut Record::new("a", "1"), None).unwrap();

    let mut record = Record::new("b", "2");
    record.tombstone = true;
    record.set_key_link(0u64).unwrap();
    let position = store.save(&mut record, None).unwrap();

    let stored = store.read(position).unwrap().unwrap();
    assert!(!stored.tombstone);
    assert_eq!(stored.key_link(), None);
}

#[test]
fn test_save_with_prior_sets_value_link() {
    let (_temp, path) = setup_temp_store();
    let mut store = open_with(&path, 1, 0);

    let first = store.save(&mut Record::list_item("l", "a"), None).unwrap();
    let second = store.save(&mut Record::list_item("l", "b"), Some(first)).unwrap();

    assert_eq!(store.read(second).unwrap().unwrap().value_link(), Some(first));
}

#[test]
fn test_save_with_prior_past_end_is_type_mismatch() {
    let (_temp, path) = setup_temp_store();
    let mut store = open_with(&path, 1, 0);

    let result = store.save(&mut Record::new("k", "v"), Some(0));
    assert!(matches!(result, Err(ChainError::TypeMismatch(_))));
    assert!(store.is_empty());
}

#[test]
fn test_read_past_end_is_none() {
    let (_temp, path) = setup_temp_store();
    let mut store = open_with(&path, 1, 0);

    assert!(store.read(0).unwrap().is_none());
    store.save(&mut Record::new("k", "v"), None).unwrap();
    assert!(store.read(store.len()).unwrap().is_none());
    assert!(store.read(u64::MAX - 1).unwrap().is_none());
}

// =============================================================================
// Truncation and Corruption Tests
// =============================================================================

#[test]
fn test_truncated_frame_reads_none() {
    let (_temp, path) = setup_temp_store();
    let position = {
        let mut store = open_with(&path, 1, 0);
        store.save(&mut Record::new("first", "1"), None).unwrap();
        let position = store.save(&mut Record::new("second", "2"), None).unwrap();
        store.close().unwrap();
        position
    };

    let len = file_len(&path);
    let file = OpenOptions::new().write(true).open(&path).unwrap();
    file.set_len(len - 3).unwrap();
    drop(file);

    let mut store = open_with(&path, 1, 0);
    assert!(store.read(0).unwrap().is_some());
    assert!(store.read(position).unwrap().is_none());
}

#[test]
fn test_truncated_header_reads_none() {
    let (_temp, path) = setup_temp_store();
    {
        let mut store = open_with(&path, 1, 0);
        store.save(&mut Record::new("only", "1"), None).unwrap();
        store.close().unwrap();
    }

    let file = OpenOptions::new().write(true).open(&path).unwrap();
    file.set_len(HEADER_SIZE as u64 - 4).unwrap();
    drop(file);

    let mut store = open_with(&path, 1, 0);
    assert!(store.read(0).unwrap().is_none());
}

#[test]
fn test_corrupted_payload_is_corruption() {
    let (_temp, path) = setup_temp_store();
    {
        let mut store = open_with(&path, 1, 0);
        store.save(&mut Record::new("key", "a-long-enough-value"), None).unwrap();
        store.close().unwrap();
    }

    let mut file = OpenOptions::new().write(true).open(&path).unwrap();
    file.seek(SeekFrom::Start(HEADER_SIZE as u64 + 4)).unwrap();
    file.write_all(b"garbage").unwrap();
    drop(file);

    let mut store = open_with(&path, 1, 0);
    assert!(matches!(store.read(0), Err(ChainError::Corruption(_))));
}

#[test]
fn test_misaligned_read_is_corruption() {
    let (_temp, path) = setup_temp_store();
    let mut store = open_with(&path, 1, 0);
    store.save(&mut Record::new("key", "value"), None).unwrap();
    store.save(&mut Record::new("key2", "value2"), None).unwrap();

    assert!(store.read(3).is_err());
}

// =============================================================================
// Patch Tests
// =============================================================================

#[test]
fn test_update_record_link_inplace() {
    let (_temp, path) = setup_temp_store();
    let mut store = open_with(&path, 1, 0);

    let a = store.save(&mut Record::new("a", "1"), None).unwrap();
    let b = store.save(&mut Record::new("b", "2"), None).unwrap();
    let before = store.len();

    store.update_record_link_inplace(b, Some(a)).unwrap();
    assert_eq!(store.read(b).unwrap().unwrap().key_link(), Some(a));
    assert_eq!(store.len(), before);

    store.update_record_link_inplace::<u64>(b, None).unwrap();
    assert_eq!(store.read(b).unwrap().unwrap().key_link(), None);
}

#[test]
fn test_update_record_link_negative_is_type_mismatch() {
    let (_temp, path) = setup_temp_store();
    let mut store = open_with(&path, 1, 0);

    store.save(&mut Record::new("a", "1"), None).unwrap();
    let b = store.save(&mut Record::new("b", "2"), None).unwrap();

    let result = store.update_record_link_inplace(b, Some(-1i64));
    assert!(matches!(result, Err(ChainError::TypeMismatch(_))));
    assert_eq!(store.read(b).unwrap().unwrap().key_link(), None);
}

#[test]
fn test_mark_tombstone() {
    let (_temp, path) = setup_temp_store();
    let mut store = open_with(&path, 1, 0);

    let position = store.save(&mut Record::new("a", "1"), None).unwrap();
    store.mark_tombstone(position).unwrap();

    let record = store.read(position).unwrap().unwrap();
    assert!(record.tombstone);
    assert_eq!(record.key, "a");
}

#[test]
fn test_cache_mirrors_patches() {
    let (_temp, path) = setup_temp_store();
    let mut store = open_with(&path, 1, 8);

    let a = store.save(&mut Record::new("a", "1"), None).unwrap();
    let b = store.save(&mut Record::new("b", "2"), None).unwrap();
    assert!(store.cache().unwrap().contains(b));

    store.update_record_link_inplace(b, Some(a)).unwrap();
    store.mark_tombstone(b).unwrap();

    // Served from the cache
    let cached = store.read(b).unwrap().unwrap();
    assert_eq!(cached.key_link(), Some(a));
    assert!(cached.tombstone);
    store.close().unwrap();

    // Served from disk
    let mut reopened = open_with(&path, 1, 0);
    let on_disk = reopened.read(b).unwrap().unwrap();
    assert_eq!(on_disk, cached);
}

#[test]
fn test_cache_disabled() {
    let (_temp, path) = setup_temp_store();
    let mut store = open_with(&path, 1, 0);

    store.save(&mut Record::new("a", "1"), None).unwrap();
    assert!(store.cache().is_none());
    assert!(store.read(0).unwrap().is_some());
}

// =============================================================================
// Batch Mode Tests
// =============================================================================

#[test]
fn test_batch_defers_writes() {
    let (_temp, path) = setup_temp_store();
    let mut store = open_with(&path, 1_000, 0);

    store.begin_batch();
    assert!(store.is_batching());
    let a = store.save(&mut Record::new("a", "1"), None).unwrap();
    let b = store.save(&mut Record::new("b", "2"), None).unwrap();

    assert_eq!(file_len(&path), 0);
    assert!(store.pending_len() > 0);
    assert_eq!(store.read(a).unwrap().unwrap().key, "a");
    assert_eq!(store.read(b).unwrap().unwrap().key, "b");

    store.end_batch().unwrap();
    assert!(!store.is_batching());
    assert_eq!(store.pending_len(), 0);
    assert_eq!(file_len(&path), store.len());
}

#[test]
fn test_batch_drains_every_flush_interval() {
    let (_temp, path) = setup_temp_store();
    let mut store = open_with(&path, 3, 0);

    store.begin_batch();
    for i in 0..7 {
        store.save(&mut Record::new(format!("k{}", i), "v"), None).unwrap();
    }

    // Two drains of three records; one record still buffered
    assert!(store.pending_len() > 0);
    assert_eq!(file_len(&path) + store.pending_len() as u64, store.len());

    store.sync().unwrap();
    assert_eq!(store.pending_len(), 0);
    assert!(store.is_batching());
    assert_eq!(file_len(&path), store.len());
}

#[test]
fn test_batch_equivalence() {
    let (temp, direct_path) = setup_temp_store();
    let batch_path = temp.path().join("batch.log");

    let records: Vec<Record> = (0..50)
        .map(|i| Record::new(format!("key_{}", i), format!("value_{}", i)))
        .collect();

    let mut direct = open_with(&direct_path, 1, 0);
    let direct_positions: Vec<u64> = records
        .iter()
        .map(|r| direct.save(&mut r.clone(), None).unwrap())
        .collect();
    direct.close().unwrap();

    let mut batch = open_with(&batch_path, 7, 0);
    batch.begin_batch();
    let batch_positions: Vec<u64> = records
        .iter()
        .map(|r| batch.save(&mut r.clone(), None).unwrap())
        .collect();
    batch.end_batch().unwrap();
    batch.close().unwrap();

    assert_eq!(direct_positions, batch_positions);
    assert_eq!(
        std::fs::read(&direct_path).unwrap(),
        std::fs::read(&batch_path).unwrap()
    );
}

#[test]
fn test_drop_drains_pending_batch() {
    let (_temp, path) = setup_temp_store();
    {
        let mut store = open_with(&path, 1_000, 0);
        store.begin_batch();
        store.save(&mut Record::new("a", "1"), None).unwrap();
    }

    let mut store = open_with(&path, 1, 0);
    assert_eq!(store.read(0).unwrap().unwrap().key, "a");
}

// =============================================================================
// Persistence Tests
// =============================================================================

#[test]
fn test_reopen_appends_after_existing_records() {
    let (_temp, path) = setup_temp_store();
    let first = {
        let mut store = open_with(&path, 1, 0);
        let position = store.save(&mut Record::new("a", "1"), None).unwrap();
        store.close().unwrap();
        position
    };

    let mut store = open_with(&path, 1, 0);
    let second = store.save(&mut Record::new("b", "2"), None).unwrap();

    assert!(second > first);
    assert_eq!(store.read(first).unwrap().unwrap().key, "a");
    assert_eq!(store.read(second).unwrap().unwrap().key, "b");
}
