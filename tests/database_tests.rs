//! Tests for Database
//!
//! These tests verify:
//! - Lazy table opening and handle sharing
//! - Table listing
//! - Concurrent access through shared handles
//! - Close and reopen

use std::sync::Arc;
use std::thread;

use chainkv::{ChainError, Config, Database, Record};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_database() -> (TempDir, Database) {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .database("social")
        .shard_capacity(257)
        .build();
    let database = Database::open(config).unwrap();
    (temp_dir, database)
}

// =============================================================================
// Table Handle Tests
// =============================================================================

#[test]
fn test_open_creates_database_directory() {
    let (temp, database) = setup_temp_database();

    assert!(temp.path().join("social").is_dir());
    assert_eq!(database.name(), "social");
    assert_eq!(database.open_table_count(), 0);
}

#[test]
fn test_table_handles_are_shared() {
    let (_temp, database) = setup_temp_database();

    let first = database.table("people").unwrap();
    let second = database.table("people").unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(database.open_table_count(), 1);
}

#[test]
fn test_tables_are_independent() {
    let (_temp, database) = setup_temp_database();

    let people = database.table("people").unwrap();
    let places = database.table("places").unwrap();

    people.lock().put(Record::new("k", "person")).unwrap();
    places.lock().put(Record::new("k", "place")).unwrap();

    let person = people.lock().get("k").unwrap().unwrap();
    let place = places.lock().get("k").unwrap().unwrap();
    assert_eq!(person.value.as_str(), Some("person"));
    assert_eq!(place.value.as_str(), Some("place"));
}

#[test]
fn test_invalid_table_names() {
    let (_temp, database) = setup_temp_database();

    for name in ["", ".", "..", "a/b", "../escape"] {
        assert!(
            matches!(database.table(name), Err(ChainError::Config(_))),
            "{:?} should be rejected",
            name
        );
    }
}

#[test]
fn test_list_tables() {
    let (_temp, database) = setup_temp_database();

    database.table("zeta").unwrap();
    database.table("alpha").unwrap();

    assert_eq!(database.list_tables().unwrap(), vec!["alpha", "zeta"]);
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_concurrent_writers() {
    let (_temp, database) = setup_temp_database();
    let database = Arc::new(database);

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let database = Arc::clone(&database);
            thread::spawn(move || {
                let table = database.table("shared").unwrap();
                for i in 0..50 {
                    table
                        .lock()
                        .put(Record::new(format!("t{}:{}", t, i), i.to_string()))
                        .unwrap();
                    table.lock().put_set("writers", &t.to_string()).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let table = database.table("shared").unwrap();
    let mut table = table.lock();
    assert_eq!(table.key_count(), 201);

    let writers = table.get("writers").unwrap().unwrap();
    let mut members = writers.value.items().unwrap().to_vec();
    members.sort();
    assert_eq!(members, vec!["0", "1", "2", "3"]);
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_close_and_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .database("social")
        .build();

    {
        let database = Database::open(config.clone()).unwrap();
        let table = database.table("people").unwrap();
        table.lock().put_list("friends:1", "2").unwrap();
        table.lock().put_list("friends:1", "3").unwrap();
        drop(table);
        database.close().unwrap();
    }

    let database = Database::open(config).unwrap();
    assert_eq!(database.list_tables().unwrap(), vec!["people"]);

    let table = database.table("people").unwrap();
    let friends = table.lock().get("friends:1").unwrap().unwrap();
    assert_eq!(friends.value.items().unwrap(), &["3", "2"]);
}

#[test]
fn test_close_with_outstanding_handle() {
    let (_temp, database) = setup_temp_database();

    let held = database.table("people").unwrap();
    let result = database.close();

    assert!(matches!(result, Err(ChainError::Config(_))));
    drop(held);
}
