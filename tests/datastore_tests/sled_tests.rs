//! Sled Backend Tests
//!
//! Tests verify:
//! - Persistence across reopen
//! - Duplicate policy via compare-and-swap
//! - Listing semantics shared with the map backend
//! - Comparators are refused

use std::path::Path;

use tempfile::TempDir;

use meshkv::datastore::{Comparator, DataStore, Duplicates, SledDataStore, StoreOptions};
use meshkv::MeshError;

// =============================================================================
// Helper Functions
// =============================================================================

fn open_at(dir: &Path, options: StoreOptions) -> SledDataStore {
    let store = SledDataStore::new(options);
    store.open_database("sled-db", dir).unwrap();
    store
}

fn temp_store() -> (TempDir, SledDataStore) {
    let dir = TempDir::new().unwrap();
    let store = open_at(dir.path(), StoreOptions::default());
    (dir, store)
}

fn strings(keys: Vec<Vec<u8>>) -> Vec<String> {
    keys.into_iter()
        .map(|k| String::from_utf8(k).unwrap())
        .collect()
}

// =============================================================================
// Tests
// =============================================================================

#[test]
fn test_put_get_erase() {
    let (_dir, store) = temp_store();

    assert!(store.put(b"key", b"value").unwrap());
    assert_eq!(store.get(b"key").unwrap(), Some(b"value".to_vec()));
    assert!(store.exists(b"key").unwrap());

    assert!(store.erase(b"key").unwrap());
    assert!(!store.erase(b"key").unwrap());
    assert_eq!(store.get(b"key").unwrap(), None);
}

#[test]
fn test_ignore_policy_keeps_first_value() {
    let (_dir, store) = temp_store();

    assert!(store.put(b"key", b"first").unwrap());
    assert!(!store.put(b"key", b"second").unwrap());

    assert_eq!(store.get(b"key").unwrap(), Some(b"first".to_vec()));
}

#[test]
fn test_allow_policy_overwrites() {
    let dir = TempDir::new().unwrap();
    let store = open_at(
        dir.path(),
        StoreOptions {
            duplicates: Duplicates::Allow,
            ..StoreOptions::default()
        },
    );

    assert!(store.put(b"key", b"first").unwrap());
    assert!(store.put(b"key", b"second").unwrap());

    assert_eq!(store.get(b"key").unwrap(), Some(b"second".to_vec()));
}

#[test]
fn test_values_survive_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let store = open_at(dir.path(), StoreOptions::default());
        store.put(b"durable", b"yes").unwrap();
        store.sync().unwrap();
    }

    let store = open_at(dir.path(), StoreOptions::default());

    assert_eq!(store.get(b"durable").unwrap(), Some(b"yes".to_vec()));
}

#[test]
fn test_prefix_and_range_listing() {
    let (_dir, store) = temp_store();
    for key in ["XYZa", "XYZb", "other", "XYZc", "1", "3", "5", "7", "9"] {
        store.put(key.as_bytes(), b"v").unwrap();
    }

    assert_eq!(
        strings(store.list_keys(b"", 10, b"XYZ").unwrap()),
        vec!["XYZa", "XYZb", "XYZc"]
    );
    assert_eq!(strings(store.list_keys(b"XYZa", 10, b"XYZ").unwrap()), vec!["XYZb", "XYZc"]);
    assert_eq!(strings(store.list_key_range(b"3", b"7", 0).unwrap()), vec!["5", "7"]);
    assert_eq!(strings(store.list_key_range(b"3", b"6", 0).unwrap()), vec!["5"]);
    assert_eq!(
        store.list_keyvals(b"", 1, b"XYZ").unwrap(),
        vec![(b"XYZa".to_vec(), b"v".to_vec())]
    );
}

#[test]
fn test_in_memory_store_needs_no_directory() {
    let store = SledDataStore::new(StoreOptions {
        in_memory: true,
        ..StoreOptions::default()
    });
    store.open_database("scratch", Path::new("/nonexistent/meshkv")).unwrap();

    assert!(store.put(b"k", b"v").unwrap());
    assert_eq!(store.get(b"k").unwrap(), Some(b"v".to_vec()));
}

#[test]
fn test_unopened_store_reports_engine_failure() {
    let store = SledDataStore::new(StoreOptions::default());

    let result = store.get(b"key");

    assert!(matches!(result, Err(MeshError::Engine(_))));
}

#[test]
fn test_comparator_is_unsupported() {
    let (_dir, store) = temp_store();

    let result = store.set_comparison_function(Comparator::new("reverse", |a, b| b.cmp(a)));

    assert!(matches!(result, Err(MeshError::Unsupported(_))));
}
