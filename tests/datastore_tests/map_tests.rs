//! Ordered Map Backend Tests
//!
//! Tests verify:
//! - Duplicate and overwrite policy on put
//! - Round trips including empty values
//! - Prefix listing with early termination and restart
//! - Range listing bounds
//! - Custom comparators
//! - Concurrent writers

use std::path::Path;
use std::sync::Arc;
use std::thread;

use meshkv::datastore::{
    Comparator, DataStore, Duplicates, MapDataStore, StoreOptions,
};

// =============================================================================
// Helper Functions
// =============================================================================

fn open_store(options: StoreOptions) -> MapDataStore {
    let store = MapDataStore::new(options);
    store.open_database("test", Path::new(".")).unwrap();
    store
}

fn default_store() -> MapDataStore {
    open_store(StoreOptions::default())
}

fn allow_store() -> MapDataStore {
    open_store(StoreOptions {
        duplicates: Duplicates::Allow,
        ..StoreOptions::default()
    })
}

fn populate(store: &MapDataStore, keys: &[&str]) {
    for key in keys {
        assert!(store.put(key.as_bytes(), b"v").unwrap());
    }
}

fn strings(keys: Vec<Vec<u8>>) -> Vec<String> {
    keys.into_iter()
        .map(|k| String::from_utf8(k).unwrap())
        .collect()
}

// =============================================================================
// Basic Operations Tests
// =============================================================================

#[test]
fn test_new_store_is_empty() {
    let store = default_store();
    assert!(store.is_empty());
    assert_eq!(store.len(), 0);
    assert_eq!(store.name(), "test");
}

#[test]
fn test_put_and_get() {
    let store = default_store();

    assert!(store.put(b"key1", b"value1").unwrap());

    assert_eq!(store.get(b"key1").unwrap(), Some(b"value1".to_vec()));
    assert!(store.exists(b"key1").unwrap());
}

#[test]
fn test_get_nonexistent_key() {
    let store = default_store();

    assert_eq!(store.get(b"missing").unwrap(), None);
    assert!(!store.exists(b"missing").unwrap());
}

#[test]
fn test_empty_value_round_trip() {
    let store = default_store();

    assert!(store.put(b"empty", b"").unwrap());

    assert_eq!(store.get(b"empty").unwrap(), Some(Vec::new()));
}

#[test]
fn test_binary_keys_and_values() {
    let store = default_store();
    let key = vec![0u8, 255, 1, 254];
    let value: Vec<u8> = (0..=255).collect();

    assert!(store.put(&key, &value).unwrap());

    assert_eq!(store.get(&key).unwrap(), Some(value));
}

// =============================================================================
// Duplicate Policy Tests
// =============================================================================

#[test]
fn test_ignore_policy_rejects_existing_key() {
    let store = default_store();

    assert!(store.put(b"key", b"first").unwrap());
    assert!(!store.put(b"key", b"second").unwrap());

    assert_eq!(store.get(b"key").unwrap(), Some(b"first".to_vec()));
    assert_eq!(store.len(), 1);
}

#[test]
fn test_allow_policy_overwrites() {
    let store = allow_store();

    assert!(store.put(b"key", b"first").unwrap());
    assert!(store.put(b"key", b"second").unwrap());

    assert_eq!(store.get(b"key").unwrap(), Some(b"second".to_vec()));
    assert_eq!(store.len(), 1);
}

#[test]
fn test_no_overwrite_wins_over_allow() {
    let store = open_store(StoreOptions {
        duplicates: Duplicates::Allow,
        no_overwrite: true,
        in_memory: false,
    });

    assert!(store.put(b"key", b"first").unwrap());
    assert!(!store.put(b"key", b"second").unwrap());

    assert_eq!(store.get(b"key").unwrap(), Some(b"first".to_vec()));
}

#[test]
fn test_put_multi_reports_each_item() {
    let store = default_store();
    store.put(b"b", b"old").unwrap();

    let keys: Vec<&[u8]> = vec![b"a", b"b", b"c"];
    let values: Vec<&[u8]> = vec![b"1", b"2", b"3"];
    let results = store.put_multi(&keys, &values).unwrap();

    assert_eq!(results, vec![true, false, true]);
    assert_eq!(store.get(b"b").unwrap(), Some(b"old".to_vec()));
    assert_eq!(store.len(), 3);
}

#[test]
fn test_put_multi_length_mismatch() {
    let store = default_store();

    let keys: Vec<&[u8]> = vec![b"a", b"b"];
    let values: Vec<&[u8]> = vec![b"1"];

    assert!(store.put_multi(&keys, &values).is_err());
    assert!(store.is_empty());
}

// =============================================================================
// Erase Tests
// =============================================================================

#[test]
fn test_erase_existing_key() {
    let store = default_store();
    store.put(b"key", b"value").unwrap();

    assert!(store.erase(b"key").unwrap());

    assert_eq!(store.get(b"key").unwrap(), None);
}

#[test]
fn test_erase_is_idempotent() {
    let store = default_store();
    store.put(b"other", b"value").unwrap();

    assert!(!store.erase(b"key").unwrap());
    store.put(b"key", b"value").unwrap();
    assert!(store.erase(b"key").unwrap());
    assert!(!store.erase(b"key").unwrap());

    assert_eq!(store.len(), 1);
}

#[test]
fn test_open_database_resets_contents() {
    let store = default_store();
    store.put(b"key", b"value").unwrap();

    store.open_database("fresh", Path::new(".")).unwrap();

    assert!(store.is_empty());
    assert_eq!(store.name(), "fresh");
}

// =============================================================================
// Prefix Listing Tests
// =============================================================================

#[test]
fn test_list_keys_with_prefix() {
    let store = default_store();
    populate(&store, &["XYZa", "XYZb", "other", "XYZc"]);

    let keys = store.list_keys(b"", 10, b"XYZ").unwrap();

    assert_eq!(strings(keys), vec!["XYZa", "XYZb", "XYZc"]);
}

#[test]
fn test_list_keys_without_prefix_returns_all_in_order() {
    let store = default_store();
    populate(&store, &["d", "a", "c", "b"]);

    let keys = store.list_keys(b"", 10, b"").unwrap();

    assert_eq!(strings(keys), vec!["a", "b", "c", "d"]);
}

#[test]
fn test_list_keys_start_key_is_exclusive() {
    let store = default_store();
    populate(&store, &["a", "b", "c", "d"]);

    let keys = store.list_keys(b"b", 10, b"").unwrap();

    assert_eq!(strings(keys), vec!["c", "d"]);
}

#[test]
fn test_list_keys_respects_count() {
    let store = default_store();
    populate(&store, &["a", "b", "c", "d"]);

    let keys = store.list_keys(b"", 2, b"").unwrap();

    assert_eq!(strings(keys), vec!["a", "b"]);
}

#[test]
fn test_list_keys_pages_restart_from_last_key() {
    let store = default_store();
    let all: Vec<String> = (0..25).map(|i| format!("key{:02}", i)).collect();
    for key in &all {
        store.put(key.as_bytes(), b"v").unwrap();
    }

    let mut seen = Vec::new();
    let mut start = Vec::new();
    loop {
        let page = store.list_keys(&start, 10, b"key").unwrap();
        if page.is_empty() {
            break;
        }
        start = page.last().unwrap().clone();
        seen.extend(strings(page));
    }

    assert_eq!(seen, all);
}

#[test]
fn test_list_keys_skips_keys_shorter_than_prefix() {
    let store = default_store();
    populate(&store, &["A", "AB", "ABC", "ABD", "B"]);

    let keys = store.list_keys(b"", 10, b"AB").unwrap();

    assert_eq!(strings(keys), vec!["AB", "ABC", "ABD"]);
}

#[test]
fn test_list_keys_fewer_available_than_requested() {
    let store = default_store();
    populate(&store, &["p1", "p2", "q1"]);

    let keys = store.list_keys(b"", 100, b"p").unwrap();

    assert_eq!(keys.len(), 2);
}

#[test]
fn test_list_keyvals_pairs_values() {
    let store = default_store();
    store.put(b"k1", b"v1").unwrap();
    store.put(b"k2", b"v2").unwrap();
    store.put(b"x", b"vx").unwrap();

    let pairs = store.list_keyvals(b"", 10, b"k").unwrap();

    assert_eq!(
        pairs,
        vec![
            (b"k1".to_vec(), b"v1".to_vec()),
            (b"k2".to_vec(), b"v2".to_vec()),
        ]
    );
}

// =============================================================================
// Range Listing Tests
// =============================================================================

#[test]
fn test_list_key_range_bounds() {
    let store = default_store();
    populate(&store, &["1", "3", "5", "7", "9"]);

    assert_eq!(strings(store.list_key_range(b"3", b"7", 0).unwrap()), vec!["5", "7"]);
    assert_eq!(strings(store.list_key_range(b"3", b"6", 0).unwrap()), vec!["5"]);
}

#[test]
fn test_list_key_range_respects_max() {
    let store = default_store();
    populate(&store, &["1", "3", "5", "7", "9"]);

    let keys = store.list_key_range(b"0", b"9", 2).unwrap();

    assert_eq!(strings(keys), vec!["1", "3"]);
}

#[test]
fn test_list_key_range_inverted_bounds_is_empty() {
    let store = default_store();
    populate(&store, &["1", "3", "5"]);

    assert!(store.list_key_range(b"5", b"1", 0).unwrap().is_empty());
    assert!(store.list_key_range(b"3", b"3", 0).unwrap().is_empty());
}

#[test]
fn test_list_keyval_range() {
    let store = default_store();
    store.put(b"a", b"1").unwrap();
    store.put(b"b", b"2").unwrap();
    store.put(b"c", b"3").unwrap();

    let pairs = store.list_keyval_range(b"a", b"c", 0).unwrap();

    assert_eq!(
        pairs,
        vec![(b"b".to_vec(), b"2".to_vec()), (b"c".to_vec(), b"3".to_vec())]
    );
}

// =============================================================================
// Comparator Tests
// =============================================================================

#[test]
fn test_reverse_comparator_orders_keys() {
    let store = default_store();
    store
        .set_comparison_function(Comparator::new("reverse", |a, b| b.cmp(a)))
        .unwrap();
    populate(&store, &["a", "c", "b"]);

    let keys = store.list_keys(b"", 10, b"").unwrap();

    assert_eq!(strings(keys), vec!["c", "b", "a"]);
}

#[test]
fn test_comparator_equality_governs_uniqueness() {
    let store = default_store();
    store
        .set_comparison_function(Comparator::new("case-insensitive", |a, b| {
            a.to_ascii_lowercase().cmp(&b.to_ascii_lowercase())
        }))
        .unwrap();

    assert!(store.put(b"Key", b"1").unwrap());
    assert!(!store.put(b"KEY", b"2").unwrap());

    assert_eq!(store.get(b"key").unwrap(), Some(b"1".to_vec()));
}

#[test]
fn test_comparator_rejected_on_populated_store() {
    let store = default_store();
    store.put(b"key", b"value").unwrap();

    let result = store.set_comparison_function(Comparator::new("reverse", |a, b| b.cmp(a)));

    assert!(result.is_err());
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_concurrent_disjoint_puts() {
    let store = Arc::new(default_store());
    let mut handles = vec![];

    for t in 0..8 {
        let store = Arc::clone(&store);
        handles.push(thread::spawn(move || {
            for i in 0..200 {
                let key = format!("t{}-k{:03}", t, i);
                assert!(store.put(key.as_bytes(), key.as_bytes()).unwrap());
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(store.len(), 8 * 200);
    for t in 0..8 {
        for i in 0..200 {
            let key = format!("t{}-k{:03}", t, i);
            assert_eq!(store.get(key.as_bytes()).unwrap(), Some(key.into_bytes()));
        }
    }
}

#[test]
fn test_concurrent_same_key_has_one_winner() {
    let store = Arc::new(default_store());
    let mut handles = vec![];

    for t in 0..8u8 {
        let store = Arc::clone(&store);
        handles.push(thread::spawn(move || {
            let value = vec![t; 1024];
            store.put(b"contended", &value).unwrap()
        }));
    }
    let winners: Vec<bool> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(winners.iter().filter(|won| **won).count(), 1);
    let stored = store.get(b"contended").unwrap().unwrap();
    assert_eq!(stored.len(), 1024);
    assert!(stored.iter().all(|byte| *byte == stored[0]));
}

#[test]
fn test_listing_during_writes_is_monotonic() {
    let store = Arc::new(default_store());
    for i in 0..100 {
        store.put(format!("k{:03}", i).as_bytes(), b"v").unwrap();
    }

    let writer = {
        let store = Arc::clone(&store);
        thread::spawn(move || {
            for i in 100..400 {
                store.put(format!("k{:03}", i).as_bytes(), b"v").unwrap();
            }
        })
    };

    for _ in 0..50 {
        let keys = store.list_keys(b"", 1000, b"k").unwrap();
        assert!(keys.windows(2).all(|pair| pair[0] < pair[1]));
    }
    writer.join().unwrap();
}
