//! Null Backend Tests

use std::path::Path;

use meshkv::datastore::{Comparator, DataStore, NullDataStore};

#[test]
fn test_null_store_accepts_and_forgets() {
    let store = NullDataStore::new();
    store.open_database("null", Path::new(".")).unwrap();

    assert!(store.put(b"key", b"value").unwrap());
    assert!(store.put(b"key", b"again").unwrap());

    assert_eq!(store.get(b"key").unwrap(), None);
    assert!(!store.exists(b"key").unwrap());
    assert!(!store.erase(b"key").unwrap());
}

#[test]
fn test_null_store_lists_nothing() {
    let store = NullDataStore::new();
    store.put(b"a", b"1").unwrap();

    assert!(store.list_keys(b"", 10, b"").unwrap().is_empty());
    assert!(store.list_keyvals(b"", 10, b"").unwrap().is_empty());
    assert!(store.list_key_range(b"", b"z", 0).unwrap().is_empty());
    assert!(store.list_keyval_range(b"", b"z", 0).unwrap().is_empty());
}

#[test]
fn test_null_store_put_multi_and_sync() {
    let store = NullDataStore::new();
    let keys: Vec<&[u8]> = vec![b"a", b"b"];
    let values: Vec<&[u8]> = vec![b"1", b"2"];

    assert_eq!(store.put_multi(&keys, &values).unwrap(), vec![true, true]);
    store
        .set_comparison_function(Comparator::new("reverse", |a, b| b.cmp(a)))
        .unwrap();
    store.sync().unwrap();
}
