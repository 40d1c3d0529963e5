//! Ordered map backend
//!
//! BTreeMap-based store with one RwLock per database. Reads (get, exists,
//! listings) share the lock for their whole duration; writes take it
//! exclusively.

use std::cmp::Ordering;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::path::Path;

use parking_lot::RwLock;

use crate::error::{MeshError, Result};

use super::{check_batch, Comparator, DataStore, KeyValue, PrefixScan, Step, StoreOptions};

/// Key wrapper ordering itself with the database's comparator
#[derive(Clone)]
struct MapKey {
    bytes: Vec<u8>,
    order: Option<Comparator>,
}

impl MapKey {
    fn new(bytes: &[u8], order: &Option<Comparator>) -> Self {
        Self {
            bytes: bytes.to_vec(),
            order: order.clone(),
        }
    }
}

impl Ord for MapKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match &self.order {
            Some(comparator) => comparator.compare(&self.bytes, &other.bytes),
            None => self.bytes.cmp(&other.bytes),
        }
    }
}

impl PartialOrd for MapKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for MapKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for MapKey {}

struct MapState {
    name: String,
    entries: BTreeMap<MapKey, Vec<u8>>,
    comparator: Option<Comparator>,
}

impl MapState {
    fn probe(&self, key: &[u8]) -> MapKey {
        MapKey::new(key, &self.comparator)
    }

    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        match &self.comparator {
            Some(comparator) => comparator.compare(a, b),
            None => a.cmp(b),
        }
    }

    fn insert(&mut self, options: &StoreOptions, key: &[u8], value: &[u8]) -> bool {
        let probe = self.probe(key);
        match self.entries.entry(probe) {
            Entry::Occupied(_) if options.rejects_existing() => false,
            Entry::Occupied(mut stored) => {
                stored.insert(value.to_vec());
                true
            }
            Entry::Vacant(slot) => {
                slot.insert(value.to_vec());
                true
            }
        }
    }

    /// Entries strictly after `start_key`, or all of them when it is empty
    fn after<'s>(&'s self, start_key: &[u8]) -> impl Iterator<Item = (&'s MapKey, &'s Vec<u8>)> {
        let lower = if start_key.is_empty() {
            Bound::Unbounded
        } else {
            Bound::Excluded(self.probe(start_key))
        };
        self.entries.range((lower, Bound::Unbounded))
    }

    /// Entries in `(lower, upper]`; empty when the bounds are inverted
    fn between<'s>(
        &'s self,
        lower: &[u8],
        upper: &[u8],
    ) -> Option<impl Iterator<Item = (&'s MapKey, &'s Vec<u8>)>> {
        if self.compare(lower, upper) != Ordering::Less {
            return None;
        }
        let range = (
            Bound::Excluded(self.probe(lower)),
            Bound::Included(self.probe(upper)),
        );
        Some(self.entries.range(range))
    }
}

/// In-memory ordered store
pub struct MapDataStore {
    options: StoreOptions,
    state: RwLock<MapState>,
}

impl MapDataStore {
    pub fn new(options: StoreOptions) -> Self {
        Self {
            options,
            state: RwLock::new(MapState {
                name: String::new(),
                entries: BTreeMap::new(),
                comparator: None,
            }),
        }
    }

    /// Name given at the last `open_database`
    pub fn name(&self) -> String {
        self.state.read().name.clone()
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().entries.is_empty()
    }
}

impl DataStore for MapDataStore {
    fn open_database(&self, name: &str, _path: &Path) -> Result<()> {
        let mut state = self.state.write();
        state.name = name.to_string();
        state.entries.clear();
        Ok(())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<bool> {
        let mut state = self.state.write();
        Ok(state.insert(&self.options, key, value))
    }

    fn put_multi(&self, keys: &[&[u8]], values: &[&[u8]]) -> Result<Vec<bool>> {
        check_batch(keys, values)?;
        let mut state = self.state.write();
        Ok(keys
            .iter()
            .zip(values)
            .map(|(key, value)| state.insert(&self.options, key, value))
            .collect())
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let state = self.state.read();
        Ok(state.entries.get(&state.probe(key)).cloned())
    }

    fn exists(&self, key: &[u8]) -> Result<bool> {
        let state = self.state.read();
        Ok(state.entries.contains_key(&state.probe(key)))
    }

    fn erase(&self, key: &[u8]) -> Result<bool> {
        let mut state = self.state.write();
        let probe = state.probe(key);
        Ok(state.entries.remove(&probe).is_some())
    }

    fn list_keys(&self, start_key: &[u8], count: usize, prefix: &[u8]) -> Result<Vec<Vec<u8>>> {
        let state = self.state.read();
        let mut scan = PrefixScan::new(prefix, count);
        let mut keys = Vec::new();
        for (key, _) in state.after(start_key) {
            match scan.step(&key.bytes) {
                Step::Take => keys.push(key.bytes.clone()),
                Step::Skip => {}
                Step::Stop => break,
            }
        }
        Ok(keys)
    }

    fn list_keyvals(&self, start_key: &[u8], count: usize, prefix: &[u8]) -> Result<Vec<KeyValue>> {
        let state = self.state.read();
        let mut scan = PrefixScan::new(prefix, count);
        let mut pairs = Vec::new();
        for (key, value) in state.after(start_key) {
            match scan.step(&key.bytes) {
                Step::Take => pairs.push((key.bytes.clone(), value.clone())),
                Step::Skip => {}
                Step::Stop => break,
            }
        }
        Ok(pairs)
    }

    fn list_key_range(&self, lower: &[u8], upper: &[u8], max: usize) -> Result<Vec<Vec<u8>>> {
        let state = self.state.read();
        let limit = if max == 0 { usize::MAX } else { max };
        let keys = match state.between(lower, upper) {
            Some(range) => range.take(limit).map(|(key, _)| key.bytes.clone()).collect(),
            None => Vec::new(),
        };
        Ok(keys)
    }

    fn list_keyval_range(&self, lower: &[u8], upper: &[u8], max: usize) -> Result<Vec<KeyValue>> {
        let state = self.state.read();
        let limit = if max == 0 { usize::MAX } else { max };
        let pairs = match state.between(lower, upper) {
            Some(range) => range
                .take(limit)
                .map(|(key, value)| (key.bytes.clone(), value.clone()))
                .collect(),
            None => Vec::new(),
        };
        Ok(pairs)
    }

    fn set_comparison_function(&self, comparator: Comparator) -> Result<()> {
        let mut state = self.state.write();
        if !state.entries.is_empty() {
            return Err(MeshError::InvalidArgument(format!(
                "cannot install comparator {:?} on a database holding {} keys",
                comparator.name(),
                state.entries.len()
            )));
        }
        state.comparator = Some(comparator);
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }
}
