//! Sled backend
//!
//! Persistent store over a sled database. Sled orders keys bytewise, so
//! custom comparators are not supported.

use std::cmp::Ordering;
use std::fs;
use std::ops::Bound;
use std::path::Path;

use parking_lot::RwLock;
use sled::{Db, IVec};

use crate::error::{MeshError, Result};

use super::{Comparator, DataStore, KeyValue, PrefixScan, Step, StoreOptions};

pub struct SledDataStore {
    options: StoreOptions,
    db: RwLock<Option<Db>>,
}

impl SledDataStore {
    pub fn new(options: StoreOptions) -> Self {
        Self {
            options,
            db: RwLock::new(None),
        }
    }

    /// Run `op` against the open database
    fn with_db<T>(&self, op: impl FnOnce(&Db) -> Result<T>) -> Result<T> {
        let guard = self.db.read();
        match guard.as_ref() {
            Some(db) => op(db),
            None => Err(MeshError::Engine("sled database is not open".to_string())),
        }
    }

    fn insert(&self, db: &Db, key: &[u8], value: &[u8]) -> Result<bool> {
        if self.options.rejects_existing() {
            let swapped = db.compare_and_swap(key, None::<&[u8]>, Some(value))?;
            return Ok(swapped.is_ok());
        }
        db.insert(key, value)?;
        Ok(true)
    }

    fn after(db: &Db, start_key: &[u8]) -> sled::Iter {
        if start_key.is_empty() {
            db.iter()
        } else {
            db.range::<&[u8], _>((Bound::Excluded(start_key), Bound::Unbounded))
        }
    }

    fn between(db: &Db, lower: &[u8], upper: &[u8]) -> Option<sled::Iter> {
        if lower.cmp(upper) != Ordering::Less {
            return None;
        }
        Some(db.range::<&[u8], _>((Bound::Excluded(lower), Bound::Included(upper))))
    }

    fn scan<T>(
        db: &Db,
        start_key: &[u8],
        count: usize,
        prefix: &[u8],
        project: impl Fn(IVec, IVec) -> T,
    ) -> Result<Vec<T>> {
        let mut scan = PrefixScan::new(prefix, count);
        let mut out = Vec::new();
        for entry in Self::after(db, start_key) {
            let (key, value) = entry?;
            match scan.step(&key) {
                Step::Take => out.push(project(key, value)),
                Step::Skip => {}
                Step::Stop => break,
            }
        }
        Ok(out)
    }

    fn range<T>(
        db: &Db,
        lower: &[u8],
        upper: &[u8],
        max: usize,
        project: impl Fn(IVec, IVec) -> T,
    ) -> Result<Vec<T>> {
        let Some(iter) = Self::between(db, lower, upper) else {
            return Ok(Vec::new());
        };
        let limit = if max == 0 { usize::MAX } else { max };
        iter.take(limit)
            .map(|entry| -> Result<T> {
                let (key, value) = entry?;
                Ok(project(key, value))
            })
            .collect()
    }
}

impl DataStore for SledDataStore {
    fn open_database(&self, name: &str, path: &Path) -> Result<()> {
        let db = if self.options.in_memory {
            sled::Config::new().temporary(true).open()?
        } else {
            fs::create_dir_all(path)?;
            sled::open(path.join(name))?
        };
        tracing::debug!("Opened sled database {} under {}", name, path.display());
        *self.db.write() = Some(db);
        Ok(())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<bool> {
        self.with_db(|db| self.insert(db, key, value))
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.with_db(|db| Ok(db.get(key)?.map(|value| value.to_vec())))
    }

    fn exists(&self, key: &[u8]) -> Result<bool> {
        self.with_db(|db| Ok(db.contains_key(key)?))
    }

    fn erase(&self, key: &[u8]) -> Result<bool> {
        self.with_db(|db| Ok(db.remove(key)?.is_some()))
    }

    fn list_keys(&self, start_key: &[u8], count: usize, prefix: &[u8]) -> Result<Vec<Vec<u8>>> {
        self.with_db(|db| Self::scan(db, start_key, count, prefix, |key, _| key.to_vec()))
    }

    fn list_keyvals(&self, start_key: &[u8], count: usize, prefix: &[u8]) -> Result<Vec<KeyValue>> {
        self.with_db(|db| {
            Self::scan(db, start_key, count, prefix, |key, value| {
                (key.to_vec(), value.to_vec())
            })
        })
    }

    fn list_key_range(&self, lower: &[u8], upper: &[u8], max: usize) -> Result<Vec<Vec<u8>>> {
        self.with_db(|db| Self::range(db, lower, upper, max, |key, _| key.to_vec()))
    }

    fn list_keyval_range(&self, lower: &[u8], upper: &[u8], max: usize) -> Result<Vec<KeyValue>> {
        self.with_db(|db| {
            Self::range(db, lower, upper, max, |key, value| {
                (key.to_vec(), value.to_vec())
            })
        })
    }

    fn set_comparison_function(&self, comparator: Comparator) -> Result<()> {
        Err(MeshError::Unsupported(format!(
            "sled orders keys bytewise and cannot use comparator {:?}",
            comparator.name()
        )))
    }

    fn sync(&self) -> Result<()> {
        self.with_db(|db| {
            db.flush()?;
            Ok(())
        })
    }
}
