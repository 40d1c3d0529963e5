//! No-op backend
//!
//! Accepts every write and stores nothing. Useful for measuring the RPC path
//! without storage cost.

use std::path::Path;

use crate::error::Result;

use super::{Comparator, DataStore, KeyValue};

#[derive(Debug, Default)]
pub struct NullDataStore;

impl NullDataStore {
    pub fn new() -> Self {
        Self
    }
}

impl DataStore for NullDataStore {
    fn open_database(&self, _name: &str, _path: &Path) -> Result<()> {
        Ok(())
    }

    fn put(&self, _key: &[u8], _value: &[u8]) -> Result<bool> {
        Ok(true)
    }

    fn get(&self, _key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }

    fn exists(&self, _key: &[u8]) -> Result<bool> {
        Ok(false)
    }

    fn erase(&self, _key: &[u8]) -> Result<bool> {
        Ok(false)
    }

    fn list_keys(&self, _start_key: &[u8], _count: usize, _prefix: &[u8]) -> Result<Vec<Vec<u8>>> {
        Ok(Vec::new())
    }

    fn list_keyvals(&self, _start_key: &[u8], _count: usize, _prefix: &[u8]) -> Result<Vec<KeyValue>> {
        Ok(Vec::new())
    }

    fn list_key_range(&self, _lower: &[u8], _upper: &[u8], _max: usize) -> Result<Vec<Vec<u8>>> {
        Ok(Vec::new())
    }

    fn list_keyval_range(&self, _lower: &[u8], _upper: &[u8], _max: usize) -> Result<Vec<KeyValue>> {
        Ok(Vec::new())
    }

    fn set_comparison_function(&self, _comparator: Comparator) -> Result<()> {
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }
}
