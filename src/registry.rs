//! Database Registry
//!
//! Maps 64-bit database identifiers to open stores.
//!
//! ## Locking
//! - The table itself sits behind a light RwLock: lookups share it, only
//!   adding or removing a database takes it exclusively.
//! - Each database carries its own engine-level lock, so traffic on one
//!   database never waits on another.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::datastore::{Backend, Comparator, DataStore, Duplicates, KeyValue, Store, StoreOptions};
use crate::error::{MeshError, Result};

/// Wire identifier of a database, returned by `open`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DatabaseId(pub u64);

impl fmt::Display for DatabaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "db-{}", self.0)
    }
}

// =============================================================================
// Database Configuration
// =============================================================================

/// Declaration of one database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub name: String,
    /// Directory the backend keeps its files under (ignored by volatile backends)
    pub path: PathBuf,
    pub backend: Backend,
    pub duplicates: Duplicates,
    pub no_overwrite: bool,
    pub in_memory: bool,
    /// Name of a comparator registered on the provider
    pub comparator: Option<String>,
}

impl DatabaseConfig {
    /// Create a new config builder for the database `name`
    pub fn builder(name: impl Into<String>) -> DatabaseConfigBuilder {
        DatabaseConfigBuilder {
            config: DatabaseConfig {
                name: name.into(),
                path: PathBuf::from("."),
                backend: Backend::default(),
                duplicates: Duplicates::default(),
                no_overwrite: false,
                in_memory: false,
                comparator: None,
            },
        }
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            duplicates: self.duplicates,
            no_overwrite: self.no_overwrite,
            in_memory: self.in_memory,
        }
    }
}

/// Builder for DatabaseConfig
pub struct DatabaseConfigBuilder {
    config: DatabaseConfig,
}

impl DatabaseConfigBuilder {
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.path = path.into();
        self
    }

    pub fn backend(mut self, backend: Backend) -> Self {
        self.config.backend = backend;
        self
    }

    pub fn duplicates(mut self, duplicates: Duplicates) -> Self {
        self.config.duplicates = duplicates;
        self
    }

    pub fn no_overwrite(mut self, enabled: bool) -> Self {
        self.config.no_overwrite = enabled;
        self
    }

    pub fn in_memory(mut self, enabled: bool) -> Self {
        self.config.in_memory = enabled;
        self
    }

    pub fn comparator(mut self, name: impl Into<String>) -> Self {
        self.config.comparator = Some(name.into());
        self
    }

    pub fn build(self) -> DatabaseConfig {
        self.config
    }
}

// =============================================================================
// Database
// =============================================================================

/// An open database: a store plus the configuration it was created with.
///
/// The first engine failure poisons the database; every later call fails
/// with `MeshError::Poisoned` instead of reaching the store again.
pub struct Database {
    id: DatabaseId,
    config: DatabaseConfig,
    store: Store,
    poisoned: AtomicBool,
}

impl Database {
    pub fn id(&self) -> DatabaseId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Path the database was declared with
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::Acquire)
    }

    fn guard<T>(&self, op: impl FnOnce(&Store) -> Result<T>) -> Result<T> {
        if self.is_poisoned() {
            return Err(MeshError::Poisoned(self.id));
        }
        let result = op(&self.store);
        if let Err(MeshError::Engine(reason)) = &result {
            tracing::error!("Database {} ({}) poisoned: {}", self.id, self.config.name, reason);
            self.poisoned.store(true, Ordering::Release);
        }
        result
    }

    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<bool> {
        self.guard(|store| store.put(key, value))
    }

    pub fn put_multi(&self, keys: &[&[u8]], values: &[&[u8]]) -> Result<Vec<bool>> {
        self.guard(|store| store.put_multi(keys, values))
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.guard(|store| store.get(key))
    }

    pub fn exists(&self, key: &[u8]) -> Result<bool> {
        self.guard(|store| store.exists(key))
    }

    pub fn erase(&self, key: &[u8]) -> Result<bool> {
        self.guard(|store| store.erase(key))
    }

    pub fn list_keys(&self, start_key: &[u8], count: usize, prefix: &[u8]) -> Result<Vec<Vec<u8>>> {
        self.guard(|store| store.list_keys(start_key, count, prefix))
    }

    pub fn list_keyvals(&self, start_key: &[u8], count: usize, prefix: &[u8]) -> Result<Vec<KeyValue>> {
        self.guard(|store| store.list_keyvals(start_key, count, prefix))
    }

    pub fn list_key_range(&self, lower: &[u8], upper: &[u8], max: usize) -> Result<Vec<Vec<u8>>> {
        self.guard(|store| store.list_key_range(lower, upper, max))
    }

    pub fn list_keyval_range(&self, lower: &[u8], upper: &[u8], max: usize) -> Result<Vec<KeyValue>> {
        self.guard(|store| store.list_keyval_range(lower, upper, max))
    }

    pub fn sync(&self) -> Result<()> {
        self.guard(|store| store.sync())
    }
}

// =============================================================================
// Registry
// =============================================================================

#[derive(Default)]
struct Table {
    by_id: HashMap<DatabaseId, Arc<Database>>,
    by_name: HashMap<String, DatabaseId>,
}

/// Identifier → database table of one provider
pub struct DatabaseRegistry {
    next_id: AtomicU64,
    table: RwLock<Table>,
}

impl Default for DatabaseRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DatabaseRegistry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            table: RwLock::new(Table::default()),
        }
    }

    /// Create the store `config` declares, open it, and register it.
    ///
    /// `comparator` must already be resolved from `config.comparator`.
    pub fn open(&self, config: DatabaseConfig, comparator: Option<Comparator>) -> Result<DatabaseId> {
        let store = Store::create(config.backend, config.store_options(), comparator)?;
        self.insert(config, store)
    }

    /// Register an already-constructed store under `config`.
    pub fn insert(&self, config: DatabaseConfig, store: Store) -> Result<DatabaseId> {
        if self.find(&config.name).is_some() {
            return Err(MeshError::DatabaseExists(config.name));
        }

        store.open_database(&config.name, &config.path)?;

        let mut table = self.table.write();
        if table.by_name.contains_key(&config.name) {
            return Err(MeshError::DatabaseExists(config.name));
        }

        let id = DatabaseId(self.next_id.fetch_add(1, Ordering::SeqCst));
        tracing::debug!(
            "Registered database {} as {} ({} backend)",
            config.name,
            id,
            store.kind()
        );
        table.by_name.insert(config.name.clone(), id);
        table.by_id.insert(
            id,
            Arc::new(Database {
                id,
                config,
                store,
                poisoned: AtomicBool::new(false),
            }),
        );
        Ok(id)
    }

    /// Look up an open database
    pub fn get(&self, id: DatabaseId) -> Option<Arc<Database>> {
        self.table.read().by_id.get(&id).cloned()
    }

    /// Resolve a database name to its identifier
    pub fn find(&self, name: &str) -> Option<DatabaseId> {
        self.table.read().by_name.get(name).copied()
    }

    /// Close a database. In-flight calls holding it finish normally.
    pub fn remove(&self, id: DatabaseId) -> Option<Arc<Database>> {
        let mut table = self.table.write();
        let database = table.by_id.remove(&id)?;
        table.by_name.remove(database.name());
        Some(database)
    }

    /// Identifiers of all open databases, ascending
    pub fn ids(&self) -> Vec<DatabaseId> {
        let mut ids: Vec<DatabaseId> = self.table.read().by_id.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.table.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flush every open database
    pub fn sync_all(&self) -> Result<()> {
        let databases: Vec<Arc<Database>> = self.table.read().by_id.values().cloned().collect();
        for database in databases {
            database.sync()?;
        }
        Ok(())
    }
}
