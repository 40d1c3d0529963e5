//! Datastore Module
//!
//! The storage contract every backend satisfies, and the closed set of
//! backends a database can be created with.
//!
//! ## Responsibilities
//! - Ordered key semantics (bytewise by default, or a named comparator)
//! - Duplicate / overwrite policy on put
//! - Prefix listing and bounded range listing
//!
//! ## Backends
//! ```text
//! ┌──────────┬───────────────────────────────────────────────┐
//! │ map      │ BTreeMap under one RwLock (reference engine)  │
//! │ null     │ accepts everything, stores nothing            │
//! │ sled     │ persistent, bytewise order only               │
//! │ plugin   │ embedder-provided Box<dyn DataStore>          │
//! └──────────┴───────────────────────────────────────────────┘
//! ```

mod map;
mod null;
mod sled;

use std::cmp::Ordering;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{MeshError, Result};

pub use self::map::MapDataStore;
pub use self::null::NullDataStore;
pub use self::sled::SledDataStore;

/// A key/value pair as returned by the keyval listings
pub type KeyValue = (Vec<u8>, Vec<u8>);

/// The storage contract.
///
/// Every operation is atomic with respect to other operations on the same
/// store. `Err` is reserved for engine failures; missing keys and rejected
/// puts are reported through the return value.
pub trait DataStore: Send + Sync {
    /// (Re)initialize the namespace. Volatile backends drop prior contents.
    fn open_database(&self, name: &str, path: &Path) -> Result<()>;

    /// Insert `key`; `false` if the duplicate policy forbids it.
    fn put(&self, key: &[u8], value: &[u8]) -> Result<bool>;

    /// Repeated `put`. No atomicity across items.
    fn put_multi(&self, keys: &[&[u8]], values: &[&[u8]]) -> Result<Vec<bool>> {
        check_batch(keys, values)?;
        keys.iter()
            .zip(values)
            .map(|(key, value)| self.put(key, value))
            .collect()
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    fn exists(&self, key: &[u8]) -> Result<bool>;

    /// `true` if an entry was removed.
    fn erase(&self, key: &[u8]) -> Result<bool>;

    /// Up to `count` keys strictly after `start_key` (empty = from the
    /// beginning) that begin with `prefix`, in comparator order.
    fn list_keys(&self, start_key: &[u8], count: usize, prefix: &[u8]) -> Result<Vec<Vec<u8>>>;

    /// Same as [`DataStore::list_keys`] but with values.
    fn list_keyvals(&self, start_key: &[u8], count: usize, prefix: &[u8]) -> Result<Vec<KeyValue>>;

    /// Keys in `(lower, upper]`, capped at `max` (0 = unbounded).
    fn list_key_range(&self, lower: &[u8], upper: &[u8], max: usize) -> Result<Vec<Vec<u8>>>;

    /// Same as [`DataStore::list_key_range`] but with values.
    fn list_keyval_range(&self, lower: &[u8], upper: &[u8], max: usize) -> Result<Vec<KeyValue>>;

    /// Install a custom ordering. Rejected once the store holds keys.
    fn set_comparison_function(&self, comparator: Comparator) -> Result<()>;

    /// Flush to the backing medium.
    fn sync(&self) -> Result<()>;
}

pub(crate) fn check_batch(keys: &[&[u8]], values: &[&[u8]]) -> Result<()> {
    if keys.len() != values.len() {
        return Err(MeshError::InvalidArgument(format!(
            "put_multi got {} keys but {} values",
            keys.len(),
            values.len()
        )));
    }
    Ok(())
}

// =============================================================================
// Policies
// =============================================================================

/// What a put does when the key already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Duplicates {
    /// Reject the put, keep the stored value
    #[default]
    Ignore,
    /// Replace the stored value (unless `no_overwrite` is set)
    Allow,
}

/// Per-store options fixed at creation time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreOptions {
    pub duplicates: Duplicates,
    pub no_overwrite: bool,
    pub in_memory: bool,
}

impl StoreOptions {
    /// Whether a put on an existing key must be rejected
    pub fn rejects_existing(&self) -> bool {
        self.no_overwrite || self.duplicates == Duplicates::Ignore
    }
}

// =============================================================================
// Comparator
// =============================================================================

/// Signature of a key ordering function
pub type CompareFn = dyn Fn(&[u8], &[u8]) -> Ordering + Send + Sync;

/// A named key ordering.
///
/// Prefix listing assumes the ordering keeps keys sharing a prefix
/// contiguous, as bytewise order does.
#[derive(Clone)]
pub struct Comparator {
    name: Arc<str>,
    func: Arc<CompareFn>,
}

impl Comparator {
    pub fn new<F>(name: &str, func: F) -> Self
    where
        F: Fn(&[u8], &[u8]) -> Ordering + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(name),
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        (self.func)(a, b)
    }
}

impl fmt::Debug for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Comparator").field("name", &self.name).finish()
    }
}

// =============================================================================
// Prefix Scan
// =============================================================================

/// Verdict for one candidate key during a prefix scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Take,
    Skip,
    Stop,
}

/// Incremental filter shared by the backends' prefix listings.
///
/// Candidates must be fed in ascending order. A key whose leading bytes sort
/// after the prefix ends the scan; keys shorter than the prefix are skipped.
pub struct PrefixScan<'a> {
    prefix: &'a [u8],
    remaining: usize,
}

impl<'a> PrefixScan<'a> {
    pub fn new(prefix: &'a [u8], count: usize) -> Self {
        Self {
            prefix,
            remaining: count,
        }
    }

    pub fn step(&mut self, key: &[u8]) -> Step {
        if self.remaining == 0 {
            return Step::Stop;
        }
        if key.len() < self.prefix.len() {
            return Step::Skip;
        }
        match self.prefix.cmp(&key[..self.prefix.len()]) {
            Ordering::Equal => {
                self.remaining -= 1;
                Step::Take
            }
            Ordering::Less => Step::Stop,
            Ordering::Greater => Step::Skip,
        }
    }

    /// Whether the scan can still accept keys
    pub fn is_open(&self) -> bool {
        self.remaining > 0
    }
}

// =============================================================================
// Backend Selection
// =============================================================================

/// Backend a database is created with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Backend {
    #[default]
    Map,
    Null,
    Sled,
}

impl FromStr for Backend {
    type Err = MeshError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "map" => Ok(Backend::Map),
            "null" => Ok(Backend::Null),
            "sled" => Ok(Backend::Sled),
            _ => Err(MeshError::Config(format!("no such backend: {}", s))),
        }
    }
}

impl AsRef<str> for Backend {
    fn as_ref(&self) -> &str {
        match self {
            Backend::Map => "map",
            Backend::Null => "null",
            Backend::Sled => "sled",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_ref())
    }
}

/// The closed set of engines a database can hold
pub enum Store {
    Map(MapDataStore),
    Null(NullDataStore),
    Sled(SledDataStore),
    Plugin(Box<dyn DataStore>),
}

impl Store {
    /// Construct the engine for `backend` and install the comparator, before
    /// any key can be inserted.
    pub fn create(
        backend: Backend,
        options: StoreOptions,
        comparator: Option<Comparator>,
    ) -> Result<Self> {
        let store = match backend {
            Backend::Map => Store::Map(MapDataStore::new(options)),
            Backend::Null => Store::Null(NullDataStore::new()),
            Backend::Sled => Store::Sled(SledDataStore::new(options)),
        };
        if let Some(comparator) = comparator {
            store.set_comparison_function(comparator)?;
        }
        Ok(store)
    }

    /// Name of the engine, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Store::Map(_) => "map",
            Store::Null(_) => "null",
            Store::Sled(_) => "sled",
            Store::Plugin(_) => "plugin",
        }
    }

    fn inner(&self) -> &dyn DataStore {
        match self {
            Store::Map(store) => store,
            Store::Null(store) => store,
            Store::Sled(store) => store,
            Store::Plugin(store) => store.as_ref(),
        }
    }
}

impl DataStore for Store {
    fn open_database(&self, name: &str, path: &Path) -> Result<()> {
        self.inner().open_database(name, path)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<bool> {
        self.inner().put(key, value)
    }

    fn put_multi(&self, keys: &[&[u8]], values: &[&[u8]]) -> Result<Vec<bool>> {
        self.inner().put_multi(keys, values)
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.inner().get(key)
    }

    fn exists(&self, key: &[u8]) -> Result<bool> {
        self.inner().exists(key)
    }

    fn erase(&self, key: &[u8]) -> Result<bool> {
        self.inner().erase(key)
    }

    fn list_keys(&self, start_key: &[u8], count: usize, prefix: &[u8]) -> Result<Vec<Vec<u8>>> {
        self.inner().list_keys(start_key, count, prefix)
    }

    fn list_keyvals(&self, start_key: &[u8], count: usize, prefix: &[u8]) -> Result<Vec<KeyValue>> {
        self.inner().list_keyvals(start_key, count, prefix)
    }

    fn list_key_range(&self, lower: &[u8], upper: &[u8], max: usize) -> Result<Vec<Vec<u8>>> {
        self.inner().list_key_range(lower, upper, max)
    }

    fn list_keyval_range(&self, lower: &[u8], upper: &[u8], max: usize) -> Result<Vec<KeyValue>> {
        self.inner().list_keyval_range(lower, upper, max)
    }

    fn set_comparison_function(&self, comparator: Comparator) -> Result<()> {
        self.inner().set_comparison_function(comparator)
    }

    fn sync(&self) -> Result<()> {
        self.inner().sync()
    }
}
