//! Provider
//!
//! One multiplexed service instance: its databases, the comparators they
//! may be created with, and per-RPC counters.

use std::cmp::Ordering as KeyOrdering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::datastore::{Comparator, DataStore, Store};
use crate::error::{MeshError, Result};
use crate::protocol::RpcKind;
use crate::registry::{Database, DatabaseConfig, DatabaseId, DatabaseRegistry};

/// Calls served, per kind
struct RpcCounters {
    counts: HashMap<RpcKind, AtomicU64>,
}

impl RpcCounters {
    fn new() -> Self {
        Self {
            counts: RpcKind::ALL
                .iter()
                .map(|kind| (*kind, AtomicU64::new(0)))
                .collect(),
        }
    }

    fn record(&self, kind: RpcKind) {
        if let Some(count) = self.counts.get(&kind) {
            count.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn get(&self, kind: RpcKind) -> u64 {
        self.counts
            .get(&kind)
            .map(|count| count.load(Ordering::Relaxed))
            .unwrap_or(0)
    }
}

/// A provider reachable through one multiplex id of a server
pub struct Provider {
    id: u8,
    registry: DatabaseRegistry,
    comparators: RwLock<HashMap<String, Comparator>>,
    counters: RpcCounters,
}

impl Provider {
    pub fn new(id: u8) -> Self {
        Self {
            id,
            registry: DatabaseRegistry::new(),
            comparators: RwLock::new(HashMap::new()),
            counters: RpcCounters::new(),
        }
    }

    /// Multiplex id this provider answers to
    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn registry(&self) -> &DatabaseRegistry {
        &self.registry
    }

    /// Register a named key ordering for later `add_database` calls
    pub fn add_comparison_function<F>(&self, name: &str, func: F) -> Result<()>
    where
        F: Fn(&[u8], &[u8]) -> KeyOrdering + Send + Sync + 'static,
    {
        let mut comparators = self.comparators.write();
        if comparators.contains_key(name) {
            return Err(MeshError::InvalidArgument(format!(
                "comparator {:?} is already registered",
                name
            )));
        }
        comparators.insert(name.to_string(), Comparator::new(name, func));
        Ok(())
    }

    fn resolve_comparator(&self, config: &DatabaseConfig) -> Result<Option<Comparator>> {
        let Some(name) = &config.comparator else {
            return Ok(None);
        };
        self.comparators
            .read()
            .get(name)
            .cloned()
            .map(Some)
            .ok_or_else(|| MeshError::InvalidArgument(format!("no comparator named {:?}", name)))
    }

    /// Create and open a database from its declaration
    pub fn add_database(&self, config: DatabaseConfig) -> Result<DatabaseId> {
        let comparator = self.resolve_comparator(&config)?;
        let id = self.registry.open(config, comparator)?;
        tracing::debug!("Provider {} now serves {}", self.id, id);
        Ok(id)
    }

    /// Serve an embedder-supplied engine under `config`
    pub fn attach_database(&self, config: DatabaseConfig, engine: Box<dyn DataStore>) -> Result<DatabaseId> {
        let store = Store::Plugin(engine);
        if let Some(comparator) = self.resolve_comparator(&config)? {
            store.set_comparison_function(comparator)?;
        }
        self.registry.insert(config, store)
    }

    pub fn database(&self, id: DatabaseId) -> Option<Arc<Database>> {
        self.registry.get(id)
    }

    pub fn find_database(&self, name: &str) -> Option<DatabaseId> {
        self.registry.find(name)
    }

    /// Close a database; `false` if it was not open
    pub fn remove_database(&self, id: DatabaseId) -> bool {
        let removed = self.registry.remove(id);
        if let Some(database) = &removed {
            tracing::debug!("Provider {} closed {} ({})", self.id, id, database.name());
        }
        removed.is_some()
    }

    pub fn databases(&self) -> Vec<DatabaseId> {
        self.registry.ids()
    }

    /// Calls of `kind` this provider has served
    pub fn rpc_count(&self, kind: RpcKind) -> u64 {
        self.counters.get(kind)
    }

    pub(crate) fn record(&self, kind: RpcKind) {
        self.counters.record(kind);
    }
}
