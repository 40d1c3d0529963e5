//! Configuration for meshkv
//!
//! Centralized configuration with sensible defaults. The same `Config` is
//! consumed by the server (listen address, connection limits) and by the
//! client (inline threshold, call timeout, bulk buffer pools).

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{MeshError, Result};
use crate::protocol::MAX_RPC_MESSAGE_SIZE;

/// Main configuration for a meshkv endpoint
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Parent directory for persistent databases declared by the server.
    pub data_dir: PathBuf,

    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// TCP listen address
    pub listen_addr: String,

    /// Max concurrent client connections
    pub max_connections: usize,

    /// Idle read timeout for server connections (milliseconds, 0 = none)
    pub read_timeout_ms: u64,

    /// Client-side timeout for one RPC (milliseconds, 0 = none)
    pub rpc_timeout_ms: u64,

    // -------------------------------------------------------------------------
    // Transfer Configuration
    // -------------------------------------------------------------------------
    /// Largest message (key + value + header overhead) sent inline.
    /// Anything bigger goes through a bulk transfer.
    pub max_inline_size: usize,

    /// Pre-allocated bulk buffers; `None` allocates per call.
    pub bulk_pool: Option<BulkPoolConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./meshkv_data"),
            listen_addr: "127.0.0.1:7878".to_string(),
            max_connections: 1024,
            read_timeout_ms: 0,
            rpc_timeout_ms: 0,
            max_inline_size: MAX_RPC_MESSAGE_SIZE,
            bulk_pool: None,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Call timeout as a `Duration`, if one is configured
    pub fn rpc_timeout(&self) -> Option<Duration> {
        (self.rpc_timeout_ms > 0).then(|| Duration::from_millis(self.rpc_timeout_ms))
    }

    /// Idle read timeout as a `Duration`, if one is configured
    pub fn read_timeout(&self) -> Option<Duration> {
        (self.read_timeout_ms > 0).then(|| Duration::from_millis(self.read_timeout_ms))
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (parent of persistent databases)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the TCP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the maximum number of concurrent connections
    pub fn max_connections(mut self, count: usize) -> Self {
        self.config.max_connections = count;
        self
    }

    /// Set the server idle read timeout (in milliseconds)
    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.read_timeout_ms = ms;
        self
    }

    /// Set the client call timeout (in milliseconds)
    pub fn rpc_timeout_ms(mut self, ms: u64) -> Self {
        self.config.rpc_timeout_ms = ms;
        self
    }

    /// Set the inline/bulk threshold (in bytes)
    pub fn max_inline_size(mut self, size: usize) -> Self {
        self.config.max_inline_size = size;
        self
    }

    /// Enable pre-allocated bulk buffers
    pub fn bulk_pool(mut self, pool: BulkPoolConfig) -> Self {
        self.config.bulk_pool = Some(pool);
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

// =============================================================================
// Bulk Buffer Pools
// =============================================================================

/// Sizing of the client's bulk buffer pools.
///
/// Pool `i` holds `nbufs` buffers of `first_size * size_multiple^i` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkPoolConfig {
    pub npools: usize,
    pub nbufs: usize,
    pub first_size: usize,
    pub size_multiple: usize,
}

impl BulkPoolConfig {
    pub const ENV_NPOOLS: &'static str = "MESHKV_BULK_NPOOLS";
    pub const ENV_NBUFS: &'static str = "MESHKV_BULK_NBUFS";
    pub const ENV_FIRST_SIZE: &'static str = "MESHKV_BULK_FIRST_SIZE";
    pub const ENV_SIZE_MULTIPLE: &'static str = "MESHKV_BULK_SIZE_MULTIPLE";

    /// Read the pool sizing from the process environment.
    ///
    /// Returns `Ok(None)` when none of the variables are set.
    pub fn from_env() -> Result<Option<Self>> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read the pool sizing through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Option<Self>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let names = [
            Self::ENV_NPOOLS,
            Self::ENV_NBUFS,
            Self::ENV_FIRST_SIZE,
            Self::ENV_SIZE_MULTIPLE,
        ];
        let values: Vec<Option<String>> = names.iter().map(|name| lookup(name)).collect();

        if values.iter().all(Option::is_none) {
            return Ok(None);
        }

        let mut parsed = [0usize; 4];
        for ((name, value), slot) in names.iter().zip(&values).zip(parsed.iter_mut()) {
            let raw = value
                .as_deref()
                .ok_or_else(|| MeshError::Config(format!("{} is not set", name)))?;
            *slot = raw.trim().parse().map_err(|_| {
                MeshError::Config(format!("{} must be a non-negative integer, got {:?}", name, raw))
            })?;
        }

        let config = Self {
            npools: parsed[0],
            nbufs: parsed[1],
            first_size: parsed[2],
            size_multiple: parsed[3],
        };
        config.validate()?;
        Ok(Some(config))
    }

    /// Reject sizings that cannot describe a usable pool set
    pub fn validate(&self) -> Result<()> {
        if self.npools == 0 || self.nbufs == 0 {
            return Err(MeshError::Config(
                "bulk pool set needs at least one pool and one buffer per pool".to_string(),
            ));
        }
        if self.first_size == 0 || self.size_multiple < 2 {
            return Err(MeshError::Config(format!(
                "bulk pool sizes must start above zero and grow (first_size={}, size_multiple={})",
                self.first_size, self.size_multiple
            )));
        }
        Ok(())
    }
}
