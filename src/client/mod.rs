//! Client Module
//!
//! The caller's side of the protocol.
//!
//! ## Ownership
//! ```text
//!   Client ──owns──▶ BulkRegistry, BulkPoolSet, live-handle counter
//!     │
//!     └─ provider_handle(address, mplex_id)
//!          │
//!          ▼
//!   ProviderHandle (clone = ref_incr, drop = release)
//!     └─ every RPC: (handle, database id, ...) ──▶ Address::exchange
//! ```

mod address;
mod handle;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::bulk::{BulkPoolSet, BulkRegistry};
use crate::config::Config;
use crate::error::{MeshError, Result};
use crate::protocol::{write_frame, Frame};

pub use address::Address;
pub use handle::ProviderHandle;

pub(crate) struct ClientInner {
    config: Config,
    live_handles: AtomicU64,
    bulk: BulkRegistry,
    pool: Option<BulkPoolSet>,
}

impl ClientInner {
    /// A zero-filled buffer of `len` bytes, from the pools when enabled
    fn buffer(&self, len: usize) -> Vec<u8> {
        match &self.pool {
            Some(pool) => pool.acquire(len),
            None => vec![0; len],
        }
    }

    fn recycle(&self, buffers: impl IntoIterator<Item = Vec<u8>>) {
        if let Some(pool) = &self.pool {
            for buf in buffers {
                pool.release(buf);
            }
        }
    }
}

/// Entry point of the client library
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    pub fn new(config: Config) -> Result<Self> {
        let pool = config.bulk_pool.as_ref().map(BulkPoolSet::new).transpose()?;
        Ok(Self {
            inner: Arc::new(ClientInner {
                config,
                live_handles: AtomicU64::new(0),
                bulk: BulkRegistry::new(),
                pool,
            }),
        })
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Resolve `addr` ("host:port") to an address
    pub async fn lookup(&self, addr: &str) -> Result<Address> {
        let mut candidates = tokio::net::lookup_host(addr)
            .await
            .map_err(|e| MeshError::Transport(format!("lookup of {} failed: {}", addr, e)))?;
        candidates
            .next()
            .map(Address::new)
            .ok_or_else(|| MeshError::Transport(format!("lookup of {} returned nothing", addr)))
    }

    /// Handle on provider `mplex_id` behind `address`
    pub fn provider_handle(&self, address: &Address, mplex_id: u8) -> ProviderHandle {
        self.inner.live_handles.fetch_add(1, Ordering::AcqRel);
        ProviderHandle::new(Arc::clone(&self.inner), address.clone(), mplex_id)
    }

    /// Provider handles not yet fully released
    pub fn live_handles(&self) -> u64 {
        self.inner.live_handles.load(Ordering::Acquire)
    }

    /// Regions currently exposed for bulk transfers
    pub fn exposed_regions(&self) -> usize {
        self.inner.bulk.len()
    }

    /// Idle bulk buffers, when pools are enabled
    pub fn pooled_buffers(&self) -> Option<usize> {
        self.inner.pool.as_ref().map(BulkPoolSet::idle_buffers)
    }

    /// Tell the server behind `address` to stop serving. Does not wait.
    pub async fn shutdown_service(&self, address: &Address) -> Result<()> {
        let mut stream = address.checkout().await?;
        write_frame(&mut stream, &Frame::Shutdown)
            .await
            .map_err(|e| address.transport(e))?;
        tracing::debug!("Sent shutdown to {}", address.socket_addr());
        Ok(())
    }

    /// Tear the client down, reporting handles that were never released.
    ///
    /// Returns the number of leaked handles.
    pub fn finalize(self) -> u64 {
        let leaked = self.live_handles();
        if leaked > 0 {
            tracing::warn!("{} provider handle(s) still alive at finalize", leaked);
        }
        let exposed = self.exposed_regions();
        if exposed > 0 {
            tracing::warn!("{} bulk region(s) still exposed at finalize", exposed);
        }
        leaked
    }
}
