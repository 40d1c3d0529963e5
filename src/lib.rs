//! # meshkv
//!
//! A multiplexed key-value service with:
//! - Interchangeable storage engines behind one ordered-map contract
//! - Named databases addressed by 64-bit identifiers
//! - Size-aware RPCs: small payloads inline, large ones by bulk transfer
//! - Several independent providers behind one listening address
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │          Client  ──  ProviderHandle (refcounted)             │
//! │          exposes bulk regions for large payloads             │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │  frames over TCP
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                  Server  (tokio tasks)                       │
//! │            routes by multiplex id to a Provider              │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │        Provider  ──  DatabaseRegistry (id → Database)        │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┼────────────┐
//!          ▼            ▼            ▼
//!   ┌───────────┐ ┌───────────┐ ┌───────────┐
//!   │    map    │ │   null    │ │   sled    │
//!   │ (RwLock)  │ │  (no-op)  │ │ (on disk) │
//!   └───────────┘ └───────────┘ └───────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod datastore;
pub mod registry;
pub mod protocol;
pub mod bulk;
pub mod network;
pub mod client;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{MeshError, Result};
pub use config::{BulkPoolConfig, Config};
pub use datastore::{Backend, DataStore, Duplicates};
pub use registry::{DatabaseConfig, DatabaseId};
pub use network::{Provider, Server};
pub use client::{Address, Client, ProviderHandle};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of meshkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
