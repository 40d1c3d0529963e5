//! Error types for meshkv
//!
//! Provides a unified error type for all operations. Soft outcomes of the
//! storage contract (missing key, rejected put) are values, not errors.

use thiserror::Error;

use crate::protocol::Status;
use crate::registry::DatabaseId;

/// Result type alias using MeshError
pub type Result<T> = std::result::Result<T, MeshError>;

/// Unified error type for meshkv operations
#[derive(Debug, Error)]
pub enum MeshError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    /// The backing medium of an engine is corrupted or unreachable.
    #[error("Engine failure: {0}")]
    Engine(String),

    /// The database hit an engine failure earlier and refuses further work.
    #[error("Database {0} is poisoned by an earlier engine failure")]
    Poisoned(DatabaseId),

    #[error("Database already exists: {0}")]
    DatabaseExists(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Network Errors
    // -------------------------------------------------------------------------
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A status code returned by the remote provider, forwarded as-is.
    #[error("Remote provider returned {0}")]
    Remote(Status),

    /// A fetched value is longer than the caller allowed; `size` is its
    /// actual length.
    #[error("Value of {size} bytes exceeds the requested size")]
    Truncated { size: u64 },

    #[error("Provider {0} is already registered")]
    ProviderExists(u8),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<bincode::Error> for MeshError {
    fn from(err: bincode::Error) -> Self {
        MeshError::Serialization(err.to_string())
    }
}

impl From<sled::Error> for MeshError {
    fn from(err: sled::Error) -> Self {
        MeshError::Engine(err.to_string())
    }
}

impl MeshError {
    /// Whether this error means the engine behind a database is unusable.
    pub fn is_engine_failure(&self) -> bool {
        matches!(self, MeshError::Engine(_) | MeshError::Poisoned(_))
    }

    /// The provider status behind this error, if it came from one
    pub fn remote_status(&self) -> Option<Status> {
        match self {
            MeshError::Remote(status) => Some(*status),
            MeshError::Truncated { .. } => Some(Status::Truncated),
            _ => None,
        }
    }
}
