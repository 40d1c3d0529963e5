//! Request definitions
//!
//! Represents calls from a client to one provider.

use serde::{Deserialize, Serialize};

use crate::registry::DatabaseId;

use super::transfer::BulkDescriptor;

/// RPC kinds, used for routing and per-provider counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum RpcKind {
    Open = 0x01,
    Put = 0x02,
    BulkPut = 0x03,
    Get = 0x04,
    BulkGet = 0x05,
    Erase = 0x06,
    Length = 0x07,
    ListKeys = 0x08,
    ListKeyVals = 0x09,
}

impl RpcKind {
    pub const ALL: [RpcKind; 9] = [
        RpcKind::Open,
        RpcKind::Put,
        RpcKind::BulkPut,
        RpcKind::Get,
        RpcKind::BulkGet,
        RpcKind::Erase,
        RpcKind::Length,
        RpcKind::ListKeys,
        RpcKind::ListKeyVals,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RpcKind::Open => "open",
            RpcKind::Put => "put",
            RpcKind::BulkPut => "bulk_put",
            RpcKind::Get => "get",
            RpcKind::BulkGet => "bulk_get",
            RpcKind::Erase => "erase",
            RpcKind::Length => "length",
            RpcKind::ListKeys => "list_keys",
            RpcKind::ListKeyVals => "list_keyvals",
        }
    }
}

/// A call addressed to a provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    /// Resolve a database name to its identifier
    Open { name: String },

    /// Store a small value carried in the message
    Put {
        db_id: DatabaseId,
        key: Vec<u8>,
        value: Vec<u8>,
    },

    /// Store a value the provider pulls from a client region
    BulkPut {
        db_id: DatabaseId,
        key: Vec<u8>,
        value: BulkDescriptor,
    },

    /// Fetch a value of at most `max_size` bytes inline
    Get {
        db_id: DatabaseId,
        key: Vec<u8>,
        max_size: u64,
    },

    /// Fetch a value the provider pushes into a client region
    BulkGet {
        db_id: DatabaseId,
        key: Vec<u8>,
        buffer: BulkDescriptor,
    },

    Erase { db_id: DatabaseId, key: Vec<u8> },

    /// Size of the value stored under `key`
    Length { db_id: DatabaseId, key: Vec<u8> },

    /// One page of keys. `keys` holds one writable segment per slot;
    /// `key_sizes` receives one little-endian u64 per returned key.
    ListKeys {
        db_id: DatabaseId,
        start_key: Vec<u8>,
        prefix: Vec<u8>,
        max_keys: u64,
        keys: BulkDescriptor,
        key_sizes: BulkDescriptor,
    },

    /// Same as `ListKeys`, with values and their sizes
    ListKeyVals {
        db_id: DatabaseId,
        start_key: Vec<u8>,
        prefix: Vec<u8>,
        max_keys: u64,
        keys: BulkDescriptor,
        key_sizes: BulkDescriptor,
        values: BulkDescriptor,
        value_sizes: BulkDescriptor,
    },
}

impl Request {
    pub fn kind(&self) -> RpcKind {
        match self {
            Request::Open { .. } => RpcKind::Open,
            Request::Put { .. } => RpcKind::Put,
            Request::BulkPut { .. } => RpcKind::BulkPut,
            Request::Get { .. } => RpcKind::Get,
            Request::BulkGet { .. } => RpcKind::BulkGet,
            Request::Erase { .. } => RpcKind::Erase,
            Request::Length { .. } => RpcKind::Length,
            Request::ListKeys { .. } => RpcKind::ListKeys,
            Request::ListKeyVals { .. } => RpcKind::ListKeyVals,
        }
    }

    /// Target database, if the call names one
    pub fn db_id(&self) -> Option<DatabaseId> {
        match self {
            Request::Open { .. } => None,
            Request::Put { db_id, .. }
            | Request::BulkPut { db_id, .. }
            | Request::Get { db_id, .. }
            | Request::BulkGet { db_id, .. }
            | Request::Erase { db_id, .. }
            | Request::Length { db_id, .. }
            | Request::ListKeys { db_id, .. }
            | Request::ListKeyVals { db_id, .. } => Some(*db_id),
        }
    }
}
