//! Response definitions
//!
//! Represents replies from a provider.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::registry::DatabaseId;

use super::request::RpcKind;

/// Response status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Status {
    Ok = 0x00,
    NotFound = 0x01,
    PolicyViolation = 0x02,
    Truncated = 0x03,
    UnknownDatabase = 0x04,
    UnknownProvider = 0x05,
    EngineFailure = 0x06,
    BulkFailure = 0x07,
    InvalidRequest = 0x08,
}

impl Status {
    pub fn is_ok(&self) -> bool {
        *self == Status::Ok
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::NotFound => "NOT_FOUND",
            Status::PolicyViolation => "POLICY_VIOLATION",
            Status::Truncated => "TRUNCATED",
            Status::UnknownDatabase => "UNKNOWN_DATABASE",
            Status::UnknownProvider => "UNKNOWN_PROVIDER",
            Status::EngineFailure => "ENGINE_FAILURE",
            Status::BulkFailure => "BULK_FAILURE",
            Status::InvalidRequest => "INVALID_REQUEST",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reply, shaped after the request it answers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    Open {
        status: Status,
        db_id: Option<DatabaseId>,
    },

    /// put, bulk_put, erase
    Ack { status: Status },

    /// Inline get. On `Truncated`, `value` is empty and `size` is the
    /// stored length.
    Get {
        status: Status,
        value: Vec<u8>,
        size: u64,
    },

    BulkGet { status: Status, size: u64 },

    Length { status: Status, size: u64 },

    /// list_keys and list_keyvals
    List { status: Status, count: u64 },
}

impl Response {
    /// The empty reply of `kind` carrying `status`
    pub fn failure(kind: RpcKind, status: Status) -> Self {
        match kind {
            RpcKind::Open => Response::Open { status, db_id: None },
            RpcKind::Put | RpcKind::BulkPut | RpcKind::Erase => Response::Ack { status },
            RpcKind::Get => Response::Get {
                status,
                value: Vec::new(),
                size: 0,
            },
            RpcKind::BulkGet => Response::BulkGet { status, size: 0 },
            RpcKind::Length => Response::Length { status, size: 0 },
            RpcKind::ListKeys | RpcKind::ListKeyVals => Response::List { status, count: 0 },
        }
    }

    pub fn ack(status: Status) -> Self {
        Response::Ack { status }
    }

    pub fn status(&self) -> Status {
        match self {
            Response::Open { status, .. }
            | Response::Ack { status }
            | Response::Get { status, .. }
            | Response::BulkGet { status, .. }
            | Response::Length { status, .. }
            | Response::List { status, .. } => *status,
        }
    }
}
