//! Inline vs bulk transfer
//!
//! A payload travels inside the control message while
//! `key + value + HEADER_OVERHEAD <= threshold`; above that the caller
//! exposes a region and sends only its descriptor.

use serde::{Deserialize, Serialize};

/// Default inline threshold in bytes
pub const MAX_RPC_MESSAGE_SIZE: usize = 4000;

/// Fixed per-message overhead counted against the threshold
pub const HEADER_OVERHEAD: usize = 2 * std::mem::size_of::<u64>();

/// How the remote side may touch an exposed region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BulkAccess {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl BulkAccess {
    /// Remote side may pull from the region
    pub fn readable(&self) -> bool {
        matches!(self, BulkAccess::ReadOnly | BulkAccess::ReadWrite)
    }

    /// Remote side may push into the region
    pub fn writable(&self) -> bool {
        matches!(self, BulkAccess::WriteOnly | BulkAccess::ReadWrite)
    }
}

/// Wire description of a region exposed by the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkDescriptor {
    pub region: u64,
    pub access: BulkAccess,
    /// Capacity of each segment, in order
    pub segment_sizes: Vec<u64>,
}

impl BulkDescriptor {
    pub fn total_size(&self) -> u64 {
        self.segment_sizes.iter().sum()
    }

    pub fn segment_count(&self) -> usize {
        self.segment_sizes.len()
    }
}

/// One segment's worth of data pushed into a region
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentWrite {
    pub index: u32,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    Inline,
    Bulk,
}

/// Size a message carrying `key_len` + `value_len` bytes counts as
pub fn message_size(key_len: usize, value_len: usize) -> usize {
    key_len
        .saturating_add(value_len)
        .saturating_add(HEADER_OVERHEAD)
}

/// Pick the transfer path for a put (`value_len` = value size) or a get
/// (`value_len` = requested maximum size).
pub fn select_transfer(key_len: usize, value_len: usize, threshold: usize) -> TransferMode {
    if message_size(key_len, value_len) <= threshold {
        TransferMode::Inline
    } else {
        TransferMode::Bulk
    }
}
