//! Bulk Module
//!
//! Client-side half of bulk transfers.
//!
//! ## Lifecycle of a grant
//! ```text
//!   expose(segments) ──▶ descriptor sent in request
//!          │
//!          ▼
//!   serve_pull / serve_push (while the call is in flight)
//!          │
//!          ▼
//!   BulkHandle dropped ──▶ region revoked (every exit path)
//! ```

mod pool;
mod region;

pub use pool::BulkPoolSet;
pub use region::{BulkHandle, BulkRegistry};
