//! Protocol Module
//!
//! Defines the RPC catalogue and the frame format that carries it.
//!
//! ## Call Flow
//! ```text
//!  client                                   server
//!    │── REQUEST (target, Request) ───────────▶│
//!    │                                         │ (bulk calls only)
//!    │◀────────────── BULK_PULL / BULK_PUSH ───│
//!    │── BULK_DATA / BULK_ACK / BULK_DENIED ──▶│
//!    │◀──────────────────────── REPLY ─────────│
//! ```
//!
//! ### Status Codes
//! - 0x00: OK
//! - 0x01: NOT_FOUND
//! - 0x02: POLICY_VIOLATION
//! - 0x03: TRUNCATED
//! - 0x04: UNKNOWN_DATABASE
//! - 0x05: UNKNOWN_PROVIDER
//! - 0x06: ENGINE_FAILURE
//! - 0x07: BULK_FAILURE
//! - 0x08: INVALID_REQUEST

mod codec;
mod request;
mod response;
mod transfer;

pub use codec::{
    decode_frame, decode_payload, encode_frame, read_frame, write_frame, Frame, FrameKind,
    HEADER_SIZE, MAX_PAYLOAD_SIZE,
};
pub use request::{Request, RpcKind};
pub use response::{Response, Status};
pub use transfer::{
    message_size, select_transfer, BulkAccess, BulkDescriptor, SegmentWrite, TransferMode,
    HEADER_OVERHEAD, MAX_RPC_MESSAGE_SIZE,
};
