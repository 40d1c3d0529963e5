//! Protocol codec
//!
//! Encoding and decoding of frames, plus async stream helpers.
//!
//! ## Wire Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │ Kind (1) │ Len (4)  │   Payload (bincode)         │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! ### Payload by Frame Kind
//! - REQUEST:     (target: u8, Request)
//! - REPLY:       Response
//! - BULK_PULL:   region id (u64)
//! - BULK_DATA:   segments (Vec<Vec<u8>>)
//! - BULK_PUSH:   (region id, Vec<SegmentWrite>)
//! - BULK_ACK:    empty
//! - BULK_DENIED: reason (String)
//! - SHUTDOWN:    empty

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{MeshError, Result};

use super::{Request, Response, SegmentWrite};

/// Header size: 1 byte kind + 4 bytes length
pub const HEADER_SIZE: usize = 5;

/// Maximum payload size (64 MB)
pub const MAX_PAYLOAD_SIZE: u32 = 64 * 1024 * 1024;

/// Frame kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    Request = 0x01,
    Reply = 0x02,
    BulkPull = 0x03,
    BulkData = 0x04,
    BulkPush = 0x05,
    BulkAck = 0x06,
    BulkDenied = 0x07,
    Shutdown = 0x08,
}

impl FrameKind {
    pub fn from_u8(byte: u8) -> Result<Self> {
        match byte {
            0x01 => Ok(FrameKind::Request),
            0x02 => Ok(FrameKind::Reply),
            0x03 => Ok(FrameKind::BulkPull),
            0x04 => Ok(FrameKind::BulkData),
            0x05 => Ok(FrameKind::BulkPush),
            0x06 => Ok(FrameKind::BulkAck),
            0x07 => Ok(FrameKind::BulkDenied),
            0x08 => Ok(FrameKind::Shutdown),
            _ => Err(MeshError::Protocol(format!(
                "Unknown frame kind: 0x{:02x}",
                byte
            ))),
        }
    }
}

/// One unit on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A call routed to provider `target`
    Request { target: u8, request: Request },

    Reply(Response),

    /// Server asks for the contents of a client region
    BulkPull { region: u64 },

    /// Client answers a pull
    BulkData { segments: Vec<Vec<u8>> },

    /// Server writes into a client region
    BulkPush {
        region: u64,
        writes: Vec<SegmentWrite>,
    },

    /// Client confirms a push
    BulkAck,

    /// Client refuses a pull or push
    BulkDenied { reason: String },

    /// Stop the serving loop
    Shutdown,
}

impl Frame {
    pub fn kind(&self) -> FrameKind {
        match self {
            Frame::Request { .. } => FrameKind::Request,
            Frame::Reply(_) => FrameKind::Reply,
            Frame::BulkPull { .. } => FrameKind::BulkPull,
            Frame::BulkData { .. } => FrameKind::BulkData,
            Frame::BulkPush { .. } => FrameKind::BulkPush,
            Frame::BulkAck => FrameKind::BulkAck,
            Frame::BulkDenied { .. } => FrameKind::BulkDenied,
            Frame::Shutdown => FrameKind::Shutdown,
        }
    }
}

// =============================================================================
// Frame Encoding/Decoding
// =============================================================================

/// Encode a frame to bytes
///
/// Format: kind (1) + payload_len (4) + payload
pub fn encode_frame(frame: &Frame) -> Result<Bytes> {
    let payload = match frame {
        Frame::Request { target, request } => bincode::serialize(&(target, request))?,
        Frame::Reply(response) => bincode::serialize(response)?,
        Frame::BulkPull { region } => bincode::serialize(region)?,
        Frame::BulkData { segments } => bincode::serialize(segments)?,
        Frame::BulkPush { region, writes } => bincode::serialize(&(region, writes))?,
        Frame::BulkDenied { reason } => bincode::serialize(reason)?,
        Frame::BulkAck | Frame::Shutdown => Vec::new(),
    };

    if payload.len() > MAX_PAYLOAD_SIZE as usize {
        return Err(MeshError::Protocol(format!(
            "Payload too large: {} bytes (max {})",
            payload.len(),
            MAX_PAYLOAD_SIZE
        )));
    }

    let mut message = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    message.put_u8(frame.kind() as u8);
    message.put_u32(payload.len() as u32);
    message.put_slice(&payload);

    Ok(message.freeze())
}

/// Decode one complete frame from bytes
pub fn decode_frame(bytes: &[u8]) -> Result<Frame> {
    if bytes.len() < HEADER_SIZE {
        return Err(MeshError::Protocol(format!(
            "Incomplete header: expected {} bytes, got {}",
            HEADER_SIZE,
            bytes.len()
        )));
    }

    let kind = FrameKind::from_u8(bytes[0])?;
    let payload_len = parse_length(&bytes[1..HEADER_SIZE])?;

    let total_len = HEADER_SIZE + payload_len;
    if bytes.len() < total_len {
        return Err(MeshError::Protocol(format!(
            "Incomplete payload: expected {} bytes, got {}",
            total_len,
            bytes.len()
        )));
    }

    decode_payload(kind, &bytes[HEADER_SIZE..total_len])
}

/// Decode the payload of a frame whose header was already parsed
pub fn decode_payload(kind: FrameKind, payload: &[u8]) -> Result<Frame> {
    let frame = match kind {
        FrameKind::Request => {
            let (target, request): (u8, Request) = bincode::deserialize(payload)?;
            Frame::Request { target, request }
        }
        FrameKind::Reply => Frame::Reply(bincode::deserialize(payload)?),
        FrameKind::BulkPull => Frame::BulkPull {
            region: bincode::deserialize(payload)?,
        },
        FrameKind::BulkData => Frame::BulkData {
            segments: bincode::deserialize(payload)?,
        },
        FrameKind::BulkPush => {
            let (region, writes): (u64, Vec<SegmentWrite>) = bincode::deserialize(payload)?;
            Frame::BulkPush { region, writes }
        }
        FrameKind::BulkDenied => Frame::BulkDenied {
            reason: bincode::deserialize(payload)?,
        },
        FrameKind::BulkAck => {
            expect_empty("BULK_ACK", payload)?;
            Frame::BulkAck
        }
        FrameKind::Shutdown => {
            expect_empty("SHUTDOWN", payload)?;
            Frame::Shutdown
        }
    };
    Ok(frame)
}

fn parse_length(header: &[u8]) -> Result<usize> {
    let payload_len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
    if payload_len > MAX_PAYLOAD_SIZE {
        return Err(MeshError::Protocol(format!(
            "Payload too large: {} bytes (max {})",
            payload_len, MAX_PAYLOAD_SIZE
        )));
    }
    Ok(payload_len as usize)
}

fn expect_empty(name: &str, payload: &[u8]) -> Result<()> {
    if !payload.is_empty() {
        return Err(MeshError::Protocol(format!(
            "{} frame: unexpected payload of {} bytes",
            name,
            payload.len()
        )));
    }
    Ok(())
}

// =============================================================================
// Stream-based I/O helpers
// =============================================================================

/// Read a complete frame from a stream
///
/// Suspends until a whole frame is buffered or the stream fails
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Frame> {
    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header).await?;

    let kind = FrameKind::from_u8(header[0])?;
    let payload_len = parse_length(&header[1..])?;

    let mut payload = vec![0u8; payload_len];
    if payload_len > 0 {
        reader.read_exact(&mut payload).await?;
    }

    decode_payload(kind, &payload)
}

/// Write a frame to a stream
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, frame: &Frame) -> Result<()> {
    let bytes = encode_frame(frame)?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}
