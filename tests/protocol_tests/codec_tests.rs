//! Codec Tests
//!
//! Tests for frame encoding/decoding and the async stream helpers.

use meshkv::protocol::{
    decode_frame, encode_frame, read_frame, write_frame, BulkAccess, BulkDescriptor, Frame,
    FrameKind, Request, Response, SegmentWrite, Status, HEADER_SIZE, MAX_PAYLOAD_SIZE,
};
use meshkv::registry::DatabaseId;
use meshkv::MeshError;

// =============================================================================
// Helper Functions
// =============================================================================

fn round_trip(frame: Frame) -> Frame {
    let encoded = encode_frame(&frame).unwrap();
    decode_frame(&encoded).unwrap()
}

fn descriptor(region: u64, access: BulkAccess, sizes: &[u64]) -> BulkDescriptor {
    BulkDescriptor {
        region,
        access,
        segment_sizes: sizes.to_vec(),
    }
}

// =============================================================================
// Frame Encoding/Decoding Tests
// =============================================================================

#[test]
fn test_encode_decode_put_request() {
    let frame = Frame::Request {
        target: 7,
        request: Request::Put {
            db_id: DatabaseId(42),
            key: b"mykey".to_vec(),
            value: b"myvalue".to_vec(),
        },
    };

    match round_trip(frame) {
        Frame::Request {
            target,
            request: Request::Put { db_id, key, value },
        } => {
            assert_eq!(target, 7);
            assert_eq!(db_id, DatabaseId(42));
            assert_eq!(key, b"mykey");
            assert_eq!(value, b"myvalue");
        }
        other => panic!("Expected PUT request, got {:?}", other),
    }
}

#[test]
fn test_encode_decode_list_request() {
    let frame = Frame::Request {
        target: 0,
        request: Request::ListKeyVals {
            db_id: DatabaseId(1),
            start_key: b"start".to_vec(),
            prefix: b"pre".to_vec(),
            max_keys: 3,
            keys: descriptor(1, BulkAccess::WriteOnly, &[16, 16, 16]),
            key_sizes: descriptor(2, BulkAccess::WriteOnly, &[24]),
            values: descriptor(3, BulkAccess::WriteOnly, &[64, 64, 64]),
            value_sizes: descriptor(4, BulkAccess::WriteOnly, &[24]),
        },
    };

    assert_eq!(round_trip(frame.clone()), frame);
}

#[test]
fn test_encode_decode_replies() {
    let replies = vec![
        Response::Open {
            status: Status::Ok,
            db_id: Some(DatabaseId(9)),
        },
        Response::Ack {
            status: Status::PolicyViolation,
        },
        Response::Get {
            status: Status::Ok,
            value: Vec::new(),
            size: 0,
        },
        Response::List {
            status: Status::Truncated,
            count: 2,
        },
    ];

    for reply in replies {
        assert_eq!(round_trip(Frame::Reply(reply.clone())), Frame::Reply(reply));
    }
}

#[test]
fn test_encode_decode_bulk_frames() {
    let frames = vec![
        Frame::BulkPull { region: 5 },
        Frame::BulkData {
            segments: vec![vec![1, 2, 3], Vec::new()],
        },
        Frame::BulkPush {
            region: 5,
            writes: vec![SegmentWrite {
                index: 1,
                data: b"abc".to_vec(),
            }],
        },
        Frame::BulkDenied {
            reason: "region 5 is not exposed".to_string(),
        },
        Frame::BulkAck,
        Frame::Shutdown,
    ];

    for frame in frames {
        assert_eq!(round_trip(frame.clone()), frame);
    }
}

#[test]
fn test_header_layout() {
    let encoded = encode_frame(&Frame::BulkPull { region: 1 }).unwrap();

    assert_eq!(encoded[0], FrameKind::BulkPull as u8);
    let len = u32::from_be_bytes([encoded[1], encoded[2], encoded[3], encoded[4]]) as usize;
    assert_eq!(encoded.len(), HEADER_SIZE + len);
}

#[test]
fn test_unit_frames_have_empty_payload() {
    let encoded = encode_frame(&Frame::Shutdown).unwrap();

    assert_eq!(&encoded[..], &[FrameKind::Shutdown as u8, 0, 0, 0, 0]);
}

// =============================================================================
// Error Handling Tests
// =============================================================================

#[test]
fn test_decode_incomplete_header() {
    let result = decode_frame(&[0x01, 0x00]);

    assert!(matches!(result, Err(MeshError::Protocol(_))));
}

#[test]
fn test_decode_unknown_kind() {
    let result = decode_frame(&[0xFF, 0, 0, 0, 0]);

    assert!(matches!(result, Err(MeshError::Protocol(_))));
}

#[test]
fn test_decode_payload_too_large() {
    let mut bytes = vec![FrameKind::Reply as u8];
    bytes.extend_from_slice(&(MAX_PAYLOAD_SIZE + 1).to_be_bytes());

    let result = decode_frame(&bytes);

    assert!(matches!(result, Err(MeshError::Protocol(_))));
}

#[test]
fn test_decode_incomplete_payload() {
    let encoded = encode_frame(&Frame::BulkDenied {
        reason: "nope".to_string(),
    })
    .unwrap();

    let result = decode_frame(&encoded[..encoded.len() - 1]);

    assert!(matches!(result, Err(MeshError::Protocol(_))));
}

#[test]
fn test_decode_garbage_payload() {
    let bytes = [FrameKind::Request as u8, 0, 0, 0, 2, 0xAB, 0xCD];

    let result = decode_frame(&bytes);

    assert!(matches!(result, Err(MeshError::Serialization(_))));
}

#[test]
fn test_unit_frame_with_payload_rejected() {
    let bytes = [FrameKind::BulkAck as u8, 0, 0, 0, 1, 0x00];

    let result = decode_frame(&bytes);

    assert!(matches!(result, Err(MeshError::Protocol(_))));
}

// =============================================================================
// Stream I/O Tests
// =============================================================================

#[tokio::test]
async fn test_stream_write_then_read() {
    let (mut client, mut server) = tokio::io::duplex(1024);
    let frame = Frame::Request {
        target: 2,
        request: Request::Open {
            name: "users".to_string(),
        },
    };

    write_frame(&mut client, &frame).await.unwrap();
    let read = read_frame(&mut server).await.unwrap();

    assert_eq!(read, frame);
}

#[tokio::test]
async fn test_stream_multiple_frames_in_order() {
    let (mut client, mut server) = tokio::io::duplex(64 * 1024);

    write_frame(&mut client, &Frame::BulkPull { region: 1 }).await.unwrap();
    write_frame(&mut client, &Frame::BulkAck).await.unwrap();
    write_frame(&mut client, &Frame::Shutdown).await.unwrap();

    assert_eq!(read_frame(&mut server).await.unwrap(), Frame::BulkPull { region: 1 });
    assert_eq!(read_frame(&mut server).await.unwrap(), Frame::BulkAck);
    assert_eq!(read_frame(&mut server).await.unwrap(), Frame::Shutdown);
}

#[tokio::test]
async fn test_stream_eof_is_io_error() {
    let (client, mut server) = tokio::io::duplex(64);
    drop(client);

    let result = read_frame(&mut server).await;

    match result {
        Err(MeshError::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::UnexpectedEof),
        other => panic!("Expected EOF, got {:?}", other),
    }
}
