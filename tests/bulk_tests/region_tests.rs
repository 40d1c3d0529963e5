//! Exposed Region Tests
//!
//! Tests verify:
//! - Grants are revoked when their handle drops
//! - Access modes are enforced for pulls and pushes
//! - Pushes are bounds-checked per segment

use meshkv::bulk::BulkRegistry;
use meshkv::protocol::{BulkAccess, SegmentWrite};

#[test]
fn test_expose_and_revoke_on_drop() {
    let registry = BulkRegistry::new();

    {
        let handle = registry.expose(vec![vec![0; 8]], BulkAccess::ReadOnly);
        assert_eq!(registry.len(), 1);
        assert_eq!(handle.descriptor().segment_sizes, vec![8]);
    }

    assert!(registry.is_empty());
}

#[test]
fn test_region_ids_are_unique() {
    let registry = BulkRegistry::new();

    let a = registry.expose(vec![Vec::new()], BulkAccess::ReadOnly);
    let b = registry.expose(vec![Vec::new()], BulkAccess::ReadOnly);

    assert_ne!(a.id(), b.id());
    assert_eq!(registry.len(), 2);
}

#[test]
fn test_pull_readable_region() {
    let registry = BulkRegistry::new();
    let handle = registry.expose(vec![b"hello".to_vec(), b"world".to_vec()], BulkAccess::ReadOnly);

    let segments = registry.serve_pull(handle.id()).unwrap();

    assert_eq!(segments, vec![b"hello".to_vec(), b"world".to_vec()]);
}

#[test]
fn test_pull_write_only_region_denied() {
    let registry = BulkRegistry::new();
    let handle = registry.expose(vec![vec![0; 4]], BulkAccess::WriteOnly);

    assert!(registry.serve_pull(handle.id()).is_err());
}

#[test]
fn test_push_read_only_region_denied() {
    let registry = BulkRegistry::new();
    let handle = registry.expose(vec![vec![0; 4]], BulkAccess::ReadOnly);

    let result = registry.serve_push(
        handle.id(),
        vec![SegmentWrite {
            index: 0,
            data: b"ab".to_vec(),
        }],
    );

    assert!(result.is_err());
}

#[test]
fn test_push_then_take_segments() {
    let registry = BulkRegistry::new();
    let handle = registry.expose(vec![vec![0; 4], vec![0; 4]], BulkAccess::WriteOnly);

    registry
        .serve_push(
            handle.id(),
            vec![
                SegmentWrite {
                    index: 1,
                    data: b"xy".to_vec(),
                },
                SegmentWrite {
                    index: 0,
                    data: b"abcd".to_vec(),
                },
            ],
        )
        .unwrap();
    let segments = handle.into_segments();

    assert_eq!(segments, vec![b"abcd".to_vec(), b"xy\0\0".to_vec()]);
    assert!(registry.is_empty());
}

#[test]
fn test_push_overflow_rejected_without_partial_write() {
    let registry = BulkRegistry::new();
    let handle = registry.expose(vec![vec![0; 2], vec![0; 2]], BulkAccess::WriteOnly);

    let result = registry.serve_push(
        handle.id(),
        vec![
            SegmentWrite {
                index: 0,
                data: b"ok".to_vec(),
            },
            SegmentWrite {
                index: 1,
                data: b"too long".to_vec(),
            },
        ],
    );

    assert!(result.is_err());
    assert_eq!(handle.into_segments(), vec![vec![0; 2], vec![0; 2]]);
}

#[test]
fn test_push_unknown_segment_rejected() {
    let registry = BulkRegistry::new();
    let handle = registry.expose(vec![vec![0; 2]], BulkAccess::ReadWrite);

    let result = registry.serve_push(
        handle.id(),
        vec![SegmentWrite {
            index: 3,
            data: Vec::new(),
        }],
    );

    assert!(result.is_err());
}

#[test]
fn test_revoked_region_denied() {
    let registry = BulkRegistry::new();
    let id = registry.expose(vec![vec![1]], BulkAccess::ReadWrite).id();

    assert!(registry.serve_pull(id).is_err());
    assert!(registry.serve_push(id, Vec::new()).is_err());
}
