//! Exposed regions
//!
//! Memory a client makes remotely addressable for the span of one call.
//! The grant lives exactly as long as its `BulkHandle`.

use std::collections::HashMap;
use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{MeshError, Result};
use crate::protocol::{BulkAccess, BulkDescriptor, SegmentWrite};

struct ExposedRegion {
    access: BulkAccess,
    /// Segment lengths are the capacities advertised in the descriptor
    segments: Mutex<Vec<Vec<u8>>>,
}

/// Table of live grants, keyed by region id
pub struct BulkRegistry {
    next_id: AtomicU64,
    regions: Mutex<HashMap<u64, Arc<ExposedRegion>>>,
}

impl Default for BulkRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl BulkRegistry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            regions: Mutex::new(HashMap::new()),
        }
    }

    /// Grant remote access to `segments` until the returned handle drops.
    pub fn expose(&self, segments: Vec<Vec<u8>>, access: BulkAccess) -> BulkHandle<'_> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let segment_sizes = segments.iter().map(|s| s.len() as u64).collect();
        let region = Arc::new(ExposedRegion {
            access,
            segments: Mutex::new(segments),
        });
        self.regions.lock().insert(id, Arc::clone(&region));
        tracing::trace!("Exposed region {} ({:?})", id, access);

        BulkHandle {
            registry: self,
            region,
            descriptor: BulkDescriptor {
                region: id,
                access,
                segment_sizes,
            },
        }
    }

    /// Number of grants currently live
    pub fn len(&self) -> usize {
        self.regions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup(&self, id: u64) -> Result<Arc<ExposedRegion>> {
        self.regions
            .lock()
            .get(&id)
            .cloned()
            .ok_or_else(|| MeshError::InvalidArgument(format!("region {} is not exposed", id)))
    }

    /// Contents of a region, for a remote pull
    pub fn serve_pull(&self, id: u64) -> Result<Vec<Vec<u8>>> {
        let region = self.lookup(id)?;
        if !region.access.readable() {
            return Err(MeshError::InvalidArgument(format!(
                "region {} does not allow pulls",
                id
            )));
        }
        let segments = region.segments.lock().clone();
        Ok(segments)
    }

    /// Apply a remote push. Every write must fit its segment.
    pub fn serve_push(&self, id: u64, writes: Vec<SegmentWrite>) -> Result<()> {
        let region = self.lookup(id)?;
        if !region.access.writable() {
            return Err(MeshError::InvalidArgument(format!(
                "region {} does not allow pushes",
                id
            )));
        }

        let mut segments = region.segments.lock();
        for write in &writes {
            let capacity = segments
                .get(write.index as usize)
                .map(|segment| segment.len())
                .ok_or_else(|| {
                    MeshError::InvalidArgument(format!(
                        "region {} has no segment {}",
                        id, write.index
                    ))
                })?;
            if write.data.len() > capacity {
                return Err(MeshError::InvalidArgument(format!(
                    "write of {} bytes overflows segment {} ({} bytes)",
                    write.data.len(),
                    write.index,
                    capacity
                )));
            }
        }
        for write in writes {
            let segment = &mut segments[write.index as usize];
            segment[..write.data.len()].copy_from_slice(&write.data);
        }
        Ok(())
    }

    fn revoke(&self, id: u64) {
        if self.regions.lock().remove(&id).is_some() {
            tracing::trace!("Revoked region {}", id);
        }
    }
}

/// A live grant. Dropping it revokes the region.
pub struct BulkHandle<'a> {
    registry: &'a BulkRegistry,
    region: Arc<ExposedRegion>,
    descriptor: BulkDescriptor,
}

impl BulkHandle<'_> {
    pub fn id(&self) -> u64 {
        self.descriptor.region
    }

    pub fn descriptor(&self) -> BulkDescriptor {
        self.descriptor.clone()
    }

    /// Revoke the grant and hand back the (possibly written) segments
    pub fn into_segments(self) -> Vec<Vec<u8>> {
        self.registry.revoke(self.descriptor.region);
        let segments = mem::take(&mut *self.region.segments.lock());
        segments
    }
}

impl Drop for BulkHandle<'_> {
    fn drop(&mut self) {
        self.registry.revoke(self.descriptor.region);
    }
}
