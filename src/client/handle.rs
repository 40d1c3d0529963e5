//! Provider handles and RPC operations
//!
//! Every operation sets the handle's multiplex id on the outgoing request,
//! waits for the reply, and forwards any status other than the soft
//! outcomes (not found, policy violation) as `MeshError::Remote`. An
//! oversized `get` is the exception: it reports the value's real size
//! through `MeshError::Truncated`.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::datastore::KeyValue;
use crate::error::{MeshError, Result};
use crate::protocol::{
    select_transfer, BulkAccess, Frame, Request, Response, Status, TransferMode,
};
use crate::registry::DatabaseId;

use super::{Address, ClientInner};

const SIZE_WIDTH: usize = std::mem::size_of::<u64>();

struct HandleShared {
    client: Arc<ClientInner>,
    address: Address,
    mplex_id: u8,
}

impl Drop for HandleShared {
    fn drop(&mut self) {
        self.client.live_handles.fetch_sub(1, Ordering::AcqRel);
        tracing::trace!(
            "Released handle on provider {} at {}",
            self.mplex_id,
            self.address.socket_addr()
        );
    }
}

/// Shared handle on one remote provider.
///
/// Cloning takes a reference; the address is released when the last clone
/// drops.
#[derive(Clone)]
pub struct ProviderHandle {
    shared: Arc<HandleShared>,
}

impl ProviderHandle {
    pub(crate) fn new(client: Arc<ClientInner>, address: Address, mplex_id: u8) -> Self {
        Self {
            shared: Arc::new(HandleShared {
                client,
                address,
                mplex_id,
            }),
        }
    }

    /// Take another reference on the handle
    pub fn ref_incr(&self) -> Self {
        self.clone()
    }

    /// Give up this reference
    pub fn release(self) {
        drop(self);
    }

    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.shared)
    }

    pub fn mplex_id(&self) -> u8 {
        self.shared.mplex_id
    }

    pub fn address(&self) -> &Address {
        &self.shared.address
    }

    fn client(&self) -> &ClientInner {
        &self.shared.client
    }

    async fn call(&self, request: Request) -> Result<Response> {
        let frame = Frame::Request {
            target: self.shared.mplex_id,
            request,
        };
        let address = &self.shared.address;
        let exchange = address.exchange(&frame, &self.client().bulk);
        match self.client().config.rpc_timeout() {
            Some(limit) => tokio::time::timeout(limit, exchange)
                .await
                .map_err(|_| address.transport(format!("no reply within {:?}", limit)))?,
            None => exchange.await,
        }
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Resolve a database name to its identifier
    pub async fn open(&self, name: &str) -> Result<DatabaseId> {
        let request = Request::Open {
            name: name.to_string(),
        };
        match self.call(request).await? {
            Response::Open {
                status: Status::Ok,
                db_id: Some(id),
            } => Ok(id),
            other => Err(unexpected(other)),
        }
    }

    /// Store `value` under `key`. `false` if the database's duplicate
    /// policy rejected it.
    pub async fn put(&self, db_id: DatabaseId, key: &[u8], value: &[u8]) -> Result<bool> {
        let client = self.client();
        let response = match select_transfer(key.len(), value.len(), client.config.max_inline_size) {
            TransferMode::Inline => {
                self.call(Request::Put {
                    db_id,
                    key: key.to_vec(),
                    value: value.to_vec(),
                })
                .await?
            }
            TransferMode::Bulk => {
                let mut staged = client.buffer(value.len());
                staged.copy_from_slice(value);
                let region = client.bulk.expose(vec![staged], BulkAccess::ReadOnly);
                let response = self
                    .call(Request::BulkPut {
                        db_id,
                        key: key.to_vec(),
                        value: region.descriptor(),
                    })
                    .await;
                client.recycle(region.into_segments());
                response?
            }
        };

        match response {
            Response::Ack { status: Status::Ok } => Ok(true),
            Response::Ack {
                status: Status::PolicyViolation,
            } => Ok(false),
            other => Err(unexpected(other)),
        }
    }

    /// Fetch the value under `key`, which must fit in `max_size` bytes.
    ///
    /// A longer value fails with [`MeshError::Truncated`] carrying its
    /// actual size, so the retry can be sized without a `length` call.
    pub async fn get(&self, db_id: DatabaseId, key: &[u8], max_size: usize) -> Result<Option<Vec<u8>>> {
        let client = self.client();
        match select_transfer(key.len(), max_size, client.config.max_inline_size) {
            TransferMode::Inline => {
                let request = Request::Get {
                    db_id,
                    key: key.to_vec(),
                    max_size: max_size as u64,
                };
                match self.call(request).await? {
                    Response::Get {
                        status: Status::Ok,
                        value,
                        ..
                    } => Ok(Some(value)),
                    Response::Get {
                        status: Status::NotFound,
                        ..
                    } => Ok(None),
                    Response::Get {
                        status: Status::Truncated,
                        size,
                        ..
                    } => Err(MeshError::Truncated { size }),
                    other => Err(unexpected(other)),
                }
            }
            TransferMode::Bulk => {
                let region = client
                    .bulk
                    .expose(vec![client.buffer(max_size)], BulkAccess::WriteOnly);
                let response = self
                    .call(Request::BulkGet {
                        db_id,
                        key: key.to_vec(),
                        buffer: region.descriptor(),
                    })
                    .await;
                let buffer = region.into_segments().into_iter().next().unwrap_or_default();

                let outcome = match response {
                    Ok(Response::BulkGet {
                        status: Status::Ok,
                        size,
                    }) => buffer
                        .get(..size as usize)
                        .map(|value| Some(value.to_vec()))
                        .ok_or_else(|| {
                            MeshError::Protocol(format!(
                                "reply claims {} bytes in a {} byte buffer",
                                size,
                                buffer.len()
                            ))
                        }),
                    Ok(Response::BulkGet {
                        status: Status::NotFound,
                        ..
                    }) => Ok(None),
                    Ok(Response::BulkGet {
                        status: Status::Truncated,
                        size,
                    }) => Err(MeshError::Truncated { size }),
                    Ok(other) => Err(unexpected(other)),
                    Err(e) => Err(e),
                };
                client.recycle([buffer]);
                outcome
            }
        }
    }

    /// Remove `key`; `false` if it was absent
    pub async fn erase(&self, db_id: DatabaseId, key: &[u8]) -> Result<bool> {
        let request = Request::Erase {
            db_id,
            key: key.to_vec(),
        };
        match self.call(request).await? {
            Response::Ack { status: Status::Ok } => Ok(true),
            Response::Ack {
                status: Status::NotFound,
            } => Ok(false),
            other => Err(unexpected(other)),
        }
    }

    /// Size of the value under `key`, if present
    pub async fn length(&self, db_id: DatabaseId, key: &[u8]) -> Result<Option<usize>> {
        let request = Request::Length {
            db_id,
            key: key.to_vec(),
        };
        match self.call(request).await? {
            Response::Length {
                status: Status::Ok,
                size,
            } => Ok(Some(size as usize)),
            Response::Length {
                status: Status::NotFound,
                ..
            } => Ok(None),
            other => Err(unexpected(other)),
        }
    }

    /// Up to `max_keys` keys after `start_key` beginning with `prefix`,
    /// each at most `key_capacity` bytes long.
    pub async fn list_keys(
        &self,
        db_id: DatabaseId,
        start_key: &[u8],
        prefix: &[u8],
        max_keys: usize,
        key_capacity: usize,
    ) -> Result<Vec<Vec<u8>>> {
        let mut slots = vec![vec![0u8; key_capacity]; max_keys];
        let count = self.list_keys_into(db_id, start_key, prefix, &mut slots).await?;
        slots.truncate(count);
        Ok(slots)
    }

    /// Fill caller-sized `slots` (one key each, capacity = slot length)
    /// and return how many were filled.
    ///
    /// On `Remote(Truncated)` the first returned slots are resized to the
    /// lengths the keys need, without their contents.
    pub async fn list_keys_into(
        &self,
        db_id: DatabaseId,
        start_key: &[u8],
        prefix: &[u8],
        slots: &mut [Vec<u8>],
    ) -> Result<usize> {
        self.list_page(db_id, start_key, prefix, slots, None).await
    }

    /// Same as [`Self::list_keys`], with values of at most `value_capacity`
    /// bytes.
    pub async fn list_keyvals(
        &self,
        db_id: DatabaseId,
        start_key: &[u8],
        prefix: &[u8],
        max_keys: usize,
        key_capacity: usize,
        value_capacity: usize,
    ) -> Result<Vec<KeyValue>> {
        let mut keys = vec![vec![0u8; key_capacity]; max_keys];
        let mut values = vec![vec![0u8; value_capacity]; max_keys];
        let count = self
            .list_keyvals_into(db_id, start_key, prefix, &mut keys, &mut values)
            .await?;
        Ok(keys.into_iter().zip(values).take(count).collect())
    }

    /// Same as [`Self::list_keys_into`], filling `values` alongside `keys`.
    pub async fn list_keyvals_into(
        &self,
        db_id: DatabaseId,
        start_key: &[u8],
        prefix: &[u8],
        keys: &mut [Vec<u8>],
        values: &mut [Vec<u8>],
    ) -> Result<usize> {
        if keys.len() != values.len() {
            return Err(MeshError::InvalidArgument(format!(
                "{} key slots but {} value slots",
                keys.len(),
                values.len()
            )));
        }
        self.list_page(db_id, start_key, prefix, keys, Some(values)).await
    }

    async fn list_page(
        &self,
        db_id: DatabaseId,
        start_key: &[u8],
        prefix: &[u8],
        keys: &mut [Vec<u8>],
        values: Option<&mut [Vec<u8>]>,
    ) -> Result<usize> {
        let client = self.client();
        let max_keys = keys.len();
        let expose_slots = |slots: &[Vec<u8>]| {
            let buffers = slots.iter().map(|slot| client.buffer(slot.len())).collect();
            client.bulk.expose(buffers, BulkAccess::WriteOnly)
        };
        let expose_sizes = || {
            client
                .bulk
                .expose(vec![client.buffer(max_keys * SIZE_WIDTH)], BulkAccess::WriteOnly)
        };

        let key_region = expose_slots(keys);
        let key_size_region = expose_sizes();
        let value_regions = values
            .as_deref()
            .map(|values| (expose_slots(values), expose_sizes()));

        let request = match &value_regions {
            None => Request::ListKeys {
                db_id,
                start_key: start_key.to_vec(),
                prefix: prefix.to_vec(),
                max_keys: max_keys as u64,
                keys: key_region.descriptor(),
                key_sizes: key_size_region.descriptor(),
            },
            Some((value_region, value_size_region)) => Request::ListKeyVals {
                db_id,
                start_key: start_key.to_vec(),
                prefix: prefix.to_vec(),
                max_keys: max_keys as u64,
                keys: key_region.descriptor(),
                key_sizes: key_size_region.descriptor(),
                values: value_region.descriptor(),
                value_sizes: value_size_region.descriptor(),
            },
        };
        let response = self.call(request).await;

        let key_segments = key_region.into_segments();
        let key_sizes = key_size_region.into_segments();
        let value_segments = value_regions.map(|(value_region, value_size_region)| {
            (value_region.into_segments(), value_size_region.into_segments())
        });

        let outcome = match response {
            Ok(Response::List { status, count })
                if matches!(status, Status::Ok | Status::Truncated) =>
            {
                let count = (count as usize).min(max_keys);
                let truncated = status == Status::Truncated;
                let mut filled =
                    fill_slots(keys, &key_segments, &decode_sizes(&key_sizes, count), truncated);
                if filled.is_ok() {
                    if let (Some(values), Some((segments, sizes))) = (values, &value_segments) {
                        filled = fill_slots(values, segments, &decode_sizes(sizes, count), truncated);
                    }
                }
                filled.and_then(|()| {
                    if truncated {
                        Err(MeshError::Remote(Status::Truncated))
                    } else {
                        Ok(count)
                    }
                })
            }
            Ok(other) => Err(unexpected(other)),
            Err(e) => Err(e),
        };

        client.recycle(key_segments.into_iter().chain(key_sizes));
        if let Some((segments, sizes)) = value_segments {
            client.recycle(segments.into_iter().chain(sizes));
        }
        outcome
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Error for a reply that is not one of the operation's success shapes
fn unexpected(response: Response) -> MeshError {
    match response.status() {
        Status::Ok => MeshError::Protocol(format!("reply does not match the call: {:?}", response)),
        status => MeshError::Remote(status),
    }
}

/// First `count` little-endian sizes of a size region
fn decode_sizes(segments: &[Vec<u8>], count: usize) -> Vec<usize> {
    let packed = segments.concat();
    packed
        .chunks_exact(SIZE_WIDTH)
        .take(count)
        .map(|chunk| {
            let mut raw = [0u8; SIZE_WIDTH];
            raw.copy_from_slice(chunk);
            u64::from_le_bytes(raw) as usize
        })
        .collect()
}

/// Copy the pushed items into the caller's slots, or on truncation only
/// size the slots to what the items need.
fn fill_slots(slots: &mut [Vec<u8>], segments: &[Vec<u8>], sizes: &[usize], truncated: bool) -> Result<()> {
    for (index, (slot, size)) in slots.iter_mut().zip(sizes).enumerate() {
        slot.clear();
        if truncated {
            slot.resize(*size, 0);
            continue;
        }
        let data = segments
            .get(index)
            .and_then(|segment| segment.get(..*size))
            .ok_or_else(|| {
                MeshError::Protocol(format!("item {} of {} bytes does not fit its slot", index, size))
            })?;
        slot.extend_from_slice(data);
    }
    Ok(())
}
