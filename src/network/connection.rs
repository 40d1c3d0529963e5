//! Connection Handler
//!
//! Serves one client connection: reads request frames, routes them to the
//! target provider, drives bulk pulls and pushes against the caller's
//! exposed regions, and writes the reply.

use std::io::ErrorKind;
use std::sync::Arc;

use tokio::io::{BufReader, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::watch;

use crate::error::{MeshError, Result};
use crate::protocol::{
    read_frame, write_frame, BulkDescriptor, Frame, Request, Response, RpcKind, SegmentWrite,
    Status,
};
use crate::registry::Database;

use super::provider::Provider;
use super::server::Server;

/// Handles a single client connection
pub struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: BufWriter<OwnedWriteHalf>,
    server: Server,
    /// Peer address for logging
    peer_addr: String,
}

impl Connection {
    pub fn new(stream: TcpStream, server: Server) -> Result<Self> {
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true)?;

        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(read_half),
            writer: BufWriter::new(write_half),
            server,
            peer_addr,
        })
    }

    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }

    /// Serve frames until the client leaves or the server shuts down
    pub async fn handle(mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        tracing::debug!("Connection established from {}", self.peer_addr);
        if *shutdown.borrow_and_update() {
            tracing::debug!("Closing {} for shutdown", self.peer_addr);
            return Ok(());
        }

        loop {
            let frame = tokio::select! {
                _ = shutdown.changed() => {
                    tracing::debug!("Closing {} for shutdown", self.peer_addr);
                    return Ok(());
                }
                frame = self.next_frame() => frame,
            };

            let frame = match frame {
                Ok(frame) => frame,
                Err(MeshError::Io(ref e)) if is_disconnect(e.kind()) => {
                    tracing::debug!("Client {} disconnected", self.peer_addr);
                    return Ok(());
                }
                Err(MeshError::Io(ref e)) if e.kind() == ErrorKind::TimedOut => {
                    tracing::debug!("Read timeout for client {}", self.peer_addr);
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!("Error reading from {}: {}", self.peer_addr, e);
                    return Err(e);
                }
            };

            match frame {
                Frame::Request { target, request } => {
                    tracing::trace!(
                        "Received {} for provider {} from {}",
                        request.kind().as_str(),
                        target,
                        self.peer_addr
                    );
                    let response = self.dispatch(target, request).await?;
                    if let Err(e) = write_frame(&mut self.writer, &Frame::Reply(response)).await {
                        if let MeshError::Io(ref io_err) = e {
                            if is_disconnect(io_err.kind()) {
                                tracing::debug!(
                                    "Client {} disconnected before the reply could be sent",
                                    self.peer_addr
                                );
                                return Ok(());
                            }
                        }
                        tracing::warn!("Error writing to {}: {}", self.peer_addr, e);
                        return Err(e);
                    }
                }
                Frame::Shutdown => {
                    tracing::info!("Shutdown requested by {}", self.peer_addr);
                    self.server.shutdown();
                    return Ok(());
                }
                other => {
                    let e = MeshError::Protocol(format!(
                        "unexpected {:?} frame outside of a call",
                        other.kind()
                    ));
                    tracing::warn!("Closing {}: {}", self.peer_addr, e);
                    return Err(e);
                }
            }
        }
    }

    async fn next_frame(&mut self) -> Result<Frame> {
        match self.server.config().read_timeout() {
            Some(limit) => match tokio::time::timeout(limit, read_frame(&mut self.reader)).await {
                Ok(frame) => frame,
                Err(_) => Err(MeshError::Io(std::io::Error::new(
                    ErrorKind::TimedOut,
                    "idle read timeout",
                ))),
            },
            None => read_frame(&mut self.reader).await,
        }
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    /// Run one call. `Err` only when the connection itself is unusable.
    async fn dispatch(&mut self, target: u8, request: Request) -> Result<Response> {
        let kind = request.kind();
        let Some(provider) = self.server.provider(target) else {
            tracing::debug!("No provider {} for {}", target, self.peer_addr);
            return Ok(Response::failure(kind, Status::UnknownProvider));
        };
        provider.record(kind);

        match self.execute(&provider, request).await {
            Ok(response) => Ok(response),
            Err(e @ (MeshError::Io(_) | MeshError::Protocol(_))) => Err(e),
            Err(e) => {
                let status = status_for(&e);
                tracing::debug!(
                    "{} on provider {} failed: {} ({})",
                    kind.as_str(),
                    target,
                    e,
                    status
                );
                Ok(Response::failure(kind, status))
            }
        }
    }

    async fn execute(&mut self, provider: &Provider, request: Request) -> Result<Response> {
        if let Request::Open { name } = &request {
            return Ok(match provider.find_database(name) {
                Some(id) => Response::Open {
                    status: Status::Ok,
                    db_id: Some(id),
                },
                None => Response::failure(RpcKind::Open, Status::UnknownDatabase),
            });
        }

        let kind = request.kind();
        let Some(db) = request.db_id().and_then(|id| provider.database(id)) else {
            return Ok(Response::failure(kind, Status::UnknownDatabase));
        };

        match request {
            Request::Open { .. } => Ok(Response::failure(kind, Status::InvalidRequest)),
            Request::Put { key, value, .. } => {
                let stored = on_engine(&db, move |db| db.put(&key, &value)).await?;
                Ok(put_reply(stored))
            }
            Request::BulkPut { key, value, .. } => {
                let value = self.pull(&value).await?.concat();
                let stored = on_engine(&db, move |db| db.put(&key, &value)).await?;
                Ok(put_reply(stored))
            }
            Request::Get { key, max_size, .. } => {
                let found = on_engine(&db, move |db| db.get(&key)).await?;
                Ok(get_reply(found, max_size))
            }
            Request::BulkGet { key, buffer, .. } => self.bulk_get(&db, key, &buffer).await,
            Request::Erase { key, .. } => {
                let erased = on_engine(&db, move |db| db.erase(&key)).await?;
                Ok(Response::ack(if erased { Status::Ok } else { Status::NotFound }))
            }
            Request::Length { key, .. } => {
                let found = on_engine(&db, move |db| db.get(&key)).await?;
                Ok(match found {
                    Some(value) => Response::Length {
                        status: Status::Ok,
                        size: value.len() as u64,
                    },
                    None => Response::failure(kind, Status::NotFound),
                })
            }
            Request::ListKeys {
                start_key,
                prefix,
                max_keys,
                keys,
                key_sizes,
                ..
            } => {
                check_writable(&[&keys, &key_sizes])?;
                let limit = page_limit(max_keys, &keys);
                let found =
                    on_engine(&db, move |db| db.list_keys(&start_key, limit, &prefix)).await?;
                let truncated = exceeds_slots(found.iter(), &keys);

                let count = found.len();
                self.push_sizes(&key_sizes, found.iter()).await?;
                if !truncated {
                    self.push_slots(&keys, found.iter()).await?;
                }
                Ok(list_reply(truncated, count))
            }
            Request::ListKeyVals {
                start_key,
                prefix,
                max_keys,
                keys,
                key_sizes,
                values,
                value_sizes,
                ..
            } => {
                check_writable(&[&keys, &key_sizes, &values, &value_sizes])?;
                let limit = page_limit(max_keys, &keys).min(values.segment_count());
                let found =
                    on_engine(&db, move |db| db.list_keyvals(&start_key, limit, &prefix)).await?;
                let truncated = exceeds_slots(found.iter().map(|(k, _)| k), &keys)
                    || exceeds_slots(found.iter().map(|(_, v)| v), &values);

                let count = found.len();
                self.push_sizes(&key_sizes, found.iter().map(|(k, _)| k)).await?;
                self.push_sizes(&value_sizes, found.iter().map(|(_, v)| v)).await?;
                if !truncated {
                    self.push_slots(&keys, found.iter().map(|(k, _)| k)).await?;
                    self.push_slots(&values, found.iter().map(|(_, v)| v)).await?;
                }
                Ok(list_reply(truncated, count))
            }
        }
    }

    async fn bulk_get(&mut self, db: &Arc<Database>, key: Vec<u8>, buffer: &BulkDescriptor) -> Result<Response> {
        check_writable(&[buffer])?;
        let Some(value) = on_engine(db, move |db| db.get(&key)).await? else {
            return Ok(Response::failure(RpcKind::BulkGet, Status::NotFound));
        };
        let size = value.len() as u64;
        if size > buffer.total_size() {
            return Ok(Response::BulkGet {
                status: Status::Truncated,
                size,
            });
        }
        self.push(buffer.region, scatter(&value, &buffer.segment_sizes)).await?;
        Ok(Response::BulkGet {
            status: Status::Ok,
            size,
        })
    }

    // =========================================================================
    // Bulk Transfers
    // =========================================================================

    /// Fetch the contents of a client region
    async fn pull(&mut self, descriptor: &BulkDescriptor) -> Result<Vec<Vec<u8>>> {
        if !descriptor.access.readable() {
            return Err(MeshError::InvalidArgument(format!(
                "region {} is not readable",
                descriptor.region
            )));
        }

        write_frame(&mut self.writer, &Frame::BulkPull { region: descriptor.region }).await?;
        match read_frame(&mut self.reader).await? {
            Frame::BulkData { segments } => {
                let sizes: Vec<u64> = segments.iter().map(|s| s.len() as u64).collect();
                if sizes != descriptor.segment_sizes {
                    return Err(MeshError::Transport(format!(
                        "region {} delivered segments {:?}, descriptor promised {:?}",
                        descriptor.region, sizes, descriptor.segment_sizes
                    )));
                }
                Ok(segments)
            }
            Frame::BulkDenied { reason } => Err(MeshError::Transport(format!(
                "pull of region {} denied: {}",
                descriptor.region, reason
            ))),
            other => Err(MeshError::Protocol(format!(
                "expected BULK_DATA, got {:?}",
                other.kind()
            ))),
        }
    }

    /// Write into a client region
    async fn push(&mut self, region: u64, writes: Vec<SegmentWrite>) -> Result<()> {
        write_frame(&mut self.writer, &Frame::BulkPush { region, writes }).await?;
        match read_frame(&mut self.reader).await? {
            Frame::BulkAck => Ok(()),
            Frame::BulkDenied { reason } => Err(MeshError::Transport(format!(
                "push to region {} denied: {}",
                region, reason
            ))),
            other => Err(MeshError::Protocol(format!(
                "expected BULK_ACK, got {:?}",
                other.kind()
            ))),
        }
    }

    /// Pack one little-endian u64 size per item into `sizes`
    async fn push_sizes<'a>(
        &mut self,
        sizes: &BulkDescriptor,
        items: impl Iterator<Item = &'a Vec<u8>>,
    ) -> Result<()> {
        let packed: Vec<u8> = items
            .flat_map(|item| (item.len() as u64).to_le_bytes())
            .collect();
        if packed.is_empty() {
            return Ok(());
        }
        if packed.len() as u64 > sizes.total_size() {
            return Err(MeshError::InvalidArgument(format!(
                "size region {} holds {} bytes, {} needed",
                sizes.region,
                sizes.total_size(),
                packed.len()
            )));
        }
        self.push(sizes.region, scatter(&packed, &sizes.segment_sizes)).await
    }

    /// Item `i` goes to segment `i`
    async fn push_slots<'a>(
        &mut self,
        slots: &BulkDescriptor,
        items: impl Iterator<Item = &'a Vec<u8>>,
    ) -> Result<()> {
        let writes: Vec<SegmentWrite> = items
            .enumerate()
            .map(|(index, item)| SegmentWrite {
                index: index as u32,
                data: item.clone(),
            })
            .collect();
        if writes.is_empty() {
            return Ok(());
        }
        self.push(slots.region, writes).await
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Run an engine call on the blocking pool; engines may do disk I/O.
async fn on_engine<T, F>(db: &Arc<Database>, call: F) -> Result<T>
where
    F: FnOnce(&Database) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let name = db.name().to_string();
    let db = Arc::clone(db);
    tokio::task::spawn_blocking(move || call(&db))
        .await
        .map_err(|e| MeshError::Engine(format!("engine task on {} failed: {}", name, e)))?
}

fn is_disconnect(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::UnexpectedEof
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
    )
}

/// Status a failed call reports to the client
fn status_for(error: &MeshError) -> Status {
    match error {
        e if e.is_engine_failure() => Status::EngineFailure,
        MeshError::Transport(_) => Status::BulkFailure,
        _ => Status::InvalidRequest,
    }
}

fn get_reply(found: Option<Vec<u8>>, max_size: u64) -> Response {
    match found {
        None => Response::failure(RpcKind::Get, Status::NotFound),
        Some(value) if value.len() as u64 > max_size => Response::Get {
            status: Status::Truncated,
            value: Vec::new(),
            size: value.len() as u64,
        },
        Some(value) => Response::Get {
            status: Status::Ok,
            size: value.len() as u64,
            value,
        },
    }
}

fn put_reply(stored: bool) -> Response {
    Response::ack(if stored {
        Status::Ok
    } else {
        Status::PolicyViolation
    })
}

fn list_reply(truncated: bool, count: usize) -> Response {
    Response::List {
        status: if truncated { Status::Truncated } else { Status::Ok },
        count: count as u64,
    }
}

fn check_writable(regions: &[&BulkDescriptor]) -> Result<()> {
    match regions.iter().find(|region| !region.access.writable()) {
        Some(region) => Err(MeshError::InvalidArgument(format!(
            "region {} is not writable",
            region.region
        ))),
        None => Ok(()),
    }
}

/// Entries a page may hold: the request's cap, bounded by the slot count
fn page_limit(max_keys: u64, slots: &BulkDescriptor) -> usize {
    usize::try_from(max_keys)
        .unwrap_or(usize::MAX)
        .min(slots.segment_count())
}

fn exceeds_slots<'a>(items: impl Iterator<Item = &'a Vec<u8>>, slots: &BulkDescriptor) -> bool {
    items
        .zip(&slots.segment_sizes)
        .any(|(item, capacity)| item.len() as u64 > *capacity)
}

/// Split `data` over consecutive segments of the given capacities
fn scatter(data: &[u8], segment_sizes: &[u64]) -> Vec<SegmentWrite> {
    let mut writes = Vec::new();
    let mut rest = data;
    for (index, capacity) in segment_sizes.iter().enumerate() {
        if rest.is_empty() {
            break;
        }
        let take = rest.len().min(*capacity as usize);
        let (head, tail) = rest.split_at(take);
        writes.push(SegmentWrite {
            index: index as u32,
            data: head.to_vec(),
        });
        rest = tail;
    }
    writes
}
