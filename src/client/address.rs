//! Remote addresses
//!
//! An `Address` owns a small pool of idle connections to one server. A call
//! checks a connection out, and returns it only after a clean reply; a
//! connection that saw an error or was abandoned mid-call is dropped.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::net::TcpStream;

use crate::bulk::BulkRegistry;
use crate::error::{MeshError, Result};
use crate::protocol::{read_frame, write_frame, Frame, Response};

/// Idle connections kept per address
const MAX_IDLE_CONNECTIONS: usize = 16;

struct Endpoint {
    addr: SocketAddr,
    idle: Mutex<Vec<TcpStream>>,
}

/// A resolved server endpoint. Clones share the connection pool.
#[derive(Clone)]
pub struct Address {
    endpoint: Arc<Endpoint>,
}

impl Address {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            endpoint: Arc::new(Endpoint {
                addr,
                idle: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        self.endpoint.addr
    }

    pub fn idle_connections(&self) -> usize {
        self.endpoint.idle.lock().len()
    }

    pub(crate) async fn checkout(&self) -> Result<TcpStream> {
        let pooled = self.endpoint.idle.lock().pop();
        if let Some(stream) = pooled {
            return Ok(stream);
        }

        let stream = TcpStream::connect(self.endpoint.addr)
            .await
            .map_err(|e| self.transport(e))?;
        stream.set_nodelay(true).map_err(|e| self.transport(e))?;
        tracing::debug!("Connected to {}", self.endpoint.addr);
        Ok(stream)
    }

    pub(crate) fn checkin(&self, stream: TcpStream) {
        let mut idle = self.endpoint.idle.lock();
        if idle.len() < MAX_IDLE_CONNECTIONS {
            idle.push(stream);
        }
    }

    pub(crate) fn transport(&self, error: impl fmt::Display) -> MeshError {
        MeshError::Transport(format!("{}: {}", self.endpoint.addr, error))
    }

    /// Send `frame` and wait for the reply, serving the server's bulk
    /// pulls and pushes against `bulk` meanwhile.
    pub(crate) async fn exchange(&self, frame: &Frame, bulk: &BulkRegistry) -> Result<Response> {
        let mut stream = self.checkout().await?;
        let response = self.converse(&mut stream, frame, bulk).await?;
        self.checkin(stream);
        Ok(response)
    }

    async fn converse(
        &self,
        stream: &mut TcpStream,
        frame: &Frame,
        bulk: &BulkRegistry,
    ) -> Result<Response> {
        self.send(stream, frame).await?;
        loop {
            let incoming = read_frame(stream).await.map_err(|e| match e {
                MeshError::Io(io) => self.transport(io),
                other => other,
            })?;

            let answer = match incoming {
                Frame::Reply(response) => return Ok(response),
                Frame::BulkPull { region } => match bulk.serve_pull(region) {
                    Ok(segments) => Frame::BulkData { segments },
                    Err(e) => Frame::BulkDenied {
                        reason: e.to_string(),
                    },
                },
                Frame::BulkPush { region, writes } => match bulk.serve_push(region, writes) {
                    Ok(()) => Frame::BulkAck,
                    Err(e) => Frame::BulkDenied {
                        reason: e.to_string(),
                    },
                },
                other => {
                    return Err(MeshError::Protocol(format!(
                        "unexpected {:?} frame from {}",
                        other.kind(),
                        self.endpoint.addr
                    )))
                }
            };
            self.send(stream, &answer).await?;
        }
    }

    async fn send(&self, stream: &mut TcpStream, frame: &Frame) -> Result<()> {
        write_frame(stream, frame).await.map_err(|e| match e {
            MeshError::Io(io) => self.transport(io),
            other => other,
        })
    }
}

impl From<SocketAddr> for Address {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Address")
            .field("addr", &self.endpoint.addr)
            .finish()
    }
}
