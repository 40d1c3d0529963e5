//! Network Module
//!
//! TCP server, per-connection dispatch, and the providers it routes to.
//!
//! ## Architecture
//! - One accept loop on a tokio runtime
//! - One task per connection, bounded by `max_connections`
//! - Requests routed by multiplex id to a `Provider`, then by database id
//!   to a `Database`

mod connection;
mod provider;
mod server;

pub use connection::Connection;
pub use provider::Provider;
pub use server::Server;
