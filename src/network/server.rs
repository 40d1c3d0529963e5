//! TCP Server
//!
//! Accepts connections and spawns one task per connection. Every
//! connection can reach every registered provider through its multiplex id.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::net::TcpListener;
use tokio::sync::{watch, Semaphore};

use crate::config::Config;
use crate::error::{MeshError, Result};

use super::connection::Connection;
use super::provider::Provider;

struct Shared {
    config: Config,
    providers: RwLock<HashMap<u8, Arc<Provider>>>,
    shutdown: watch::Sender<bool>,
    connections: Arc<Semaphore>,
}

/// TCP server for meshkv
#[derive(Clone)]
pub struct Server {
    shared: Arc<Shared>,
}

impl Server {
    /// Create a new server with the given config and no providers
    pub fn new(config: Config) -> Self {
        let (shutdown, _) = watch::channel(false);
        let connections = Arc::new(Semaphore::new(config.max_connections));
        Self {
            shared: Arc::new(Shared {
                config,
                providers: RwLock::new(HashMap::new()),
                shutdown,
                connections,
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    /// Make `provider` reachable under its multiplex id
    pub fn register_provider(&self, provider: Provider) -> Result<Arc<Provider>> {
        let mut providers = self.shared.providers.write();
        if providers.contains_key(&provider.id()) {
            return Err(MeshError::ProviderExists(provider.id()));
        }
        let provider = Arc::new(provider);
        providers.insert(provider.id(), Arc::clone(&provider));
        tracing::info!("Registered provider {}", provider.id());
        Ok(provider)
    }

    pub fn provider(&self, id: u8) -> Option<Arc<Provider>> {
        self.shared.providers.read().get(&id).cloned()
    }

    /// Bind the configured listen address
    pub async fn bind(&self) -> Result<TcpListener> {
        let listener = TcpListener::bind(&self.shared.config.listen_addr).await?;
        tracing::info!("Listening on {}", listener.local_addr()?);
        Ok(listener)
    }

    /// Bind and serve until shutdown
    pub async fn run(&self) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Accept connections on `listener` until shutdown is signalled
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let mut shutdown = self.shutdown_signal();
        if *shutdown.borrow() {
            return Ok(());
        }

        loop {
            let (stream, peer) = tokio::select! {
                _ = shutdown.changed() => break,
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        tracing::warn!("Accept failed: {}", e);
                        continue;
                    }
                },
            };

            let Ok(permit) = Arc::clone(&self.shared.connections).try_acquire_owned() else {
                tracing::warn!(
                    "Connection limit ({}) reached, refusing {}",
                    self.shared.config.max_connections,
                    peer
                );
                continue;
            };

            let connection = match Connection::new(stream, self.clone()) {
                Ok(connection) => connection,
                Err(e) => {
                    tracing::warn!("Failed to set up connection from {}: {}", peer, e);
                    continue;
                }
            };
            let signal = self.shutdown_signal();
            tokio::spawn(async move {
                if let Err(e) = connection.handle(signal).await {
                    tracing::warn!("Connection from {} ended with error: {}", peer, e);
                }
                drop(permit);
            });
        }

        tracing::info!("Server shutting down");
        let server = self.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || server.sync_providers()).await {
            tracing::error!("Provider flush task failed: {}", e);
        }
        Ok(())
    }

    /// Signal the server to stop accepting and close its connections
    pub fn shutdown(&self) {
        self.shared.shutdown.send_replace(true);
    }

    /// A receiver that observes the shutdown flag
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shared.shutdown.subscribe()
    }

    pub fn is_shutdown(&self) -> bool {
        *self.shared.shutdown.borrow()
    }

    /// Connections currently being served
    pub fn active_connections(&self) -> usize {
        self.shared.config.max_connections - self.shared.connections.available_permits()
    }

    fn sync_providers(&self) {
        let providers: Vec<Arc<Provider>> = self.shared.providers.read().values().cloned().collect();
        for provider in providers {
            if let Err(e) = provider.registry().sync_all() {
                tracing::error!("Provider {} failed to flush: {}", provider.id(), e);
            }
        }
    }
}

