//
// Copyright 2025-2026 Neptune Developers. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Neptune server implementation
//!
//! The Server is the main entry point. It owns the TCP listener, the
//! router and the connection manager, and runs the accept loop.

use crate::connection::ConnectionContext;
use crate::{
    Connection, ConnectionHooks, ConnectionId, ConnectionManager, Handler, Result, Router,
    RouterConfig, ServerConfig, ServerMetrics, ServerSnapshot, ServiceError,
};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Message-routed TCP server
///
/// # Example
///
/// ```no_run
/// use neptune_service::{Handler, Request, Server, ServerConfig};
/// use async_trait::async_trait;
///
/// struct PingHandler;
///
/// #[async_trait]
/// impl Handler for PingHandler {
///     async fn handle(&self, request: &Request) {
///         let _ = request.send_message(1, "pong").await;
///     }
/// }
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut server = Server::new(ServerConfig::new("127.0.0.1:8999")).await?;
///     server.add_router(0, PingHandler);
///     server.serve().await?;
///     Ok(())
/// }
/// ```
pub struct Server {
    config: ServerConfig,
    listener: Arc<TcpListener>,
    bind_address: SocketAddr,
    manager: Arc<ConnectionManager>,
    router: Arc<Router>,
    hooks: Arc<ConnectionHooks>,
    metrics: Arc<ServerMetrics>,
    next_id: Arc<AtomicU32>,
    started_at: Instant,
    running: AtomicBool,
    shutdown: CancellationToken,
    accept_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Server {
    /// Create a new server with the given configuration
    ///
    /// Validates the configuration, resolves `bind_address` within the
    /// configured protocol family and binds the listener. Connections are not
    /// accepted until [`Server::start`] or [`Server::serve`] is called.
    pub async fn new(config: ServerConfig) -> Result<Self> {
        config.validate().map_err(ServiceError::InvalidConfig)?;

        let address = tokio::net::lookup_host(config.bind_address.as_str())
            .await?
            .find(|addr| config.ip_version.matches(addr))
            .ok_or_else(|| {
                ServiceError::AddressResolution(format!(
                    "{} has no {} address",
                    config.bind_address, config.ip_version
                ))
            })?;

        let listener = TcpListener::bind(address).await?;
        let bind_address = listener.local_addr()?;

        let metrics = Arc::new(ServerMetrics::new());
        let manager = Arc::new(ConnectionManager::new(metrics.clone()));
        let router = Arc::new(Router::new(RouterConfig::from(&config), metrics.clone()));

        info!(
            name = %config.name,
            address = %bind_address,
            max_connections = config.max_connections,
            max_packet_size = config.max_packet_size,
            "Server bound"
        );

        Ok(Self {
            config,
            listener: Arc::new(listener),
            bind_address,
            manager,
            router,
            hooks: Arc::new(ConnectionHooks::new()),
            metrics,
            next_id: Arc::new(AtomicU32::new(0)),
            started_at: Instant::now(),
            running: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            accept_handle: Mutex::new(None),
        })
    }

    /// Register a handler for a message id
    ///
    /// Handlers can only be added before the server starts; afterwards (and
    /// for an id that is already taken) this logs a warning and returns
    /// `false`.
    pub fn add_router<H: Handler>(&mut self, id: u32, handler: H) -> bool {
        match Arc::get_mut(&mut self.router) {
            Some(router) => router.add_handler(id, handler),
            None => {
                warn!(message_id = id, "Cannot add handler after the server has started");
                false
            }
        }
    }

    /// Set the callback run when a connection starts
    pub fn set_on_conn_start<F>(&self, callback: F)
    where
        F: Fn(&Connection) + Send + Sync + 'static,
    {
        self.hooks.set_on_start(callback);
    }

    /// Set the callback run when a connection stops
    pub fn set_on_conn_stop<F>(&self, callback: F)
    where
        F: Fn(&Connection) + Send + Sync + 'static,
    {
        self.hooks.set_on_stop(callback);
    }

    /// Start the worker pool and the accept loop
    ///
    /// Returns as soon as the accept loop has been spawned.
    pub fn start(&self) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Err(ServiceError::ServerStopped);
        }
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ServiceError::ServerAlreadyRunning);
        }

        info!(name = %self.config.name, address = %self.bind_address, "Starting server");
        self.router.start_worker_pool();

        let handle = self.spawn_accept_loop();
        *self
            .accept_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);
        Ok(())
    }

    /// Start the server and wait until it is stopped
    pub async fn serve(&self) -> Result<()> {
        self.start()?;
        self.shutdown.cancelled().await;
        Ok(())
    }

    fn spawn_accept_loop(&self) -> JoinHandle<()> {
        let listener = self.listener.clone();
        let manager = self.manager.clone();
        let metrics = self.metrics.clone();
        let next_id = self.next_id.clone();
        let shutdown = self.shutdown.clone();
        let max_connections = self.config.max_connections;
        let context = ConnectionContext {
            max_packet_size: self.config.max_packet_size,
            outbound_buffer_size: self.config.outbound_buffer_size,
            manager: Arc::downgrade(&self.manager),
            router: self.router.clone(),
            hooks: self.hooks.clone(),
            metrics: self.metrics.clone(),
        };

        tokio::spawn(async move {
            loop {
                let accepted = tokio::select! {
                    result = listener.accept() => result,
                    _ = shutdown.cancelled() => break,
                };

                match accepted {
                    Ok((socket, peer_addr)) => {
                        debug!(peer_addr = %peer_addr, "Accepted connection");

                        if manager.connection_count() >= max_connections {
                            let reason = ServiceError::MaxConnectionsReached(max_connections);
                            warn!(peer_addr = %peer_addr, error = %reason, "Rejecting connection");
                            metrics.connection_rejected();
                            drop(socket);
                            continue;
                        }

                        let id = ConnectionId::new(next_id.fetch_add(1, Ordering::SeqCst));
                        let connection = Connection::new(socket, peer_addr, id, context.clone());
                        // Registered before the next admission check; the start
                        // callback runs off the accept loop.
                        connection.start_detached();
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to accept connection");
                        metrics.connection_error();

                        // Back off on errors to avoid tight loop
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                }
            }

            info!("Accept loop terminated");
        })
    }

    /// Stop the server
    ///
    /// Ends the accept loop, stops every connection and lets the workers
    /// drain their queues before exiting. A stopped server cannot be started
    /// again.
    pub async fn stop(&self) -> Result<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Err(ServiceError::ServerNotRunning);
        }

        info!(name = %self.config.name, "Stopping server");
        self.shutdown.cancel();

        let accept_handle = self
            .accept_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = accept_handle {
            let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
        }

        self.manager.close_connections();
        self.router.shutdown().await;

        info!(name = %self.config.name, "Server stopped");
        Ok(())
    }

    /// Check if the server is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Get the server's bind address
    pub fn bind_address(&self) -> SocketAddr {
        self.bind_address
    }

    /// Get the number of registered connections
    pub fn connection_count(&self) -> usize {
        self.manager.connection_count()
    }

    /// Get a snapshot of the server state
    pub fn snapshot(&self) -> ServerSnapshot {
        ServerSnapshot {
            name: self.config.name.clone(),
            active_connections: self.manager.connection_count(),
            total_connections: self.metrics.total_connections(),
            bind_address: self.bind_address,
            uptime: self.started_at.elapsed(),
            started_at: self.started_at,
        }
    }

    /// Get the server metrics
    pub fn metrics(&self) -> Arc<ServerMetrics> {
        self.metrics.clone()
    }

    /// Get the connection manager
    pub fn manager(&self) -> Arc<ConnectionManager> {
        self.manager.clone()
    }

    /// Get the router
    pub fn router(&self) -> Arc<Router> {
        self.router.clone()
    }

    /// Get the server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("name", &self.config.name)
            .field("bind_address", &self.bind_address)
            .field("running", &self.is_running())
            .field("connection_count", &self.connection_count())
            .field("uptime", &self.started_at.elapsed())
            .finish()
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        if self.running.swap(false, Ordering::SeqCst) {
            warn!(name = %self.config.name, "Server dropped while still running");
            self.shutdown.cancel();
            self.manager.close_connections();
            self.router.signal_shutdown();
        }
    }
}
