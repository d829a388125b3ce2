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

//! Connection manager implementation
//!
//! The ConnectionManager is responsible for:
//! - Tracking every registered connection by id
//! - Answering the admission check with the live connection count
//! - Stopping all connections at server shutdown

use crate::{Connection, ConnectionId, ConnectionInfo, Result, ServerMetrics, ServiceError};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use metrics::gauge;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Connection manager
///
/// A concurrent registry from [`ConnectionId`] to [`Connection`]. No lock is
/// held while a connection is being stopped.
pub struct ConnectionManager {
    connections: DashMap<ConnectionId, Connection>,
    metrics: Arc<ServerMetrics>,
}

impl ConnectionManager {
    /// Create a new connection manager
    pub fn new(metrics: Arc<ServerMetrics>) -> Self {
        Self {
            connections: DashMap::new(),
            metrics,
        }
    }

    /// Register a connection
    ///
    /// Returns `false` and leaves the existing entry untouched if the id is
    /// already registered.
    pub fn add_connection(&self, connection: Connection) -> bool {
        let id = connection.id();
        let inserted = match self.connections.entry(id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(connection);
                true
            }
        };
        if !inserted {
            warn!(connection_id = %id, "Connection already registered");
            return false;
        }

        self.metrics.connection_opened();
        gauge!("neptune.connections.active").increment(1.0);
        debug!(
            connection_id = %id,
            count = self.connections.len(),
            "Connection registered"
        );
        true
    }

    /// Get a connection by ID
    pub fn get_connection(&self, id: ConnectionId) -> Result<Connection> {
        self.connections
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or(ServiceError::ConnectionNotFound(id))
    }

    /// Deregister a connection
    ///
    /// Stops the connection if it is still running. Returns `false` if the
    /// connection was not registered.
    pub fn close_connection(&self, connection: &Connection) -> bool {
        let id = connection.id();
        let Some((_, removed)) = self.connections.remove(&id) else {
            debug!(connection_id = %id, "Connection not registered");
            return false;
        };

        self.metrics.connection_closed(removed.created_at().elapsed());
        gauge!("neptune.connections.active").decrement(1.0);
        debug!(
            connection_id = %id,
            count = self.connections.len(),
            "Connection deregistered"
        );

        if !removed.state().is_terminal() {
            removed.stop();
        }
        true
    }

    /// Get the number of registered connections
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Get all registered connection IDs
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.connections.iter().map(|entry| *entry.key()).collect()
    }

    /// Get a snapshot of every registered connection
    pub fn connection_infos(&self) -> Vec<ConnectionInfo> {
        self.connections
            .iter()
            .map(|entry| entry.value().info())
            .collect()
    }

    /// Stop and deregister every connection
    ///
    /// Not intended to be run concurrently with itself.
    pub fn close_connections(&self) {
        let ids = self.connection_ids();
        info!(count = ids.len(), "Closing all connections");

        for id in ids {
            if let Some((_, connection)) = self.connections.remove(&id) {
                self.metrics
                    .connection_closed(connection.created_at().elapsed());
                gauge!("neptune.connections.active").decrement(1.0);
                connection.stop();
            }
        }
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("connection_count", &self.connection_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionContext;
    use crate::{ConnectionHooks, Router, RouterConfig};
    use std::net::SocketAddr;
    use tokio::net::{TcpListener, TcpStream};
    use tracing_test::traced_test;

    async fn connection(
        manager: &Arc<ConnectionManager>,
        metrics: &Arc<ServerMetrics>,
        id: u32,
    ) -> (Connection, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap())
            .await
            .unwrap();
        let (socket, peer_addr): (_, SocketAddr) = listener.accept().await.unwrap();
        let context = ConnectionContext {
            max_packet_size: 4096,
            outbound_buffer_size: 8,
            manager: Arc::downgrade(manager),
            router: Arc::new(Router::new(RouterConfig::default(), metrics.clone())),
            hooks: Arc::new(ConnectionHooks::new()),
            metrics: metrics.clone(),
        };
        (
            Connection::new(socket, peer_addr, ConnectionId::new(id), context),
            client,
        )
    }

    fn fixture() -> (Arc<ConnectionManager>, Arc<ServerMetrics>) {
        let metrics = Arc::new(ServerMetrics::new());
        (Arc::new(ConnectionManager::new(metrics.clone())), metrics)
    }

    #[tokio::test]
    async fn test_add_and_get() {
        let (manager, metrics) = fixture();
        let (conn, _client) = connection(&manager, &metrics, 1).await;

        assert!(manager.add_connection(conn.clone()));
        assert_eq!(manager.connection_count(), 1);
        assert_eq!(manager.get_connection(ConnectionId::new(1)).unwrap().id(), conn.id());

        let err = manager.get_connection(ConnectionId::new(2)).unwrap_err();
        assert!(matches!(err, ServiceError::ConnectionNotFound(id) if id.as_u32() == 2));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_duplicate_add_is_ignored() {
        let (manager, metrics) = fixture();
        let (first, _c1) = connection(&manager, &metrics, 5).await;
        let (second, _c2) = connection(&manager, &metrics, 5).await;

        assert!(manager.add_connection(first.clone()));
        assert!(!manager.add_connection(second.clone()));
        assert_eq!(manager.connection_count(), 1);
        assert_eq!(
            manager.get_connection(ConnectionId::new(5)).unwrap().peer_addr(),
            first.peer_addr()
        );
        assert_eq!(metrics.total_connections(), 1);
        assert!(logs_contain("Connection already registered"));
    }

    #[tokio::test]
    async fn test_close_connection() {
        let (manager, metrics) = fixture();
        let (conn, _client) = connection(&manager, &metrics, 1).await;
        manager.add_connection(conn.clone());

        assert!(manager.close_connection(&conn));
        assert_eq!(manager.connection_count(), 0);
        assert!(conn.is_closed());
        assert_eq!(metrics.active_connections(), 0);

        // Absent connection is a no-op
        assert!(!manager.close_connection(&conn));
        assert_eq!(metrics.total_connections(), 1);
    }

    #[tokio::test]
    async fn test_close_connections() {
        let (manager, metrics) = fixture();
        let mut clients = Vec::new();
        let mut conns = Vec::new();
        for id in 0..4 {
            let (conn, client) = connection(&manager, &metrics, id).await;
            conn.start();
            conns.push(conn);
            clients.push(client);
        }
        assert_eq!(manager.connection_count(), 4);
        assert_eq!(manager.connection_infos().len(), 4);

        manager.close_connections();
        assert_eq!(manager.connection_count(), 0);
        assert_eq!(metrics.active_connections(), 0);
        assert!(conns.iter().all(Connection::is_closed));
    }
}
