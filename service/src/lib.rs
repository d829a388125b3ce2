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

//! # Neptune Service
//!
//! A length-prefixed, message-routed TCP server. Each accepted connection is
//! decoded into [`Message`]s, and every message is dispatched by its id to a
//! registered [`Handler`] running on a fixed pool of workers.
//!
//! # Architecture
//!
//! ```text
//! Server ── accept ──> Connection ── read loop ──> Router ──> worker queues
//!   │                     ▲                                      │
//!   └─ ConnectionManager  └──── write loop <── send_message <── Handler
//! ```
//!
//! - [`Server`] binds the listener, enforces the connection limit and owns
//!   the other components.
//! - [`ConnectionManager`] is the registry of live connections.
//! - [`Connection`] runs one read loop and one write loop per socket.
//! - [`Router`] maps message ids to handlers and owns the worker pool.
//!
//! # Example
//!
//! ```no_run
//! use neptune_service::{Handler, Request, Server, ServerConfig};
//! use async_trait::async_trait;
//!
//! struct PingHandler;
//!
//! #[async_trait]
//! impl Handler for PingHandler {
//!     async fn handle(&self, request: &Request) {
//!         let reply = format!("pong:{}", String::from_utf8_lossy(request.data()));
//!         let _ = request.send_message(1, reply).await;
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new(ServerConfig::default()).await?;
//!     server.add_router(1, PingHandler);
//!     server.set_on_conn_start(|conn| {
//!         let _ = conn.try_send_message(2, "welcome");
//!     });
//!     server.serve().await?;
//!     Ok(())
//! }
//! ```

mod config;
mod connection;
mod error;
mod handler;
mod manager;
mod metrics;
mod request;
mod router;
mod server;
mod types;

pub use config::{IpVersion, ServerConfig};
pub use connection::Connection;
pub use error::{Result, ServiceError};
pub use handler::{CallbackHandler, ConnectionCallback, ConnectionHooks, Handler, RequestCallback};
pub use manager::ConnectionManager;
pub use self::metrics::{MetricsSnapshot, ServerMetrics};
pub use neptune_codec::Message;
pub use request::Request;
pub use router::{Router, RouterConfig};
pub use server::Server;
pub use types::{ConnectionId, ConnectionInfo, ConnectionState, ServerSnapshot};
