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

//! Ping Server Example
//!
//! Routes two message ids: `1` replies with `pong:<payload>` and `2` greets
//! the client. Every new connection receives a welcome frame and is tagged
//! with a property that the stop hook reports when the client leaves.
//!
//! ## Usage
//!
//! ```bash
//! RUST_LOG=debug cargo run --example ping_server
//! ```
//!
//! Then run the `ping_client` example against it.

use async_trait::async_trait;
use neptune_service::{CallbackHandler, Handler, Request, Server, ServerConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

struct PingHandler;

#[async_trait]
impl Handler for PingHandler {
    async fn pre_handle(&self, request: &Request) {
        info!(message_id = request.id(), "Ping received");
    }

    async fn handle(&self, request: &Request) {
        let reply = format!("pong:{}", String::from_utf8_lossy(request.data()));
        if let Err(e) = request.send_message(1, reply).await {
            warn!(error = %e, "Unable to reply");
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let mut server = Server::new(ServerConfig::new("127.0.0.1:8999").with_name("PingServer")).await?;

    server.add_router(1, PingHandler);
    server.add_router(
        2,
        CallbackHandler {
            handle: Some(Box::new(|request: &Request| {
                if let Some(connection) = request.connection() {
                    let _ = connection.try_send_message(2, "Hello from Neptune");
                }
            })),
            ..Default::default()
        },
    );

    server.set_on_conn_start(|connection| {
        let _ = connection.set_property("name", format!("client-{}", connection.id().as_u32()));
        let _ = connection.try_send_message(2, "Welcome to Neptune");
    });
    server.set_on_conn_stop(|connection| {
        if let Ok(name) = connection.get_property::<String>("name") {
            info!(%name, "Client left");
        }
    });

    println!("Ping server listening on {}", server.bind_address());
    println!("Press Ctrl+C to stop");

    tokio::select! {
        result = server.serve() => result?,
        _ = tokio::signal::ctrl_c() => {}
    }

    println!("{}", server.snapshot());
    server.stop().await?;

    Ok(())
}
