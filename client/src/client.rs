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

use crate::{ClientConfig, ClientError, Result};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use neptune_codec::{FrameCodec, Message};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tracing::{debug, info, trace};

/// Neptune client
///
/// Speaks the same frame format as the server: every message sent is
/// encoded as an 8-byte header followed by its payload, and every frame
/// received is decoded back into a [`Message`].
pub struct Client {
    framed: Framed<TcpStream, FrameCodec>,
    config: ClientConfig,
    peer_addr: SocketAddr,
    local_addr: SocketAddr,
}

impl Client {
    /// Connect to a server
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        let addr = config.address();
        info!("Connecting to {}...", addr);

        let stream = match timeout(config.connect_timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err(ClientError::ConnectionTimeout),
        };
        stream.set_nodelay(true)?;

        let peer_addr = stream.peer_addr()?;
        let local_addr = stream.local_addr()?;
        info!("Connected to {}", peer_addr);

        Ok(Self {
            framed: Framed::new(stream, FrameCodec::new(config.max_packet_size)),
            config,
            peer_addr,
            local_addr,
        })
    }

    /// Send one message
    pub async fn send(&mut self, id: u32, payload: impl Into<Bytes>) -> Result<()> {
        let message = Message::new(id, payload)?;
        trace!(message_id = id, length = message.length(), "Sending frame");
        self.framed.send(message).await?;
        Ok(())
    }

    /// Receive the next message
    ///
    /// Returns `Ok(None)` once the server has closed the connection. The
    /// configured read timeout, if any, applies.
    pub async fn recv(&mut self) -> Result<Option<Message>> {
        match self.config.read_timeout {
            Some(limit) => self.recv_timeout(limit).await,
            None => self.next_message().await,
        }
    }

    /// Receive the next message, failing with [`ClientError::ReadTimeout`]
    /// if none arrives within `limit`
    pub async fn recv_timeout(&mut self, limit: Duration) -> Result<Option<Message>> {
        timeout(limit, self.next_message())
            .await
            .map_err(|_| ClientError::ReadTimeout)?
    }

    async fn next_message(&mut self) -> Result<Option<Message>> {
        match self.framed.next().await {
            Some(Ok(message)) => {
                trace!(message_id = message.id(), length = message.length(), "Received frame");
                Ok(Some(message))
            }
            Some(Err(e)) => Err(e.into()),
            None => {
                debug!("Server closed connection");
                Ok(None)
            }
        }
    }

    /// Flush pending frames and close the connection
    pub async fn close(mut self) -> Result<()> {
        SinkExt::<Message>::close(&mut self.framed).await?;
        info!("Disconnected from {}", self.peer_addr);
        Ok(())
    }

    /// Get the server address
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Get the local address
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Get the client configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("peer_addr", &self.peer_addr)
            .field("local_addr", &self.local_addr)
            .finish()
    }
}
