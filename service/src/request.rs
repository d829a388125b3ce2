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

use crate::connection::ConnectionInner;
use crate::{Connection, Result, ServiceError};
use bytes::Bytes;
use neptune_codec::Message;
use std::sync::Weak;

/// A decoded message paired with the connection it arrived on.
///
/// The connection handle is weak: a request waiting in a worker queue does
/// not keep its connection alive. Handlers that run after the connection
/// has shut down see [`Request::connection`] return `None`, or get
/// [`ServiceError::ConnectionClosed`] from [`Request::send_message`].
#[derive(Debug)]
pub struct Request {
    message: Message,
    connection: Weak<ConnectionInner>,
}

impl Request {
    pub(crate) fn new(message: Message, connection: &Connection) -> Self {
        Self {
            message,
            connection: connection.downgrade(),
        }
    }

    /// A request that is not attached to any connection
    #[cfg(test)]
    pub(crate) fn detached(message: Message) -> Self {
        Self {
            message,
            connection: Weak::new(),
        }
    }

    /// The decoded message
    pub fn message(&self) -> &Message {
        &self.message
    }

    /// The message id
    pub fn id(&self) -> u32 {
        self.message.id()
    }

    /// The message payload
    pub fn data(&self) -> &Bytes {
        self.message.payload()
    }

    /// The originating connection, if it still exists
    pub fn connection(&self) -> Option<Connection> {
        self.connection.upgrade().map(Connection::from_inner)
    }

    /// Reply on the originating connection
    pub async fn send_message(&self, id: u32, payload: impl Into<Bytes>) -> Result<()> {
        let connection = self.connection().ok_or(ServiceError::ConnectionClosed)?;
        connection.send_message(id, payload).await
    }
}
