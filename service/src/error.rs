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

//! Error types for the Neptune service

use crate::types::ConnectionId;
use thiserror::Error;

/// Result type for service operations
pub type Result<T> = std::result::Result<T, ServiceError>;

/// Service error types
#[derive(Debug, Error)]
pub enum ServiceError {
    /// I/O error from the listener or an underlying TCP stream
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Protocol error from the frame codec
    #[error("Protocol error: {0}")]
    Codec(#[from] neptune_codec::CodecError),

    /// Connection with the given ID was not found
    #[error("Connection {0} not found")]
    ConnectionNotFound(ConnectionId),

    /// Connection has been closed
    #[error("Connection closed")]
    ConnectionClosed,

    /// The connection's outbound channel is full
    #[error("Outbound channel full")]
    OutboundFull,

    /// Maximum number of connections reached
    #[error("Maximum connections ({0}) reached")]
    MaxConnectionsReached(usize),

    /// A request was submitted before the worker pool was started
    #[error("Worker pool not started")]
    WorkerPoolNotStarted,

    /// The worker queue was closed while submitting a request
    #[error("Worker queue closed")]
    QueueClosed,

    /// The worker queue stayed full past the configured enqueue timeout
    #[error("Timed out waiting for worker queue capacity")]
    QueueTimeout,

    /// The bind address did not resolve to a usable socket address
    #[error("Unable to resolve address: {0}")]
    AddressResolution(String),

    /// The server configuration failed validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Server was already started
    #[error("Server already running")]
    ServerAlreadyRunning,

    /// Server is not running
    #[error("Server not running")]
    ServerNotRunning,

    /// Server was stopped and cannot be started again
    #[error("Server stopped")]
    ServerStopped,

    /// No property is stored under the given key
    #[error("Property '{0}' not found")]
    PropertyNotFound(String),

    /// A property exists but holds a value of a different type
    #[error("Property '{0}' has a different type")]
    PropertyTypeMismatch(String),
}

impl ServiceError {
    /// Check if the error is confined to a single connection
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            ServiceError::ConnectionNotFound(_)
                | ServiceError::ConnectionClosed
                | ServiceError::Io(_)
                | ServiceError::Codec(_)
        )
    }

    /// Check if the error was caused by the peer violating the wire format
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, ServiceError::Codec(e) if e.is_protocol_error())
    }

    /// Check if the error comes from the worker pool
    pub fn is_queue_error(&self) -> bool {
        matches!(
            self,
            ServiceError::WorkerPoolNotStarted
                | ServiceError::QueueClosed
                | ServiceError::QueueTimeout
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neptune_codec::CodecError;

    #[test]
    fn test_error_is_connection_error() {
        assert!(ServiceError::ConnectionNotFound(ConnectionId::new(1)).is_connection_error());
        assert!(ServiceError::ConnectionClosed.is_connection_error());
        assert!(!ServiceError::QueueTimeout.is_connection_error());
        assert!(!ServiceError::ServerNotRunning.is_connection_error());
    }

    #[test]
    fn test_error_is_protocol_error() {
        let err = ServiceError::from(CodecError::PackageTooLarge {
            length: 8192,
            max: 4096,
        });
        assert!(err.is_protocol_error());

        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
        assert!(!ServiceError::from(CodecError::Io(io)).is_protocol_error());
        assert!(!ServiceError::ConnectionClosed.is_protocol_error());
    }

    #[test]
    fn test_error_is_queue_error() {
        assert!(ServiceError::WorkerPoolNotStarted.is_queue_error());
        assert!(ServiceError::QueueTimeout.is_queue_error());
        assert!(!ServiceError::ConnectionClosed.is_queue_error());
    }

    #[test]
    fn test_error_display() {
        let err = ServiceError::ConnectionNotFound(ConnectionId::new(42));
        assert_eq!(err.to_string(), "Connection conn-42 not found");

        let err = ServiceError::MaxConnectionsReached(1000);
        assert_eq!(err.to_string(), "Maximum connections (1000) reached");

        let err = ServiceError::PropertyNotFound("user".to_string());
        assert_eq!(err.to_string(), "Property 'user' not found");
    }
}
