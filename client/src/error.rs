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

//! Client error types

use neptune_codec::CodecError;
use std::io;
use thiserror::Error;

/// Client error type
#[derive(Debug, Error)]
pub enum ClientError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(io::Error),

    /// Connection timeout
    #[error("Connection timeout")]
    ConnectionTimeout,

    /// Read timeout
    #[error("Read timeout")]
    ReadTimeout,

    /// Connection closed by server
    #[error("Connection closed by server")]
    ConnectionClosed,

    /// Connection refused
    #[error("Connection refused")]
    ConnectionRefused,

    /// Frame could not be encoded or decoded
    #[error("Codec error: {0}")]
    Codec(CodecError),
}

impl From<io::Error> for ClientError {
    fn from(error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::TimedOut => Self::ReadTimeout,
            io::ErrorKind::ConnectionRefused => Self::ConnectionRefused,
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof => Self::ConnectionClosed,
            _ => Self::Io(error),
        }
    }
}

impl From<CodecError> for ClientError {
    fn from(error: CodecError) -> Self {
        match error {
            CodecError::Io(e) => e.into(),
            other => Self::Codec(other),
        }
    }
}

/// Result type for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_mapping() {
        let err: ClientError = io::Error::from(io::ErrorKind::ConnectionRefused).into();
        assert!(matches!(err, ClientError::ConnectionRefused));

        let err: ClientError = io::Error::from(io::ErrorKind::BrokenPipe).into();
        assert!(matches!(err, ClientError::ConnectionClosed));

        let err: ClientError = io::Error::from(io::ErrorKind::PermissionDenied).into();
        assert!(matches!(err, ClientError::Io(_)));
    }

    #[test]
    fn test_codec_error_mapping() {
        let err: ClientError = CodecError::PackageTooLarge { length: 10, max: 5 }.into();
        assert!(matches!(err, ClientError::Codec(_)));

        let eof = io::Error::from(io::ErrorKind::UnexpectedEof);
        let err: ClientError = CodecError::Io(eof).into();
        assert!(matches!(err, ClientError::ConnectionClosed));
    }

    #[test]
    fn test_error_display() {
        assert_eq!(ClientError::ReadTimeout.to_string(), "Read timeout");
        assert_eq!(
            ClientError::ConnectionClosed.to_string(),
            "Connection closed by server"
        );
    }
}
