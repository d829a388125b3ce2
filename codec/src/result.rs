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

/// Result Type for Codec Operations
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors produced while encoding or decoding Neptune frames.
///
/// Every variant except [`CodecError::Io`] is a protocol error: the peer sent
/// something that cannot be framed, and the stream it came from should be
/// closed.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The declared payload length is larger than the configured maximum.
    #[error("package too large: declared {length} bytes, maximum is {max}")]
    PackageTooLarge {
        /// Length declared in the frame header
        length: u32,
        /// Configured maximum payload length
        max: u32,
    },

    /// Not enough bytes were supplied to parse a frame header.
    #[error("incomplete header: required {required} bytes, available {available}")]
    IncompleteHeader {
        /// Number of bytes required
        required: usize,
        /// Number of bytes available
        available: usize,
    },

    /// A payload was attached whose size does not match the header.
    #[error("payload length mismatch: header declares {declared} bytes, got {actual}")]
    LengthMismatch {
        /// Length declared in the frame header
        declared: u32,
        /// Actual number of payload bytes supplied
        actual: usize,
    },

    /// The payload is too large to be described by a 32-bit length field.
    #[error("payload of {0} bytes does not fit a 32-bit length field")]
    PayloadOverflow(usize),

    /// An I/O error occurred on the underlying stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CodecError {
    /// Check if the error was caused by the peer violating the wire format
    pub fn is_protocol_error(&self) -> bool {
        !matches!(self, CodecError::Io(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CodecError::PackageTooLarge {
            length: 8192,
            max: 4096,
        };
        assert_eq!(
            err.to_string(),
            "package too large: declared 8192 bytes, maximum is 4096"
        );

        let err = CodecError::IncompleteHeader {
            required: 8,
            available: 3,
        };
        assert_eq!(
            err.to_string(),
            "incomplete header: required 8 bytes, available 3"
        );
    }

    #[test]
    fn test_protocol_error_classification() {
        assert!(CodecError::PackageTooLarge { length: 2, max: 1 }.is_protocol_error());
        assert!(CodecError::PayloadOverflow(usize::MAX).is_protocol_error());
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
        assert!(!CodecError::from(io).is_protocol_error());
    }
}
