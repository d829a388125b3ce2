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

//! Application message type

use crate::{CodecError, CodecResult};
use bytes::Bytes;
use std::fmt;

/// One application message: a dispatch id plus an opaque payload.
///
/// The id is a routing key, not an identity; many messages share the same id.
/// A message is immutable once built. The only way to go from a header-only
/// message (as produced by [`FrameCodec::decode_header`](crate::FrameCodec::decode_header))
/// to a complete one is [`Message::with_payload`], which consumes the header.
#[derive(Clone, PartialEq, Eq)]
pub struct Message {
    id: u32,
    length: u32,
    payload: Bytes,
}

impl Message {
    /// Build a complete message from an id and payload.
    ///
    /// Fails only if the payload cannot be described by a 32-bit length.
    ///
    /// # Example
    /// ```
    /// use neptune_codec::Message;
    ///
    /// let message = Message::new(1, "ping").unwrap();
    /// assert_eq!(message.id(), 1);
    /// assert_eq!(message.length(), 4);
    /// ```
    pub fn new(id: u32, payload: impl Into<Bytes>) -> CodecResult<Self> {
        let payload = payload.into();
        let length =
            u32::try_from(payload.len()).map_err(|_| CodecError::PayloadOverflow(payload.len()))?;
        Ok(Self {
            id,
            length,
            payload,
        })
    }

    /// Build a message carrying only header information; the payload is unset.
    pub(crate) fn header_only(id: u32, length: u32) -> Self {
        Self {
            id,
            length,
            payload: Bytes::new(),
        }
    }

    /// Attach the payload read off the wire to a header-only message.
    ///
    /// The payload must be exactly as long as the header declared.
    pub fn with_payload(self, payload: impl Into<Bytes>) -> CodecResult<Self> {
        let payload = payload.into();
        if payload.len() != self.length as usize {
            return Err(CodecError::LengthMismatch {
                declared: self.length,
                actual: payload.len(),
            });
        }
        Ok(Self { payload, ..self })
    }

    /// The dispatch id
    pub fn id(&self) -> u32 {
        self.id
    }

    /// The payload length, as carried in the frame header
    pub fn length(&self) -> u32 {
        self.length
    }

    /// The payload bytes
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Consume the message and return its payload
    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// True once the payload matches the declared length
    pub fn is_complete(&self) -> bool {
        self.payload.len() == self.length as usize
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("id", &self.id)
            .field("length", &self.length)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_sets_length() {
        let message = Message::new(7, "hello").unwrap();
        assert_eq!(message.id(), 7);
        assert_eq!(message.length(), 5);
        assert_eq!(message.payload().as_ref(), b"hello");
        assert!(message.is_complete());
    }

    #[test]
    fn test_empty_payload() {
        let message = Message::new(99, Bytes::new()).unwrap();
        assert_eq!(message.length(), 0);
        assert!(message.is_complete());
    }

    #[test]
    fn test_header_only_then_payload() {
        let header = Message::header_only(3, 4);
        assert!(!header.is_complete());

        let message = header.with_payload(&b"ping"[..]).unwrap();
        assert!(message.is_complete());
        assert_eq!(message.into_payload().as_ref(), b"ping");
    }

    #[test]
    fn test_payload_length_mismatch() {
        let header = Message::header_only(3, 4);
        let err = header.with_payload(&b"pong!"[..]).unwrap_err();
        assert!(matches!(
            err,
            CodecError::LengthMismatch {
                declared: 4,
                actual: 5
            }
        ));
    }
}
