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

use crate::{CodecError, CodecResult, Message};
use byteorder::{ByteOrder, LittleEndian};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{trace, warn};

/// Size of the fixed frame header: message id (4 bytes) + payload length (4 bytes).
pub const HEADER_LEN: usize = 8;

/// Largest up-front buffer reservation for a pending payload
const MAX_RESERVE: usize = 64 * 1024;

/// Codec for the Neptune wire format.
///
/// ```text
/// offset 0..3: message id     (u32, little-endian)
/// offset 4..7: payload length (u32, little-endian)
/// offset 8..N: payload        (N = length bytes)
/// ```
///
/// The codec can be used two ways. The stateless pair [`FrameCodec::encode`] /
/// [`FrameCodec::decode_header`] operates on raw buffers; the caller reads the
/// header, decodes it, then reads exactly `length` more bytes. The
/// [`Decoder`]/[`Encoder`] implementations wrap the same logic for use with
/// `tokio_util::codec::Framed`.
///
/// In both modes the declared length is checked against `max_packet_size`
/// before any payload byte is consumed, so an oversized frame is rejected
/// without being buffered. A `max_packet_size` of `0` disables the check.
#[derive(Debug, Clone, Default)]
pub struct FrameCodec {
    max_packet_size: u32,
    pending: Option<Message>,
}

impl FrameCodec {
    /// Creates a codec that rejects payloads longer than `max_packet_size`.
    ///
    /// # Example
    /// ```
    /// use neptune_codec::FrameCodec;
    ///
    /// let codec = FrameCodec::new(4096);
    /// assert_eq!(codec.max_packet_size(), 4096);
    /// ```
    pub fn new(max_packet_size: u32) -> FrameCodec {
        FrameCodec {
            max_packet_size,
            pending: None,
        }
    }

    /// Creates a codec that accepts payloads of any length.
    pub fn unlimited() -> FrameCodec {
        FrameCodec::new(0)
    }

    /// The configured maximum payload length (`0` means unlimited)
    pub fn max_packet_size(&self) -> u32 {
        self.max_packet_size
    }

    /// Length of the fixed header
    pub fn header_len(&self) -> usize {
        HEADER_LEN
    }

    /// Encodes a message into a freshly allocated frame.
    pub fn encode(&self, message: &Message) -> Bytes {
        let mut dst = BytesMut::with_capacity(HEADER_LEN + message.payload().len());
        self.encode_into(message, &mut dst);
        dst.freeze()
    }

    /// Appends the encoded frame for `message` to `dst`.
    pub fn encode_into(&self, message: &Message, dst: &mut BytesMut) {
        dst.reserve(HEADER_LEN + message.payload().len());
        dst.put_u32_le(message.id());
        dst.put_u32_le(message.length());
        dst.put_slice(message.payload());
    }

    /// Parses a frame header.
    ///
    /// Only the first [`HEADER_LEN`] bytes of `header` are examined. The returned
    /// message has its id and length set and an empty payload; the caller reads
    /// exactly `length` further bytes and attaches them with
    /// [`Message::with_payload`].
    ///
    /// # Errors
    /// - [`CodecError::IncompleteHeader`] if fewer than [`HEADER_LEN`] bytes are given.
    /// - [`CodecError::PackageTooLarge`] if a maximum is configured and the
    ///   declared length exceeds it.
    pub fn decode_header(&self, header: &[u8]) -> CodecResult<Message> {
        if header.len() < HEADER_LEN {
            return Err(CodecError::IncompleteHeader {
                required: HEADER_LEN,
                available: header.len(),
            });
        }
        let id = LittleEndian::read_u32(&header[0..4]);
        let length = LittleEndian::read_u32(&header[4..8]);
        if self.max_packet_size > 0 && length > self.max_packet_size {
            warn!(
                message_id = id,
                length,
                max = self.max_packet_size,
                "Rejecting oversized frame"
            );
            return Err(CodecError::PackageTooLarge {
                length,
                max: self.max_packet_size,
            });
        }
        trace!(message_id = id, length, "Decoded frame header");
        Ok(Message::header_only(id, length))
    }
}

impl Decoder for FrameCodec {
    type Item = Message;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let header = match self.pending.take() {
            Some(header) => header,
            None => {
                if src.len() < HEADER_LEN {
                    src.reserve(HEADER_LEN - src.len());
                    return Ok(None);
                }
                let header = self.decode_header(&src[..HEADER_LEN])?;
                src.advance(HEADER_LEN);
                header
            }
        };

        let length = header.length() as usize;
        if src.len() < length {
            // Header is kept so the length check is not repeated. The buffer
            // grows in bounded steps as payload bytes arrive.
            src.reserve((length - src.len()).min(MAX_RESERVE));
            self.pending = Some(header);
            return Ok(None);
        }

        let payload = src.split_to(length).freeze();
        header.with_payload(payload).map(Some)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(message) => Ok(Some(message)),
            None if self.pending.is_none() && src.is_empty() => Ok(None),
            None => {
                let buffered = src.len();
                self.pending = None;
                src.clear();
                Err(CodecError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("stream ended inside a frame ({} bytes buffered)", buffered),
                )))
            }
        }
    }
}

impl Encoder<Message> for FrameCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.encode_into(&item, dst);
        Ok(())
    }
}

impl Encoder<&Message> for FrameCodec {
    type Error = CodecError;

    fn encode(&mut self, item: &Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.encode_into(item, dst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn test_encode_layout() {
        let codec = FrameCodec::new(4096);
        let message = Message::new(0x0102_0304, "ping").unwrap();
        let frame = codec.encode(&message);

        assert_eq!(
            frame.as_ref(),
            &[0x04, 0x03, 0x02, 0x01, 4, 0, 0, 0, b'p', b'i', b'n', b'g']
        );
    }

    #[test]
    fn test_header_round_trip() {
        let codec = FrameCodec::new(4096);
        let message = Message::new(1, "pong:ping").unwrap();
        let frame = codec.encode(&message);

        let header = codec.decode_header(&frame[..HEADER_LEN]).unwrap();
        assert_eq!(header.id(), message.id());
        assert_eq!(header.length(), message.length());
        assert!(header.payload().is_empty());

        let decoded = header.with_payload(frame.slice(HEADER_LEN..)).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn test_decode_header_rejects_oversize() {
        let codec = FrameCodec::new(16);
        let mut header = BytesMut::new();
        header.put_u32_le(1);
        header.put_u32_le(17);

        let err = codec.decode_header(&header).unwrap_err();
        assert!(matches!(
            err,
            CodecError::PackageTooLarge {
                length: 17,
                max: 16
            }
        ));
    }

    #[test]
    fn test_decode_header_accepts_limit() {
        let codec = FrameCodec::new(16);
        let mut header = BytesMut::new();
        header.put_u32_le(1);
        header.put_u32_le(16);
        assert_eq!(codec.decode_header(&header).unwrap().length(), 16);
    }

    #[test]
    fn test_unlimited_accepts_anything() {
        let codec = FrameCodec::unlimited();
        let mut header = BytesMut::new();
        header.put_u32_le(1);
        header.put_u32_le(u32::MAX);
        assert_eq!(codec.decode_header(&header).unwrap().length(), u32::MAX);
    }

    #[test]
    fn test_decode_header_incomplete() {
        let codec = FrameCodec::new(16);
        let err = codec.decode_header(&[1, 0, 0]).unwrap_err();
        assert!(matches!(
            err,
            CodecError::IncompleteHeader {
                required: 8,
                available: 3
            }
        ));
    }

    #[test]
    fn test_decoder_partial_frames() {
        let mut codec = FrameCodec::new(4096);
        let frame = codec.encode(&Message::new(5, "hello").unwrap());

        let mut src = BytesMut::new();
        src.extend_from_slice(&frame[..3]);
        assert!(codec.decode(&mut src).unwrap().is_none());

        src.extend_from_slice(&frame[3..10]);
        assert!(codec.decode(&mut src).unwrap().is_none());

        src.extend_from_slice(&frame[10..]);
        let message = codec.decode(&mut src).unwrap().unwrap();
        assert_eq!(message.id(), 5);
        assert_eq!(message.payload().as_ref(), b"hello");
        assert!(src.is_empty());
    }

    #[test]
    fn test_decoder_multiple_frames_in_one_buffer() {
        let mut codec = FrameCodec::new(4096);
        let mut src = BytesMut::new();
        Encoder::encode(&mut codec, Message::new(1, "a").unwrap(), &mut src).unwrap();
        Encoder::encode(&mut codec, Message::new(2, "").unwrap(), &mut src).unwrap();
        Encoder::encode(&mut codec, Message::new(3, "ccc").unwrap(), &mut src).unwrap();

        let ids: Vec<u32> = std::iter::from_fn(|| codec.decode(&mut src).unwrap())
            .map(|m| m.id())
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    #[traced_test]
    fn test_decoder_rejects_oversize_before_payload() {
        let mut codec = FrameCodec::new(8);
        let mut src = BytesMut::new();
        src.put_u32_le(1);
        src.put_u32_le(1024);

        // No payload bytes present yet; the header alone is enough to fail.
        let err = codec.decode(&mut src).unwrap_err();
        assert!(matches!(err, CodecError::PackageTooLarge { .. }));
        assert!(logs_contain("Rejecting oversized frame"));
    }

    #[test]
    fn test_decoder_caps_payload_reservation() {
        let mut codec = FrameCodec::unlimited();
        let mut src = BytesMut::new();
        src.put_u32_le(1);
        src.put_u32_le(u32::MAX);

        assert!(codec.decode(&mut src).unwrap().is_none());
        assert!(src.capacity() >= MAX_RESERVE);
        assert!(src.capacity() < 1 << 20);

        // A small declared frame still gets exactly what it needs.
        let mut codec = FrameCodec::new(4096);
        let mut src = BytesMut::new();
        src.put_u32_le(2);
        src.put_u32_le(100);
        assert!(codec.decode(&mut src).unwrap().is_none());
        assert!(src.capacity() >= 100);
    }

    #[test]
    fn test_decode_eof_truncated_frame() {
        let mut codec = FrameCodec::new(4096);
        let frame = codec.encode(&Message::new(1, "truncated").unwrap());
        let mut src = BytesMut::from(&frame[..HEADER_LEN + 2]);

        assert!(codec.decode(&mut src).unwrap().is_none());
        let err = codec.decode_eof(&mut src).unwrap_err();
        assert!(matches!(err, CodecError::Io(_)));
    }

    #[test]
    fn test_decode_eof_clean() {
        let mut codec = FrameCodec::new(4096);
        let mut src = BytesMut::new();
        assert!(codec.decode_eof(&mut src).unwrap().is_none());
    }
}
