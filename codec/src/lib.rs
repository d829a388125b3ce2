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

//! # Neptune Frame Codec
//!
//! Encoding and decoding of the Neptune wire format: a fixed 8-byte
//! little-endian header (message id, payload length) followed by the payload.
//!
//! ## Core Components
//!
//! ### [`Message`]
//!
//! One application unit: a numeric dispatch id and its payload bytes.
//!
//! ### [`FrameCodec`]
//!
//! Stateless [`FrameCodec::encode`] / [`FrameCodec::decode_header`] for callers
//! that drive the socket themselves, plus [`Decoder`](tokio_util::codec::Decoder)
//! and [`Encoder`](tokio_util::codec::Encoder) implementations for use with
//! `tokio_util::codec::Framed`.
//!
//! ## Example
//!
//! ```
//! use neptune_codec::{FrameCodec, Message, HEADER_LEN};
//!
//! let codec = FrameCodec::new(4096);
//! let frame = codec.encode(&Message::new(1, "ping").unwrap());
//!
//! let header = codec.decode_header(&frame[..HEADER_LEN]).unwrap();
//! let message = header.with_payload(frame.slice(HEADER_LEN..)).unwrap();
//! assert_eq!(message.payload().as_ref(), b"ping");
//! ```

mod codec;
mod message;
mod result;

pub use codec::{FrameCodec, HEADER_LEN};
pub use message::Message;
pub use result::{CodecError, CodecResult};
