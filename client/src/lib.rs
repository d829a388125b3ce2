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

//! # Neptune Client
//!
//! Client side of the Neptune wire protocol: connect to a server, send
//! messages by id and read the server's replies.
//!
//! ## Quick Start
//!
//! ```no_run
//! use neptune_client::{Client, ClientConfig};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = Client::connect(ClientConfig::new("127.0.0.1", 8999)).await?;
//!
//!     client.send(1, "ping").await?;
//!     if let Some(reply) = client.recv_timeout(Duration::from_secs(1)).await? {
//!         println!("{}: {:?}", reply.id(), reply.payload());
//!     }
//!
//!     client.close().await?;
//!     Ok(())
//! }
//! ```

mod client;
mod config;
mod error;

pub use client::Client;
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use neptune_codec::Message;
