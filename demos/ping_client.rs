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

//! Ping Client Example
//!
//! Sends a message with a random id (`1` or `2`) once per second and prints
//! every reply from the `ping_server` example.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --example ping_client
//! ```

use neptune_client::{Client, ClientConfig, ClientError};
use rand::Rng;
use std::time::Duration;

async fn ping_loop(client: &mut Client) -> Result<(), ClientError> {
    loop {
        let id = rand::rng().random_range(1..=2);
        client.send(id, "Neptune ping").await?;

        // Print replies until the line goes quiet for a second
        loop {
            match client.recv_timeout(Duration::from_secs(1)).await {
                Ok(Some(message)) => println!(
                    "[{}] {}",
                    message.id(),
                    String::from_utf8_lossy(message.payload())
                ),
                Ok(None) => {
                    println!("Server closed the connection");
                    return Ok(());
                }
                Err(ClientError::ReadTimeout) => break,
                Err(e) => return Err(e),
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut client = Client::connect(ClientConfig::new("127.0.0.1", 8999)).await?;
    println!("Connected to {}", client.peer_addr());

    tokio::select! {
        result = ping_loop(&mut client) => result?,
        _ = tokio::signal::ctrl_c() => {}
    }

    client.close().await?;
    Ok(())
}
