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

//! Server configuration
//!
//! A [`ServerConfig`] is built once and passed by value into
//! [`Server::new`](crate::Server::new). The router and every connection
//! receive the subset they need from it; there is no process-wide instance.
//!
//! ```
//! use neptune_service::{IpVersion, ServerConfig};
//! use std::time::Duration;
//!
//! let config = ServerConfig::new("127.0.0.1:7777")
//!     .with_name("Lobby")
//!     .with_ip_version(IpVersion::V4)
//!     .with_worker_pool_size(4)
//!     .with_enqueue_timeout(Some(Duration::from_millis(250)));
//! assert!(config.validate().is_ok());
//! ```

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

/// Protocol family the listener binds to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IpVersion {
    /// IPv4 only
    #[default]
    V4,
    /// IPv6 only
    V6,
    /// Whichever family the address resolves to first
    Any,
}

impl IpVersion {
    /// Check if a resolved address belongs to this family
    pub fn matches(self, addr: &SocketAddr) -> bool {
        match self {
            IpVersion::V4 => addr.is_ipv4(),
            IpVersion::V6 => addr.is_ipv6(),
            IpVersion::Any => true,
        }
    }
}

impl fmt::Display for IpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpVersion::V4 => write!(f, "tcp4"),
            IpVersion::V6 => write!(f, "tcp6"),
            IpVersion::Any => write!(f, "tcp"),
        }
    }
}

/// Server configuration
///
/// Use the builder methods to customize the defaults.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Human readable server name, used in logs and snapshots
    pub name: String,

    /// Address to listen on, as `host:port`
    pub bind_address: String,

    /// Protocol family used when resolving `bind_address`
    pub ip_version: IpVersion,

    /// Maximum number of concurrently registered connections
    pub max_connections: usize,

    /// Maximum payload length accepted in a frame (`0` means unlimited)
    pub max_packet_size: u32,

    /// Number of worker tasks (and queues) in the router's pool
    pub worker_pool_size: usize,

    /// Capacity of each worker queue
    pub task_queue_size: usize,

    /// Capacity of each connection's outbound channel
    pub outbound_buffer_size: usize,

    /// How long a read loop waits for queue capacity before dropping a request
    ///
    /// `None` blocks indefinitely. A saturated pool whose handlers are
    /// themselves waiting on full outbound channels can then stall every
    /// reader; setting a timeout bounds that stall at the cost of dropped
    /// requests.
    pub enqueue_timeout: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "NeptuneServer".to_string(),
            bind_address: "0.0.0.0:8999".to_string(),
            ip_version: IpVersion::V4,
            max_connections: 1000,
            max_packet_size: 4096,
            worker_pool_size: 10,
            task_queue_size: 100,
            outbound_buffer_size: 64,
            enqueue_timeout: None,
        }
    }
}

impl ServerConfig {
    /// Create a new configuration with the given bind address
    ///
    /// All other settings will use their default values.
    pub fn new(bind_address: impl Into<String>) -> Self {
        Self {
            bind_address: bind_address.into(),
            ..Default::default()
        }
    }

    /// Set the server name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the protocol family
    pub fn with_ip_version(mut self, ip_version: IpVersion) -> Self {
        self.ip_version = ip_version;
        self
    }

    /// Set the maximum number of concurrent connections
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the maximum payload length (`0` for unlimited)
    pub fn with_max_packet_size(mut self, max: u32) -> Self {
        self.max_packet_size = max;
        self
    }

    /// Set the number of workers
    pub fn with_worker_pool_size(mut self, size: usize) -> Self {
        self.worker_pool_size = size;
        self
    }

    /// Set the capacity of each worker queue
    pub fn with_task_queue_size(mut self, size: usize) -> Self {
        self.task_queue_size = size;
        self
    }

    /// Set the capacity of each connection's outbound channel
    pub fn with_outbound_buffer_size(mut self, size: usize) -> Self {
        self.outbound_buffer_size = size;
        self
    }

    /// Set the enqueue timeout (`None` to block indefinitely)
    pub fn with_enqueue_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.enqueue_timeout = timeout;
        self
    }

    /// Validate the configuration
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.bind_address.is_empty() {
            return Err("bind_address must not be empty".to_string());
        }

        if self.max_connections == 0 {
            return Err("max_connections must be greater than 0".to_string());
        }

        if self.worker_pool_size == 0 {
            return Err("worker_pool_size must be greater than 0".to_string());
        }

        if self.task_queue_size == 0 {
            return Err("task_queue_size must be greater than 0".to_string());
        }

        if self.outbound_buffer_size == 0 {
            return Err("outbound_buffer_size must be greater than 0".to_string());
        }

        if self.enqueue_timeout.is_some_and(|t| t.is_zero()) {
            return Err("enqueue_timeout must be greater than 0 when set".to_string());
        }

        Ok(())
    }
}
