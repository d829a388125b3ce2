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

//! Lock-free metrics for the Neptune service

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Lock-free server metrics
///
/// All metrics are stored as atomics and can be accessed concurrently
/// without locks. Use the `snapshot()` method to get a view of all metrics
/// at a point in time.
#[derive(Debug)]
pub struct ServerMetrics {
    // Connection counts
    total_connections: AtomicU64,
    active_connections: AtomicU64,
    rejected_connections: AtomicU64,

    // Throughput
    frames_received: AtomicU64,
    frames_sent: AtomicU64,
    bytes_received: AtomicU64,
    bytes_sent: AtomicU64,

    // Errors
    connection_errors: AtomicU64,
    protocol_errors: AtomicU64,
    unrouted_messages: AtomicU64,
    handler_panics: AtomicU64,
    queue_timeouts: AtomicU64,

    // Timing (stored as nanoseconds)
    total_connection_duration_ns: AtomicU64,

    started_at: Instant,
}

impl Default for ServerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerMetrics {
    /// Create a new metrics instance
    pub fn new() -> Self {
        Self {
            total_connections: AtomicU64::new(0),
            active_connections: AtomicU64::new(0),
            rejected_connections: AtomicU64::new(0),
            frames_received: AtomicU64::new(0),
            frames_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            connection_errors: AtomicU64::new(0),
            protocol_errors: AtomicU64::new(0),
            unrouted_messages: AtomicU64::new(0),
            handler_panics: AtomicU64::new(0),
            queue_timeouts: AtomicU64::new(0),
            total_connection_duration_ns: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    // Connection tracking

    /// Record a connection being registered
    pub fn connection_opened(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a connection being deregistered
    pub fn connection_closed(&self, duration: Duration) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
        self.total_connection_duration_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
    }

    /// Record a socket closed by the admission check
    pub fn connection_rejected(&self) {
        self.rejected_connections.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current number of registered connections
    pub fn active_connections(&self) -> u64 {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Get the total number of connections since server start
    pub fn total_connections(&self) -> u64 {
        self.total_connections.load(Ordering::Relaxed)
    }

    /// Get the number of sockets rejected by the admission check
    pub fn rejected_connections(&self) -> u64 {
        self.rejected_connections.load(Ordering::Relaxed)
    }

    // Throughput tracking

    /// Record a decoded frame of `bytes` bytes (header included)
    pub fn frame_received(&self, bytes: u64) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Record a written frame of `bytes` bytes (header included)
    pub fn frame_sent(&self, bytes: u64) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes, Ordering::Relaxed);
    }

    // Error tracking

    /// Record an I/O or accept error
    pub fn connection_error(&self) {
        self.connection_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a malformed or oversized frame
    pub fn protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a request with no registered handler
    pub fn unrouted_message(&self) {
        self.unrouted_messages.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a handler phase that panicked
    pub fn handler_panic(&self) {
        self.handler_panics.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a request dropped because its queue stayed full
    pub fn queue_timeout(&self) {
        self.queue_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    // Snapshot

    /// Get a snapshot of all metrics
    ///
    /// Counters are read individually, so the snapshot may be slightly
    /// inconsistent while traffic is flowing.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_connections: self.total_connections.load(Ordering::Relaxed),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            rejected_connections: self.rejected_connections.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            connection_errors: self.connection_errors.load(Ordering::Relaxed),
            protocol_errors: self.protocol_errors.load(Ordering::Relaxed),
            unrouted_messages: self.unrouted_messages.load(Ordering::Relaxed),
            handler_panics: self.handler_panics.load(Ordering::Relaxed),
            queue_timeouts: self.queue_timeouts.load(Ordering::Relaxed),
            uptime: self.started_at.elapsed(),
            avg_connection_duration: self.average_connection_duration(),
        }
    }

    fn average_connection_duration(&self) -> Duration {
        let closed = self
            .total_connections
            .load(Ordering::Relaxed)
            .saturating_sub(self.active_connections.load(Ordering::Relaxed));
        if closed == 0 {
            return Duration::ZERO;
        }
        let total_ns = self.total_connection_duration_ns.load(Ordering::Relaxed);
        Duration::from_nanos(total_ns / closed)
    }
}

/// A snapshot of server metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    /// Total connections since server start
    pub total_connections: u64,
    /// Currently registered connections
    pub active_connections: u64,
    /// Sockets closed by the admission check
    pub rejected_connections: u64,
    /// Frames decoded from peers
    pub frames_received: u64,
    /// Frames written to peers
    pub frames_sent: u64,
    /// Bytes decoded from peers
    pub bytes_received: u64,
    /// Bytes written to peers
    pub bytes_sent: u64,
    /// I/O and accept errors
    pub connection_errors: u64,
    /// Malformed or oversized frames
    pub protocol_errors: u64,
    /// Requests dropped for lack of a handler
    pub unrouted_messages: u64,
    /// Handler phases that panicked
    pub handler_panics: u64,
    /// Requests dropped on enqueue timeout
    pub queue_timeouts: u64,
    /// Server uptime
    pub uptime: Duration,
    /// Average duration of closed connections
    pub avg_connection_duration: Duration,
}

impl MetricsSnapshot {
    /// Calculate frames per second (received)
    pub fn frames_received_per_sec(&self) -> f64 {
        if self.uptime.is_zero() {
            return 0.0;
        }
        self.frames_received as f64 / self.uptime.as_secs_f64()
    }

    /// Calculate frames per second (sent)
    pub fn frames_sent_per_sec(&self) -> f64 {
        if self.uptime.is_zero() {
            return 0.0;
        }
        self.frames_sent as f64 / self.uptime.as_secs_f64()
    }

    /// Calculate total error count
    pub fn total_errors(&self) -> u64 {
        self.connection_errors + self.protocol_errors + self.handler_panics
    }
}
