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

//! Server-side connection
//!
//! Each [`Connection`] owns one accepted socket and drives it with two tasks:
//! a read loop that decodes frames and submits them to the router, and a
//! write loop that drains the outbound channel onto the socket. Either loop
//! ending stops the connection.

use crate::{
    ConnectionHooks, ConnectionId, ConnectionInfo, ConnectionManager, ConnectionState, Request,
    Result, Router, ServerMetrics, ServiceError,
};
use bytes::Bytes;
use futures_util::StreamExt;
use metrics::{counter, histogram};
use neptune_codec::{FrameCodec, HEADER_LEN, Message};
use std::any::Any;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

/// Shared server state handed to every connection
#[derive(Clone)]
pub(crate) struct ConnectionContext {
    pub(crate) max_packet_size: u32,
    pub(crate) outbound_buffer_size: usize,
    pub(crate) manager: Weak<ConnectionManager>,
    pub(crate) router: Arc<Router>,
    pub(crate) hooks: Arc<ConnectionHooks>,
    pub(crate) metrics: Arc<ServerMetrics>,
}

type Properties = HashMap<String, Box<dyn Any + Send + Sync>>;

pub(crate) struct ConnectionInner {
    id: ConnectionId,
    peer_addr: SocketAddr,
    created_at: Instant,
    state: AtomicU8,

    // Taken by `start`, or dropped by `stop` if the connection never started
    socket: Mutex<Option<TcpStream>>,
    outbound: Mutex<Option<mpsc::Sender<Bytes>>>,
    outbound_rx: Mutex<Option<mpsc::Receiver<Bytes>>>,
    exit: CancellationToken,

    properties: Mutex<Properties>,
    codec: FrameCodec,
    context: ConnectionContext,

    frames_received: AtomicU64,
    frames_sent: AtomicU64,
    bytes_received: AtomicU64,
    bytes_sent: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A connection accepted by the server
///
/// `Connection` is a cheap handle; clones refer to the same socket.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl Connection {
    pub(crate) fn new(
        socket: TcpStream,
        peer_addr: SocketAddr,
        id: ConnectionId,
        context: ConnectionContext,
    ) -> Self {
        let (tx, rx) = mpsc::channel(context.outbound_buffer_size);
        Self {
            inner: Arc::new(ConnectionInner {
                id,
                peer_addr,
                created_at: Instant::now(),
                state: AtomicU8::new(ConnectionState::Connecting.as_u8()),
                socket: Mutex::new(Some(socket)),
                outbound: Mutex::new(Some(tx)),
                outbound_rx: Mutex::new(Some(rx)),
                exit: CancellationToken::new(),
                properties: Mutex::new(HashMap::new()),
                codec: FrameCodec::new(context.max_packet_size),
                context,
                frames_received: AtomicU64::new(0),
                frames_sent: AtomicU64::new(0),
                bytes_received: AtomicU64::new(0),
                bytes_sent: AtomicU64::new(0),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<ConnectionInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<ConnectionInner> {
        Arc::downgrade(&self.inner)
    }

    /// Get the connection ID
    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    /// Get the peer address
    pub fn peer_addr(&self) -> SocketAddr {
        self.inner.peer_addr
    }

    /// Get when the connection was created
    pub fn created_at(&self) -> Instant {
        self.inner.created_at
    }

    /// Get the current state
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    /// Check if shutdown has completed
    pub fn is_closed(&self) -> bool {
        self.state() == ConnectionState::Closed
    }

    /// Get a snapshot of this connection's state and counters
    pub fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            id: self.inner.id,
            state: self.state(),
            peer_addr: self.inner.peer_addr,
            created_at: self.inner.created_at,
            frames_received: self.inner.frames_received.load(Ordering::Relaxed),
            frames_sent: self.inner.frames_sent.load(Ordering::Relaxed),
            bytes_received: self.inner.bytes_received.load(Ordering::Relaxed),
            bytes_sent: self.inner.bytes_sent.load(Ordering::Relaxed),
        }
    }

    /// Start the connection
    ///
    /// Registers the connection with its manager, launches the read and write
    /// loops, then runs the start callback. Must be called from within a
    /// Tokio runtime. Calling it a second time, or after [`Connection::stop`],
    /// does nothing.
    #[instrument(skip(self), fields(connection_id = %self.inner.id))]
    pub fn start(&self) {
        if self.launch() {
            self.inner.context.hooks.call_on_start(self);
        }
    }

    /// Start the connection without waiting for the start callback
    ///
    /// Registration and the loops are in place when this returns; the start
    /// callback runs on the blocking pool, so a slow callback cannot hold up
    /// the caller.
    #[instrument(skip(self), fields(connection_id = %self.inner.id))]
    pub(crate) fn start_detached(&self) {
        if self.launch() {
            let connection = self.clone();
            tokio::task::spawn_blocking(move || {
                if !connection.state().is_terminal() {
                    connection.inner.context.hooks.call_on_start(&connection);
                }
            });
        }
    }

    fn launch(&self) -> bool {
        let started = self.inner.state.compare_exchange(
            ConnectionState::Connecting.as_u8(),
            ConnectionState::Active.as_u8(),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        if started.is_err() {
            warn!(state = %self.state(), "Connection cannot be started");
            return false;
        }

        let (Some(socket), Some(outbound)) = (
            lock(&self.inner.socket).take(),
            lock(&self.inner.outbound_rx).take(),
        ) else {
            warn!("Connection resources already released");
            return false;
        };

        if let Some(manager) = self.inner.context.manager.upgrade() {
            manager.add_connection(self.clone());
        }

        let (reader, writer) = socket.into_split();
        tokio::spawn(read_loop(self.clone(), reader));
        tokio::spawn(write_loop(self.clone(), writer, outbound));

        info!(peer_addr = %self.inner.peer_addr, "Connection started");
        true
    }

    /// Stop the connection
    ///
    /// The first call runs the stop callback, marks the connection closed,
    /// signals both loops to exit (which closes the socket), releases the
    /// outbound channel and deregisters from the manager. Later calls log a
    /// warning and return.
    #[instrument(skip(self), fields(connection_id = %self.inner.id))]
    pub fn stop(&self) {
        let transition =
            self.inner
                .state
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |state| {
                    if ConnectionState::from_u8(state).is_terminal() {
                        None
                    } else {
                        Some(ConnectionState::Closing.as_u8())
                    }
                });
        if transition.is_err() {
            warn!("Connection already stopped");
            return;
        }

        debug!("Stopping connection");
        self.inner.context.hooks.call_on_stop(self);

        {
            // Published under the property lock so no mutation lands after it
            let _properties = lock(&self.inner.properties);
            self.inner
                .state
                .store(ConnectionState::Closed.as_u8(), Ordering::Release);
        }
        lock(&self.inner.socket).take();
        self.inner.exit.cancel();
        lock(&self.inner.outbound).take();
        lock(&self.inner.outbound_rx).take();

        if let Some(manager) = self.inner.context.manager.upgrade() {
            manager.close_connection(self);
        }
        info!(
            duration = ?self.inner.created_at.elapsed(),
            "Connection closed"
        );
    }

    /// Queue a message for delivery to the peer
    ///
    /// Waits only for room in the outbound channel, never for the network.
    ///
    /// # Errors
    /// [`ServiceError::ConnectionClosed`] once the connection has stopped.
    pub async fn send_message(&self, id: u32, payload: impl Into<Bytes>) -> Result<()> {
        let sender = self.outbound_sender()?;
        let frame = self.encode(id, payload)?;
        sender
            .send(frame)
            .await
            .map_err(|_| ServiceError::ConnectionClosed)
    }

    /// Queue a message without waiting
    ///
    /// Usable from synchronous code such as the lifecycle callbacks.
    ///
    /// # Errors
    /// [`ServiceError::OutboundFull`] if the outbound channel has no room,
    /// [`ServiceError::ConnectionClosed`] once the connection has stopped.
    pub fn try_send_message(&self, id: u32, payload: impl Into<Bytes>) -> Result<()> {
        let sender = self.outbound_sender()?;
        let frame = self.encode(id, payload)?;
        sender.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => ServiceError::OutboundFull,
            TrySendError::Closed(_) => ServiceError::ConnectionClosed,
        })
    }

    fn outbound_sender(&self) -> Result<mpsc::Sender<Bytes>> {
        lock(&self.inner.outbound)
            .as_ref()
            .cloned()
            .ok_or(ServiceError::ConnectionClosed)
    }

    fn encode(&self, id: u32, payload: impl Into<Bytes>) -> Result<Bytes> {
        let message = Message::new(id, payload)?;
        trace!(connection_id = %self.inner.id, message_id = id, length = message.length(), "Queueing frame");
        Ok(self.inner.codec.encode(&message))
    }

    /// Store a property on the connection
    ///
    /// # Example
    /// ```no_run
    /// # use neptune_service::Connection;
    /// # fn example(conn: &Connection) -> neptune_service::Result<()> {
    /// conn.set_property("player", "ferris".to_string())?;
    /// let player: String = conn.get_property("player")?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn set_property<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) -> Result<()> {
        let mut properties = lock(&self.inner.properties);
        if self.is_closed() {
            return Err(ServiceError::ConnectionClosed);
        }
        properties.insert(key.into(), Box::new(value));
        Ok(())
    }

    /// Retrieve a copy of a property
    ///
    /// # Errors
    /// [`ServiceError::PropertyNotFound`] if nothing is stored under `key`,
    /// [`ServiceError::PropertyTypeMismatch`] if the stored value is not a `T`.
    pub fn get_property<T: Any + Clone>(&self, key: &str) -> Result<T> {
        let properties = lock(&self.inner.properties);
        let value = properties
            .get(key)
            .ok_or_else(|| ServiceError::PropertyNotFound(key.to_string()))?;
        value
            .downcast_ref::<T>()
            .cloned()
            .ok_or_else(|| ServiceError::PropertyTypeMismatch(key.to_string()))
    }

    /// Remove a property
    ///
    /// Returns `true` if the key existed and was removed.
    pub fn remove_property(&self, key: &str) -> Result<bool> {
        let mut properties = lock(&self.inner.properties);
        if self.is_closed() {
            return Err(ServiceError::ConnectionClosed);
        }
        Ok(properties.remove(key).is_some())
    }

    /// Check if a property exists
    pub fn has_property(&self, key: &str) -> bool {
        lock(&self.inner.properties).contains_key(key)
    }
}

async fn read_loop(connection: Connection, reader: OwnedReadHalf) {
    let inner = &connection.inner;
    let mut frames = FramedRead::new(reader, inner.codec.clone());

    loop {
        let next = tokio::select! {
            _ = inner.exit.cancelled() => break,
            next = frames.next() => next,
        };

        let message = match next {
            Some(Ok(message)) => message,
            Some(Err(e)) if e.is_protocol_error() => {
                warn!(connection_id = %inner.id, error = %e, "Closing connection on protocol error");
                inner.context.metrics.protocol_error();
                counter!("neptune.errors.protocol").increment(1);
                break;
            }
            Some(Err(e)) => {
                debug!(connection_id = %inner.id, error = %e, "Read failed");
                inner.context.metrics.connection_error();
                break;
            }
            None => {
                debug!(connection_id = %inner.id, "Peer closed connection");
                break;
            }
        };

        let size = (HEADER_LEN + message.payload().len()) as u64;
        inner.frames_received.fetch_add(1, Ordering::Relaxed);
        inner.bytes_received.fetch_add(size, Ordering::Relaxed);
        inner.context.metrics.frame_received(size);
        counter!("neptune.frames.received").increment(1);
        trace!(
            connection_id = %inner.id,
            message_id = message.id(),
            length = message.length(),
            "Frame received"
        );

        let request = Request::new(message, &connection);
        let submitted = tokio::select! {
            _ = inner.exit.cancelled() => break,
            result = inner.context.router.send_message_to_task_queue(request) => result,
        };
        match submitted {
            Ok(()) | Err(ServiceError::QueueTimeout) => {}
            Err(e) => {
                warn!(connection_id = %inner.id, error = %e, "Unable to submit request");
                break;
            }
        }
    }

    if !inner.exit.is_cancelled() {
        connection.stop();
    }
}

async fn write_loop(
    connection: Connection,
    mut writer: OwnedWriteHalf,
    mut outbound: mpsc::Receiver<Bytes>,
) {
    let inner = &connection.inner;

    loop {
        let frame = tokio::select! {
            _ = inner.exit.cancelled() => break,
            frame = outbound.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };

        let start = Instant::now();
        if let Err(e) = writer.write_all(&frame).await {
            debug!(connection_id = %inner.id, error = %e, "Write failed");
            inner.context.metrics.connection_error();
            break;
        }

        let size = frame.len() as u64;
        inner.frames_sent.fetch_add(1, Ordering::Relaxed);
        inner.bytes_sent.fetch_add(size, Ordering::Relaxed);
        inner.context.metrics.frame_sent(size);
        counter!("neptune.frames.sent").increment(1);
        histogram!("neptune.frame.write_duration").record(start.elapsed().as_secs_f64());
    }

    let _ = writer.shutdown().await;
    if !inner.exit.is_cancelled() {
        connection.stop();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.inner.id)
            .field("peer_addr", &self.inner.peer_addr)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RouterConfig;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;
    use tracing_test::traced_test;

    struct Fixture {
        manager: Arc<ConnectionManager>,
        hooks: Arc<ConnectionHooks>,
        metrics: Arc<ServerMetrics>,
    }

    impl Fixture {
        fn new() -> Self {
            let metrics = Arc::new(ServerMetrics::new());
            Self {
                manager: Arc::new(ConnectionManager::new(metrics.clone())),
                hooks: Arc::new(ConnectionHooks::new()),
                metrics,
            }
        }

        fn context(&self) -> ConnectionContext {
            ConnectionContext {
                max_packet_size: 16,
                outbound_buffer_size: 8,
                manager: Arc::downgrade(&self.manager),
                router: Arc::new(Router::new(RouterConfig::default(), self.metrics.clone())),
                hooks: self.hooks.clone(),
                metrics: self.metrics.clone(),
            }
        }

        async fn connect(&self, id: u32) -> (Connection, TcpStream) {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let client = TcpStream::connect(listener.local_addr().unwrap())
                .await
                .unwrap();
            let (socket, peer_addr) = listener.accept().await.unwrap();
            let connection =
                Connection::new(socket, peer_addr, ConnectionId::new(id), self.context());
            (connection, client)
        }
    }

    async fn wait_until(condition: impl Fn() -> bool) {
        for _ in 0..100 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn test_start_registers_and_runs_hook() {
        let fixture = Fixture::new();
        let started = Arc::new(AtomicUsize::new(0));
        let counter = started.clone();
        fixture.hooks.set_on_start(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let (connection, _client) = fixture.connect(7).await;
        assert_eq!(connection.state(), ConnectionState::Connecting);

        connection.start();
        assert_eq!(connection.state(), ConnectionState::Active);
        assert_eq!(fixture.manager.connection_count(), 1);
        assert_eq!(started.load(Ordering::SeqCst), 1);

        connection.stop();
    }

    #[tokio::test]
    #[traced_test]
    async fn test_stop_is_idempotent() {
        let fixture = Fixture::new();
        let stopped = Arc::new(AtomicUsize::new(0));
        let counter = stopped.clone();
        fixture.hooks.set_on_stop(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let (connection, _client) = fixture.connect(1).await;
        connection.start();
        connection.stop();
        connection.stop();

        assert!(connection.is_closed());
        assert_eq!(stopped.load(Ordering::SeqCst), 1);
        assert_eq!(fixture.manager.connection_count(), 0);
        assert_eq!(fixture.metrics.active_connections(), 0);
        assert!(logs_contain("Connection already stopped"));
    }

    #[tokio::test]
    async fn test_send_message_reaches_peer() {
        let fixture = Fixture::new();
        let (connection, mut client) = fixture.connect(1).await;
        connection.start();

        connection.send_message(3, "pong").await.unwrap();

        let mut frame = [0u8; HEADER_LEN + 4];
        client.read_exact(&mut frame).await.unwrap();
        assert_eq!(&frame[..4], &3u32.to_le_bytes());
        assert_eq!(&frame[4..8], &4u32.to_le_bytes());
        assert_eq!(&frame[8..], b"pong");

        wait_until(|| connection.info().frames_sent == 1).await;
        connection.stop();
    }

    #[tokio::test]
    async fn test_send_after_stop_fails() {
        let fixture = Fixture::new();
        let (connection, _client) = fixture.connect(1).await;
        connection.start();
        connection.stop();

        let err = connection.send_message(1, "late").await.unwrap_err();
        assert!(matches!(err, ServiceError::ConnectionClosed));
        let err = connection.try_send_message(1, "late").unwrap_err();
        assert!(matches!(err, ServiceError::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_peer_close_stops_connection() {
        let fixture = Fixture::new();
        let (connection, client) = fixture.connect(1).await;
        connection.start();
        drop(client);

        wait_until(|| connection.is_closed()).await;
        assert_eq!(fixture.manager.connection_count(), 0);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_oversize_frame_closes_connection() {
        let fixture = Fixture::new();
        let (connection, mut client) = fixture.connect(1).await;
        connection.start();

        let mut header = Vec::new();
        header.extend_from_slice(&1u32.to_le_bytes());
        header.extend_from_slice(&17u32.to_le_bytes());
        client.write_all(&header).await.unwrap();

        wait_until(|| connection.is_closed()).await;
        assert_eq!(fixture.metrics.snapshot().protocol_errors, 1);
        assert!(logs_contain("Closing connection on protocol error"));

        let mut buf = [0u8; 1];
        assert_eq!(client.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_properties() {
        let fixture = Fixture::new();
        let (connection, _client) = fixture.connect(1).await;

        connection.set_property("name", "ferris".to_string()).unwrap();
        connection.set_property("level", 3u32).unwrap();

        assert_eq!(connection.get_property::<String>("name").unwrap(), "ferris");
        assert_eq!(connection.get_property::<u32>("level").unwrap(), 3);
        assert!(connection.has_property("level"));

        let err = connection.get_property::<u32>("missing").unwrap_err();
        assert!(matches!(err, ServiceError::PropertyNotFound(key) if key == "missing"));
        let err = connection.get_property::<u64>("level").unwrap_err();
        assert!(matches!(err, ServiceError::PropertyTypeMismatch(_)));

        assert!(connection.remove_property("level").unwrap());
        assert!(!connection.remove_property("level").unwrap());

        connection.stop();
        assert!(matches!(
            connection.set_property("late", 1u8),
            Err(ServiceError::ConnectionClosed)
        ));
        assert!(matches!(
            connection.remove_property("name"),
            Err(ServiceError::ConnectionClosed)
        ));
        assert_eq!(connection.get_property::<String>("name").unwrap(), "ferris");
    }

    #[tokio::test]
    async fn test_stop_hook_sees_properties() {
        let fixture = Fixture::new();
        let seen = Arc::new(Mutex::new(None));
        let slot = seen.clone();
        fixture.hooks.set_on_stop(move |conn| {
            *slot.lock().unwrap() = conn.get_property::<String>("name").ok();
        });

        let (connection, _client) = fixture.connect(1).await;
        connection.start();
        connection.set_property("name", "ferris".to_string()).unwrap();
        connection.stop();

        assert_eq!(seen.lock().unwrap().as_deref(), Some("ferris"));
    }

    #[tokio::test]
    async fn test_start_detached_registers_before_hook_finishes() {
        let fixture = Fixture::new();
        let (release, hold) = std::sync::mpsc::channel::<()>();
        let hold = Mutex::new(hold);
        let started = Arc::new(AtomicUsize::new(0));
        let counter = started.clone();
        fixture.hooks.set_on_start(move |_| {
            let _ = hold.lock().unwrap().recv();
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let (connection, _client) = fixture.connect(1).await;
        connection.start_detached();
        assert_eq!(connection.state(), ConnectionState::Active);
        assert_eq!(fixture.manager.connection_count(), 1);
        assert_eq!(started.load(Ordering::SeqCst), 0);

        release.send(()).unwrap();
        wait_until(|| started.load(Ordering::SeqCst) == 1).await;
        connection.stop();
    }

    #[tokio::test]
    async fn test_closed_is_published_under_property_lock() {
        let fixture = Fixture::new();
        let (connection, _client) = fixture.connect(1).await;
        connection.set_property("name", "ferris".to_string()).unwrap();

        let guard = lock(&connection.inner.properties);
        let stopper = {
            let connection = connection.clone();
            std::thread::spawn(move || connection.stop())
        };
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(connection.state(), ConnectionState::Closing);
        drop(guard);
        stopper.join().unwrap();

        assert!(connection.is_closed());
        assert!(matches!(
            connection.set_property("late", 1u8),
            Err(ServiceError::ConnectionClosed)
        ));
        assert!(!connection.has_property("late"));
    }

    #[tokio::test]
    async fn test_stop_before_start() {
        let fixture = Fixture::new();
        let (connection, mut client) = fixture.connect(1).await;
        connection.stop();
        connection.start();

        assert!(connection.is_closed());
        assert_eq!(fixture.manager.connection_count(), 0);
        let mut buf = [0u8; 1];
        assert_eq!(client.read(&mut buf).await.unwrap(), 0);
    }
}
