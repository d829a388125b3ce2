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

//! Message handler traits and connection lifecycle hooks

use crate::{Connection, Request};
use async_trait::async_trait;
use std::sync::{Arc, PoisonError, RwLock};

/// Message handler trait
///
/// A handler is registered with the router under one message id. For every
/// request carrying that id a worker calls [`pre_handle`](Handler::pre_handle),
/// [`handle`](Handler::handle) and [`post_handle`](Handler::post_handle) in
/// order. All three have default implementations that do nothing, so a
/// handler only overrides the phases it needs.
///
/// # Example
///
/// ```no_run
/// use neptune_service::{Handler, Request};
/// use async_trait::async_trait;
///
/// struct PingHandler;
///
/// #[async_trait]
/// impl Handler for PingHandler {
///     async fn handle(&self, request: &Request) {
///         let reply = format!("pong:{}", String::from_utf8_lossy(request.data()));
///         let _ = request.send_message(1, reply).await;
///     }
/// }
/// ```
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    /// Called before [`Handler::handle`]
    async fn pre_handle(&self, _request: &Request) {}

    /// Called to process the request
    async fn handle(&self, _request: &Request) {}

    /// Called after [`Handler::handle`] returns
    async fn post_handle(&self, _request: &Request) {}
}

/// Synchronous request callback
pub type RequestCallback = Box<dyn Fn(&Request) + Send + Sync + 'static>;

/// Callback-based handler implementation
///
/// Lets simple handlers be written as closures instead of implementing
/// [`Handler`]. Closures are synchronous; use
/// [`Connection::try_send_message`] to reply from one.
///
/// # Example
///
/// ```no_run
/// use neptune_service::CallbackHandler;
///
/// let handler = CallbackHandler {
///     handle: Some(Box::new(|request| {
///         if let Some(conn) = request.connection() {
///             let _ = conn.try_send_message(1, request.data().clone());
///         }
///     })),
///     ..Default::default()
/// };
/// ```
#[derive(Default)]
pub struct CallbackHandler {
    /// Called before handling
    pub pre_handle: Option<RequestCallback>,
    /// Called to handle the request
    pub handle: Option<RequestCallback>,
    /// Called after handling
    pub post_handle: Option<RequestCallback>,
}

#[async_trait]
impl Handler for CallbackHandler {
    async fn pre_handle(&self, request: &Request) {
        if let Some(ref f) = self.pre_handle {
            f(request);
        }
    }

    async fn handle(&self, request: &Request) {
        if let Some(ref f) = self.handle {
            f(request);
        }
    }

    async fn post_handle(&self, request: &Request) {
        if let Some(ref f) = self.post_handle {
            f(request);
        }
    }
}

/// Connection lifecycle callback
pub type ConnectionCallback = Arc<dyn Fn(&Connection) + Send + Sync + 'static>;

/// Optional callbacks run when a connection starts or stops
///
/// Callbacks run inline on the task that starts or stops the connection and
/// are never invoked while the hook lock is held.
#[derive(Default)]
pub struct ConnectionHooks {
    on_start: RwLock<Option<ConnectionCallback>>,
    on_stop: RwLock<Option<ConnectionCallback>>,
}

impl ConnectionHooks {
    /// Create an empty set of hooks
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the callback run after a connection's loops are launched
    pub fn set_on_start<F>(&self, callback: F)
    where
        F: Fn(&Connection) + Send + Sync + 'static,
    {
        *self.on_start.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(callback));
    }

    /// Set the callback run at the beginning of a connection's shutdown
    pub fn set_on_stop<F>(&self, callback: F)
    where
        F: Fn(&Connection) + Send + Sync + 'static,
    {
        *self.on_stop.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(callback));
    }

    /// Run the start callback, if any
    pub fn call_on_start(&self, connection: &Connection) {
        let callback = self
            .on_start
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(callback) = callback {
            callback(connection);
        }
    }

    /// Run the stop callback, if any
    pub fn call_on_stop(&self, connection: &Connection) {
        let callback = self
            .on_stop
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(callback) = callback {
            callback(connection);
        }
    }
}

impl std::fmt::Debug for ConnectionHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let is_set = |lock: &RwLock<Option<ConnectionCallback>>| {
            lock.read()
                .unwrap_or_else(PoisonError::into_inner)
                .is_some()
        };
        f.debug_struct("ConnectionHooks")
            .field("on_start", &is_set(&self.on_start))
            .field("on_stop", &is_set(&self.on_stop))
            .finish()
    }
}
