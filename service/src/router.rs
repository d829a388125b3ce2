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

//! Message router and worker pool
//!
//! The router owns the handler table and a fixed pool of workers, each with
//! its own bounded queue. Requests are assigned to a queue at random and
//! processed in FIFO order within that queue.
//!
//! ```text
//! read loop ─┬─> queue 0 ──> worker 0 ─┐
//!            ├─> queue 1 ──> worker 1 ─┼─> handler(pre, handle, post)
//!            └─> queue N ──> worker N ─┘
//! ```

use crate::{Handler, Request, Result, ServerConfig, ServerMetrics, ServiceError};
use futures::FutureExt;
use metrics::{counter, histogram};
use rand::Rng;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// How long `shutdown` waits for each worker to drain its queue
const WORKER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Worker pool configuration, derived from [`ServerConfig`]
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Number of workers (and queues)
    pub worker_pool_size: usize,
    /// Capacity of each queue
    pub task_queue_size: usize,
    /// How long to wait for queue capacity (`None` blocks indefinitely)
    pub enqueue_timeout: Option<Duration>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: 10,
            task_queue_size: 100,
            enqueue_timeout: None,
        }
    }
}

impl From<&ServerConfig> for RouterConfig {
    fn from(config: &ServerConfig) -> Self {
        Self {
            worker_pool_size: config.worker_pool_size,
            task_queue_size: config.task_queue_size,
            enqueue_timeout: config.enqueue_timeout,
        }
    }
}

/// Message router
///
/// Handlers are registered through `&mut self`, so the table can only change
/// before the router is shared with its workers; lookups afterwards take no
/// lock.
pub struct Router {
    config: RouterConfig,
    handlers: HashMap<u32, Arc<dyn Handler>>,
    queues: OnceLock<Vec<mpsc::Sender<Request>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    shutdown: CancellationToken,
    metrics: Arc<ServerMetrics>,
}

impl Router {
    /// Create a router with an empty handler table
    pub fn new(config: RouterConfig, metrics: Arc<ServerMetrics>) -> Self {
        Self {
            config,
            handlers: HashMap::new(),
            queues: OnceLock::new(),
            workers: Mutex::new(Vec::new()),
            shutdown: CancellationToken::new(),
            metrics,
        }
    }

    /// Register a handler for a message id
    ///
    /// Returns `false` and keeps the existing handler if `id` is already taken.
    pub fn add_handler<H: Handler>(&mut self, id: u32, handler: H) -> bool {
        if self.handlers.contains_key(&id) {
            warn!(message_id = id, "Handler already registered, ignoring");
            return false;
        }
        self.handlers.insert(id, Arc::new(handler));
        debug!(message_id = id, "Handler registered");
        true
    }

    /// Check if a handler is registered for `id`
    pub fn has_handler(&self, id: u32) -> bool {
        self.handlers.contains_key(&id)
    }

    /// Number of registered handlers
    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Get the router configuration
    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Check if the worker pool has been started
    pub fn is_started(&self) -> bool {
        self.queues.get().is_some()
    }

    /// Create the queues and spawn one worker per queue
    ///
    /// Only the first call has any effect; later calls log a warning and
    /// return `false`.
    pub fn start_worker_pool(self: &Arc<Self>) -> bool {
        let pool_size = self.config.worker_pool_size.max(1);
        let queue_size = self.config.task_queue_size.max(1);

        let mut receivers = Vec::with_capacity(pool_size);
        self.queues.get_or_init(|| {
            (0..pool_size)
                .map(|_| {
                    let (tx, rx) = mpsc::channel(queue_size);
                    receivers.push(rx);
                    tx
                })
                .collect()
        });
        if receivers.is_empty() {
            warn!("Worker pool already started");
            return false;
        }

        let handles = receivers
            .into_iter()
            .enumerate()
            .map(|(index, queue)| tokio::spawn(self.clone().run_worker(index, queue)))
            .collect();
        *self.workers.lock().unwrap_or_else(PoisonError::into_inner) = handles;

        info!(
            workers = pool_size,
            queue_size,
            handlers = self.handlers.len(),
            "Worker pool started"
        );
        true
    }

    async fn run_worker(self: Arc<Self>, index: usize, mut queue: mpsc::Receiver<Request>) {
        debug!(worker = index, "Worker started");

        loop {
            // Queued requests are preferred over the shutdown signal so the
            // queue is drained before the worker exits.
            tokio::select! {
                biased;
                request = queue.recv() => match request {
                    Some(request) => self.route(request).await,
                    None => break,
                },
                _ = self.shutdown.cancelled() => break,
            }
        }

        debug!(worker = index, "Worker stopped");
    }

    /// Dispatch one request to its handler
    ///
    /// Runs `pre_handle`, `handle` and `post_handle` in order on the calling
    /// task. A request with no registered handler is logged and dropped. A
    /// panic in any phase is logged and the remaining phases are skipped.
    pub async fn route(&self, request: Request) {
        let id = request.id();
        let Some(handler) = self.handlers.get(&id) else {
            warn!(message_id = id, "No handler registered for message, dropping");
            self.metrics.unrouted_message();
            counter!("neptune.messages.unrouted").increment(1);
            return;
        };

        let start = Instant::now();
        let outcome = AssertUnwindSafe(async {
            handler.pre_handle(&request).await;
            handler.handle(&request).await;
            handler.post_handle(&request).await;
        })
        .catch_unwind()
        .await;

        match outcome {
            Ok(()) => {
                counter!("neptune.messages.handled").increment(1);
                histogram!("neptune.handler.duration").record(start.elapsed().as_secs_f64());
            }
            Err(payload) => {
                error!(
                    message_id = id,
                    panic = panic_message(payload.as_ref()),
                    "Handler panicked"
                );
                self.metrics.handler_panic();
                counter!("neptune.errors.handler_panic").increment(1);
            }
        }
    }

    /// Submit a request to a randomly chosen worker queue
    ///
    /// Waits while the chosen queue is full. With an enqueue timeout
    /// configured the request is dropped once the timeout elapses.
    ///
    /// # Errors
    /// - [`ServiceError::WorkerPoolNotStarted`] before [`Router::start_worker_pool`].
    /// - [`ServiceError::QueueTimeout`] if the enqueue timeout elapsed.
    /// - [`ServiceError::QueueClosed`] after the pool has shut down.
    pub async fn send_message_to_task_queue(&self, request: Request) -> Result<()> {
        let queues = self
            .queues
            .get()
            .ok_or(ServiceError::WorkerPoolNotStarted)?;
        let index = rand::rng().random_range(0..queues.len());
        self.enqueue(index, request).await
    }

    async fn enqueue(&self, index: usize, request: Request) -> Result<()> {
        let queue = self
            .queues
            .get()
            .and_then(|queues| queues.get(index))
            .ok_or(ServiceError::WorkerPoolNotStarted)?;
        trace!(queue = index, message_id = request.id(), "Submitting request");

        let Some(limit) = self.config.enqueue_timeout else {
            return queue
                .send(request)
                .await
                .map_err(|_| ServiceError::QueueClosed);
        };

        match tokio::time::timeout(limit, queue.send(request)).await {
            Ok(sent) => sent.map_err(|_| ServiceError::QueueClosed),
            Err(_) => {
                warn!(queue = index, timeout = ?limit, "Worker queue full, dropping request");
                self.metrics.queue_timeout();
                counter!("neptune.errors.queue_timeout").increment(1);
                Err(ServiceError::QueueTimeout)
            }
        }
    }

    /// Signal the workers to exit once their queues are empty
    pub fn signal_shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Signal the workers to exit and wait for them to drain their queues
    ///
    /// Must not be awaited from inside a handler.
    pub async fn shutdown(&self) {
        self.signal_shutdown();
        let workers = {
            let mut guard = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *guard)
        };

        for (index, handle) in workers.into_iter().enumerate() {
            match tokio::time::timeout(WORKER_DRAIN_TIMEOUT, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) if e.is_panic() => {
                    error!(
                        worker = index,
                        panic = panic_message(e.into_panic().as_ref()),
                        "Worker panicked"
                    );
                }
                Ok(Err(_)) => debug!(worker = index, "Worker cancelled"),
                Err(_) => warn!(worker = index, "Worker did not drain in time"),
            }
        }
        info!("Worker pool stopped");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<_> = self.handlers.keys().copied().collect();
        ids.sort_unstable();
        f.debug_struct("Router")
            .field("config", &self.config)
            .field("handlers", &ids)
            .field("started", &self.is_started())
            .finish()
    }
}
