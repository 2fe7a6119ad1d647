//! Asynchronous dispatch engine.
//!
//! ```text
//! DispatchHandle::submit → validate → DispatchQueue → DeliveryWorker
//!                                                      → RateGate → FailoverEngine → Transport
//! ```
//!
//! Acceptance only guarantees that a message was queued. Delivery outcomes
//! are reported through logs.

pub mod failover;
pub mod queue;
pub mod rate_limit;
pub mod worker;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::DispatchError;
use crate::message::{EmailRequest, Message};
use crate::provider::ProviderRegistry;
use crate::transport::Transport;

pub use failover::{DeliveryReport, FailoverEngine, RetryPolicy};
pub use queue::{DispatchQueue, QueueReceiver, DEFAULT_QUEUE_CAPACITY};
pub use rate_limit::{RateGate, DEFAULT_RATE_INTERVAL};
pub use worker::{DeliveryWorker, WorkerState, WorkerStats};

/// Tunables for the dispatch engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSettings {
    pub queue_capacity: usize,
    pub rate_interval: Duration,
    pub retry: RetryPolicy,
    /// How long `stop` waits for an in-flight delivery.
    pub shutdown_grace: Duration,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            rate_interval: DEFAULT_RATE_INTERVAL,
            retry: RetryPolicy::default(),
            shutdown_grace: Duration::from_secs(10),
        }
    }
}

/// Cloneable acceptance boundary handed to request handlers.
#[derive(Debug, Clone)]
pub struct DispatchHandle {
    queue: DispatchQueue,
    next_id: Arc<AtomicU64>,
}

impl DispatchHandle {
    /// Validate and enqueue a request. Returns the assigned message id.
    ///
    /// Never waits: a full queue is reported as [`DispatchError::QueueFull`].
    pub fn submit(&self, request: EmailRequest) -> Result<u64, DispatchError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let message = Message::from_request(id, request)?;
        let recipient = message.recipient.clone();

        self.queue.enqueue(message)?;

        info!(
            message_id = id,
            recipient = %recipient,
            queue_len = self.queue.len(),
            "message_enqueued"
        );
        Ok(id)
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue.capacity()
    }
}

/// Owns the queue, the worker and its lifecycle.
pub struct Dispatcher {
    handle: DispatchHandle,
    pending: Option<DeliveryWorker>,
    running: Option<JoinHandle<WorkerStats>>,
    shutdown: CancellationToken,
    grace: Duration,
}

impl Dispatcher {
    /// Build the engine. Nothing runs until [`Dispatcher::start`].
    pub fn new(
        settings: DispatchSettings,
        registry: ProviderRegistry,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let (queue, receiver) = queue::bounded(settings.queue_capacity);
        let engine = FailoverEngine::new(Arc::new(registry), transport, settings.retry);
        let shutdown = CancellationToken::new();
        let worker = DeliveryWorker::new(
            receiver,
            engine,
            settings.rate_interval,
            shutdown.child_token(),
        );

        Self {
            handle: DispatchHandle {
                queue,
                next_id: Arc::new(AtomicU64::new(0)),
            },
            pending: Some(worker),
            running: None,
            shutdown,
            grace: settings.shutdown_grace,
        }
    }

    pub fn handle(&self) -> DispatchHandle {
        self.handle.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Spawn the delivery worker. Must be called from within a tokio runtime.
    pub fn start(&mut self) -> Result<(), DispatchError> {
        let worker = self.pending.take().ok_or(DispatchError::AlreadyStarted)?;
        self.running = Some(tokio::spawn(worker.run()));
        info!("dispatcher_started");
        Ok(())
    }

    /// Signal the worker to stop and wait for it.
    ///
    /// An in-flight delivery may finish within the grace period; after that
    /// the worker task is aborted. Returns the worker's counters when it
    /// exited on its own.
    pub async fn stop(&mut self) -> Option<WorkerStats> {
        info!(queue_len = self.handle.queue_len(), "dispatcher_stopping");
        self.shutdown.cancel();

        // Never started: dropping the worker closes the queue.
        self.pending.take();

        let mut handle = self.running.take()?;
        match timeout(self.grace, &mut handle).await {
            Ok(Ok(stats)) => Some(stats),
            Ok(Err(e)) => {
                error!(error = %e, "dispatcher_worker_failed");
                None
            }
            Err(_) => {
                warn!(
                    grace_ms = self.grace.as_millis() as u64,
                    "dispatcher_worker_aborted"
                );
                handle.abort();
                let _ = handle.await;
                None
            }
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
