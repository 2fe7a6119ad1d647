//! The single background delivery worker.
//!
//! ```text
//! Idle --dequeue--> RateGated --admit--> Delivering --done--> Idle
//! ```
//!
//! A failed message is logged and the loop moves on; only cancellation or a
//! closed queue ends it.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::failover::FailoverEngine;
use super::queue::QueueReceiver;
use super::rate_limit::RateGate;

/// Where the worker currently is in its loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    RateGated,
    Delivering,
}

impl WorkerState {
    fn as_str(self) -> &'static str {
        match self {
            WorkerState::Idle => "idle",
            WorkerState::RateGated => "rate_gated",
            WorkerState::Delivering => "delivering",
        }
    }
}

/// Counters reported when the worker exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub delivered: u64,
    pub failed: u64,
    /// Messages still queued (or dequeued but not yet admitted) at shutdown.
    pub dropped: u64,
}

pub struct DeliveryWorker {
    receiver: QueueReceiver,
    engine: FailoverEngine,
    rate_interval: Duration,
    shutdown: CancellationToken,
}

impl DeliveryWorker {
    pub fn new(
        receiver: QueueReceiver,
        engine: FailoverEngine,
        rate_interval: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            receiver,
            engine,
            rate_interval,
            shutdown,
        }
    }

    /// Drain the queue until shutdown.
    ///
    /// Cancellation is observed while idle or rate-gated. An in-flight
    /// delivery is left to finish; the owner decides whether to abort it.
    pub async fn run(mut self) -> WorkerStats {
        // Built here so the gate's clock starts inside the runtime.
        let mut gate = RateGate::new(self.rate_interval);
        let mut stats = WorkerStats::default();
        let mut state = WorkerState::Idle;

        info!(
            rate_interval_ms = gate.period().as_millis() as u64,
            attempts_per_provider = self.engine.policy().attempts_per_provider,
            backoff_ms = self.engine.policy().backoff.as_millis() as u64,
            "worker_started"
        );

        loop {
            debug!(state = state.as_str(), "worker_state");

            let message = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                next = self.receiver.dequeue() => match next {
                    Some(message) => message,
                    None => {
                        warn!("worker_queue_closed");
                        break;
                    }
                },
            };

            state = WorkerState::RateGated;
            debug!(state = state.as_str(), message_id = message.id, "worker_state");

            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    stats.dropped += 1;
                    break;
                }
                _ = gate.admit() => {}
            }

            state = WorkerState::Delivering;
            debug!(state = state.as_str(), message_id = message.id, "worker_state");

            match self.engine.deliver(&message).await {
                Ok(_) => stats.delivered += 1,
                Err(_) => stats.failed += 1,
            }
            // Space the next message from this one's last attempt.
            gate.reset();

            state = WorkerState::Idle;
        }

        stats.dropped += self.receiver.close_and_drain() as u64;

        info!(
            delivered = stats.delivered,
            failed = stats.failed,
            dropped = stats.dropped,
            "worker_stopped"
        );

        stats
    }
}
