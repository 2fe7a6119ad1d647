//! Per-message retry and provider failover.
//!
//! Providers are tried in registry order. Each provider gets up to
//! `attempts_per_provider` transport calls; a failed call is followed by a
//! fixed pause before the next call, on the same provider or the next one.
//! The first success ends delivery.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::error::DeliveryError;
use crate::message::Message;
use crate::provider::ProviderRegistry;
use crate::transport::Transport;

/// Retry bound and backoff applied to every provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts_per_provider: u32,
    /// Fixed pause after a failed attempt; does not grow.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts_per_provider: 3,
            backoff: Duration::from_secs(2),
        }
    }
}

/// Successful delivery summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub provider: String,
    /// Transport calls made for this message, including the successful one.
    pub attempts: u32,
}

/// Runs the retry/failover algorithm for one message at a time.
#[derive(Clone)]
pub struct FailoverEngine {
    registry: Arc<ProviderRegistry>,
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
}

impl FailoverEngine {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        transport: Arc<dyn Transport>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            registry,
            transport,
            policy,
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Deliver `message`, trying every provider before giving up.
    ///
    /// Makes at most `providers * attempts_per_provider` transport calls.
    pub async fn deliver(&self, message: &Message) -> Result<DeliveryReport, DeliveryError> {
        let mut calls: u32 = 0;
        // Set after a failed call; the pause is taken only if another call follows.
        let mut backoff_due = false;

        for provider in self.registry.iter() {
            let prepared = match message.prepare(&provider.default_sender) {
                Ok(prepared) => prepared,
                Err(e) => {
                    // Sender is resolved per provider, so only this provider is skipped.
                    warn!(
                        message_id = message.id,
                        recipient = %message.recipient,
                        provider = %provider.name,
                        error = %e,
                        "delivery_provider_skipped"
                    );
                    continue;
                }
            };

            for attempt in 1..=self.policy.attempts_per_provider {
                if backoff_due {
                    sleep(self.policy.backoff).await;
                }
                calls += 1;
                info!(
                    message_id = message.id,
                    recipient = %message.recipient,
                    provider = %provider.name,
                    endpoint = %provider.endpoint(),
                    attempt = attempt,
                    "delivery_attempt"
                );

                match self.transport.send(provider, &prepared).await {
                    Ok(()) => {
                        info!(
                            message_id = message.id,
                            recipient = %message.recipient,
                            provider = %provider.name,
                            attempt = attempt,
                            total_attempts = calls,
                            "delivery_succeeded"
                        );
                        return Ok(DeliveryReport {
                            provider: provider.name.clone(),
                            attempts: calls,
                        });
                    }
                    Err(e) => {
                        warn!(
                            message_id = message.id,
                            recipient = %message.recipient,
                            provider = %provider.name,
                            attempt = attempt,
                            error = %e,
                            "delivery_attempt_failed"
                        );
                        backoff_due = true;
                    }
                }
            }

            info!(
                message_id = message.id,
                provider = %provider.name,
                attempts = self.policy.attempts_per_provider,
                "delivery_provider_exhausted"
            );
        }

        debug_assert!(
            calls <= (self.registry.len() as u32).saturating_mul(self.policy.attempts_per_provider)
        );

        let err = DeliveryError::AllProvidersExhausted {
            providers: self.registry.len(),
            attempts: calls,
        };
        error!(
            message_id = message.id,
            recipient = %message.recipient,
            providers = self.registry.len(),
            attempts = calls,
            error = %err,
            "delivery_exhausted"
        );
        Err(err)
    }
}
