//! Error types shared across the relay.
//!
//! Acceptance errors (`DispatchError`) surface synchronously to the HTTP caller.
//! Delivery errors (`TransportError`, `DeliveryError`) never leave the worker;
//! they are only logged.

use thiserror::Error;

/// Startup configuration failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable {0} is not set")]
    MissingVar(String),

    #[error("environment variable {name} has invalid value {value:?}")]
    InvalidVar { name: String, value: String },

    #[error("no SMTP providers configured")]
    NoProviders,

    #[error("provider {provider} is missing its {field}")]
    MissingCredential { provider: String, field: &'static str },
}

/// Outcome of handing a message to the dispatcher that was not an acceptance.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("invalid {field} address: {value:?}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("dispatch queue is full")]
    QueueFull,

    #[error("dispatcher is not running")]
    Stopped,

    #[error("dispatcher already started")]
    AlreadyStarted,
}

/// A single failed transport call.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error(transparent)]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("{0}")]
    Rejected(String),
}

/// Failures inside the retry/failover engine.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("invalid sender address: {0:?}")]
    InvalidSender(String),

    #[error("invalid recipient address: {0:?}")]
    InvalidRecipient(String),

    #[error("all {providers} providers exhausted after {attempts} attempts")]
    AllProvidersExhausted { providers: usize, attempts: u32 },
}
