//! Mailer - queue-backed email relay.
//!
//! Requests are accepted over HTTP, validated, and placed on a bounded
//! in-process queue. A single background worker drains the queue at a fixed
//! rate and delivers each message over SMTP, retrying and failing over across
//! the configured providers.
//!
//! ## Architecture
//!
//! ```text
//! POST /send-email → DispatchHandle → DispatchQueue → DeliveryWorker → RateGate → FailoverEngine → SMTP
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod message;
pub mod provider;
pub mod transport;
pub mod web;

// Re-export commonly used types
pub use config::Config;
pub use dispatch::{DispatchHandle, DispatchSettings, Dispatcher, RetryPolicy};
pub use error::{ConfigError, DeliveryError, DispatchError, TransportError};
pub use message::{validate_address, EmailRequest, Message};
pub use provider::{Provider, ProviderRegistry, TlsMode};
pub use transport::{SmtpTransport, Transport};
pub use web::AppState;
