//! Mail submission transport.
//!
//! The [`Transport`] trait is the seam between the failover engine and the
//! network: production uses [`SmtpTransport`] (lettre, PLAIN auth), tests use
//! an in-memory double.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use lettre::transport::smtp::authentication::{Credentials, Mechanism};
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use tracing::debug;

use crate::error::TransportError;
use crate::message::PreparedMessage;
use crate::provider::{Provider, ProviderRegistry, TlsMode};

/// Performs exactly one delivery attempt against one provider.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, provider: &Provider, message: &PreparedMessage)
        -> Result<(), TransportError>;
}

type SmtpClient = AsyncSmtpTransport<Tokio1Executor>;

/// lettre-backed SMTP transport with one client per provider.
pub struct SmtpTransport {
    clients: HashMap<String, SmtpClient>,
    timeout: Duration,
}

impl SmtpTransport {
    /// Build a client for every provider in the registry.
    pub fn new(registry: &ProviderRegistry, timeout: Duration) -> Result<Self, TransportError> {
        let mut clients = HashMap::with_capacity(registry.len());
        for provider in registry.iter() {
            clients.insert(provider.name.clone(), build_client(provider, timeout)?);
        }
        Ok(Self { clients, timeout })
    }
}

fn build_client(provider: &Provider, timeout: Duration) -> Result<SmtpClient, TransportError> {
    let builder = match provider.tls {
        TlsMode::StartTls => SmtpClient::starttls_relay(&provider.host)?,
        TlsMode::Implicit => SmtpClient::relay(&provider.host)?,
        TlsMode::None => SmtpClient::builder_dangerous(&provider.host),
    };

    Ok(builder
        .port(provider.port)
        .credentials(Credentials::new(
            provider.username.clone(),
            provider.password.clone(),
        ))
        .authentication(vec![Mechanism::Plain])
        .timeout(Some(timeout))
        .build())
}

#[async_trait]
impl Transport for SmtpTransport {
    async fn send(
        &self,
        provider: &Provider,
        message: &PreparedMessage,
    ) -> Result<(), TransportError> {
        let response = match self.clients.get(&provider.name) {
            Some(client) => client.send_raw(&message.envelope, &message.raw).await?,
            None => {
                build_client(provider, self.timeout)?
                    .send_raw(&message.envelope, &message.raw)
                    .await?
            }
        };

        debug!(
            provider = %provider.name,
            code = %response.code(),
            "smtp_response"
        );
        Ok(())
    }
}
