//! Upstream SMTP providers in failover order.

use std::fmt;

use tracing::warn;

use crate::error::ConfigError;
use crate::message::validate_address;

/// How the connection to a provider is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsMode {
    /// Plain connection upgraded with STARTTLS (submission port 587).
    StartTls,
    /// TLS from the first byte (port 465).
    Implicit,
    /// No encryption. Only useful against local test servers.
    None,
}

impl TlsMode {
    /// Default mode for a port when none is configured.
    pub fn for_port(port: u16) -> Self {
        if port == 465 {
            TlsMode::Implicit
        } else {
            TlsMode::StartTls
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "starttls" => Some(TlsMode::StartTls),
            "tls" | "implicit" => Some(TlsMode::Implicit),
            "none" | "plain" => Some(TlsMode::None),
            _ => None,
        }
    }
}

/// One upstream delivery endpoint with its own credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Provider {
    /// Label used in logs.
    pub name: String,
    pub host: String,
    pub port: u16,
    pub tls: TlsMode,
    pub username: String,
    pub password: String,
    /// Sender identity used when a message has no explicit sender.
    pub default_sender: String,
}

impl Provider {
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// Keep the password out of logs.
impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("name", &self.name)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("tls", &self.tls)
            .field("username", &self.username)
            .field("default_sender", &self.default_sender)
            .finish_non_exhaustive()
    }
}

/// Ordered, non-empty provider list. Read-only after construction.
#[derive(Debug, Clone)]
pub struct ProviderRegistry {
    providers: Vec<Provider>,
}

impl ProviderRegistry {
    /// Build the registry, rejecting an empty list or missing credentials.
    pub fn new(providers: Vec<Provider>) -> Result<Self, ConfigError> {
        if providers.is_empty() {
            return Err(ConfigError::NoProviders);
        }

        for provider in &providers {
            let missing = if provider.host.trim().is_empty() {
                Some("host")
            } else if provider.username.trim().is_empty() {
                Some("username")
            } else if provider.password.is_empty() {
                Some("password")
            } else {
                None
            };

            if let Some(field) = missing {
                return Err(ConfigError::MissingCredential {
                    provider: provider.name.clone(),
                    field,
                });
            }

            // Not fatal: only messages without an explicit sender are affected.
            if !validate_address(&provider.default_sender) {
                warn!(
                    provider = %provider.name,
                    default_sender = %provider.default_sender,
                    "provider_default_sender_invalid"
                );
            }
        }

        Ok(Self { providers })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Provider> {
        self.providers.iter()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[cfg(test)]
pub(crate) fn test_provider(name: &str) -> Provider {
    Provider {
        name: name.to_string(),
        host: format!("{}.example.com", name),
        port: 587,
        tls: TlsMode::StartTls,
        username: format!("user@{}.example.com", name),
        password: "secret".to_string(),
        default_sender: format!("noreply@{}.example.com", name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_rejects_empty() {
        assert!(matches!(
            ProviderRegistry::new(vec![]),
            Err(ConfigError::NoProviders)
        ));
    }

    #[test]
    fn test_registry_rejects_missing_password() {
        let mut provider = test_provider("primary");
        provider.password = String::new();

        let err = ProviderRegistry::new(vec![test_provider("ok"), provider]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingCredential { ref provider, field: "password" } if provider == "primary"
        ));
    }

    #[test]
    fn test_registry_preserves_order() {
        let registry = ProviderRegistry::new(vec![
            test_provider("first"),
            test_provider("second"),
            test_provider("third"),
        ])
        .unwrap();

        let names: Vec<&str> = registry.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second", "third"]);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_tls_mode_parse() {
        assert_eq!(TlsMode::parse("STARTTLS"), Some(TlsMode::StartTls));
        assert_eq!(TlsMode::parse("tls"), Some(TlsMode::Implicit));
        assert_eq!(TlsMode::parse("none"), Some(TlsMode::None));
        assert_eq!(TlsMode::parse("ssl3"), None);
        assert_eq!(TlsMode::for_port(465), TlsMode::Implicit);
        assert_eq!(TlsMode::for_port(587), TlsMode::StartTls);
    }

    #[test]
    fn test_debug_hides_password() {
        let rendered = format!("{:?}", test_provider("primary"));
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("primary.example.com"));
    }
}
