//! Configuration module for environment variable parsing.
//!
//! Required variables fail startup; optional ones fall back to defaults with a
//! warning when they are present but malformed.

use std::env;
use std::time::Duration;

use tracing::warn;

use crate::dispatch::{DispatchSettings, RetryPolicy, DEFAULT_QUEUE_CAPACITY};
use crate::error::ConfigError;
use crate::provider::{Provider, ProviderRegistry, TlsMode};

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port for the web server to listen on
    pub port: u16,

    /// Expected value of the X-API-KEY header
    pub api_key: String,

    /// Upstream SMTP providers in failover order
    pub providers: Vec<Provider>,

    /// Maximum number of queued messages
    pub queue_capacity: usize,

    /// Minimum spacing between delivery attempts across all messages
    pub rate_interval_ms: u64,

    /// Transport calls per provider before failing over
    pub max_attempts_per_provider: u32,

    /// Fixed pause between attempts on the same provider
    pub retry_backoff_ms: u64,

    /// Timeout for a single SMTP transaction
    pub send_timeout_ms: u64,

    /// How long shutdown waits for an in-flight delivery
    pub shutdown_grace_ms: u64,

    /// Allowed CORS origins; `None` allows any origin
    pub cors_allowed_origins: Option<Vec<String>>,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars { lookup: &lookup };

        Ok(Config {
            port: vars.parsed_or("PORT", 8080),
            api_key: vars.required("API_KEY")?,
            providers: load_providers(&vars)?,
            queue_capacity: vars.positive_or("QUEUE_CAPACITY", DEFAULT_QUEUE_CAPACITY),
            rate_interval_ms: vars.positive_or("RATE_LIMIT_INTERVAL_MS", 1000),
            max_attempts_per_provider: vars.positive_or("MAX_ATTEMPTS_PER_PROVIDER", 3),
            retry_backoff_ms: vars.parsed_or("RETRY_BACKOFF_MS", 2000),
            send_timeout_ms: vars.positive_or("SEND_TIMEOUT_MS", 30_000),
            shutdown_grace_ms: vars.parsed_or("SHUTDOWN_GRACE_MS", 10_000),
            cors_allowed_origins: vars.csv("CORS_ALLOWED_ORIGINS"),
        })
    }

    pub fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings {
            queue_capacity: self.queue_capacity,
            rate_interval: Duration::from_millis(self.rate_interval_ms),
            retry: RetryPolicy {
                attempts_per_provider: self.max_attempts_per_provider,
                backoff: Duration::from_millis(self.retry_backoff_ms),
            },
            shutdown_grace: Duration::from_millis(self.shutdown_grace_ms),
        }
    }

    pub fn provider_registry(&self) -> Result<ProviderRegistry, ConfigError> {
        ProviderRegistry::new(self.providers.clone())
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

struct Vars<'a> {
    lookup: &'a dyn Fn(&str) -> Option<String>,
}

impl Vars<'_> {
    /// Non-empty value or `None`.
    fn get(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.trim().is_empty())
    }

    fn first(&self, names: &[&str]) -> Option<String> {
        names.iter().find_map(|name| self.get(name))
    }

    fn required(&self, name: &str) -> Result<String, ConfigError> {
        self.get(name)
            .ok_or_else(|| ConfigError::MissingVar(name.to_string()))
    }

    fn parsed_or<T: std::str::FromStr>(&self, name: &str, default: T) -> T {
        match self.get(name) {
            None => default,
            Some(raw) => match raw.trim().parse() {
                Ok(v) => v,
                Err(_) => {
                    warn!(env_var = name, value = %raw, "Invalid value, using default");
                    default
                }
            },
        }
    }

    /// Like `parsed_or`, but zero also falls back to the default.
    fn positive_or<T>(&self, name: &str, default: T) -> T
    where
        T: std::str::FromStr + PartialEq + Default + Copy,
    {
        let value = self.parsed_or(name, default);
        if value == T::default() {
            warn!(env_var = name, "Zero is not allowed, using default");
            default
        } else {
            value
        }
    }

    fn csv(&self, name: &str) -> Option<Vec<String>> {
        self.get(name).map(|raw| {
            raw.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
    }
}

/// Read the primary provider and any numbered fallbacks (`SMTP_2_*`, `SMTP_3_*`, ...).
fn load_providers(vars: &Vars<'_>) -> Result<Vec<Provider>, ConfigError> {
    let mail_from = vars.get("MAIL_FROM");

    let host = vars.required("SMTP_HOST")?;
    let port = required_port(vars, "SMTP_PORT")?;
    let username = vars
        .first(&["GMAIL_ADDRESS", "SMTP_USERNAME"])
        .ok_or_else(|| ConfigError::MissingVar("GMAIL_ADDRESS".to_string()))?;
    let password = vars
        .first(&["GMAIL_APP_PASSWORD", "SMTP_PASSWORD"])
        .ok_or_else(|| ConfigError::MissingVar("GMAIL_APP_PASSWORD".to_string()))?;

    let mut providers = vec![Provider {
        name: "primary".to_string(),
        tls: tls_mode(vars, "SMTP_TLS", port)?,
        default_sender: mail_from.clone().unwrap_or_else(|| username.clone()),
        host,
        port,
        username,
        password,
    }];

    for n in 2.. {
        let prefix = format!("SMTP_{}", n);
        let Some(host) = vars.get(&format!("{}_HOST", prefix)) else {
            break;
        };
        let name = format!("smtp_{}", n);

        let port = required_port(vars, &format!("{}_PORT", prefix))?;
        let username = vars.get(&format!("{}_USERNAME", prefix)).ok_or_else(|| {
            ConfigError::MissingCredential {
                provider: name.clone(),
                field: "username",
            }
        })?;
        let password = vars.get(&format!("{}_PASSWORD", prefix)).ok_or_else(|| {
            ConfigError::MissingCredential {
                provider: name.clone(),
                field: "password",
            }
        })?;
        let default_sender = vars
            .get(&format!("{}_FROM", prefix))
            .or_else(|| mail_from.clone())
            .unwrap_or_else(|| username.clone());

        providers.push(Provider {
            tls: tls_mode(vars, &format!("{}_TLS", prefix), port)?,
            name,
            host,
            port,
            username,
            password,
            default_sender,
        });
    }

    Ok(providers)
}

fn required_port(vars: &Vars<'_>, name: &str) -> Result<u16, ConfigError> {
    let raw = vars.required(name)?;
    raw.trim().parse().map_err(|_| ConfigError::InvalidVar {
        name: name.to_string(),
        value: raw,
    })
}

fn tls_mode(vars: &Vars<'_>, name: &str, port: u16) -> Result<TlsMode, ConfigError> {
    match vars.get(name) {
        None => Ok(TlsMode::for_port(port)),
        Some(raw) => TlsMode::parse(&raw).ok_or(ConfigError::InvalidVar {
            name: name.to_string(),
            value: raw,
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    const BASE: &[(&str, &str)] = &[
        ("API_KEY", "key-123"),
        ("SMTP_HOST", "smtp.gmail.com"),
        ("SMTP_PORT", "587"),
        ("GMAIL_ADDRESS", "me@gmail.com"),
        ("GMAIL_APP_PASSWORD", "app-password"),
    ];

    fn with(extra: &[(&'static str, &'static str)]) -> Vec<(&'static str, &'static str)> {
        BASE.iter().chain(extra.iter()).copied().collect()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(BASE)).unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.api_key, "key-123");
        assert_eq!(config.queue_capacity, 100);

        let settings = config.dispatch_settings();
        assert_eq!(settings.rate_interval, Duration::from_secs(1));
        assert_eq!(settings.retry, RetryPolicy::default());
        assert_eq!(config.cors_allowed_origins, None);

        assert_eq!(config.providers.len(), 1);
        let primary = &config.providers[0];
        assert_eq!(primary.name, "primary");
        assert_eq!(primary.endpoint(), "smtp.gmail.com:587");
        assert_eq!(primary.tls, TlsMode::StartTls);
        assert_eq!(primary.default_sender, "me@gmail.com");
    }

    #[test]
    fn test_missing_required() {
        let vars: Vec<_> = BASE
            .iter()
            .copied()
            .filter(|(k, _)| *k != "GMAIL_APP_PASSWORD")
            .collect();
        let err = Config::from_lookup(lookup(&vars)).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar(ref v) if v == "GMAIL_APP_PASSWORD"));

        let vars: Vec<_> = BASE.iter().copied().filter(|(k, _)| *k != "API_KEY").collect();
        assert!(Config::from_lookup(lookup(&vars)).is_err());
    }

    #[test]
    fn test_invalid_port() {
        let vars: Vec<_> = BASE
            .iter()
            .copied()
            .map(|(k, v)| if k == "SMTP_PORT" { (k, "smtp") } else { (k, v) })
            .collect();
        let err = Config::from_lookup(lookup(&vars)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidVar { ref name, .. } if name == "SMTP_PORT"));
    }

    #[test]
    fn test_fallback_providers_in_order() {
        let config = Config::from_lookup(lookup(&with(&[
            ("MAIL_FROM", "relay@example.com"),
            ("SMTP_2_HOST", "smtp.backup.example"),
            ("SMTP_2_PORT", "465"),
            ("SMTP_2_USERNAME", "backup-user"),
            ("SMTP_2_PASSWORD", "backup-pass"),
            ("SMTP_3_HOST", "localhost"),
            ("SMTP_3_PORT", "2525"),
            ("SMTP_3_USERNAME", "local"),
            ("SMTP_3_PASSWORD", "local-pass"),
            ("SMTP_3_TLS", "none"),
            ("SMTP_3_FROM", "local@example.com"),
            // Gap: SMTP_4 missing, so SMTP_5 is never read.
            ("SMTP_5_HOST", "ignored.example"),
        ])))
        .unwrap();

        let names: Vec<&str> = config.providers.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["primary", "smtp_2", "smtp_3"]);

        assert_eq!(config.providers[0].default_sender, "relay@example.com");
        assert_eq!(config.providers[1].tls, TlsMode::Implicit);
        assert_eq!(config.providers[1].default_sender, "relay@example.com");
        assert_eq!(config.providers[2].tls, TlsMode::None);
        assert_eq!(config.providers[2].default_sender, "local@example.com");

        assert_eq!(config.provider_registry().unwrap().len(), 3);
    }

    #[test]
    fn test_fallback_provider_missing_password() {
        let err = Config::from_lookup(lookup(&with(&[
            ("SMTP_2_HOST", "smtp.backup.example"),
            ("SMTP_2_PORT", "587"),
            ("SMTP_2_USERNAME", "backup-user"),
        ])))
        .unwrap_err();

        assert!(matches!(
            err,
            ConfigError::MissingCredential { ref provider, field: "password" } if provider == "smtp_2"
        ));
    }

    #[test]
    fn test_malformed_optional_values_use_defaults() {
        let config = Config::from_lookup(lookup(&with(&[
            ("PORT", "not-a-port"),
            ("QUEUE_CAPACITY", "0"),
            ("RATE_LIMIT_INTERVAL_MS", "250"),
            ("RETRY_BACKOFF_MS", "-5"),
            ("CORS_ALLOWED_ORIGINS", "https://a.example, ,https://b.example"),
        ])))
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.queue_capacity, 100);
        assert_eq!(config.rate_interval_ms, 250);
        assert_eq!(config.retry_backoff_ms, 2000);
        assert_eq!(
            config.cors_allowed_origins,
            Some(vec![
                "https://a.example".to_string(),
                "https://b.example".to_string()
            ])
        );
    }

    #[test]
    fn test_username_alias() {
        let vars: Vec<_> = BASE
            .iter()
            .copied()
            .filter(|(k, _)| !k.starts_with("GMAIL_"))
            .chain([("SMTP_USERNAME", "user@example.com"), ("SMTP_PASSWORD", "pw")])
            .collect();
        let config = Config::from_lookup(lookup(&vars)).unwrap();
        assert_eq!(config.providers[0].username, "user@example.com");
        assert_eq!(config.providers[0].password, "pw");
    }
}
