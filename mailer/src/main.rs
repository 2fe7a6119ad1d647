//! Mailer - HTTP front end plus background SMTP delivery worker.
//!
//! Accepts send requests on `/send-email`, queues them, and delivers them
//! through the configured SMTP providers at a fixed rate.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mailer::{web, AppState, Config, Dispatcher, SmtpTransport};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("mailer_starting");

    // Load configuration from environment
    let config = Config::from_env().context("Failed to load configuration")?;
    info!(
        port = config.port,
        providers = config.providers.len(),
        queue_capacity = config.queue_capacity,
        rate_interval_ms = config.rate_interval_ms,
        max_attempts_per_provider = config.max_attempts_per_provider,
        retry_backoff_ms = config.retry_backoff_ms,
        cors_restricted = config.cors_allowed_origins.is_some(),
        "config_loaded"
    );

    let registry = config
        .provider_registry()
        .context("Invalid provider configuration")?;
    for provider in registry.iter() {
        info!(
            provider = %provider.name,
            endpoint = %provider.endpoint(),
            tls = ?provider.tls,
            "provider_registered"
        );
    }

    let transport = SmtpTransport::new(&registry, config.send_timeout())
        .context("Failed to build SMTP transport")?;

    // Start the delivery worker
    let mut dispatcher = Dispatcher::new(config.dispatch_settings(), registry, Arc::new(transport));
    dispatcher.start().context("Failed to start dispatcher")?;

    let state = AppState::new(config.clone(), dispatcher.handle());
    let app = web::router(state);

    // Bind to address
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "web_server_listening");

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Let the worker finish its in-flight delivery
    let stats = dispatcher.stop().await;
    info!(stats = ?stats, "mailer_shutdown_complete");

    Ok(())
}

/// Create a future that completes when a shutdown signal is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    info!("web_server_shutting_down");
}
