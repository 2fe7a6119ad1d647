//! Endpoint handlers.
//!
//! `send_email` never talks to SMTP. It only:
//! 1. Validates the addresses
//! 2. Enqueues the message
//! 3. Returns immediately
//!
//! Authentication runs earlier in [`super::auth::require_api_key`].

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::dispatch::DispatchHandle;
use crate::error::DispatchError;
use crate::message::EmailRequest;
use crate::Config;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub dispatcher: DispatchHandle,
}

impl AppState {
    pub fn new(config: Config, dispatcher: DispatchHandle) -> Self {
        Self {
            config: Arc::new(config),
            dispatcher,
        }
    }
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// =============================================================================
// Send Email
// =============================================================================

/// Send endpoint response.
#[derive(Debug, Serialize)]
pub struct SendResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SendResponse {
    pub fn status(status: &'static str) -> Self {
        Self {
            status,
            message_id: None,
            error: None,
        }
    }
}

/// Accept a message for asynchronous delivery.
///
/// 202 means queued, not delivered.
pub async fn send_email(
    State(state): State<AppState>,
    Json(request): Json<EmailRequest>,
) -> Response {
    info!(
        to = %request.to,
        has_from = !request.from.trim().is_empty(),
        subject_length = request.subject.len(),
        body_length = request.body.len(),
        "send_email_received"
    );

    match state.dispatcher.submit(request) {
        Ok(message_id) => (
            StatusCode::ACCEPTED,
            Json(SendResponse {
                status: "queued",
                message_id: Some(message_id),
                error: None,
            }),
        )
            .into_response(),
        Err(err @ DispatchError::InvalidAddress { .. }) => {
            warn!(error = %err, "send_email_invalid_address");
            (
                StatusCode::BAD_REQUEST,
                Json(SendResponse {
                    error: Some(err.to_string()),
                    ..SendResponse::status("invalid_address")
                }),
            )
                .into_response()
        }
        Err(DispatchError::QueueFull) => {
            warn!(
                capacity = state.dispatcher.queue_capacity(),
                "send_email_queue_full"
            );
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [(header::RETRY_AFTER, "1")],
                Json(SendResponse::status("queue_full")),
            )
                .into_response()
        }
        Err(err) => {
            warn!(error = %err, "send_email_unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(SendResponse::status("unavailable")),
            )
                .into_response()
        }
    }
}
