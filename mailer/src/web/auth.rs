//! API key check for the send endpoint.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use tracing::warn;

use super::handlers::{AppState, SendResponse};

/// Header carrying the shared API key. Lowercase so it can be used with
/// `HeaderName::from_static`.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Reject requests whose `X-API-KEY` does not match the configured key.
pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let matches = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|key| constant_time_compare(key, &state.config.api_key));

    match matches {
        Some(true) => next.run(request).await,
        Some(false) => {
            warn!(path = %request.uri().path(), "api_key_invalid");
            unauthorized()
        }
        None => {
            warn!(path = %request.uri().path(), "api_key_missing");
            unauthorized()
        }
    }
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(SendResponse::status("unauthorized")),
    )
        .into_response()
}

/// Constant-time string comparison to prevent timing attacks.
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}
