//! Sample webhook receiver.
//!
//! Accepts the notifications the webhook sink sends and logs them. Useful
//! to check a sink configuration end to end without a real consumer.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use secrecy::ExposeSecret;
use serde_json::Value;

use parley_core::notify::SECRET_HEADER;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Reply sent for an accepted notification.
pub const RECEIVED: &str = "Conversation insights received";

/// Receive a teardown notification.
/// POST /v1/webhook/:conversation_id
///
/// When `PARLEY_RECEIVER_SECRET` is set the shared-secret header must match
/// it, ignoring case.
pub async fn receive_notification(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> ApiResult<(StatusCode, &'static str)> {
    if let Some(expected) = state.receiver_secret() {
        let presented = headers
            .get(SECRET_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !presented.eq_ignore_ascii_case(expected.expose_secret()) {
            tracing::warn!(conversation_id = %conversation_id, "Webhook secret mismatch");
            return Err(ApiError::bad_request("webhook secret mismatch"));
        }
    }

    let pretty = serde_json::to_string_pretty(&body).map_err(|e| ApiError::internal(e.to_string()))?;
    tracing::info!(conversation_id = %conversation_id, "Conversation insights received\n{}", pretty);

    Ok((StatusCode::OK, RECEIVED))
}
