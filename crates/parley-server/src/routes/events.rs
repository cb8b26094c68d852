//! Event intake endpoint.
//!
//! Stands in for the message bus: each posted payload is wrapped in a
//! [`ConversationEvent`] for the path's conversation and handed to every
//! enabled plugin in order.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};

use parley_core::dispatch_raw;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventAccepted {
    pub conversation_id: String,
    pub plugins: usize,
}

/// Dispatch one event payload.
/// POST /v1/conversations/:conversation_id/events
///
/// The body is the payload, tagged by `type`. Every plugin sees the event
/// even when an earlier one fails; the first failure is returned.
pub async fn post_event(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    Json(payload): Json<Value>,
) -> ApiResult<(StatusCode, Json<EventAccepted>)> {
    if payload.get("type").and_then(Value::as_str).is_none() {
        return Err(ApiError::bad_request("event payload must carry a string `type`"));
    }

    let data = serde_json::to_vec(&json!({
        "conversationId": conversation_id,
        "payload": payload,
    }))
    .map_err(|e| ApiError::internal(e.to_string()))?;

    let mut first_error = None;
    for plugin in state.plugins() {
        if let Err(e) = dispatch_raw(plugin.as_ref(), &data).await {
            // Conversation-scoped failures drop one event; anything else
            // points at the deployment.
            if e.is_conversation_scoped() {
                tracing::warn!(
                    plugin = plugin.name(),
                    conversation_id = %conversation_id,
                    code = e.code().as_str(),
                    error = %e,
                    "Plugin dropped event"
                );
            } else {
                tracing::error!(
                    plugin = plugin.name(),
                    conversation_id = %conversation_id,
                    code = e.code().as_str(),
                    error = %e,
                    "Plugin failed to handle event"
                );
            }
            first_error.get_or_insert(e);
        }
    }

    if let Some(e) = first_error {
        return Err(e.into());
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(EventAccepted {
            conversation_id,
            plugins: state.plugins().len(),
        }),
    ))
}
