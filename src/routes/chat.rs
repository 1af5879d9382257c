//! Chat turn relay.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::error;

use super::json_or_default;
use crate::AppState;

/// Request body for `POST /api/chat`.
#[derive(Default, Deserialize)]
pub struct ChatRequest {
    pub message: Option<String>,
}

/// Response body for `POST /api/chat`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub response: String,
    /// Fetch URL of the synthesized reply, `null` when synthesis was skipped
    /// or failed.
    pub audio_url: Option<String>,
}

/// `POST /api/chat`: forward a message to the gateway session.
///
/// Synthesis is best-effort and never fails the call.
///
/// # Errors
///
/// - `400 Bad Request`: `message` missing or blank, or the body is not a
///   JSON object
/// - `500` (or the upstream's error status): gateway failure
pub async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, (StatusCode, Json<Value>)> {
    let payload: ChatRequest = json_or_default(payload);
    // Blank messages are refused; accepted ones are forwarded untrimmed.
    let message = match payload.message.as_deref() {
        Some(m) if !m.trim().is_empty() => m,
        _ => {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "No message provided"})),
            ));
        }
    };

    match state.relay.chat(message).await {
        Ok(reply) => Ok(Json(ChatResponse {
            response: reply.response,
            audio_url: reply.audio_url,
        })),
        Err(e) => {
            error!("Gateway call failed: {e}");
            let status = StatusCode::from_u16(e.client_status())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            Err((
                status,
                Json(json!({"error": "Failed to get response from gateway"})),
            ))
        }
    }
}
