//! Synthesized audio retrieval.

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::AppState;

/// `GET /api/audio/{filename}`: bytes of a synthesized reply.
///
/// The file is deleted a short grace delay after it is read, whether or not
/// the response reaches the client.
///
/// # Errors
///
/// - `404 Not Found`: unknown name, or already deleted
pub async fn get_audio(State(state): State<AppState>, Path(filename): Path<String>) -> Response {
    match state.relay.take_audio(&filename).await {
        Some(audio) => (
            [
                (header::CONTENT_TYPE, audio.content_type),
                (header::CACHE_CONTROL, "no-store"),
            ],
            audio.bytes,
        )
            .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "Audio not found"})),
        )
            .into_response(),
    }
}
