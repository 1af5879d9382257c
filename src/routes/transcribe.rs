//! Audio upload transcription.

use axum::{
    extract::{multipart::Field, Multipart, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use tracing::{error, info};

use crate::relay::upload::{SpoolError, TempUpload};
use crate::AppState;

/// Multipart field carrying the recording.
pub const AUDIO_FIELD: &str = "audio";

type ApiError = (StatusCode, Json<Value>);

/// `POST /api/transcribe`: multipart upload with an `audio` file field.
///
/// # Errors
///
/// - `400 Bad Request`: no `audio` field, empty file, or malformed multipart
/// - `413 Payload Too Large`: file exceeds `relay.max_upload_bytes`
/// - `500` (or the upstream's error status): transcription API failure
pub async fn transcribe(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let mut upload: Option<TempUpload> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": format!("Malformed upload: {e}")})),
        )
    })? {
        if upload.is_none() && field.name() == Some(AUDIO_FIELD) {
            upload = Some(spool(&state, field).await?);
        }
    }

    let upload = match upload {
        Some(u) if !u.is_empty() => u,
        _ => {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "No audio file provided"})),
            ));
        }
    };

    let bytes = upload.len();
    match state.relay.transcribe(upload).await {
        Ok(text) => {
            info!(bytes, chars = text.len(), "transcribed upload");
            Ok(Json(json!({ "text": text })))
        }
        Err(e) => {
            error!("Transcription failed: {e}");
            let status = StatusCode::from_u16(e.client_status())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            Err((status, Json(json!({"error": "Transcription failed"}))))
        }
    }
}

/// Write one multipart field to a [`TempUpload`], enforcing the size cap.
async fn spool(state: &AppState, mut field: Field<'_>) -> Result<TempUpload, ApiError> {
    let file_name = field.file_name().unwrap_or("recording.webm").to_string();
    let content_type = field
        .content_type()
        .unwrap_or("application/octet-stream")
        .to_string();

    let mut writer = state
        .relay
        .begin_upload(&file_name, &content_type)
        .await
        .map_err(spool_error)?;
    loop {
        match field.chunk().await {
            Ok(Some(chunk)) => writer.write(&chunk).await.map_err(spool_error)?,
            Ok(None) => break,
            Err(e) => return Err(spool_error(SpoolError::Body(e.to_string()))),
        }
    }
    writer.finish().await.map_err(spool_error)
}

fn spool_error(e: SpoolError) -> ApiError {
    let status = match e {
        SpoolError::TooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
        SpoolError::Body(_) => StatusCode::BAD_REQUEST,
        SpoolError::Io(_) => {
            error!("{e}");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(json!({"error": e.to_string()})))
}
