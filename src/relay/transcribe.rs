//! Speech-to-text client (OpenAI-compatible `/audio/transcriptions`).

use std::time::Duration;

use reqwest::multipart;
use serde_json::Value;
use tokio_util::io::ReaderStream;
use tracing::debug;

use super::upload::TempUpload;
use super::upstream::{http_client, UpstreamError};
use crate::config::TranscriptionConfig;

pub struct Transcriber {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl Transcriber {
    pub fn new(config: &TranscriptionConfig) -> Self {
        Self {
            http: http_client(Duration::from_secs(120)),
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        }
    }

    /// Stream a spooled upload with its declared content type and return the
    /// transcribed text.
    pub async fn transcribe(&self, upload: &TempUpload) -> Result<String, UpstreamError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(UpstreamError::NotConfigured("Transcription API key"))?;

        debug!(
            bytes = upload.len(),
            content_type = upload.content_type(),
            "sending audio for transcription"
        );

        let file = tokio::fs::File::open(upload.path()).await?;
        let body = reqwest::Body::wrap_stream(ReaderStream::new(file));
        let file_part = multipart::Part::stream_with_length(body, upload.len())
            .file_name(upload.file_name().to_string())
            .mime_str(upload.content_type())?;
        let form = multipart::Form::new()
            .text("model", self.model.clone())
            .part("file", file_part);

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .multipart(form)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(UpstreamError::from_response(resp).await);
        }

        let body: Value = resp.json().await.map_err(|e| {
            UpstreamError::Protocol(format!("Invalid JSON from transcription API: {e}"))
        })?;
        body["text"]
            .as_str()
            .map(|t| t.trim().to_string())
            .ok_or_else(|| UpstreamError::Protocol("transcription response has no text".into()))
    }
}
