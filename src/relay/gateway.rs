//! Chat gateway client.
//!
//! Every turn goes to the same session:
//! `POST {url}/api/sessions/{session}/send` with `{"message": "..."}`. The
//! gateway answers with a JSON object whose reply text is read from the first
//! string field among `reply`, `response`, `text`.

use std::time::Duration;

use serde_json::{json, Value};
use tracing::debug;

use super::upstream::{http_client, UpstreamError};
use crate::config::GatewayConfig;

const REPLY_FIELDS: [&str; 3] = ["reply", "response", "text"];

pub struct GatewayClient {
    http: reqwest::Client,
    send_url: String,
    token: Option<String>,
}

impl GatewayClient {
    pub fn new(config: &GatewayConfig) -> Self {
        let base = config.url.trim_end_matches('/');
        Self {
            http: http_client(Duration::from_secs(config.timeout_secs)),
            send_url: format!("{base}/api/sessions/{}/send", config.session),
            token: config.token.clone(),
        }
    }

    /// Forward `message` and return the reply text (possibly empty).
    pub async fn send(&self, message: &str) -> Result<String, UpstreamError> {
        debug!(url = %self.send_url, len = message.len(), "forwarding chat turn");

        let mut req = self.http.post(&self.send_url).json(&json!({ "message": message }));
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        let resp = req.send().await?;

        if !resp.status().is_success() {
            return Err(UpstreamError::from_response(resp).await);
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| UpstreamError::Protocol(format!("Invalid JSON from gateway: {e}")))?;
        extract_reply(&body)
            .ok_or_else(|| UpstreamError::Protocol("gateway response has no reply text".into()))
    }
}

fn extract_reply(body: &Value) -> Option<String> {
    REPLY_FIELDS
        .iter()
        .find_map(|field| body[*field].as_str())
        .map(|s| s.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_field_precedence() {
        assert_eq!(
            extract_reply(&json!({"text": "t", "reply": "r"})).as_deref(),
            Some("r")
        );
        assert_eq!(extract_reply(&json!({"response": " hi "})).as_deref(), Some("hi"));
        assert_eq!(extract_reply(&json!({"reply": 3})), None);
    }

    #[test]
    fn send_url_is_session_scoped() {
        let client = GatewayClient::new(&GatewayConfig {
            url: "http://gw.local:18789/".to_string(),
            session: "main".to_string(),
            token: None,
            timeout_secs: 5,
        });
        assert_eq!(client.send_url, "http://gw.local:18789/api/sessions/main/send");
    }
}
