//! Shared plumbing for calls to external HTTP services.

use std::fmt;
use std::time::Duration;

/// Build a `reqwest` client with the relay's connect/read timeouts.
pub fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Errors returned by the transcription, gateway and cloud synthesis clients.
#[derive(Debug)]
pub enum UpstreamError {
    /// No credential or endpoint configured for this service.
    NotConfigured(&'static str),
    /// HTTP transport error (connection refused, timeout, DNS failure, etc.).
    Request(reqwest::Error),
    /// The service answered with a non-2xx status.
    Status { status: u16, body: String },
    /// The response body did not have the expected shape.
    Protocol(String),
    /// Local I/O around the call (reading an upload, writing audio).
    Io(std::io::Error),
}

impl UpstreamError {
    /// Status to surface to the client: the upstream's own status when it
    /// sent an error status, otherwise `500`.
    pub fn client_status(&self) -> u16 {
        match self {
            UpstreamError::Status { status, .. } if *status >= 400 => *status,
            _ => 500,
        }
    }

    /// Read a non-success response into [`UpstreamError::Status`].
    pub async fn from_response(resp: reqwest::Response) -> Self {
        let status = resp.status().as_u16();
        let body = resp
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable>".to_string());
        UpstreamError::Status { status, body }
    }
}

impl fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpstreamError::NotConfigured(what) => write!(f, "{what} is not configured"),
            UpstreamError::Request(e) => write!(f, "HTTP request failed: {e}"),
            UpstreamError::Status { status, body } => {
                write!(f, "Upstream error (HTTP {status}): {body}")
            }
            UpstreamError::Protocol(msg) => write!(f, "Protocol error: {msg}"),
            UpstreamError::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for UpstreamError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            UpstreamError::Request(e) => Some(e),
            UpstreamError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(e: reqwest::Error) -> Self {
        UpstreamError::Request(e)
    }
}

impl From<std::io::Error> for UpstreamError {
    fn from(e: std::io::Error) -> Self {
        UpstreamError::Io(e)
    }
}
