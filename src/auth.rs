//! Shared-secret PIN authentication.
//!
//! Every protected endpoint requires an `X-Auth-Pin` header carrying the raw
//! PIN. There is no session token or cookie: the client re-sends the PIN on
//! every call. `POST /api/verify` lets the client test a PIN without touching
//! anything protected.

use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Header carrying the PIN on protected requests.
pub const PIN_HEADER: &str = "x-auth-pin";

/// Axum middleware that rejects requests whose `X-Auth-Pin` header is absent
/// or differs from the configured PIN. The expected PIN is injected via the
/// [`Pin`] extension.
///
/// # Error responses
///
/// - `401 Unauthorized`: header missing or wrong
/// - `500 Internal Server Error`: [`Pin`] extension not found (misconfiguration)
pub async fn require_pin(request: Request, next: Next) -> Response {
    let expected = match request.extensions().get::<Pin>() {
        Some(pin) => pin.0.clone(),
        None => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Server configuration error"})),
            )
                .into_response();
        }
    };

    let provided = request
        .headers()
        .get(PIN_HEADER)
        .and_then(|v| v.to_str().ok());

    match provided {
        Some(p) if pin_matches(&expected, p) => next.run(request).await,
        _ => (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "Invalid PIN"})),
        )
            .into_response(),
    }
}

/// Exact string equality, evaluated without early exit.
pub fn pin_matches(expected: &str, provided: &str) -> bool {
    constant_time_eq(expected.as_bytes(), provided.as_bytes())
}

/// Constant-time byte comparison.
///
/// Always iterates over the full length of `expected` regardless of `provided`
/// length.
fn constant_time_eq(expected: &[u8], provided: &[u8]) -> bool {
    let mut diff = u8::from(expected.len() != provided.len());
    for (i, e) in expected.iter().enumerate() {
        let p = provided.get(i).copied().unwrap_or(0xff);
        diff |= e ^ p;
    }
    diff == 0
}

/// Extension type carrying the configured PIN, injected into the router
/// layer so [`require_pin`] can read it without touching `AppState`.
#[derive(Clone)]
pub struct Pin(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_only() {
        assert!(pin_matches("1234", "1234"));
        assert!(!pin_matches("1234", "12345"));
        assert!(!pin_matches("1234", "123"));
        assert!(!pin_matches("1234", " 1234"));
        assert!(!pin_matches("1234", ""));
    }
}
