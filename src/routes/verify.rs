//! PIN check for the client's login screen.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::json_or_default;
use crate::auth::pin_matches;
use crate::AppState;

/// Request body for `POST /api/verify`.
#[derive(Default, Deserialize)]
pub struct VerifyRequest {
    pub pin: Option<String>,
}

/// `POST /api/verify`: report whether `pin` is correct.
///
/// Unauthenticated. Issues no token: `200 {"valid": true}` or
/// `401 {"valid": false}`. An unreadable body counts as an invalid PIN.
pub async fn verify(
    State(state): State<AppState>,
    payload: Result<Json<VerifyRequest>, JsonRejection>,
) -> (StatusCode, Json<Value>) {
    let payload: VerifyRequest = json_or_default(payload);
    let valid = payload
        .pin
        .as_deref()
        .is_some_and(|p| pin_matches(state.registry.pin(), p));
    let status = if valid {
        StatusCode::OK
    } else {
        StatusCode::UNAUTHORIZED
    };
    (status, Json(json!({ "valid": valid })))
}
