//! Command execution endpoint.
//!
//! `POST /api/exec` runs an allow-listed command string (or any string when
//! `allowCustomCommands` is set). Once a command is accepted the response is
//! always `200`: a non-zero exit, a timeout or a spawn failure are reported
//! in the body, because the caller needs the command's own diagnostics.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use super::json_or_default;
use crate::registry::Rejection;
use crate::shell::process::{ExecError, ExecResult};
use crate::AppState;

/// Request body for `POST /api/exec`.
#[derive(Default, Deserialize)]
pub struct ExecRequest {
    /// Command string, matched verbatim against the registry.
    pub command: Option<String>,
}

/// Response body for `POST /api/exec`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecResponse {
    pub success: bool,
    /// First non-empty of stdout, stderr, or a failure message.
    pub output: String,
    /// Exit code, the OS error code of a spawn failure, or `null` when the
    /// process was killed.
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
}

impl ExecResponse {
    fn from_result(result: ExecResult) -> Self {
        let success = result.success();
        let output = if !result.stdout.is_empty() {
            result.stdout
        } else if !result.stderr.is_empty() {
            result.stderr
        } else if success {
            "No output".to_string()
        } else {
            match result.exit_code {
                Some(code) => format!("Command failed with exit code {code}"),
                None => "Command terminated by signal".to_string(),
            }
        };
        Self {
            success,
            output,
            exit_code: result.exit_code,
            duration_ms: result.duration_ms,
        }
    }

    fn from_error(err: &ExecError, duration_ms: u64) -> Self {
        Self {
            success: false,
            output: err.to_string(),
            exit_code: err.code(),
            duration_ms,
        }
    }
}

/// `POST /api/exec`: run a command.
///
/// # Errors
///
/// - `400 Bad Request`: `command` missing or empty, or the body is not a
///   JSON object
/// - `403 Forbidden`: not allow-listed and custom commands are disabled
pub async fn exec(
    State(state): State<AppState>,
    payload: Result<Json<ExecRequest>, JsonRejection>,
) -> Result<Json<ExecResponse>, (StatusCode, Json<Value>)> {
    let payload: ExecRequest = json_or_default(payload);
    let command = payload.command.as_deref();
    match state.registry.authorize(command) {
        Ok(()) => {}
        Err(Rejection::Empty) => {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "No command provided"})),
            ));
        }
        Err(Rejection::NotAllowed) => {
            warn!("Refused command not in allowlist: {:?}", command.unwrap_or_default());
            return Err((
                StatusCode::FORBIDDEN,
                Json(json!({"error": "Command not allowed"})),
            ));
        }
    }
    let command = command.unwrap_or_default();

    let start = std::time::Instant::now();
    let response = match Box::pin(state.executor.run(command)).await {
        Ok(result) => ExecResponse::from_result(result),
        Err(e) => {
            #[allow(clippy::cast_possible_truncation)]
            let elapsed = start.elapsed().as_millis() as u64;
            ExecResponse::from_error(&e, elapsed)
        }
    };

    info!(
        exit_code = ?response.exit_code,
        duration_ms = response.duration_ms,
        "exec {:?}",
        command
    );
    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(code: Option<i32>, stdout: &str, stderr: &str) -> ExecResult {
        ExecResult {
            exit_code: code,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            duration_ms: 1,
        }
    }

    #[test]
    fn stdout_wins_over_stderr() {
        let r = ExecResponse::from_result(result(Some(0), "out", "err"));
        assert!(r.success);
        assert_eq!(r.output, "out");
    }

    #[test]
    fn stderr_used_when_stdout_empty() {
        let r = ExecResponse::from_result(result(Some(2), "", "bad flag"));
        assert!(!r.success);
        assert_eq!(r.output, "bad flag");
        assert_eq!(r.exit_code, Some(2));
    }

    #[test]
    fn silent_outcomes_get_messages() {
        assert_eq!(
            ExecResponse::from_result(result(Some(0), "", "")).output,
            "No output"
        );
        assert_eq!(
            ExecResponse::from_result(result(Some(1), "", "")).output,
            "Command failed with exit code 1"
        );
        assert_eq!(
            ExecResponse::from_result(result(None, "", "")).output,
            "Command terminated by signal"
        );
    }

    #[test]
    fn serializes_camel_case() {
        let v = serde_json::to_value(ExecResponse::from_result(result(Some(0), "x", ""))).unwrap();
        assert_eq!(v["exitCode"], 0);
        assert_eq!(v["success"], true);
        assert!(v.get("durationMs").is_some());
    }
}
