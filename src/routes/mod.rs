//! HTTP route handlers and router assembly.
//!
//! Every request first passes the origin guard. `/api/health` and
//! `/api/verify` need nothing else; the remaining endpoints also require the
//! PIN header via [`crate::auth::require_pin`].

pub mod audio;
pub mod chat;
pub mod commands;
pub mod exec;
pub mod health;
pub mod transcribe;
pub mod verify;


use std::path::Path;

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit},
    middleware,
    routing::{get, post},
    Extension, Json, Router,
};
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::auth::{self, Pin};
use crate::guard;
use crate::AppState;

/// Multipart framing allowance on top of the upload cap.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// A JSON body, or `T::default()` when it is missing, has the wrong content
/// type, or does not deserialize. Handlers then answer through their usual
/// validation paths instead of axum's plain-text rejections.
fn json_or_default<T: Default>(body: Result<Json<T>, JsonRejection>) -> T {
    match body {
        Ok(Json(value)) => value,
        Err(e) => {
            debug!("Unreadable JSON body: {e}");
            T::default()
        }
    }
}

/// Build the full application router.
///
/// When `server.static_dir` exists it is served as a fallback, with unknown
/// paths answered by its `index.html` so client-side routes resolve.
pub fn router(state: AppState) -> Router {
    let upload_limit = state.relay.max_upload_bytes() + MULTIPART_OVERHEAD;

    let public_routes = Router::new()
        .route("/api/health", get(health::health))
        .route("/api/verify", post(verify::verify));

    let authed_routes = Router::new()
        .route("/api/commands", get(commands::list_commands))
        .route("/api/exec", post(exec::exec))
        .route(
            "/api/transcribe",
            post(transcribe::transcribe).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/api/chat", post(chat::chat))
        .route("/api/audio/{filename}", get(audio::get_audio))
        .route_layer(middleware::from_fn(auth::require_pin));

    let mut app = Router::new().merge(public_routes).merge(authed_routes);

    let static_dir = Path::new(&state.config.server.static_dir);
    if static_dir.is_dir() {
        info!("Serving static files from {}", static_dir.display());
        let index = ServeFile::new(static_dir.join("index.html"));
        app = app.fallback_service(ServeDir::new(static_dir).fallback(index));
    }

    app.layer(Extension(Pin(state.registry.pin().to_string())))
        .layer(CorsLayer::permissive())
        .layer(middleware::from_fn(guard::require_trusted_origin))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
