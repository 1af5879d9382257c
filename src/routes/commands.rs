//! Command registry listing.

use axum::{extract::State, Json};

use crate::registry::CommandDescriptor;
use crate::AppState;

/// `GET /api/commands`: every configured descriptor, in configuration order.
pub async fn list_commands(State(state): State<AppState>) -> Json<Vec<CommandDescriptor>> {
    Json(state.registry.commands().to_vec())
}
