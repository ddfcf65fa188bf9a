use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use serde_json::{Value, json};

use crate::errors::AppResult;
use crate::state::AppState;

/// Health check handler
/// Returns a simple JSON response with current connection and session counts
pub async fn health_check(State(state): State<Arc<AppState>>) -> AppResult<Json<Value>> {
    Ok(Json(json!({
        "status": "OK",
        "connections": state.registry.len().await,
        "editSessions": state.edit_sessions.len(),
    })))
}
