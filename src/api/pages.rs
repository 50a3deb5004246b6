//! Page endpoints
//!
//! - GET / - Message submission page (requires login)
//! - GET /health - Liveness probe

use axum::{extract::State, response::Html, Json};
use serde_json::{json, Value};

use crate::api::middleware::{ApiError, AppState};

/// GET /
pub async fn index(State(state): State<AppState>) -> Result<Html<String>, ApiError> {
    Ok(Html(state.views.index()?))
}

/// GET /health
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
