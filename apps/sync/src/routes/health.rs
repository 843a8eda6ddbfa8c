use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::state::AppState;

/// GET /health
/// Returns a simple status object with service version and store backend.
pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    let storage = if state.config.storage_path.is_some() {
        "file"
    } else {
        "memory"
    };
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "resume-sync",
        "storage": storage
    }))
}
