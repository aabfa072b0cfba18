pub mod analytics;
pub mod config;
pub mod insights;
pub mod runs;

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::AppState;

/// Liveness and readiness: storage ping plus pipeline busy/idle.
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let pipeline_busy = state.registry.any_running();
    match state.insights.ping().await {
        Ok(()) => Json(json!({
            "status": "ok",
            "storage": "ok",
            "pipeline_busy": pipeline_busy,
        }))
        .into_response(),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "degraded",
                "storage": "unavailable",
                "message": e.to_string(),
                "pipeline_busy": pipeline_busy,
            })),
        )
            .into_response(),
    }
}
