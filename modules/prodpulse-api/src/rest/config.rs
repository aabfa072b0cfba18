// GET /config and PUT /config: the mutable override layer over the static
// collection defaults. Every key is validated against the settings schema
// before it is stored, so a bad override can never poison a later run.

use std::sync::Arc;

use axum::{extract::State, Json};
use serde_json::{json, Map, Value};

use prodpulse_common::CollectorSettings;

use crate::error::ApiError;
use crate::AppState;

pub async fn get_config(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let overrides = state.config_store.overrides().await?;

    let mut resolved = CollectorSettings::default();
    resolved
        .apply_overrides(&overrides)
        .map_err(|e| ApiError::Internal(anyhow::Error::new(e)))?;

    Ok(Json(json!({
        "data": {
            "settings": resolved,
            "overrides": overrides,
        }
    })))
}

pub async fn put_config(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Map<String, Value>>,
) -> Result<Json<Value>, ApiError> {
    if body.is_empty() {
        return Err(ApiError::Validation("no settings provided".to_string()));
    }

    // Validate the whole batch against the schema before storing any of it.
    let mut scratch = CollectorSettings::default();
    let mut pending: Vec<(String, String)> = Vec::new();
    for (key, value) in &body {
        let value = match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Array(items) => items
                .iter()
                .filter_map(|v| v.as_str())
                .collect::<Vec<_>>()
                .join(","),
            other => {
                return Err(ApiError::Validation(format!(
                    "unsupported value for {key:?}: {other}"
                )))
            }
        };
        scratch.apply_one(key, &value).map_err(ApiError::from)?;
        pending.push((key.clone(), value));
    }

    let mut updated = Vec::new();
    for (key, value) in pending {
        state.config_store.set(&key, &value).await?;
        updated.push(key);
    }

    Ok(Json(json!({
        "message": "Configuration updated",
        "updated": updated,
    })))
}
