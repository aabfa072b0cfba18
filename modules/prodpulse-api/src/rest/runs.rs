// Run control: trigger a collection, poll status, list recent executions,
// cancel. Runs execute on the runtime; the registry tracks lifecycle.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use prodpulse_common::{CollectorSettings, CrawlType};

use crate::error::ApiError;
use crate::runs::spawn_run;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct TriggerBody {
    subreddits: Option<Vec<String>>,
    keywords: Option<Vec<String>>,
    crawl_type: Option<String>,
    days_back: Option<i64>,
    min_score: Option<i64>,
    incremental: Option<bool>,
}

/// Resolve run settings: static defaults, then stored overrides (read once
/// per run), then explicit trigger parameters.
async fn resolve_settings(
    state: &AppState,
    body: &TriggerBody,
) -> Result<CollectorSettings, ApiError> {
    let mut settings = CollectorSettings::default();

    let overrides = state.config_store.overrides().await?;
    settings
        .apply_overrides(&overrides)
        .map_err(|e| ApiError::Internal(anyhow::Error::new(e)))?;

    if let Some(subreddits) = &body.subreddits {
        if subreddits.is_empty() {
            return Err(ApiError::Validation("subreddits must not be empty".to_string()));
        }
        settings.subreddits = subreddits.clone();
    }
    if let Some(keywords) = &body.keywords {
        settings.keywords = keywords.clone();
    }
    if let Some(raw) = &body.crawl_type {
        settings.crawl_type = CrawlType::from_str_loose(raw).ok_or_else(|| {
            ApiError::Validation(format!(
                "crawl_type must be listing, search, or both, got {raw:?}"
            ))
        })?;
    }
    if let Some(days_back) = body.days_back {
        if days_back < 1 {
            return Err(ApiError::Validation(
                "days_back must be a positive integer".to_string(),
            ));
        }
        settings.days_back = days_back as u32;
    }
    if let Some(min_score) = body.min_score {
        settings.min_post_score = min_score;
    }

    Ok(settings)
}

pub async fn trigger_run(
    State(state): State<Arc<AppState>>,
    body: Option<Json<TriggerBody>>,
) -> Result<Json<Value>, ApiError> {
    if !state.pipeline_ready {
        return Err(ApiError::Unavailable(
            "collector is not configured (ANTHROPIC_API_KEY missing)".to_string(),
        ));
    }

    let body = body.map(|Json(b)| b).unwrap_or_default();
    let settings = resolve_settings(&state, &body).await?;
    let incremental = body.incremental.unwrap_or(false);

    let started_at = Utc::now();
    let name = format!(
        "manual-{}-{}",
        started_at.format("%Y%m%d-%H%M%S"),
        &Uuid::new_v4().simple().to_string()[..8]
    );

    let input = json!({
        "trigger_source": "api",
        "trigger_time": started_at,
        "subreddits": settings.subreddits,
        "keywords": settings.keywords,
        "crawl_type": settings.crawl_type,
        "days_back": settings.days_back,
        "min_score": settings.min_post_score,
        "incremental": incremental,
    });

    let cancel = Arc::new(AtomicBool::new(false));
    state.registry.start(&name, input.clone(), cancel.clone())?;
    spawn_run(
        state.pipeline.clone(),
        state.registry.clone(),
        name.clone(),
        settings,
        incremental,
        cancel,
    );

    Ok(Json(json!({
        "message": "Crawl job started successfully",
        "executionName": name,
        "startDate": started_at,
        "parameters": input,
    })))
}

pub async fn run_status(
    State(state): State<Arc<AppState>>,
    Path(execution_name): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let record = state
        .registry
        .get(&execution_name)
        .ok_or_else(|| ApiError::NotFound(format!("execution {execution_name} not found")))?;

    Ok(Json(json!({
        "executionName": record.name,
        "status": record.status,
        "startDate": record.started_at,
        "stopDate": record.stopped_at,
        "input": record.input,
        "output": record.output,
        "error": record.error,
    })))
}

pub async fn list_executions(State(state): State<Arc<AppState>>) -> Json<Value> {
    let executions: Vec<Value> = state
        .registry
        .list_recent()
        .into_iter()
        .map(|r| {
            json!({
                "name": r.name,
                "status": r.status,
                "startDate": r.started_at,
                "stopDate": r.stopped_at,
            })
        })
        .collect();

    Json(json!({
        "executions": executions,
        "count": executions.len(),
    }))
}

pub async fn cancel_execution(
    State(state): State<Arc<AppState>>,
    Path(execution_name): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state.registry.cancel(&execution_name)?;
    Ok(Json(json!({
        "message": "Cancellation requested",
        "executionName": execution_name,
    })))
}
