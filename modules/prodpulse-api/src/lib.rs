pub mod analytics;
pub mod error;
pub mod rest;
pub mod runs;

use std::sync::Arc;

use axum::{
    routing::{delete, get, post},
    Router,
};

use prodpulse_store::{ConfigStore, InsightStore};

use runs::{RunPipeline, RunRegistry};

pub struct AppState {
    pub insights: Arc<dyn InsightStore>,
    pub config_store: Arc<dyn ConfigStore>,
    pub registry: Arc<RunRegistry>,
    pub pipeline: Arc<dyn RunPipeline>,
    /// False when the collector credentials are missing; POST /trigger
    /// answers 503 instead of launching a run that cannot analyze anything.
    pub pipeline_ready: bool,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // Read path
        .route("/insights", get(rest::insights::list_insights))
        .route("/insights/{insight_id}", get(rest::insights::get_insight))
        .route("/analytics/summary", get(rest::analytics::analytics_summary))
        .route("/analytics/trends", get(rest::analytics::analytics_trends))
        .route(
            "/analytics/competitors",
            get(rest::analytics::analytics_competitors),
        )
        // Run control
        .route("/trigger", post(rest::runs::trigger_run))
        .route("/status/{execution_name}", get(rest::runs::run_status))
        .route("/executions", get(rest::runs::list_executions))
        .route(
            "/executions/{execution_name}",
            delete(rest::runs::cancel_execution),
        )
        // Tunables and health
        .route(
            "/config",
            get(rest::config::get_config).put(rest::config::put_config),
        )
        .route("/health", get(rest::health))
        .with_state(state)
}
