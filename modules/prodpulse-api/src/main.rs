use std::sync::Arc;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use tracing_subscriber::EnvFilter;

use prodpulse_api::runs::{LivePipeline, RunRegistry};
use prodpulse_api::{router, AppState};
use prodpulse_common::Config;
use prodpulse_store::{
    PgConfigStore, PgInsightStore, PgRawStore, PgRunRecordStore, RunRecordStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("prodpulse=info".parse()?))
        .init();

    let config = Config::api_from_env();

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;
    prodpulse_store::migrate(&pool).await?;

    let insights = Arc::new(PgInsightStore::new(pool.clone()));
    let raw = Arc::new(PgRawStore::new(pool.clone()));
    let records: Arc<dyn RunRecordStore> = Arc::new(PgRunRecordStore::new(pool.clone()));
    let config_store = Arc::new(PgConfigStore::new(pool));

    let pipeline_ready = !config.anthropic_api_key.is_empty();
    let pipeline = Arc::new(LivePipeline {
        config: config.clone(),
        insights: insights.clone(),
        raw,
        records: Some(records),
    });

    let state = Arc::new(AppState {
        insights,
        config_store,
        registry: Arc::new(RunRegistry::new()),
        pipeline,
        pipeline_ready,
    });

    let app = router(state).layer(
        tower_http::trace::TraceLayer::new_for_http().make_span_with(
            |request: &axum::http::Request<_>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    path = %request.uri().path(),
                )
            },
        ),
    );

    let addr = format!("{}:{}", config.web_host, config.web_port);
    info!("prodpulse API starting on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
