// Router-level tests: every request goes through the real axum stack
// against the in-memory stores.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{Duration, NaiveDate, TimeZone, Utc};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use prodpulse_api::runs::{RunPipeline, RunRegistry};
use prodpulse_api::{router, AppState};
use prodpulse_collector::RunOutput;
use prodpulse_common::{
    CollectorSettings, FeatureCategory, Insight, Platform, UserSegment,
};
use prodpulse_store::{
    InsightStore, MemoryConfigStore, MemoryInsightStore, WritePolicy,
};

struct InstantPipeline;

#[async_trait]
impl RunPipeline for InstantPipeline {
    async fn run(
        &self,
        _settings: CollectorSettings,
        _incremental: bool,
        _cancel: Arc<AtomicBool>,
    ) -> anyhow::Result<RunOutput> {
        Ok(RunOutput::default())
    }
}

fn test_app() -> (Router, Arc<MemoryInsightStore>) {
    let insights = Arc::new(MemoryInsightStore::new());
    let state = Arc::new(AppState {
        insights: insights.clone(),
        config_store: Arc::new(MemoryConfigStore::new()),
        registry: Arc::new(RunRegistry::new()),
        pipeline: Arc::new(InstantPipeline),
        pipeline_ready: true,
    });
    (router(state), insights)
}

fn insight(date: NaiveDate, priority: u8, post_id: &str) -> Insight {
    let analyzed_at = Utc.from_utc_datetime(&date.and_hms_opt(12, 0, 0).unwrap());
    Insight {
        insight_id: format!(
            "INSIGHT#{}#PRIORITY#{priority}#ID#{post_id}",
            date.format("%Y-%m-%d")
        ),
        source_type: Platform::Reddit,
        source_post_id: post_id.to_string(),
        source_url: format!("https://reddit.com/comments/{post_id}"),
        subreddit: Some("legaltech".to_string()),
        feature_summary: "summary".to_string(),
        feature_category: FeatureCategory::DocumentAutomation,
        user_segment: UserSegment::SmallFirm,
        priority_score: priority,
        competitors_mentioned: Vec::new(),
        action_required: false,
        suggested_action: String::new(),
        pain_points: Vec::new(),
        sentiment: None,
        post_score: 10,
        num_comments: 0,
        analyzed_at,
        collected_at: analyzed_at,
        ttl: 0,
    }
}

/// An insight analyzed `back` days before now — always strictly inside a
/// window ending at the current instant.
fn insight_days_ago(back: i64, priority: u8, post_id: &str) -> Insight {
    let analyzed_at = Utc::now() - Duration::days(back) - Duration::minutes(5);
    let mut record = insight(analyzed_at.date_naive(), priority, post_id);
    record.analyzed_at = analyzed_at;
    record.collected_at = analyzed_at;
    record
}

async fn seed(store: &MemoryInsightStore, record: Insight) {
    let policy = WritePolicy {
        priority_threshold: 5,
        retention_days: 90,
    };
    store.put(record, &policy).await.unwrap();
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

async fn get(app: &Router, path: &str) -> (StatusCode, Value) {
    send(app, Request::get(path).body(Body::empty()).unwrap()).await
}

async fn send_json(
    app: &Router,
    method: &str,
    path: &str,
    body: Value,
) -> (StatusCode, Value) {
    send(
        app,
        Request::builder()
            .method(method)
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
}

// ---------------------------------------------------------------------------
// /insights
// ---------------------------------------------------------------------------

#[tokio::test]
async fn inverted_priority_range_returns_empty_not_error() {
    let (app, store) = test_app();
    seed(&store, insight(Utc::now().date_naive(), 9, "p1")).await;

    let (status, body) = get(&app, "/insights?priority_min=8&priority_max=3").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 0);
    assert_eq!(body["pagination"]["count"], 0);
    assert_eq!(body["pagination"]["hasMore"], false);
}

#[tokio::test]
async fn pagination_is_exact_and_limit_is_clamped() {
    let (app, store) = test_app();
    let day = Utc::now().date_naive();
    for i in 0..5 {
        seed(&store, insight(day - Duration::days(i), 8, &format!("p{i}"))).await;
    }

    let (status, body) = get(&app, "/insights?limit=3").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 3);
    assert_eq!(body["pagination"]["hasMore"], true);

    let (_, body) = get(&app, "/insights?limit=5").await;
    assert_eq!(body["data"].as_array().unwrap().len(), 5);
    assert_eq!(body["pagination"]["hasMore"], false);

    // Above the cap: clamped to 100, not rejected.
    let (status, body) = get(&app, "/insights?limit=250").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pagination"]["limit"], 100);
}

#[tokio::test]
async fn list_envelope_echoes_filters_and_orders_by_recency() {
    let (app, store) = test_app();
    let day = Utc::now().date_naive();
    seed(&store, insight(day - Duration::days(1), 10, "older")).await;
    seed(&store, insight(day, 6, "newer")).await;

    let (status, body) = get(&app, "/insights?category=document_automation&priority_min=5").await;
    assert_eq!(status, StatusCode::OK);
    let items = body["data"].as_array().unwrap();
    assert_eq!(items[0]["source_post_id"], "newer");
    assert_eq!(items[1]["source_post_id"], "older");
    assert_eq!(body["filters"]["category"], "document_automation");
    assert_eq!(body["filters"]["priority_min"], 5);
}

#[tokio::test]
async fn invalid_filter_values_are_rejected() {
    let (app, _store) = test_app();

    let (status, body) = get(&app, "/insights?category=nonsense").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Validation error");

    let (status, _) = get(&app, "/insights?priority_min=11").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = get(&app, "/insights?date_from=september").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = get(&app, "/insights?platform=myspace").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_id_is_400_and_missing_id_is_404() {
    let (app, store) = test_app();
    seed(&store, insight(NaiveDate::from_ymd_opt(2025, 9, 23).unwrap(), 8, "exists")).await;

    let (status, body) = get(&app, "/insights/not-a-valid-id").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Validation error");

    let (status, body) = get(
        &app,
        "/insights/INSIGHT%232025-09-23%23PRIORITY%238%23ID%23doesnotexist",
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Not found");

    let (status, body) = get(
        &app,
        "/insights/INSIGHT%232025-09-23%23PRIORITY%238%23ID%23exists",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["source_post_id"], "exists");
}

// ---------------------------------------------------------------------------
// /analytics
// ---------------------------------------------------------------------------

#[tokio::test]
async fn empty_window_summary_is_zeroed_with_empty_groups() {
    let (app, _store) = test_app();

    let (status, body) = get(&app, "/analytics/summary?group_by=category,user_segment").await;
    assert_eq!(status, StatusCode::OK);
    let data = &body["data"];
    assert_eq!(data["total_insights"], 0);
    assert_eq!(data["high_priority_count"], 0);
    assert_eq!(data["avg_priority_score"], 0.0);
    assert_eq!(data["by_category"], json!({}));
    assert_eq!(data["by_user_segment"], json!({}));
    assert_eq!(data["recent_high_priority"], json!([]));
}

#[tokio::test]
async fn summary_rolls_up_the_window() {
    let (app, store) = test_app();
    seed(&store, insight_days_ago(0, 9, "high")).await;
    seed(&store, insight_days_ago(1, 5, "low")).await;

    let (status, body) = get(&app, "/analytics/summary?period=7d").await;
    assert_eq!(status, StatusCode::OK);
    let data = &body["data"];
    assert_eq!(data["total_insights"], 2);
    assert_eq!(data["high_priority_count"], 1);
    assert_eq!(data["avg_priority_score"], 7.0);
    let top = data["recent_high_priority"].as_array().unwrap();
    assert_eq!(top[0]["source_post_id"], "high");
}

#[tokio::test]
async fn increasing_counts_trend_increasing_over_http() {
    let (app, store) = test_app();
    // 1 insight two days ago, 2 yesterday, 3 today.
    for (back, count) in [(2i64, 1), (1, 2), (0, 3)] {
        for n in 0..count {
            seed(&store, insight_days_ago(back, 8, &format!("d{back}n{n}"))).await;
        }
    }

    let (status, body) = get(
        &app,
        "/analytics/trends?metric=insights_count&period=7d&group_by=day",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["trend_direction"], "increasing");
    assert_eq!(body["data"]["metric"], "insights_count");
    assert_eq!(body["data"]["buckets"].as_array().unwrap().len(), 8);
}

#[tokio::test]
async fn trends_validates_metric_and_bucket() {
    let (app, _store) = test_app();
    let (status, _) = get(&app, "/analytics/trends?metric=bogus").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = get(&app, "/analytics/trends?group_by=hourly").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = get(&app, "/analytics/trends?period=14d").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn competitor_rollup_reports_market_leader() {
    let (app, store) = test_app();
    let mut a = insight_days_ago(0, 8, "a");
    a.competitors_mentioned = vec!["Harvey".to_string()];
    let mut b = insight_days_ago(1, 7, "b");
    b.competitors_mentioned = vec!["Harvey".to_string(), "Casetext".to_string()];
    seed(&store, a).await;
    seed(&store, b).await;

    let (status, body) = get(&app, "/analytics/competitors").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["market_leader"], "Harvey");
    let competitors = body["data"]["competitors"].as_array().unwrap();
    assert_eq!(competitors[0]["mentions"], 2);
}

// ---------------------------------------------------------------------------
// Run control
// ---------------------------------------------------------------------------

#[tokio::test]
async fn trigger_validates_parameters() {
    let (app, _store) = test_app();

    let (status, body) =
        send_json(&app, "POST", "/trigger", json!({"crawl_type": "bogus"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("crawl_type"));

    let (status, _) = send_json(&app, "POST", "/trigger", json!({"days_back": 0})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn trigger_runs_to_completion_and_is_visible_in_status() {
    let (app, _store) = test_app();

    let (status, body) = send_json(
        &app,
        "POST",
        "/trigger",
        json!({"subreddits": ["legaltech"], "crawl_type": "both", "days_back": 3}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let name = body["executionName"].as_str().unwrap().to_string();
    assert!(name.starts_with("manual-"));
    assert_eq!(body["parameters"]["crawl_type"], "both");

    // The instant pipeline finishes almost immediately; poll briefly.
    let mut last_status = String::new();
    for _ in 0..50 {
        let (_, status_body) = get(&app, &format!("/status/{name}")).await;
        last_status = status_body["status"].as_str().unwrap_or("").to_string();
        if last_status != "RUNNING" {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(last_status, "SUCCEEDED");

    let (status, body) = get(&app, "/executions").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["executions"][0]["name"], name);

    // Cancelling a finished run conflicts.
    let (status, body) = send(
        &app,
        Request::builder()
            .method("DELETE")
            .uri(format!("/executions/{name}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Conflict");
}

#[tokio::test]
async fn unknown_execution_is_404() {
    let (app, _store) = test_app();
    let (status, _) = get(&app, "/status/manual-00000000-000000-zzzzzzzz").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        Request::builder()
            .method("DELETE")
            .uri("/executions/manual-00000000-000000-zzzzzzzz")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Config and health
// ---------------------------------------------------------------------------

#[tokio::test]
async fn config_round_trip_applies_overrides() {
    let (app, _store) = test_app();

    let (status, _) = send_json(
        &app,
        "PUT",
        "/config",
        json!({"priority_threshold": 7, "subreddits": "legaltech,ediscovery"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = get(&app, "/config").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["settings"]["priority_threshold"], 7);
    assert_eq!(
        body["data"]["settings"]["subreddits"],
        json!(["legaltech", "ediscovery"])
    );
    assert_eq!(body["data"]["overrides"]["priority_threshold"], "7");
}

#[tokio::test]
async fn unknown_config_key_is_rejected_without_storing() {
    let (app, _store) = test_app();

    let (status, body) = send_json(
        &app,
        "PUT",
        "/config",
        json!({"priority_threshold": 7, "not_a_setting": 1}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Validation error");

    // The batch failed validation, so nothing was stored.
    let (_, body) = get(&app, "/config").await;
    assert_eq!(body["data"]["overrides"], json!({}));
}

#[tokio::test]
async fn health_reports_ok_with_memory_store() {
    let (app, _store) = test_app();
    let (status, body) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["pipeline_busy"], false);
}
