// Analytics endpoints: summary, trends, competitors. Each resolves its
// window, scans the store once, and hands the slice to the pure aggregation
// functions.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use prodpulse_common::Sentiment;

use crate::analytics::{
    competitors, summary, trends, BucketSize, GroupDimension, TrendMetric, TOP_INSIGHTS,
};
use crate::error::ApiError;
use crate::AppState;

const DEFAULT_PERIOD: &str = "30d";
const DEFAULT_COMPETITOR_LIMIT: usize = 20;
const MAX_COMPETITOR_LIMIT: usize = 100;

fn parse_period(period: &str) -> Result<i64, ApiError> {
    match period {
        "7d" => Ok(7),
        "30d" => Ok(30),
        "90d" => Ok(90),
        other => Err(ApiError::Validation(format!(
            "period must be 7d, 30d, or 90d, got {other:?}"
        ))),
    }
}

fn window(days: i64) -> (DateTime<Utc>, DateTime<Utc>) {
    let to = Utc::now();
    (to - Duration::days(days), to)
}

fn parse_dimensions(group_by: &Option<String>) -> Result<Vec<GroupDimension>, ApiError> {
    let Some(raw) = group_by.as_deref() else {
        return Ok(Vec::new());
    };
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            GroupDimension::parse(s).ok_or_else(|| {
                ApiError::Validation(format!(
                    "group_by accepts category and user_segment, got {s:?}"
                ))
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// GET /analytics/summary
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    period: Option<String>,
    group_by: Option<String>,
}

pub async fn analytics_summary(
    State(state): State<Arc<AppState>>,
    Query(q): Query<SummaryQuery>,
) -> Result<Json<Value>, ApiError> {
    let days = parse_period(q.period.as_deref().unwrap_or(DEFAULT_PERIOD))?;
    let dimensions = parse_dimensions(&q.group_by)?;
    let (from, to) = window(days);

    let insights = state.insights.scan_window(from, to).await?;
    let rollup = summary(&insights, &dimensions);
    let recent_high_priority = state.insights.top_by_priority(from, to, TOP_INSIGHTS).await?;

    let mut data = serde_json::to_value(&rollup).unwrap_or_default();
    if let Some(obj) = data.as_object_mut() {
        obj.insert(
            "period".to_string(),
            json!(q.period.as_deref().unwrap_or(DEFAULT_PERIOD)),
        );
        obj.insert(
            "recent_high_priority".to_string(),
            json!(recent_high_priority),
        );
    }

    Ok(Json(json!({ "data": data })))
}

// ---------------------------------------------------------------------------
// GET /analytics/trends
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct TrendsQuery {
    metric: Option<String>,
    period: Option<String>,
    group_by: Option<String>,
}

pub async fn analytics_trends(
    State(state): State<Arc<AppState>>,
    Query(q): Query<TrendsQuery>,
) -> Result<Json<Value>, ApiError> {
    let metric = match q.metric.as_deref() {
        None => TrendMetric::InsightsCount,
        Some(s) => TrendMetric::parse(s).ok_or_else(|| {
            ApiError::Validation(format!(
                "metric must be insights_count or avg_priority, got {s:?}"
            ))
        })?,
    };
    let bucket = match q.group_by.as_deref() {
        None => BucketSize::Day,
        Some(s) => BucketSize::parse(s).ok_or_else(|| {
            ApiError::Validation(format!("group_by must be day, week, or month, got {s:?}"))
        })?,
    };
    let days = parse_period(q.period.as_deref().unwrap_or(DEFAULT_PERIOD))?;
    let (from, to) = window(days);

    let insights = state.insights.scan_window(from, to).await?;
    let series = trends(&insights, metric, bucket, from.date_naive(), to.date_naive());

    let mut data = serde_json::to_value(&series).unwrap_or_default();
    if let Some(obj) = data.as_object_mut() {
        obj.insert(
            "period".to_string(),
            json!(q.period.as_deref().unwrap_or(DEFAULT_PERIOD)),
        );
    }

    Ok(Json(json!({ "data": data })))
}

// ---------------------------------------------------------------------------
// GET /analytics/competitors
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CompetitorsQuery {
    competitor: Option<String>,
    sentiment: Option<String>,
    limit: Option<usize>,
    period: Option<String>,
}

pub async fn analytics_competitors(
    State(state): State<Arc<AppState>>,
    Query(q): Query<CompetitorsQuery>,
) -> Result<Json<Value>, ApiError> {
    let sentiment = q
        .sentiment
        .as_deref()
        .map(|s| {
            Sentiment::from_str_loose(s).ok_or_else(|| {
                ApiError::Validation(format!(
                    "sentiment must be positive, negative, or neutral, got {s:?}"
                ))
            })
        })
        .transpose()?;
    // Competitor tracking defaults to the full retention window.
    let days = parse_period(q.period.as_deref().unwrap_or("90d"))?;
    let limit = q
        .limit
        .unwrap_or(DEFAULT_COMPETITOR_LIMIT)
        .clamp(1, MAX_COMPETITOR_LIMIT);
    let (from, to) = window(days);

    let insights = state.insights.scan_window(from, to).await?;
    let mut rollup = competitors(&insights, q.competitor.as_deref(), sentiment);
    rollup.competitors.truncate(limit);

    Ok(Json(json!({ "data": rollup })))
}
