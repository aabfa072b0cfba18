// GET /insights and GET /insights/{id}. List responses use the envelope
// { data, pagination, filters }; detail responses wrap the record in
// { data }.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};

use prodpulse_common::{FeatureCategory, InsightId, Platform, UserSegment};
use prodpulse_store::{clamp_limit, InsightFilter};

use crate::error::ApiError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    priority_min: Option<i64>,
    priority_max: Option<i64>,
    category: Option<String>,
    user_segment: Option<String>,
    platform: Option<String>,
    date_from: Option<String>,
    date_to: Option<String>,
    limit: Option<u32>,
}

fn parse_priority(value: Option<i64>, field: &str) -> Result<Option<u8>, ApiError> {
    match value {
        None => Ok(None),
        Some(v) if (0..=10).contains(&v) => Ok(Some(v as u8)),
        Some(v) => Err(ApiError::Validation(format!(
            "{field} must be between 0 and 10, got {v}"
        ))),
    }
}

fn parse_date(value: &Option<String>, field: &str) -> Result<Option<NaiveDate>, ApiError> {
    value
        .as_deref()
        .map(|s| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map_err(|_| ApiError::Validation(format!("{field} must be YYYY-MM-DD, got {s:?}")))
        })
        .transpose()
}

/// Strict enum parse: the loose parser has a catch-all arm, so require the
/// round trip to reproduce the input.
fn parse_category(value: &Option<String>) -> Result<Option<FeatureCategory>, ApiError> {
    value
        .as_deref()
        .map(|s| {
            let parsed = FeatureCategory::from_str_loose(s);
            if parsed.to_string() == s.to_lowercase() {
                Ok(parsed)
            } else {
                Err(ApiError::Validation(format!("unknown category: {s:?}")))
            }
        })
        .transpose()
}

fn parse_segment(value: &Option<String>) -> Result<Option<UserSegment>, ApiError> {
    value
        .as_deref()
        .map(|s| {
            let parsed = UserSegment::from_str_loose(s);
            if parsed.to_string() == s.to_lowercase() {
                Ok(parsed)
            } else {
                Err(ApiError::Validation(format!("unknown user_segment: {s:?}")))
            }
        })
        .transpose()
}

fn parse_platform(value: &Option<String>) -> Result<Option<Platform>, ApiError> {
    value
        .as_deref()
        .map(|s| {
            Platform::from_str_loose(s)
                .ok_or_else(|| ApiError::Validation(format!("unknown platform: {s:?}")))
        })
        .transpose()
}

pub async fn list_insights(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ListQuery>,
) -> Result<Json<Value>, ApiError> {
    let filter = InsightFilter {
        priority_min: parse_priority(q.priority_min, "priority_min")?,
        priority_max: parse_priority(q.priority_max, "priority_max")?,
        category: parse_category(&q.category)?,
        user_segment: parse_segment(&q.user_segment)?,
        platform: parse_platform(&q.platform)?,
        date_from: parse_date(&q.date_from, "date_from")?,
        date_to: parse_date(&q.date_to, "date_to")?,
    };
    let limit = clamp_limit(q.limit);

    let page = state.insights.list(&filter, limit).await?;

    Ok(Json(json!({
        "data": page.items,
        "pagination": {
            "limit": limit,
            "count": page.items.len(),
            "hasMore": page.has_more,
        },
        "filters": {
            "priority_min": filter.priority_min,
            "priority_max": filter.priority_max,
            "category": filter.category,
            "user_segment": filter.user_segment,
            "platform": filter.platform,
            "date_from": filter.date_from,
            "date_to": filter.date_to,
        },
    })))
}

pub async fn get_insight(
    State(state): State<Arc<AppState>>,
    Path(insight_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    // Shape validation happens before any storage I/O.
    let id = InsightId::parse(&insight_id)?;

    match state.insights.get(&id).await? {
        Some(insight) => Ok(Json(json!({ "data": insight }))),
        None => Err(ApiError::NotFound(format!(
            "no insight with id {insight_id}"
        ))),
    }
}
