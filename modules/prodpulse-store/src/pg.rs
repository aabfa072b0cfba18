// Postgres persistence. One row per insight; the secondary ranking index on
// (day, priority_score DESC, analyzed_at DESC) serves the ranked reads.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;

use prodpulse_common::{
    FeatureCategory, Insight, InsightId, Platform, PulseError, Sentiment, UserSegment,
};

use crate::insights::{
    ConfigStore, InsightFilter, InsightPage, InsightStore, PutOutcome, RawStore, RunRecordStore,
    WritePolicy,
};

fn storage_err(e: sqlx::Error) -> PulseError {
    PulseError::Storage(e.to_string())
}

/// Run the embedded SQL migrations.
pub async fn migrate(pool: &PgPool) -> Result<(), PulseError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| PulseError::Storage(e.to_string()))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Insight rows
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, sqlx::FromRow)]
struct InsightRow {
    insight_id: String,
    source_type: String,
    source_post_id: String,
    source_url: String,
    subreddit: Option<String>,
    feature_summary: String,
    feature_category: String,
    user_segment: String,
    priority_score: i16,
    competitors_mentioned: serde_json::Value,
    action_required: bool,
    suggested_action: String,
    pain_points: serde_json::Value,
    sentiment: Option<String>,
    post_score: i64,
    num_comments: i32,
    analyzed_at: DateTime<Utc>,
    collected_at: DateTime<Utc>,
    ttl: i64,
}

impl From<InsightRow> for Insight {
    fn from(r: InsightRow) -> Self {
        let strings = |v: &serde_json::Value| -> Vec<String> {
            v.as_array()
                .map(|a| {
                    a.iter()
                        .filter_map(|s| s.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default()
        };
        Insight {
            insight_id: r.insight_id,
            source_type: Platform::from_str_loose(&r.source_type).unwrap_or(Platform::Reddit),
            source_post_id: r.source_post_id,
            source_url: r.source_url,
            subreddit: r.subreddit,
            feature_summary: r.feature_summary,
            feature_category: FeatureCategory::from_str_loose(&r.feature_category),
            user_segment: UserSegment::from_str_loose(&r.user_segment),
            priority_score: r.priority_score.clamp(0, 10) as u8,
            competitors_mentioned: strings(&r.competitors_mentioned),
            action_required: r.action_required,
            suggested_action: r.suggested_action,
            pain_points: strings(&r.pain_points),
            sentiment: r.sentiment.as_deref().and_then(Sentiment::from_str_loose),
            post_score: r.post_score,
            num_comments: r.num_comments.max(0) as u32,
            analyzed_at: r.analyzed_at,
            collected_at: r.collected_at,
            ttl: r.ttl,
        }
    }
}

const INSIGHT_COLUMNS: &str = "insight_id, source_type, source_post_id, source_url, subreddit, \
     feature_summary, feature_category, user_segment, priority_score, \
     competitors_mentioned, action_required, suggested_action, pain_points, \
     sentiment, post_score, num_comments, analyzed_at, collected_at, ttl";

pub struct PgInsightStore {
    pool: PgPool,
}

impl PgInsightStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InsightStore for PgInsightStore {
    async fn put(&self, insight: Insight, policy: &WritePolicy) -> Result<PutOutcome, PulseError> {
        if insight.priority_score < policy.priority_threshold {
            return Ok(PutOutcome::Suppressed);
        }
        let ttl = Utc::now().timestamp() + policy.retention_days * 24 * 60 * 60;
        let day = InsightId::parse(&insight.insight_id)?.date;

        // Single statement covers the primary key and the ranking index;
        // the conflict arm makes retries no-ops.
        let result = sqlx::query(
            r#"
            INSERT INTO insights
                (insight_id, day, source_type, source_post_id, source_url, subreddit,
                 feature_summary, feature_category, user_segment, priority_score,
                 competitors_mentioned, action_required, suggested_action, pain_points,
                 sentiment, post_score, num_comments, analyzed_at, collected_at, ttl)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                    $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
            ON CONFLICT (insight_id) DO NOTHING
            "#,
        )
        .bind(&insight.insight_id)
        .bind(day)
        .bind(insight.source_type.to_string())
        .bind(&insight.source_post_id)
        .bind(&insight.source_url)
        .bind(&insight.subreddit)
        .bind(&insight.feature_summary)
        .bind(insight.feature_category.to_string())
        .bind(insight.user_segment.to_string())
        .bind(insight.priority_score as i16)
        .bind(serde_json::json!(insight.competitors_mentioned))
        .bind(insight.action_required)
        .bind(&insight.suggested_action)
        .bind(serde_json::json!(insight.pain_points))
        .bind(insight.sentiment.map(|s| s.to_string()))
        .bind(insight.post_score)
        .bind(insight.num_comments as i32)
        .bind(insight.analyzed_at)
        .bind(insight.collected_at)
        .bind(ttl)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        if result.rows_affected() == 0 {
            Ok(PutOutcome::Unchanged)
        } else {
            Ok(PutOutcome::Stored)
        }
    }

    async fn get(&self, id: &InsightId) -> Result<Option<Insight>, PulseError> {
        let row = sqlx::query_as::<_, InsightRow>(&format!(
            "SELECT {INSIGHT_COLUMNS} FROM insights WHERE insight_id = $1"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(row.map(Insight::from))
    }

    async fn list(
        &self,
        filter: &InsightFilter,
        limit: usize,
    ) -> Result<InsightPage, PulseError> {
        if filter.is_unsatisfiable() {
            return Ok(InsightPage {
                items: Vec::new(),
                has_more: false,
            });
        }

        // Probe one row past the page to compute has_more exactly.
        let rows = sqlx::query_as::<_, InsightRow>(&format!(
            r#"
            SELECT {INSIGHT_COLUMNS} FROM insights
            WHERE ($1::smallint IS NULL OR priority_score >= $1)
              AND ($2::smallint IS NULL OR priority_score <= $2)
              AND ($3::text IS NULL OR feature_category = $3)
              AND ($4::text IS NULL OR user_segment = $4)
              AND ($5::text IS NULL OR source_type = $5)
              AND ($6::date IS NULL OR analyzed_at::date >= $6)
              AND ($7::date IS NULL OR analyzed_at::date <= $7)
            ORDER BY analyzed_at DESC
            LIMIT $8
            "#
        ))
        .bind(filter.priority_min.map(|v| v as i16))
        .bind(filter.priority_max.map(|v| v as i16))
        .bind(filter.category.map(|c| c.to_string()))
        .bind(filter.user_segment.map(|s| s.to_string()))
        .bind(filter.platform.map(|p| p.to_string()))
        .bind(filter.date_from)
        .bind(filter.date_to)
        .bind((limit + 1) as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        let has_more = rows.len() > limit;
        let items = rows.into_iter().take(limit).map(Insight::from).collect();
        Ok(InsightPage { items, has_more })
    }

    async fn scan_window(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Insight>, PulseError> {
        let rows = sqlx::query_as::<_, InsightRow>(&format!(
            r#"
            SELECT {INSIGHT_COLUMNS} FROM insights
            WHERE analyzed_at >= $1 AND analyzed_at <= $2
            ORDER BY analyzed_at DESC
            "#
        ))
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(rows.into_iter().map(Insight::from).collect())
    }

    async fn top_by_priority(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        n: usize,
    ) -> Result<Vec<Insight>, PulseError> {
        let rows = sqlx::query_as::<_, InsightRow>(&format!(
            r#"
            SELECT {INSIGHT_COLUMNS} FROM insights
            WHERE analyzed_at >= $1 AND analyzed_at <= $2
            ORDER BY priority_score DESC, analyzed_at DESC
            LIMIT $3
            "#
        ))
        .bind(from)
        .bind(to)
        .bind(n as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(rows.into_iter().map(Insight::from).collect())
    }

    async fn ping(&self) -> Result<(), PulseError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Raw snapshots
// ---------------------------------------------------------------------------

pub struct PgRawStore {
    pool: PgPool,
}

impl PgRawStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RawStore for PgRawStore {
    async fn put_snapshot(
        &self,
        platform: Platform,
        body: &serde_json::Value,
    ) -> Result<String, PulseError> {
        let now = Utc::now();
        let key = format!(
            "{}/{}/crawl_{}.json",
            platform,
            now.format("%Y-%m-%d"),
            now.format("%Y%m%d_%H%M%S%3f")
        );

        sqlx::query(
            r#"
            INSERT INTO raw_snapshots (key, platform, day, body)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&key)
        .bind(platform.to_string())
        .bind(now.date_naive())
        .bind(body)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(key)
    }

    async fn get_snapshot(&self, key: &str) -> Result<Option<serde_json::Value>, PulseError> {
        let row: Option<(serde_json::Value,)> =
            sqlx::query_as("SELECT body FROM raw_snapshots WHERE key = $1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(storage_err)?;

        Ok(row.map(|(body,)| body))
    }

    async fn list_keys(
        &self,
        platform: Platform,
        day: NaiveDate,
    ) -> Result<Vec<String>, PulseError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT key FROM raw_snapshots
            WHERE platform = $1 AND day = $2
            ORDER BY key ASC
            "#,
        )
        .bind(platform.to_string())
        .bind(day)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(rows.into_iter().map(|(key,)| key).collect())
    }
}

// ---------------------------------------------------------------------------
// Run records (incremental fingerprints)
// ---------------------------------------------------------------------------

pub struct PgRunRecordStore {
    pool: PgPool,
}

impl PgRunRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RunRecordStore for PgRunRecordStore {
    async fn get_fingerprint(
        &self,
        scope: &str,
        item_id: &str,
    ) -> Result<Option<String>, PulseError> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT fingerprint FROM run_records WHERE scope = $1 AND item_id = $2",
        )
        .bind(scope)
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(row.map(|(f,)| f))
    }

    async fn put_fingerprint(
        &self,
        scope: &str,
        item_id: &str,
        fingerprint: &str,
    ) -> Result<(), PulseError> {
        sqlx::query(
            r#"
            INSERT INTO run_records (scope, item_id, fingerprint, last_seen)
            VALUES ($1, $2, $3, now())
            ON CONFLICT (scope, item_id)
            DO UPDATE SET fingerprint = EXCLUDED.fingerprint, last_seen = now()
            "#,
        )
        .bind(scope)
        .bind(item_id)
        .bind(fingerprint)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config overrides
// ---------------------------------------------------------------------------

pub struct PgConfigStore {
    pool: PgPool,
}

impl PgConfigStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConfigStore for PgConfigStore {
    async fn overrides(&self) -> Result<HashMap<String, String>, PulseError> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT key, value FROM config_overrides")
                .fetch_all(&self.pool)
                .await
                .map_err(storage_err)?;

        Ok(rows.into_iter().collect())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), PulseError> {
        sqlx::query(
            r#"
            INSERT INTO config_overrides (key, value, updated_at)
            VALUES ($1, $2, now())
            ON CONFLICT (key)
            DO UPDATE SET value = EXCLUDED.value, updated_at = now()
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(())
    }
}
