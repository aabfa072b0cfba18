// In-memory implementations of the storage traits. Used by tests and by
// ephemeral runs with no Postgres configured.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use prodpulse_common::{Insight, InsightId, Platform, PulseError};

use crate::insights::{
    ConfigStore, InsightFilter, InsightPage, InsightStore, PutOutcome, RawStore, RunRecordStore,
    WritePolicy,
};

// ---------------------------------------------------------------------------
// MemoryInsightStore
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryInsightStore {
    records: Mutex<BTreeMap<String, Insight>>,
}

impl MemoryInsightStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn sorted_matches(&self, filter: &InsightFilter) -> Vec<Insight> {
        let records = self.records.lock().unwrap();
        let mut matches: Vec<Insight> = records
            .values()
            .filter(|i| filter.matches(i))
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.analyzed_at.cmp(&a.analyzed_at));
        matches
    }
}

#[async_trait]
impl InsightStore for MemoryInsightStore {
    async fn put(&self, mut insight: Insight, policy: &WritePolicy) -> Result<PutOutcome, PulseError> {
        if insight.priority_score < policy.priority_threshold {
            return Ok(PutOutcome::Suppressed);
        }
        insight.ttl = Utc::now().timestamp() + policy.retention_days * 24 * 60 * 60;

        let mut records = self.records.lock().unwrap();
        if records.contains_key(&insight.insight_id) {
            return Ok(PutOutcome::Unchanged);
        }
        records.insert(insight.insight_id.clone(), insight);
        Ok(PutOutcome::Stored)
    }

    async fn get(&self, id: &InsightId) -> Result<Option<Insight>, PulseError> {
        Ok(self.records.lock().unwrap().get(&id.to_string()).cloned())
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
        let mut items = self.sorted_matches(filter);
        let has_more = items.len() > limit;
        items.truncate(limit);
        Ok(InsightPage { items, has_more })
    }

    async fn scan_window(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Insight>, PulseError> {
        let records = self.records.lock().unwrap();
        Ok(records
            .values()
            .filter(|i| i.analyzed_at >= from && i.analyzed_at <= to)
            .cloned()
            .collect())
    }

    async fn top_by_priority(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        n: usize,
    ) -> Result<Vec<Insight>, PulseError> {
        let mut window = self.scan_window(from, to).await?;
        window.sort_by(|a, b| {
            b.priority_score
                .cmp(&a.priority_score)
                .then(b.analyzed_at.cmp(&a.analyzed_at))
        });
        window.truncate(n);
        Ok(window)
    }

    async fn ping(&self) -> Result<(), PulseError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryRawStore
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryRawStore {
    blobs: Mutex<BTreeMap<String, serde_json::Value>>,
}

impl MemoryRawStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RawStore for MemoryRawStore {
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
        self.blobs.lock().unwrap().insert(key.clone(), body.clone());
        Ok(key)
    }

    async fn get_snapshot(&self, key: &str) -> Result<Option<serde_json::Value>, PulseError> {
        Ok(self.blobs.lock().unwrap().get(key).cloned())
    }

    async fn list_keys(
        &self,
        platform: Platform,
        day: NaiveDate,
    ) -> Result<Vec<String>, PulseError> {
        let prefix = format!("{}/{}/", platform, day.format("%Y-%m-%d"));
        Ok(self
            .blobs
            .lock()
            .unwrap()
            .keys()
            .filter(|k| k.starts_with(&prefix))
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// MemoryRunRecordStore
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryRunRecordStore {
    records: Mutex<HashMap<(String, String), String>>,
    /// When set, every call fails — used to test full-mode degradation.
    fail: Mutex<bool>,
}

impl MemoryRunRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }

    fn check(&self) -> Result<(), PulseError> {
        if *self.fail.lock().unwrap() {
            return Err(PulseError::Storage("run record store unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RunRecordStore for MemoryRunRecordStore {
    async fn get_fingerprint(
        &self,
        scope: &str,
        item_id: &str,
    ) -> Result<Option<String>, PulseError> {
        self.check()?;
        Ok(self
            .records
            .lock()
            .unwrap()
            .get(&(scope.to_string(), item_id.to_string()))
            .cloned())
    }

    async fn put_fingerprint(
        &self,
        scope: &str,
        item_id: &str,
        fingerprint: &str,
    ) -> Result<(), PulseError> {
        self.check()?;
        self.records
            .lock()
            .unwrap()
            .insert((scope.to_string(), item_id.to_string()), fingerprint.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryConfigStore
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryConfigStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn overrides(&self) -> Result<HashMap<String, String>, PulseError> {
        Ok(self.values.lock().unwrap().clone())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), PulseError> {
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use prodpulse_common::{FeatureCategory, UserSegment};

    fn insight(date: &str, priority: u8, post_id: &str) -> Insight {
        let day = NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap();
        let analyzed_at = Utc
            .from_utc_datetime(&day.and_hms_opt(12, 0, 0).unwrap());
        Insight {
            insight_id: InsightId::new(day, priority, post_id).unwrap().to_string(),
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

    fn policy(threshold: u8) -> WritePolicy {
        WritePolicy {
            priority_threshold: threshold,
            retention_days: 90,
        }
    }

    #[tokio::test]
    async fn put_is_idempotent_on_insight_id() {
        let store = MemoryInsightStore::new();
        let record = insight("2025-09-20", 8, "abc");

        let first = store.put(record.clone(), &policy(5)).await.unwrap();
        let second = store.put(record.clone(), &policy(5)).await.unwrap();

        assert_eq!(first, PutOutcome::Stored);
        assert_eq!(second, PutOutcome::Unchanged);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn below_threshold_insight_is_never_retrievable() {
        let store = MemoryInsightStore::new();
        let record = insight("2025-09-20", 4, "lowprio");
        let id = InsightId::parse(&record.insight_id).unwrap();

        let outcome = store.put(record, &policy(5)).await.unwrap();
        assert_eq!(outcome, PutOutcome::Suppressed);
        assert!(store.get(&id).await.unwrap().is_none());
        let page = store.list(&InsightFilter::default(), 50).await.unwrap();
        assert!(page.items.is_empty());
    }

    #[tokio::test]
    async fn ttl_is_stamped_at_write_time() {
        let store = MemoryInsightStore::new();
        let before = Utc::now().timestamp();
        store
            .put(insight("2025-09-20", 8, "abc"), &policy(5))
            .await
            .unwrap();
        let id = InsightId::parse("INSIGHT#2025-09-20#PRIORITY#8#ID#abc").unwrap();
        let stored = store.get(&id).await.unwrap().unwrap();
        let ninety_days = 90 * 24 * 60 * 60;
        assert!(stored.ttl >= before + ninety_days);
        assert!(stored.ttl <= Utc::now().timestamp() + ninety_days);
    }

    #[tokio::test]
    async fn pagination_probe_is_exact() {
        let store = MemoryInsightStore::new();
        for i in 0..5 {
            store
                .put(insight("2025-09-20", 8, &format!("post{i}")), &policy(5))
                .await
                .unwrap();
        }

        let page = store.list(&InsightFilter::default(), 3).await.unwrap();
        assert_eq!(page.items.len(), 3);
        assert!(page.has_more);

        let page = store.list(&InsightFilter::default(), 5).await.unwrap();
        assert_eq!(page.items.len(), 5);
        assert!(!page.has_more);

        let page = store.list(&InsightFilter::default(), 50).await.unwrap();
        assert_eq!(page.items.len(), 5);
        assert!(!page.has_more);
    }

    #[tokio::test]
    async fn inverted_priority_range_returns_empty_page() {
        let store = MemoryInsightStore::new();
        store
            .put(insight("2025-09-20", 9, "abc"), &policy(5))
            .await
            .unwrap();

        let filter = InsightFilter {
            priority_min: Some(8),
            priority_max: Some(3),
            ..Default::default()
        };
        let page = store.list(&filter, 50).await.unwrap();
        assert!(page.items.is_empty());
        assert!(!page.has_more);
    }

    #[tokio::test]
    async fn date_range_list_excludes_suppressed_records() {
        // Two insights: 2025-09-20 priority 9 and 2025-09-21 priority 3,
        // threshold 5. Only the first is ever visible.
        let store = MemoryInsightStore::new();
        store
            .put(insight("2025-09-20", 9, "kept"), &policy(5))
            .await
            .unwrap();
        store
            .put(insight("2025-09-21", 3, "dropped"), &policy(5))
            .await
            .unwrap();

        let filter = InsightFilter {
            date_from: Some(NaiveDate::from_ymd_opt(2025, 9, 20).unwrap()),
            date_to: Some(NaiveDate::from_ymd_opt(2025, 9, 21).unwrap()),
            ..Default::default()
        };
        let page = store.list(&filter, 50).await.unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].source_post_id, "kept");
    }

    #[tokio::test]
    async fn list_orders_by_analyzed_at_desc_not_priority() {
        let store = MemoryInsightStore::new();
        store
            .put(insight("2025-09-20", 10, "older"), &policy(5))
            .await
            .unwrap();
        store
            .put(insight("2025-09-21", 6, "newer"), &policy(5))
            .await
            .unwrap();

        let page = store.list(&InsightFilter::default(), 50).await.unwrap();
        assert_eq!(page.items[0].source_post_id, "newer");
        assert_eq!(page.items[1].source_post_id, "older");
    }

    #[tokio::test]
    async fn ranked_read_orders_by_priority_then_recency() {
        let store = MemoryInsightStore::new();
        store
            .put(insight("2025-09-19", 7, "mid"), &policy(5))
            .await
            .unwrap();
        store
            .put(insight("2025-09-20", 9, "top"), &policy(5))
            .await
            .unwrap();
        store
            .put(insight("2025-09-21", 7, "mid-newer"), &policy(5))
            .await
            .unwrap();

        let from = Utc.with_ymd_and_hms(2025, 9, 1, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2025, 9, 30, 0, 0, 0).unwrap();
        let top = store.top_by_priority(from, to, 2).await.unwrap();
        assert_eq!(top[0].source_post_id, "top");
        assert_eq!(top[1].source_post_id, "mid-newer");
    }

    #[tokio::test]
    async fn raw_snapshots_are_append_only_and_dated() {
        let store = MemoryRawStore::new();
        let key1 = store
            .put_snapshot(Platform::Reddit, &serde_json::json!({"posts": []}))
            .await
            .unwrap();
        let key2 = store
            .put_snapshot(Platform::Reddit, &serde_json::json!({"posts": [1]}))
            .await
            .unwrap();
        assert_ne!(key1, key2);
        assert!(key1.starts_with("reddit/"));

        let keys = store
            .list_keys(Platform::Reddit, Utc::now().date_naive())
            .await
            .unwrap();
        assert_eq!(keys.len(), 2);
        assert!(store.get_snapshot(&key1).await.unwrap().is_some());
    }
}
