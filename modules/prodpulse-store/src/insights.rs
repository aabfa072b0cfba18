// Storage trait seams. Postgres implementations live in pg.rs, in-memory
// ones in memory.rs; everything above the store programs against these.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use prodpulse_common::{
    CollectorSettings, FeatureCategory, Insight, InsightId, Platform, PulseError, UserSegment,
};

pub const DEFAULT_PAGE_LIMIT: u32 = 50;
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Clamp a requested page size into [1, MAX_PAGE_LIMIT]. Requests above the
/// cap are clamped, not rejected.
pub fn clamp_limit(requested: Option<u32>) -> usize {
    requested
        .unwrap_or(DEFAULT_PAGE_LIMIT)
        .clamp(1, MAX_PAGE_LIMIT) as usize
}

/// Write-time tunables resolved once per run.
#[derive(Debug, Clone, Copy)]
pub struct WritePolicy {
    /// Insights scoring below this are computed but never persisted.
    pub priority_threshold: u8,
    pub retention_days: i64,
}

impl From<&CollectorSettings> for WritePolicy {
    fn from(s: &CollectorSettings) -> Self {
        Self {
            priority_threshold: s.priority_threshold,
            retention_days: s.retention_days,
        }
    }
}

impl Default for WritePolicy {
    fn default() -> Self {
        (&CollectorSettings::default()).into()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Stored,
    /// Below the storage threshold; nothing was written.
    Suppressed,
    /// A record with this insight_id already exists; the retry was a no-op.
    Unchanged,
}

/// AND-combined list filters. All optional; an empty filter matches
/// everything.
#[derive(Debug, Clone, Default)]
pub struct InsightFilter {
    pub priority_min: Option<u8>,
    pub priority_max: Option<u8>,
    pub category: Option<FeatureCategory>,
    pub user_segment: Option<UserSegment>,
    pub platform: Option<Platform>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

impl InsightFilter {
    /// An inverted priority range is a valid, unsatisfiable filter — the
    /// list call returns an empty page rather than erroring.
    pub fn is_unsatisfiable(&self) -> bool {
        matches!((self.priority_min, self.priority_max), (Some(lo), Some(hi)) if lo > hi)
    }

    pub fn matches(&self, insight: &Insight) -> bool {
        if let Some(lo) = self.priority_min {
            if insight.priority_score < lo {
                return false;
            }
        }
        if let Some(hi) = self.priority_max {
            if insight.priority_score > hi {
                return false;
            }
        }
        if let Some(cat) = self.category {
            if insight.feature_category != cat {
                return false;
            }
        }
        if let Some(seg) = self.user_segment {
            if insight.user_segment != seg {
                return false;
            }
        }
        if let Some(platform) = self.platform {
            if insight.source_type != platform {
                return false;
            }
        }
        let day = insight.analyzed_at.date_naive();
        if let Some(from) = self.date_from {
            if day < from {
                return false;
            }
        }
        if let Some(to) = self.date_to {
            if day > to {
                return false;
            }
        }
        true
    }
}

/// One page of list results, most recently analyzed first.
#[derive(Debug, Clone)]
pub struct InsightPage {
    pub items: Vec<Insight>,
    /// True iff more matching records exist beyond this page.
    pub has_more: bool,
}

#[async_trait]
pub trait InsightStore: Send + Sync {
    /// Idempotent, atomic, threshold-gated write. The TTL is stamped here as
    /// `now + retention_days`.
    async fn put(&self, insight: Insight, policy: &WritePolicy) -> Result<PutOutcome, PulseError>;

    async fn get(&self, id: &InsightId) -> Result<Option<Insight>, PulseError>;

    /// Filtered page in descending `analyzed_at` order. Callers pass an
    /// already-clamped limit; `has_more` must be exact (limit+1 probe).
    async fn list(&self, filter: &InsightFilter, limit: usize)
        -> Result<InsightPage, PulseError>;

    /// Every insight analyzed inside the window, for analytics rollups.
    async fn scan_window(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Insight>, PulseError>;

    /// Ranked read off the secondary index: priority desc, then most recent.
    async fn top_by_priority(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        n: usize,
    ) -> Result<Vec<Insight>, PulseError>;

    /// Liveness probe for the health endpoint.
    async fn ping(&self) -> Result<(), PulseError>;
}

/// Append-only archive of fetched corpora, keyed
/// `{platform}/{YYYY-MM-DD}/crawl_{timestamp}.json`. Snapshots are never
/// updated in place.
#[async_trait]
pub trait RawStore: Send + Sync {
    async fn put_snapshot(
        &self,
        platform: Platform,
        body: &serde_json::Value,
    ) -> Result<String, PulseError>;

    async fn get_snapshot(&self, key: &str) -> Result<Option<serde_json::Value>, PulseError>;

    async fn list_keys(&self, platform: Platform, day: NaiveDate)
        -> Result<Vec<String>, PulseError>;
}

/// Prior-run fingerprints for incremental mode. A store failure downgrades
/// the run to full mode; it never aborts it.
#[async_trait]
pub trait RunRecordStore: Send + Sync {
    async fn get_fingerprint(
        &self,
        scope: &str,
        item_id: &str,
    ) -> Result<Option<String>, PulseError>;

    async fn put_fingerprint(
        &self,
        scope: &str,
        item_id: &str,
        fingerprint: &str,
    ) -> Result<(), PulseError>;
}

/// Mutable settings overrides layered over static defaults.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn overrides(&self) -> Result<HashMap<String, String>, PulseError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), PulseError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_clamps_above_cap_and_defaults() {
        assert_eq!(clamp_limit(None), 50);
        assert_eq!(clamp_limit(Some(25)), 25);
        assert_eq!(clamp_limit(Some(250)), 100);
        assert_eq!(clamp_limit(Some(0)), 1);
    }

    #[test]
    fn inverted_priority_range_is_unsatisfiable() {
        let filter = InsightFilter {
            priority_min: Some(8),
            priority_max: Some(3),
            ..Default::default()
        };
        assert!(filter.is_unsatisfiable());
        assert!(!InsightFilter::default().is_unsatisfiable());
    }
}
