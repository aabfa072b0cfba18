// Aggregation over a window of insights. Pure functions over the scanned
// slice; handlers fetch the window and translate query params.

use std::collections::BTreeMap;

use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;

use prodpulse_common::{Insight, Sentiment};

/// Priority at or above which an insight counts as high priority.
pub const HIGH_PRIORITY_FLOOR: u8 = 8;

/// Size of the `recent_high_priority` list in the summary rollup.
pub const TOP_INSIGHTS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupDimension {
    Category,
    UserSegment,
}

impl GroupDimension {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "category" => Some(Self::Category),
            "user_segment" => Some(Self::UserSegment),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendMetric {
    InsightsCount,
    AvgPriority,
}

impl TrendMetric {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "insights_count" => Some(Self::InsightsCount),
            "avg_priority" => Some(Self::AvgPriority),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InsightsCount => "insights_count",
            Self::AvgPriority => "avg_priority",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketSize {
    Day,
    Week,
    Month,
}

impl BucketSize {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "day" => Some(Self::Day),
            "week" => Some(Self::Week),
            "month" => Some(Self::Month),
            _ => None,
        }
    }

    /// Map a date to the start of its bucket.
    fn bucket_start(&self, date: NaiveDate) -> NaiveDate {
        match self {
            Self::Day => date,
            Self::Week => date - Duration::days(date.weekday().num_days_from_monday() as i64),
            Self::Month => date.with_day(1).unwrap_or(date),
        }
    }

    fn next_bucket(&self, start: NaiveDate) -> NaiveDate {
        match self {
            Self::Day => start + Duration::days(1),
            Self::Week => start + Duration::days(7),
            Self::Month => {
                // First day of the following month.
                let (year, month) = if start.month() == 12 {
                    (start.year() + 1, 1)
                } else {
                    (start.year(), start.month() + 1)
                };
                NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(start)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct GroupRollup {
    pub count: usize,
    pub avg_priority: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryRollup {
    pub total_insights: usize,
    pub high_priority_count: usize,
    pub action_required_count: usize,
    pub avg_priority_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub by_category: Option<BTreeMap<String, GroupRollup>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub by_user_segment: Option<BTreeMap<String, GroupRollup>>,
}

fn avg_priority(insights: &[&Insight]) -> f64 {
    if insights.is_empty() {
        return 0.0;
    }
    insights
        .iter()
        .map(|i| i.priority_score as f64)
        .sum::<f64>()
        / insights.len() as f64
}

fn group_rollup<F>(insights: &[Insight], key: F) -> BTreeMap<String, GroupRollup>
where
    F: Fn(&Insight) -> String,
{
    let mut groups: BTreeMap<String, Vec<&Insight>> = BTreeMap::new();
    for insight in insights {
        groups.entry(key(insight)).or_default().push(insight);
    }
    groups
        .into_iter()
        .map(|(name, members)| {
            (
                name,
                GroupRollup {
                    count: members.len(),
                    avg_priority: avg_priority(&members),
                },
            )
        })
        .collect()
}

/// Aggregate counts and averages over the window. An empty window yields
/// zeros and empty grouping maps, never an error.
pub fn summary(insights: &[Insight], dimensions: &[GroupDimension]) -> SummaryRollup {
    let all: Vec<&Insight> = insights.iter().collect();
    SummaryRollup {
        total_insights: insights.len(),
        high_priority_count: insights
            .iter()
            .filter(|i| i.priority_score >= HIGH_PRIORITY_FLOOR)
            .count(),
        action_required_count: insights.iter().filter(|i| i.action_required).count(),
        avg_priority_score: avg_priority(&all),
        by_category: dimensions
            .contains(&GroupDimension::Category)
            .then(|| group_rollup(insights, |i| i.feature_category.to_string())),
        by_user_segment: dimensions
            .contains(&GroupDimension::UserSegment)
            .then(|| group_rollup(insights, |i| i.user_segment.to_string())),
    }
}

// ---------------------------------------------------------------------------
// Trends
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct TrendBucket {
    pub period_start: NaiveDate,
    pub value: f64,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrendSeries {
    pub metric: &'static str,
    pub buckets: Vec<TrendBucket>,
    /// Simple endpoint comparison of first vs last bucket value.
    pub trend_direction: &'static str,
    /// Population standard deviation of bucket values; 0 below 2 buckets.
    pub volatility: f64,
}

/// Bucket the window and compute the metric per bucket. Buckets with no
/// insights are kept (value 0) so the series covers the whole window.
pub fn trends(
    insights: &[Insight],
    metric: TrendMetric,
    bucket: BucketSize,
    window_from: NaiveDate,
    window_to: NaiveDate,
) -> TrendSeries {
    let mut grouped: BTreeMap<NaiveDate, Vec<&Insight>> = BTreeMap::new();
    for insight in insights {
        let day = insight.analyzed_at.date_naive();
        if day < window_from || day > window_to {
            continue;
        }
        grouped
            .entry(bucket.bucket_start(day))
            .or_default()
            .push(insight);
    }

    let mut buckets = Vec::new();
    let mut start = bucket.bucket_start(window_from);
    let last = bucket.bucket_start(window_to);
    while start <= last {
        let members = grouped.remove(&start).unwrap_or_default();
        let value = match metric {
            TrendMetric::InsightsCount => members.len() as f64,
            TrendMetric::AvgPriority => avg_priority(&members),
        };
        buckets.push(TrendBucket {
            period_start: start,
            value,
            count: members.len(),
        });
        start = bucket.next_bucket(start);
    }

    let trend_direction = match (buckets.first(), buckets.last()) {
        (Some(first), Some(last)) if last.value > first.value => "increasing",
        (Some(first), Some(last)) if last.value < first.value => "decreasing",
        _ => "stable",
    };

    let volatility = if buckets.len() < 2 {
        0.0
    } else {
        let mean = buckets.iter().map(|b| b.value).sum::<f64>() / buckets.len() as f64;
        let variance = buckets
            .iter()
            .map(|b| (b.value - mean).powi(2))
            .sum::<f64>()
            / buckets.len() as f64;
        variance.sqrt()
    };

    TrendSeries {
        metric: metric.as_str(),
        buckets,
        trend_direction,
        volatility,
    }
}

// ---------------------------------------------------------------------------
// Competitors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize)]
pub struct SentimentTally {
    pub positive: usize,
    pub negative: usize,
    pub neutral: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompetitorStats {
    pub name: String,
    pub mentions: usize,
    pub avg_priority: f64,
    pub by_category: BTreeMap<String, usize>,
    pub by_user_segment: BTreeMap<String, usize>,
    pub sentiment: SentimentTally,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompetitorRollup {
    pub competitors: Vec<CompetitorStats>,
    /// Highest mention count; ties broken by name, ascending.
    pub market_leader: Option<String>,
}

/// Group mention-bearing insights by competitor name.
pub fn competitors(
    insights: &[Insight],
    name_filter: Option<&str>,
    sentiment_filter: Option<Sentiment>,
) -> CompetitorRollup {
    let mut groups: BTreeMap<String, Vec<&Insight>> = BTreeMap::new();
    for insight in insights {
        if insight.competitors_mentioned.is_empty() {
            continue;
        }
        if let Some(wanted) = sentiment_filter {
            if insight.sentiment != Some(wanted) {
                continue;
            }
        }
        for name in &insight.competitors_mentioned {
            if let Some(filter) = name_filter {
                if !name.eq_ignore_ascii_case(filter) {
                    continue;
                }
            }
            groups.entry(name.clone()).or_default().push(insight);
        }
    }

    let mut competitors: Vec<CompetitorStats> = groups
        .into_iter()
        .map(|(name, members)| {
            let mut by_category: BTreeMap<String, usize> = BTreeMap::new();
            let mut by_user_segment: BTreeMap<String, usize> = BTreeMap::new();
            let mut sentiment = SentimentTally::default();
            for insight in &members {
                *by_category
                    .entry(insight.feature_category.to_string())
                    .or_default() += 1;
                *by_user_segment
                    .entry(insight.user_segment.to_string())
                    .or_default() += 1;
                match insight.sentiment {
                    Some(Sentiment::Positive) => sentiment.positive += 1,
                    Some(Sentiment::Negative) => sentiment.negative += 1,
                    Some(Sentiment::Neutral) => sentiment.neutral += 1,
                    None => {}
                }
            }
            CompetitorStats {
                mentions: members.len(),
                avg_priority: avg_priority(&members),
                by_category,
                by_user_segment,
                sentiment,
                name,
            }
        })
        .collect();

    competitors.sort_by(|a, b| b.mentions.cmp(&a.mentions).then(a.name.cmp(&b.name)));
    let market_leader = competitors.first().map(|c| c.name.clone());

    CompetitorRollup {
        competitors,
        market_leader,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use prodpulse_common::{FeatureCategory, Platform, UserSegment};

    fn insight(date: &str, priority: u8, post_id: &str) -> Insight {
        let day = NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap();
        let analyzed_at = Utc.from_utc_datetime(&day.and_hms_opt(9, 0, 0).unwrap());
        Insight {
            insight_id: format!("INSIGHT#{date}#PRIORITY#{priority}#ID#{post_id}"),
            source_type: Platform::Reddit,
            source_post_id: post_id.to_string(),
            source_url: String::new(),
            subreddit: None,
            feature_summary: String::new(),
            feature_category: FeatureCategory::Other,
            user_segment: UserSegment::Unknown,
            priority_score: priority,
            competitors_mentioned: Vec::new(),
            action_required: false,
            suggested_action: String::new(),
            pain_points: Vec::new(),
            sentiment: None,
            post_score: 0,
            num_comments: 0,
            analyzed_at,
            collected_at: analyzed_at,
            ttl: 0,
        }
    }

    #[test]
    fn empty_window_summary_is_all_zeros_with_empty_maps() {
        let rollup = summary(&[], &[GroupDimension::Category, GroupDimension::UserSegment]);
        assert_eq!(rollup.total_insights, 0);
        assert_eq!(rollup.high_priority_count, 0);
        assert_eq!(rollup.action_required_count, 0);
        assert_eq!(rollup.avg_priority_score, 0.0);
        assert!(rollup.by_category.unwrap().is_empty());
        assert!(rollup.by_user_segment.unwrap().is_empty());
    }

    #[test]
    fn summary_counts_high_priority_and_actions() {
        let mut a = insight("2025-09-20", 9, "a");
        a.action_required = true;
        a.feature_category = FeatureCategory::DocumentAutomation;
        let b = insight("2025-09-20", 5, "b");

        let rollup = summary(&[a, b], &[GroupDimension::Category]);
        assert_eq!(rollup.total_insights, 2);
        assert_eq!(rollup.high_priority_count, 1);
        assert_eq!(rollup.action_required_count, 1);
        assert!((rollup.avg_priority_score - 7.0).abs() < 1e-9);

        let by_category = rollup.by_category.unwrap();
        assert_eq!(by_category["document_automation"].count, 1);
        assert_eq!(by_category["other"].count, 1);
        assert!(rollup.by_user_segment.is_none());
    }

    #[test]
    fn increasing_daily_counts_trend_increasing() {
        // Counts 1..=7 across a week of days.
        let mut insights = Vec::new();
        for (offset, count) in (1..=7).enumerate() {
            for n in 0..count {
                insights.push(insight(
                    &format!("2025-09-{:02}", 15 + offset),
                    6,
                    &format!("p{offset}-{n}"),
                ));
            }
        }
        let series = trends(
            &insights,
            TrendMetric::InsightsCount,
            BucketSize::Day,
            NaiveDate::from_ymd_opt(2025, 9, 15).unwrap(),
            NaiveDate::from_ymd_opt(2025, 9, 21).unwrap(),
        );
        assert_eq!(series.buckets.len(), 7);
        assert_eq!(series.trend_direction, "increasing");
        assert!(series.volatility > 0.0);
    }

    #[test]
    fn flat_series_is_stable_and_single_bucket_has_zero_volatility() {
        let insights = vec![insight("2025-09-15", 6, "a")];
        let series = trends(
            &insights,
            TrendMetric::InsightsCount,
            BucketSize::Day,
            NaiveDate::from_ymd_opt(2025, 9, 15).unwrap(),
            NaiveDate::from_ymd_opt(2025, 9, 15).unwrap(),
        );
        assert_eq!(series.buckets.len(), 1);
        assert_eq!(series.trend_direction, "stable");
        assert_eq!(series.volatility, 0.0);
    }

    #[test]
    fn empty_buckets_are_kept_in_the_series() {
        let insights = vec![insight("2025-09-15", 6, "a"), insight("2025-09-17", 6, "b")];
        let series = trends(
            &insights,
            TrendMetric::InsightsCount,
            BucketSize::Day,
            NaiveDate::from_ymd_opt(2025, 9, 15).unwrap(),
            NaiveDate::from_ymd_opt(2025, 9, 17).unwrap(),
        );
        assert_eq!(series.buckets.len(), 3);
        assert_eq!(series.buckets[1].count, 0);
        assert_eq!(series.buckets[1].value, 0.0);
    }

    #[test]
    fn month_buckets_roll_over_year_end() {
        let series = trends(
            &[insight("2025-12-10", 6, "a"), insight("2026-01-05", 6, "b")],
            TrendMetric::InsightsCount,
            BucketSize::Month,
            NaiveDate::from_ymd_opt(2025, 12, 1).unwrap(),
            NaiveDate::from_ymd_opt(2026, 1, 31).unwrap(),
        );
        assert_eq!(series.buckets.len(), 2);
        assert_eq!(
            series.buckets[1].period_start,
            NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()
        );
    }

    #[test]
    fn market_leader_ties_break_lexicographically() {
        let mut a = insight("2025-09-20", 8, "a");
        a.competitors_mentioned = vec!["Westlaw".to_string()];
        let mut b = insight("2025-09-20", 6, "b");
        b.competitors_mentioned = vec!["Harvey".to_string()];

        let rollup = competitors(&[a, b], None, None);
        assert_eq!(rollup.competitors.len(), 2);
        assert_eq!(rollup.market_leader.as_deref(), Some("Harvey"));
    }

    #[test]
    fn competitor_rollup_tallies_sentiment_and_breakdowns() {
        let mut a = insight("2025-09-20", 8, "a");
        a.competitors_mentioned = vec!["Harvey".to_string()];
        a.sentiment = Some(Sentiment::Negative);
        a.feature_category = FeatureCategory::AiAnalysis;
        let mut b = insight("2025-09-21", 6, "b");
        b.competitors_mentioned = vec!["Harvey".to_string()];
        b.sentiment = Some(Sentiment::Positive);

        let rollup = competitors(&[a, b], None, None);
        let harvey = &rollup.competitors[0];
        assert_eq!(harvey.mentions, 2);
        assert!((harvey.avg_priority - 7.0).abs() < 1e-9);
        assert_eq!(harvey.sentiment.negative, 1);
        assert_eq!(harvey.sentiment.positive, 1);
        assert_eq!(harvey.by_category["ai_analysis"], 1);
    }

    #[test]
    fn sentiment_filter_narrows_the_rollup() {
        let mut a = insight("2025-09-20", 8, "a");
        a.competitors_mentioned = vec!["Harvey".to_string()];
        a.sentiment = Some(Sentiment::Negative);
        let mut b = insight("2025-09-21", 6, "b");
        b.competitors_mentioned = vec!["Casetext".to_string()];
        b.sentiment = Some(Sentiment::Positive);

        let rollup = competitors(&[a, b], None, Some(Sentiment::Negative));
        assert_eq!(rollup.competitors.len(), 1);
        assert_eq!(rollup.competitors[0].name, "Harvey");
    }

    #[test]
    fn insights_without_mentions_are_ignored() {
        let rollup = competitors(&[insight("2025-09-20", 8, "a")], None, None);
        assert!(rollup.competitors.is_empty());
        assert!(rollup.market_leader.is_none());
    }
}
