// One collection run, end to end: fetch per platform (independent branches,
// merged at storage), archive the raw corpus, analyze each post, store the
// accepted insights. Failures isolate to their source, subtree or post;
// cancellation is honored between items so every completed write is whole.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use prodpulse_common::{
    count_comments, CollectorSettings, Insight, InsightId, Platform, RawPost,
};
use prodpulse_store::{InsightStore, PutOutcome, RawStore, RunRecordStore, WritePolicy};

use crate::change::ChangeDetector;
use crate::sources::{FetchReport, RedditFetcher, SlackSource, TwitterSource};
use crate::traits::{InsightExtractor, PostSource};

#[derive(Debug, Default, Clone, Serialize)]
pub struct RunStats {
    pub posts_collected: usize,
    pub comments_collected: usize,
    pub posts_analyzed: usize,
    pub insights_stored: usize,
    pub insights_suppressed: usize,
    pub insights_unchanged: usize,
    pub analysis_failures: usize,
    pub source_failures: Vec<String>,
    pub dropped_subtrees: u32,
    pub cancelled: bool,
}

impl std::fmt::Display for RunStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "posts={} comments={} analyzed={} stored={} suppressed={} unchanged={} analysis_failures={} source_failures={} dropped_subtrees={}{}",
            self.posts_collected,
            self.comments_collected,
            self.posts_analyzed,
            self.insights_stored,
            self.insights_suppressed,
            self.insights_unchanged,
            self.analysis_failures,
            self.source_failures.len(),
            self.dropped_subtrees,
            if self.cancelled { " (cancelled)" } else { "" }
        )
    }
}

/// Run result: stats plus the raw archive keys the run wrote.
#[derive(Debug, Default, Clone, Serialize)]
pub struct RunOutput {
    pub stats: RunStats,
    pub snapshot_keys: Vec<String>,
}

pub struct CollectorRun {
    settings: CollectorSettings,
    reddit: Option<Arc<dyn PostSource>>,
    twitter: Option<Arc<TwitterSource>>,
    slack: Option<Arc<SlackSource>>,
    extractor: Arc<dyn InsightExtractor>,
    insights: Arc<dyn InsightStore>,
    raw: Arc<dyn RawStore>,
    records: Option<Arc<dyn RunRecordStore>>,
    incremental: bool,
}

impl CollectorRun {
    pub fn new(
        settings: CollectorSettings,
        extractor: Arc<dyn InsightExtractor>,
        insights: Arc<dyn InsightStore>,
        raw: Arc<dyn RawStore>,
    ) -> Self {
        Self {
            settings,
            reddit: None,
            twitter: None,
            slack: None,
            extractor,
            insights,
            raw,
            records: None,
            incremental: false,
        }
    }

    pub fn with_reddit(mut self, source: Arc<dyn PostSource>) -> Self {
        self.reddit = Some(source);
        self
    }

    pub fn with_twitter(mut self, source: Arc<TwitterSource>) -> Self {
        self.twitter = Some(source);
        self
    }

    pub fn with_slack(mut self, source: Arc<SlackSource>) -> Self {
        self.slack = Some(source);
        self
    }

    pub fn with_records(mut self, records: Arc<dyn RunRecordStore>, incremental: bool) -> Self {
        self.records = Some(records);
        self.incremental = incremental;
        self
    }

    pub async fn run(&self, cancel: Arc<AtomicBool>) -> Result<RunOutput> {
        let mut output = RunOutput::default();
        let change = ChangeDetector::new(self.records.clone(), self.incremental);

        info!(
            crawl_type = %self.settings.crawl_type,
            subreddits = ?self.settings.subreddits,
            days_back = self.settings.days_back,
            "collection run starting"
        );

        // Platform branches are independent: no shared mutable state, each
        // rate-limit-compliant on its own, merged only at the storage step.
        let reddit_branch = async {
            let source = self.reddit.as_ref()?;
            let fetcher = RedditFetcher::new(source.as_ref(), &self.settings, &change);
            Some((Platform::Reddit, fetcher.fetch_all(&cancel).await))
        };
        let twitter_branch = async {
            let source = self.twitter.as_ref()?;
            Some((Platform::Twitter, source.fetch_all(&self.settings).await))
        };
        let slack_branch = async {
            let source = self.slack.as_ref()?;
            Some((Platform::Slack, source.fetch_all(&self.settings).await))
        };

        let (reddit, twitter, slack) = tokio::join!(reddit_branch, twitter_branch, slack_branch);

        let mut all_posts: Vec<RawPost> = Vec::new();
        for (platform, report) in [reddit, twitter, slack].into_iter().flatten() {
            self.archive_snapshot(platform, &report, &mut output).await;
            output.stats.dropped_subtrees += report.dropped_subtrees;
            output.stats.source_failures.extend(report.failures);
            all_posts.extend(report.posts);
        }

        output.stats.posts_collected = all_posts.len();
        output.stats.comments_collected = all_posts
            .iter()
            .map(|p| count_comments(&p.comments))
            .sum();

        let policy = WritePolicy::from(&self.settings);
        for post in &all_posts {
            if cancel.load(Ordering::Relaxed) {
                info!("cancellation requested, stopping before next analysis");
                break;
            }
            self.analyze_and_store(post, &policy, &mut output.stats).await;
        }
        // A cancel during the fetch stage also counts; the flag is what
        // decides whether the execution reports ABORTED.
        output.stats.cancelled = cancel.load(Ordering::Relaxed);

        info!("collection run complete. {}", output.stats);
        Ok(output)
    }

    /// Archive one platform's corpus as a dated immutable blob. A failed
    /// archive write is logged, not fatal — the insights still flow.
    async fn archive_snapshot(
        &self,
        platform: Platform,
        report: &FetchReport,
        output: &mut RunOutput,
    ) {
        if report.posts.is_empty() && report.failures.is_empty() {
            return;
        }
        let body = json!({
            "collected_at": Utc::now(),
            "config": {
                "subreddits": self.settings.subreddits,
                "keywords": self.settings.keywords,
                "crawl_type": self.settings.crawl_type,
                "days_back": self.settings.days_back,
                "min_score": self.settings.min_post_score,
            },
            "posts_count": report.posts.len(),
            "comments_count": report.posts.iter().map(|p| count_comments(&p.comments)).sum::<usize>(),
            "failures": report.failures,
            "posts": report.posts,
        });

        match self.raw.put_snapshot(platform, &body).await {
            Ok(key) => {
                info!(%platform, key, "raw snapshot archived");
                output.snapshot_keys.push(key);
            }
            Err(e) => {
                warn!(%platform, error = %e, "failed to archive raw snapshot");
            }
        }
    }

    async fn analyze_and_store(
        &self,
        post: &RawPost,
        policy: &WritePolicy,
        stats: &mut RunStats,
    ) {
        let fields = match self.extractor.extract(post).await {
            Ok(fields) => fields,
            Err(e) => {
                warn!(post_id = %post.id, error = %e, "analysis failed, skipping post");
                stats.analysis_failures += 1;
                return;
            }
        };
        stats.posts_analyzed += 1;

        let analyzed_at = Utc::now();
        let insight_id = match InsightId::new(
            analyzed_at.date_naive(),
            fields.priority_score,
            &post.id,
        ) {
            Ok(id) => id,
            Err(e) => {
                warn!(post_id = %post.id, error = %e, "cannot build insight key, skipping");
                stats.analysis_failures += 1;
                return;
            }
        };

        let insight = Insight {
            insight_id: insight_id.to_string(),
            source_type: post.platform,
            source_post_id: post.id.clone(),
            source_url: post.url.clone(),
            subreddit: post.subreddit.clone(),
            feature_summary: fields.feature_summary,
            feature_category: fields.feature_category,
            user_segment: fields.user_segment,
            priority_score: fields.priority_score,
            competitors_mentioned: fields.competitors_mentioned,
            action_required: fields.action_required,
            suggested_action: fields.suggested_action,
            pain_points: fields.pain_points,
            sentiment: fields.sentiment,
            post_score: post.score,
            num_comments: count_comments(&post.comments) as u32,
            analyzed_at,
            collected_at: post.collected_at,
            ttl: 0, // stamped by the store at write time
        };

        match self.insights.put(insight, policy).await {
            Ok(PutOutcome::Stored) => stats.insights_stored += 1,
            Ok(PutOutcome::Suppressed) => stats.insights_suppressed += 1,
            Ok(PutOutcome::Unchanged) => stats.insights_unchanged += 1,
            Err(e) => {
                warn!(post_id = %post.id, error = %e, "insight write failed");
                stats.analysis_failures += 1;
            }
        }
    }
}
