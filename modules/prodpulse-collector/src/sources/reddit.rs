// Reddit fetching: the PostSource adapter over reddit-client, and the
// strategy layer that browses listings, runs keyword searches, and unions
// the two.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use tracing::{info, warn};

use prodpulse_common::{
    content_hash, flatten_items, CollectorSettings, CrawlType, ItemKind, Platform, PulseError,
    RawPost,
};
use reddit_client::{ListingKind, RedditClient, RedditComment, RedditError, RedditPost};

use crate::change::ChangeDetector;
use crate::filter::RelevanceFilter;
use crate::sources::FetchReport;
use crate::traits::{CommentPage, FetchedComment, PostSource, RateLimited};
use crate::tree::CommentTreeCollector;

// ---------------------------------------------------------------------------
// PostSource adapter
// ---------------------------------------------------------------------------

pub struct RedditSource {
    client: RedditClient,
}

impl RedditSource {
    pub fn new(client: RedditClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PostSource for RedditSource {
    async fn listing_posts(&self, community: &str, tab: &str, limit: u32) -> Result<Vec<RawPost>> {
        let kind = ListingKind::ALL
            .into_iter()
            .find(|k| k.as_str() == tab)
            .ok_or_else(|| anyhow::anyhow!("unknown listing tab: {tab}"))?;
        let posts = self
            .client
            .listing(community, kind, limit)
            .await
            .map_err(wrap_reddit_err)?;
        Ok(posts.into_iter().map(convert_post).collect())
    }

    async fn search_posts(
        &self,
        community: &str,
        query: &str,
        limit: u32,
    ) -> Result<Vec<RawPost>> {
        let posts = self
            .client
            .search(community, query, limit)
            .await
            .map_err(wrap_reddit_err)?;
        Ok(posts.into_iter().map(convert_post).collect())
    }

    async fn top_comments(&self, post_id: &str, limit: u32) -> Result<CommentPage> {
        let comments = self
            .client
            .top_comments(post_id, limit)
            .await
            .map_err(wrap_reddit_err)?;
        Ok(comments.into_iter().map(convert_comment).collect())
    }

    async fn comment_replies(
        &self,
        post_id: &str,
        comment_id: &str,
        limit: u32,
    ) -> Result<CommentPage> {
        let comments = self
            .client
            .comment_replies(post_id, comment_id, limit)
            .await
            .map_err(wrap_reddit_err)?;
        Ok(comments.into_iter().map(convert_comment).collect())
    }
}

fn wrap_reddit_err(e: RedditError) -> anyhow::Error {
    match e {
        RedditError::RateLimited => anyhow::Error::new(RateLimited),
        // Timeouts and connection failures are transient; callers retry
        // once and then skip the affected source or subtree.
        RedditError::Network(msg) => anyhow::Error::new(PulseError::SourceUnavailable(msg)),
        other => anyhow::Error::new(other),
    }
}

fn epoch_to_utc(secs: f64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs as i64, 0).single().unwrap_or_default()
}

fn convert_post(p: RedditPost) -> RawPost {
    let text = format!("{}\n\n{}", p.title, p.selftext);
    RawPost {
        content_hash: content_hash(&text),
        id: p.id,
        platform: Platform::Reddit,
        subreddit: Some(p.subreddit),
        title: p.title,
        body: p.selftext,
        author: p.author.unwrap_or_else(|| "[deleted]".to_string()),
        created_at: epoch_to_utc(p.created_utc),
        score: p.score,
        upvote_ratio: p.upvote_ratio,
        num_comments: p.num_comments,
        url: format!("https://reddit.com{}", p.permalink),
        flair: p.link_flair_text,
        edited: p.edited.is_edited(),
        collected_at: Utc::now(),
        comments: Vec::new(),
    }
}

fn convert_comment(c: RedditComment) -> FetchedComment {
    FetchedComment {
        id: c.id,
        parent_id: c.parent_id,
        author: c.author.unwrap_or_else(|| "[deleted]".to_string()),
        body: c.body,
        score: c.score,
        created_at: epoch_to_utc(c.created_utc),
        is_submitter: c.is_submitter,
        permalink: format!("https://reddit.com{}", c.permalink),
    }
}

// ---------------------------------------------------------------------------
// Strategy layer
// ---------------------------------------------------------------------------

/// Browse-based and search-based collection over any PostSource, unioned
/// per the run's crawl type.
pub struct RedditFetcher<'a> {
    source: &'a dyn PostSource,
    settings: &'a CollectorSettings,
    filter: RelevanceFilter,
    change: &'a ChangeDetector,
}

impl<'a> RedditFetcher<'a> {
    pub fn new(
        source: &'a dyn PostSource,
        settings: &'a CollectorSettings,
        change: &'a ChangeDetector,
    ) -> Self {
        Self {
            source,
            settings,
            filter: RelevanceFilter::new(&settings.keywords, settings.always_include_author),
            change,
        }
    }

    /// Collect every configured subreddit. One subreddit failing is recorded
    /// and the rest continue.
    pub async fn fetch_all(&self, cancel: &AtomicBool) -> FetchReport {
        let mut report = FetchReport::default();
        let mut by_id: HashMap<String, RawPost> = HashMap::new();

        for subreddit in &self.settings.subreddits {
            if cancel.load(Ordering::Relaxed) {
                info!("cancellation requested, stopping reddit fetch");
                break;
            }

            if matches!(self.settings.crawl_type, CrawlType::Listing | CrawlType::Both) {
                self.crawl_listings(subreddit, &mut by_id, &mut report).await;
            }
            if matches!(self.settings.crawl_type, CrawlType::Search | CrawlType::Both) {
                self.search_keywords(subreddit, &mut by_id, &mut report).await;
            }
        }

        report.posts = by_id.into_values().collect();
        report
            .posts
            .sort_by(|a, b| b.created_at.cmp(&a.created_at));
        info!(
            posts = report.posts.len(),
            failures = report.failures.len(),
            "reddit fetch complete"
        );
        report
    }

    /// Browse the listing tabs, filter by window, score, relevance and
    /// change state, then expand each surviving post's comment tree.
    async fn crawl_listings(
        &self,
        subreddit: &str,
        by_id: &mut HashMap<String, RawPost>,
        report: &mut FetchReport,
    ) {
        let threshold = Utc::now() - Duration::days(self.settings.days_back as i64);

        for kind in ListingKind::ALL {
            let tab = kind.as_str();
            info!(subreddit, tab, "fetching listing posts");

            let posts = match self
                .source
                .listing_posts(subreddit, tab, self.settings.posts_per_listing)
                .await
            {
                Ok(posts) => posts,
                Err(e) => {
                    warn!(subreddit, tab, error = %e, "listing fetch failed, skipping");
                    report.failures.push(format!("r/{subreddit}/{tab}: {e}"));
                    continue;
                }
            };

            for post in posts {
                if by_id.contains_key(&post.id) {
                    continue;
                }
                if post.created_at < threshold {
                    continue;
                }
                if post.score < self.settings.min_post_score {
                    continue;
                }
                if !self.filter.is_relevant(&post.full_text()) {
                    continue;
                }
                if !self
                    .change
                    .is_changed(subreddit, &post.id, &post.full_text())
                    .await
                {
                    continue;
                }

                let post = self
                    .expand_tree(
                        post,
                        self.settings.comments_per_post,
                        self.settings.max_comment_depth,
                        report,
                    )
                    .await;
                self.record_items(subreddit, &post).await;
                by_id.insert(post.id.clone(), post);
            }
        }
    }

    /// Keyword search: results are pre-filtered by the query, so they skip
    /// the relevance gate; trees are clamped to one level to save calls.
    async fn search_keywords(
        &self,
        subreddit: &str,
        by_id: &mut HashMap<String, RawPost>,
        report: &mut FetchReport,
    ) {
        let scope = format!("{subreddit}_search");
        let search_depth = self.settings.max_comment_depth.min(1);

        for keyword in &self.settings.keywords {
            info!(subreddit, keyword, "searching keyword");

            let posts = match self
                .source
                .search_posts(subreddit, keyword, self.settings.search_limit)
                .await
            {
                Ok(posts) => posts,
                Err(e) => {
                    warn!(subreddit, keyword, error = %e, "search failed, skipping keyword");
                    report.failures.push(format!("r/{subreddit} q={keyword}: {e}"));
                    continue;
                }
            };

            for post in posts {
                if let Some(existing) = by_id.get_mut(&post.id) {
                    // Already collected by a listing or another keyword;
                    // nothing new to merge when trees came from the same post.
                    merge_comments(existing, post);
                    continue;
                }
                if !self.change.is_changed(&scope, &post.id, &post.full_text()).await {
                    continue;
                }

                let post = self
                    .expand_tree(
                        post,
                        self.settings.search_comments_limit,
                        search_depth,
                        report,
                    )
                    .await;
                self.record_items(&scope, &post).await;
                by_id.insert(post.id.clone(), post);
            }
        }
    }

    /// Remember fingerprints for the post and every collected comment so an
    /// unchanged thread can be skipped wholesale next run.
    async fn record_items(&self, scope: &str, post: &RawPost) {
        self.change.record(scope, &post.id, &post.full_text()).await;
        let comment_scope = format!("{scope}_comments");
        for item in flatten_items(post) {
            if item.kind == ItemKind::Comment {
                self.change.record(&comment_scope, &item.id, &item.body).await;
            }
        }
    }

    async fn expand_tree(
        &self,
        mut post: RawPost,
        top_limit: usize,
        max_depth: u32,
        report: &mut FetchReport,
    ) -> RawPost {
        let collector = CommentTreeCollector::new(self.source, &self.filter, self.settings);
        let outcome = collector.collect(&post.id, top_limit, max_depth).await;
        report.dropped_subtrees += outcome.dropped_subtrees;
        post.comments = outcome.comments;
        post
    }
}

/// Merge comments from a duplicate fetch of the same post, de-duplicated by
/// comment id.
fn merge_comments(existing: &mut RawPost, duplicate: RawPost) {
    let known: std::collections::HashSet<String> =
        existing.comments.iter().map(|c| c.id.clone()).collect();
    for comment in duplicate.comments {
        if !known.contains(&comment.id) {
            existing.comments.push(comment);
        }
    }
}
