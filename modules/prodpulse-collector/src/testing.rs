// Test mocks for the collection pipeline.
//
// Two mocks matching the two trait boundaries:
// - MockSource (PostSource) — HashMap-based listings, searches, and comment
//   pages, with registerable failures and a rate-limit-then-succeed mode
// - MockExtractor (InsightExtractor) — fixed fields per post id
//
// Plus small builders for RawPost and FetchedComment fixtures.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;

use prodpulse_common::{
    content_hash, FeatureCategory, InsightFields, Platform, RawPost, UserSegment,
};

use crate::traits::{CommentPage, FetchedComment, InsightExtractor, PostSource, RateLimited};

// ---------------------------------------------------------------------------
// Fixture builders
// ---------------------------------------------------------------------------

pub fn raw_post(id: &str, subreddit: &str, title: &str, body: &str, score: i64) -> RawPost {
    let text = format!("{title}\n\n{body}");
    RawPost {
        id: id.to_string(),
        platform: Platform::Reddit,
        subreddit: Some(subreddit.to_string()),
        title: title.to_string(),
        body: body.to_string(),
        author: "author".to_string(),
        created_at: Utc::now(),
        score,
        upvote_ratio: Some(0.9),
        num_comments: 0,
        url: format!("https://reddit.com/r/{subreddit}/comments/{id}"),
        flair: None,
        edited: false,
        collected_at: Utc::now(),
        content_hash: content_hash(&text),
        comments: Vec::new(),
    }
}

pub fn fetched_comment(id: &str, body: &str, score: i64) -> FetchedComment {
    FetchedComment {
        id: id.to_string(),
        parent_id: None,
        author: "commenter".to_string(),
        body: body.to_string(),
        score,
        created_at: Utc::now(),
        is_submitter: false,
        permalink: format!("/comments/_/{id}"),
    }
}

pub fn insight_fields(priority: u8) -> InsightFields {
    InsightFields {
        feature_summary: "test summary".to_string(),
        feature_category: FeatureCategory::Other,
        user_segment: UserSegment::Unknown,
        priority_score: priority,
        competitors_mentioned: Vec::new(),
        action_required: false,
        suggested_action: String::new(),
        pain_points: Vec::new(),
        sentiment: None,
    }
}

// ---------------------------------------------------------------------------
// MockSource
// ---------------------------------------------------------------------------

/// HashMap-based post source. Unregistered lookups return empty pages;
/// failures have to be registered explicitly.
#[derive(Default)]
pub struct MockSource {
    listings: HashMap<(String, String), Vec<RawPost>>,
    searches: HashMap<(String, String), Vec<RawPost>>,
    top_comments: HashMap<String, CommentPage>,
    replies: HashMap<(String, String), CommentPage>,
    failing_listings: Vec<(String, String)>,
    failing_replies: Vec<(String, String)>,
    rate_limited_once: Mutex<HashMap<(String, String), (u32, CommentPage)>>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_listing_posts(mut self, community: &str, tab: &str, posts: Vec<RawPost>) -> Self {
        self.listings
            .insert((community.to_string(), tab.to_string()), posts);
        self
    }

    pub fn with_search_posts(mut self, community: &str, query: &str, posts: Vec<RawPost>) -> Self {
        self.searches
            .insert((community.to_string(), query.to_string()), posts);
        self
    }

    pub fn with_top_comments(mut self, post_id: &str, comments: Vec<FetchedComment>) -> Self {
        self.top_comments.insert(post_id.to_string(), comments);
        self
    }

    pub fn with_replies(
        mut self,
        post_id: &str,
        comment_id: &str,
        replies: Vec<FetchedComment>,
    ) -> Self {
        self.replies
            .insert((post_id.to_string(), comment_id.to_string()), replies);
        self
    }

    pub fn with_failing_listing(mut self, community: &str, tab: &str) -> Self {
        self.failing_listings
            .push((community.to_string(), tab.to_string()));
        self
    }

    pub fn with_failing_replies(mut self, post_id: &str, comment_id: &str) -> Self {
        self.failing_replies
            .push((post_id.to_string(), comment_id.to_string()));
        self
    }

    /// First reply fetch for this comment returns a rate-limit error, the
    /// retry succeeds with the given page.
    pub fn with_rate_limited_then_ok(
        self,
        post_id: &str,
        comment_id: &str,
        replies: CommentPage,
    ) -> Self {
        self.rate_limited_once
            .lock()
            .unwrap()
            .insert((post_id.to_string(), comment_id.to_string()), (0, replies));
        self
    }
}

#[async_trait]
impl PostSource for MockSource {
    async fn listing_posts(&self, community: &str, tab: &str, _limit: u32) -> Result<Vec<RawPost>> {
        let key = (community.to_string(), tab.to_string());
        if self.failing_listings.contains(&key) {
            return Err(anyhow!("MockSource: listing failure for r/{community}/{tab}"));
        }
        Ok(self.listings.get(&key).cloned().unwrap_or_default())
    }

    async fn search_posts(
        &self,
        community: &str,
        query: &str,
        _limit: u32,
    ) -> Result<Vec<RawPost>> {
        let key = (community.to_string(), query.to_string());
        Ok(self.searches.get(&key).cloned().unwrap_or_default())
    }

    async fn top_comments(&self, post_id: &str, _limit: u32) -> Result<CommentPage> {
        Ok(self.top_comments.get(post_id).cloned().unwrap_or_default())
    }

    async fn comment_replies(
        &self,
        post_id: &str,
        comment_id: &str,
        _limit: u32,
    ) -> Result<CommentPage> {
        let key = (post_id.to_string(), comment_id.to_string());
        if self.failing_replies.contains(&key) {
            return Err(anyhow!(
                "MockSource: reply failure for {post_id}/{comment_id}"
            ));
        }
        let mut limited = self.rate_limited_once.lock().unwrap();
        if let Some((attempts, page)) = limited.get_mut(&key) {
            *attempts += 1;
            if *attempts == 1 {
                return Err(anyhow::Error::new(RateLimited));
            }
            return Ok(page.clone());
        }
        Ok(self.replies.get(&key).cloned().unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// MockExtractor
// ---------------------------------------------------------------------------

/// Fixed-output extractor. Per-post fields, a default priority for the rest,
/// and registerable failures.
pub struct MockExtractor {
    per_post: HashMap<String, InsightFields>,
    failing: Vec<String>,
    default_priority: u8,
    calls: Mutex<Vec<String>>,
}

impl MockExtractor {
    pub fn new() -> Self {
        Self {
            per_post: HashMap::new(),
            failing: Vec::new(),
            default_priority: 6,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_fields(mut self, post_id: &str, fields: InsightFields) -> Self {
        self.per_post.insert(post_id.to_string(), fields);
        self
    }

    pub fn with_default_priority(mut self, priority: u8) -> Self {
        self.default_priority = priority;
        self
    }

    pub fn failing_for(mut self, post_id: &str) -> Self {
        self.failing.push(post_id.to_string());
        self
    }

    /// Post ids this extractor has been asked to analyze, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for MockExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InsightExtractor for MockExtractor {
    async fn extract(&self, post: &RawPost) -> Result<InsightFields> {
        self.calls.lock().unwrap().push(post.id.clone());
        if self.failing.contains(&post.id) {
            return Err(anyhow!("MockExtractor: analysis failure for {}", post.id));
        }
        Ok(self
            .per_post
            .get(&post.id)
            .cloned()
            .unwrap_or_else(|| insight_fields(self.default_priority)))
    }
}
