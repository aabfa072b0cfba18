// Trait abstractions for the collection pipeline.
//
// PostSource puts all platform reads behind one seam: listings, keyword
// search, and the two comment-tree calls the tree collector needs.
// InsightExtractor is the opaque AI stage.
//
// Both enable deterministic testing with MockSource and MockExtractor:
// no network, no credentials, no sleeps.

use anyhow::Result;
use async_trait::async_trait;

use prodpulse_common::{InsightFields, RawPost};

/// Marker error for platform rate limiting. Implementations surface it
/// through anyhow so the tree collector can downcast and apply its backoff.
#[derive(Debug, thiserror::Error)]
#[error("rate limited")]
pub struct RateLimited;

/// A page of comments fetched for one parent (post or comment).
pub type CommentPage = Vec<FetchedComment>;

/// A comment as returned by a platform, before tree assembly.
#[derive(Debug, Clone)]
pub struct FetchedComment {
    pub id: String,
    pub parent_id: Option<String>,
    pub author: String,
    pub body: String,
    pub score: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub is_submitter: bool,
    pub permalink: String,
}

/// Read-only access to one content platform.
#[async_trait]
pub trait PostSource: Send + Sync {
    /// Browse a community's listing tab (hot/new/rising/top style).
    async fn listing_posts(&self, community: &str, tab: &str, limit: u32) -> Result<Vec<RawPost>>;

    /// Keyword search within a community.
    async fn search_posts(&self, community: &str, query: &str, limit: u32)
        -> Result<Vec<RawPost>>;

    /// Top-level comments of a post, in platform order.
    async fn top_comments(&self, post_id: &str, limit: u32) -> Result<CommentPage>;

    /// Direct replies to one comment, in platform order.
    async fn comment_replies(
        &self,
        post_id: &str,
        comment_id: &str,
        limit: u32,
    ) -> Result<CommentPage>;
}

/// The AI analysis stage, treated as opaque: content in, structured insight
/// fields out. Inline and queued implementations look the same from here.
#[async_trait]
pub trait InsightExtractor: Send + Sync {
    async fn extract(&self, post: &RawPost) -> Result<InsightFields>;
}
