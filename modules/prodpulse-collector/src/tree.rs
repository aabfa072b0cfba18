// Bounded comment tree expansion. Depth and branching are hard caps:
// branches past the reply cap and levels past the depth cap are dropped
// whole, never flattened into the parent.

use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use rand::Rng;
use tracing::{debug, warn};

use prodpulse_common::{content_hash, CollectorSettings, CommentNode};

use crate::filter::RelevanceFilter;
use crate::traits::{CommentPage, FetchedComment, PostSource, RateLimited};

/// Fixed backoff applied once when the platform rate-limits a call.
const RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(60);

/// Jittered inter-call delay bounds.
const REQUEST_DELAY_MIN: Duration = Duration::from_millis(100);
const REQUEST_DELAY_MAX: Duration = Duration::from_millis(1000);

/// A collected reply forest plus how many subtrees were dropped to
/// transient platform failures. Partial trees are normal output, not errors.
#[derive(Debug, Default)]
pub struct TreeOutcome {
    pub comments: Vec<CommentNode>,
    pub dropped_subtrees: u32,
}

pub struct CommentTreeCollector<'a> {
    source: &'a dyn PostSource,
    filter: &'a RelevanceFilter,
    settings: &'a CollectorSettings,
    rate_limit_backoff: Duration,
    request_delay: (Duration, Duration),
}

impl<'a> CommentTreeCollector<'a> {
    pub fn new(
        source: &'a dyn PostSource,
        filter: &'a RelevanceFilter,
        settings: &'a CollectorSettings,
    ) -> Self {
        Self {
            source,
            filter,
            settings,
            rate_limit_backoff: RATE_LIMIT_BACKOFF,
            request_delay: (REQUEST_DELAY_MIN, REQUEST_DELAY_MAX),
        }
    }

    /// Disable sleeps. Test builds only.
    #[cfg(any(test, feature = "test-support"))]
    pub fn without_delays(mut self) -> Self {
        self.rate_limit_backoff = Duration::ZERO;
        self.request_delay = (Duration::ZERO, Duration::ZERO);
        self
    }

    /// Collect the bounded reply forest for one post. `max_depth` is passed
    /// in because keyword-search results are clamped to one level.
    pub async fn collect(&self, post_id: &str, top_limit: usize, max_depth: u32) -> TreeOutcome {
        let mut outcome = TreeOutcome::default();

        let Some(top) = self
            .fetch_with_backoff(|| self.source.top_comments(post_id, top_limit as u32))
            .await
        else {
            warn!(post_id, "top-level comment fetch failed, returning empty tree");
            outcome.dropped_subtrees += 1;
            return outcome;
        };

        for comment in top.into_iter().take(top_limit) {
            if comment.score < self.settings.min_comment_score {
                continue;
            }
            if !self.filter.keep_comment(&comment.body, comment.is_submitter) {
                continue;
            }
            let node = self
                .expand(post_id, comment, 0, max_depth, &mut outcome.dropped_subtrees)
                .await;
            outcome.comments.push(node);
        }

        outcome
    }

    /// Build a node and, below the depth cap, its replies. Recursion is
    /// boxed; depth is bounded by configuration, not by the input.
    fn expand<'b>(
        &'b self,
        post_id: &'b str,
        comment: FetchedComment,
        depth: u32,
        max_depth: u32,
        dropped: &'b mut u32,
    ) -> BoxFuture<'b, CommentNode> {
        async move {
            let mut node = CommentNode {
                content_hash: content_hash(&comment.body),
                id: comment.id,
                parent_id: comment.parent_id,
                author: comment.author,
                body: comment.body,
                score: comment.score,
                created_at: comment.created_at,
                depth,
                is_submitter: comment.is_submitter,
                permalink: comment.permalink,
                replies: Vec::new(),
            };

            if depth >= max_depth {
                return node;
            }

            self.pause_between_calls().await;

            let Some(replies) = self
                .fetch_with_backoff(|| {
                    self.source
                        .comment_replies(post_id, &node.id, self.settings.max_replies_per_comment as u32)
                })
                .await
            else {
                warn!(post_id, comment_id = %node.id, "reply fetch failed, keeping partial tree");
                *dropped += 1;
                return node;
            };

            for reply in replies
                .into_iter()
                .take(self.settings.max_replies_per_comment)
            {
                // Nested replies get a 3-point score allowance and, with
                // preserve_context on, skip the keyword gate entirely.
                if reply.score < self.settings.min_comment_score - 3 {
                    continue;
                }
                if !self.settings.preserve_context
                    && !self.filter.keep_comment(&reply.body, reply.is_submitter)
                {
                    continue;
                }
                let child = self
                    .expand(post_id, reply, depth + 1, max_depth, dropped)
                    .await;
                node.replies.push(child);
            }

            node
        }
        .boxed()
    }

    /// Run a platform call with the documented retry policy: one retry,
    /// preceded by the fixed backoff when the failure was a rate limit.
    /// `None` means the subtree is dropped and the run continues.
    async fn fetch_with_backoff<F, Fut>(&self, call: F) -> Option<CommentPage>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = anyhow::Result<CommentPage>>,
    {
        match call().await {
            Ok(page) => Some(page),
            Err(first) => {
                if first.downcast_ref::<RateLimited>().is_some() {
                    debug!(
                        backoff_secs = self.rate_limit_backoff.as_secs(),
                        "rate limited, backing off before retry"
                    );
                    tokio::time::sleep(self.rate_limit_backoff).await;
                }
                match call().await {
                    Ok(page) => Some(page),
                    Err(second) => {
                        warn!(error = %second, "comment fetch failed after retry");
                        None
                    }
                }
            }
        }
    }

    async fn pause_between_calls(&self) {
        let (min, max) = self.request_delay;
        if max.is_zero() {
            return;
        }
        let millis = rand::rng().random_range(min.as_millis() as u64..=max.as_millis() as u64);
        tokio::time::sleep(Duration::from_millis(millis)).await;
    }
}
