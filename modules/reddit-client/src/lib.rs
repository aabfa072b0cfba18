pub mod error;
pub mod types;

pub use error::{RedditError, Result};
pub use types::{Edited, Listing, RedditComment, RedditPost, Replies, Thing};

use serde::de::DeserializeOwned;

const BASE_URL: &str = "https://www.reddit.com";

/// Listing tabs a subreddit can be browsed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingKind {
    Hot,
    New,
    Rising,
    Top,
}

impl ListingKind {
    pub const ALL: [ListingKind; 4] = [
        ListingKind::Hot,
        ListingKind::New,
        ListingKind::Rising,
        ListingKind::Top,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ListingKind::Hot => "hot",
            ListingKind::New => "new",
            ListingKind::Rising => "rising",
            ListingKind::Top => "top",
        }
    }
}

/// Read-only client for the public Reddit JSON endpoints.
pub struct RedditClient {
    client: reqwest::Client,
    user_agent: String,
    base_url: String,
}

impl RedditClient {
    pub fn new(user_agent: &str) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            user_agent: user_agent.to_string(),
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.to_string();
        self
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        tracing::debug!(url, "reddit request");
        let resp = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .send()
            .await?;

        let status = resp.status();
        if status.as_u16() == 429 {
            return Err(RedditError::RateLimited);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RedditError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let value: serde_json::Value = resp.json().await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Fetch posts from a subreddit listing tab. `top` is scoped to the past
    /// week to stay within the collection window.
    pub async fn listing(
        &self,
        subreddit: &str,
        kind: ListingKind,
        limit: u32,
    ) -> Result<Vec<RedditPost>> {
        let mut url = format!(
            "{}/r/{}/{}.json?limit={}&raw_json=1",
            self.base_url,
            subreddit,
            kind.as_str(),
            limit
        );
        if kind == ListingKind::Top {
            url.push_str("&t=week");
        }

        let listing: Listing<RedditPost> = self.get_json(&url).await?;
        Ok(listing.data.children.into_iter().map(|t| t.data).collect())
    }

    /// Search a subreddit for a keyword, relevance-sorted, past week.
    pub async fn search(&self, subreddit: &str, query: &str, limit: u32) -> Result<Vec<RedditPost>> {
        let url = format!(
            "{}/r/{}/search.json?q={}&restrict_sr=1&sort=relevance&t=week&limit={}&raw_json=1",
            self.base_url,
            subreddit,
            urlencode(query),
            limit
        );

        let listing: Listing<RedditPost> = self.get_json(&url).await?;
        Ok(listing.data.children.into_iter().map(|t| t.data).collect())
    }

    /// Top-level comments for a post, one level deep. The response is a
    /// two-element array: the post listing, then the comment listing.
    pub async fn top_comments(&self, post_id: &str, limit: u32) -> Result<Vec<RedditComment>> {
        let url = format!(
            "{}/comments/{}.json?limit={}&depth=1&raw_json=1",
            self.base_url, post_id, limit
        );

        let listings: Vec<Listing<serde_json::Value>> = self.get_json(&url).await?;
        let Some(comments) = listings.into_iter().nth(1) else {
            return Ok(Vec::new());
        };
        Ok(decode_comments(&comments))
    }

    /// Direct replies to one comment, one level deep.
    pub async fn comment_replies(
        &self,
        post_id: &str,
        comment_id: &str,
        limit: u32,
    ) -> Result<Vec<RedditComment>> {
        let url = format!(
            "{}/comments/{}/_/{}.json?limit={}&depth=1&raw_json=1",
            self.base_url, post_id, comment_id, limit
        );

        let listings: Vec<Listing<serde_json::Value>> = self.get_json(&url).await?;
        let Some(thread) = listings.into_iter().nth(1) else {
            return Ok(Vec::new());
        };
        // The focused comment is the single child; its replies are the result.
        let focused = decode_comments(&thread);
        Ok(focused
            .into_iter()
            .next()
            .map(|c| c.replies.comments())
            .unwrap_or_default())
    }
}

fn decode_comments(listing: &Listing<serde_json::Value>) -> Vec<RedditComment> {
    listing
        .data
        .children
        .iter()
        .filter(|t| t.kind == "t1")
        .filter_map(|t| serde_json::from_value(t.data.clone()).ok())
        .collect()
}

fn urlencode(s: &str) -> String {
    s.bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                (b as char).to_string()
            }
            b' ' => "+".to_string(),
            _ => format!("%{b:02X}"),
        })
        .collect()
}
