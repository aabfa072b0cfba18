// Twitter recent-search fetcher. Posts only — Twitter threads are not
// expanded into comment trees; the keyword query pre-filters relevance.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tracing::{info, warn};

use prodpulse_common::{content_hash, CollectorSettings, Platform, RawPost};

use crate::sources::FetchReport;

const SEARCH_URL: &str = "https://api.twitter.com/2/tweets/search/recent";

pub struct TwitterSource {
    client: reqwest::Client,
    bearer_token: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<Tweet>,
    #[serde(default)]
    includes: Option<Includes>,
}

#[derive(Debug, Deserialize)]
struct Includes {
    #[serde(default)]
    users: Vec<TweetUser>,
}

#[derive(Debug, Deserialize)]
struct TweetUser {
    id: String,
    username: String,
}

#[derive(Debug, Deserialize)]
struct Tweet {
    id: String,
    text: String,
    #[serde(default)]
    author_id: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    public_metrics: Option<TweetMetrics>,
}

#[derive(Debug, Deserialize, Default)]
struct TweetMetrics {
    #[serde(default)]
    like_count: i64,
    #[serde(default)]
    reply_count: u32,
}

impl TwitterSource {
    pub fn new(bearer_token: &str) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            bearer_token: bearer_token.to_string(),
            base_url: SEARCH_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.to_string();
        self
    }

    /// One query per keyword over the collection window; failures are
    /// isolated per keyword.
    pub async fn fetch_all(&self, settings: &CollectorSettings) -> FetchReport {
        let mut report = FetchReport::default();
        let start_time = Utc::now() - Duration::days(settings.days_back as i64);

        for keyword in &settings.keywords {
            info!(keyword, "twitter: searching recent tweets");
            match self.search(keyword, &start_time, settings.search_limit).await {
                Ok(mut posts) => report.posts.append(&mut posts),
                Err(e) => {
                    warn!(keyword, error = %e, "twitter search failed, skipping keyword");
                    report.failures.push(format!("twitter q={keyword}: {e}"));
                }
            }
        }

        // Keywords overlap; keep one post per tweet id.
        report.posts.sort_by(|a, b| a.id.cmp(&b.id));
        report.posts.dedup_by(|a, b| a.id == b.id);
        report
    }

    async fn search(
        &self,
        keyword: &str,
        start_time: &DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<RawPost>> {
        let resp = self
            .client
            .get(&self.base_url)
            .bearer_auth(&self.bearer_token)
            .query(&[
                ("query", format!("{keyword} -is:retweet lang:en")),
                ("max_results", limit.clamp(10, 100).to_string()),
                ("start_time", start_time.to_rfc3339()),
                ("tweet.fields", "created_at,public_metrics,author_id".to_string()),
                ("expansions", "author_id".to_string()),
                ("user.fields", "username".to_string()),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!("twitter API error ({status}): {body}"));
        }

        let search: SearchResponse = resp.json().await?;
        let users = search
            .includes
            .map(|i| i.users)
            .unwrap_or_default();

        Ok(search
            .data
            .into_iter()
            .map(|t| convert_tweet(t, &users))
            .collect())
    }
}

fn convert_tweet(t: Tweet, users: &[TweetUser]) -> RawPost {
    let author = t
        .author_id
        .as_deref()
        .and_then(|id| users.iter().find(|u| u.id == id))
        .map(|u| u.username.clone())
        .unwrap_or_else(|| "[unknown]".to_string());
    let metrics = t.public_metrics.unwrap_or_default();

    RawPost {
        content_hash: content_hash(&t.text),
        url: format!("https://twitter.com/{author}/status/{}", t.id),
        id: t.id,
        platform: Platform::Twitter,
        subreddit: None,
        title: String::new(),
        body: t.text,
        author,
        created_at: t.created_at.unwrap_or_else(Utc::now),
        score: metrics.like_count,
        upvote_ratio: None,
        num_comments: metrics.reply_count,
        flair: None,
        edited: false,
        collected_at: Utc::now(),
        comments: Vec::new(),
    }
}
