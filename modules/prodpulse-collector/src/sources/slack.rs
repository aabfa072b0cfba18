// Slack channel-history fetcher. Messages become posts; thread replies are
// attached one level deep (Slack threads are flat).

use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::Deserialize;
use tracing::{info, warn};

use prodpulse_common::{content_hash, CollectorSettings, CommentNode, Platform, RawPost};

use crate::filter::RelevanceFilter;
use crate::sources::FetchReport;

const SLACK_API_URL: &str = "https://slack.com/api";

pub struct SlackSource {
    client: reqwest::Client,
    bot_token: String,
    channels: Vec<String>,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    messages: Vec<SlackMessage>,
}

#[derive(Debug, Clone, Deserialize)]
struct SlackMessage {
    #[serde(default)]
    ts: String,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    text: String,
    #[serde(default)]
    reply_count: Option<u32>,
}

impl SlackSource {
    pub fn new(bot_token: &str, channels: &[String]) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            bot_token: bot_token.to_string(),
            channels: channels.to_vec(),
            base_url: SLACK_API_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.to_string();
        self
    }

    /// Fetch every configured channel; a failing channel is recorded and
    /// the rest continue.
    pub async fn fetch_all(&self, settings: &CollectorSettings) -> FetchReport {
        let mut report = FetchReport::default();
        let filter = RelevanceFilter::new(&settings.keywords, settings.always_include_author);
        let oldest = Utc::now() - Duration::days(settings.days_back as i64);

        for channel in &self.channels {
            info!(channel, "slack: fetching channel history");
            match self.fetch_channel(channel, &oldest, &filter).await {
                Ok(mut posts) => report.posts.append(&mut posts),
                Err(e) => {
                    warn!(channel, error = %e, "slack channel fetch failed, skipping");
                    report.failures.push(format!("slack #{channel}: {e}"));
                }
            }
        }

        report
    }

    async fn fetch_channel(
        &self,
        channel: &str,
        oldest: &DateTime<Utc>,
        filter: &RelevanceFilter,
    ) -> Result<Vec<RawPost>> {
        let messages = self
            .call_history("conversations.history", channel, None, oldest)
            .await?;

        let mut posts = Vec::new();
        for msg in messages {
            if msg.text.is_empty() || !filter.is_relevant(&msg.text) {
                continue;
            }

            let mut post = convert_message(&msg, channel);
            if msg.reply_count.unwrap_or(0) > 0 {
                let replies = self
                    .call_history("conversations.replies", channel, Some(&msg.ts), oldest)
                    .await
                    .unwrap_or_else(|e| {
                        warn!(channel, ts = %msg.ts, error = %e, "thread fetch failed, keeping message without replies");
                        Vec::new()
                    });
                post.comments = replies
                    .iter()
                    // The parent message is echoed first in the thread.
                    .filter(|r| r.ts != msg.ts)
                    .map(|r| convert_reply(r, &msg.ts))
                    .collect();
                post.num_comments = post.comments.len() as u32;
            }
            posts.push(post);
        }

        Ok(posts)
    }

    async fn call_history(
        &self,
        method: &str,
        channel: &str,
        thread_ts: Option<&str>,
        oldest: &DateTime<Utc>,
    ) -> Result<Vec<SlackMessage>> {
        let mut query = vec![
            ("channel".to_string(), channel.to_string()),
            ("oldest".to_string(), format!("{}", oldest.timestamp())),
            ("limit".to_string(), "200".to_string()),
        ];
        if let Some(ts) = thread_ts {
            query.push(("ts".to_string(), ts.to_string()));
        }

        let resp = self
            .client
            .get(format!("{}/{}", self.base_url, method))
            .bearer_auth(&self.bot_token)
            .query(&query)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(anyhow!("slack API error ({status})"));
        }
        let history: HistoryResponse = resp.json().await?;
        if !history.ok {
            return Err(anyhow!(
                "slack API error: {}",
                history.error.unwrap_or_else(|| "unknown".to_string())
            ));
        }
        Ok(history.messages)
    }
}

fn ts_to_utc(ts: &str) -> DateTime<Utc> {
    let secs = ts.split('.').next().and_then(|s| s.parse::<i64>().ok());
    secs.and_then(|s| Utc.timestamp_opt(s, 0).single())
        .unwrap_or_else(Utc::now)
}

fn convert_message(msg: &SlackMessage, channel: &str) -> RawPost {
    RawPost {
        content_hash: content_hash(&msg.text),
        id: format!("{channel}-{}", msg.ts),
        platform: Platform::Slack,
        subreddit: Some(channel.to_string()),
        title: String::new(),
        body: msg.text.clone(),
        author: msg.user.clone().unwrap_or_else(|| "[unknown]".to_string()),
        created_at: ts_to_utc(&msg.ts),
        score: 0,
        upvote_ratio: None,
        num_comments: msg.reply_count.unwrap_or(0),
        url: format!("slack://channel/{channel}/{}", msg.ts),
        flair: None,
        edited: false,
        collected_at: Utc::now(),
        comments: Vec::new(),
    }
}

fn convert_reply(msg: &SlackMessage, parent_ts: &str) -> CommentNode {
    CommentNode {
        content_hash: content_hash(&msg.text),
        id: msg.ts.clone(),
        parent_id: Some(parent_ts.to_string()),
        author: msg.user.clone().unwrap_or_else(|| "[unknown]".to_string()),
        body: msg.text.clone(),
        score: 0,
        created_at: ts_to_utc(&msg.ts),
        depth: 0,
        is_submitter: false,
        permalink: String::new(),
        replies: Vec::new(),
    }
}
