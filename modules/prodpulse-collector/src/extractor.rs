// AI insight extraction via the Anthropic messages API. The pipeline only
// sees the InsightExtractor trait, so this stage can be swapped for a queued
// worker or a mock without touching anything else.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use prodpulse_common::{
    FeatureCategory, InsightFields, PulseError, RawPost, Sentiment, UserSegment,
};

use crate::traits::InsightExtractor;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-sonnet-4-5";

/// Comments included in the prompt context.
const PROMPT_COMMENT_LIMIT: usize = 10;
/// Body excerpt length per comment.
const PROMPT_COMMENT_EXCERPT: usize = 200;

pub struct ClaudeExtractor {
    api_key: String,
    http: reqwest::Client,
    base_url: String,
    model: String,
}

impl ClaudeExtractor {
    pub fn new(api_key: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(60))
                .build()
                .unwrap_or_default(),
            base_url: ANTHROPIC_API_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.to_string();
        self
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_str(&self.api_key)?);
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: String,
}

#[async_trait]
impl InsightExtractor for ClaudeExtractor {
    async fn extract(&self, post: &RawPost) -> Result<InsightFields> {
        let prompt = build_prompt(post);
        let url = format!("{}/messages", self.base_url);

        debug!(post_id = %post.id, model = %self.model, "insight extraction request");

        let response = self
            .http
            .post(&url)
            .headers(self.headers()?)
            .json(&json!({
                "model": self.model,
                "max_tokens": 1024,
                "messages": [{"role": "user", "content": prompt}],
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            return Err(anyhow!("Anthropic API error ({}): {}", status, error_text));
        }

        let parsed: MessagesResponse = response.json().await?;
        let text = parsed
            .content
            .iter()
            .find(|b| b.block_type == "text")
            .map(|b| b.text.as_str())
            .ok_or_else(|| anyhow!("No text block in model response"))?;

        parse_analysis(text)
    }
}

/// Assemble the analysis prompt from the post and its top comments.
fn build_prompt(post: &RawPost) -> String {
    let comments_text: String = post
        .comments
        .iter()
        .take(PROMPT_COMMENT_LIMIT)
        .map(|c| {
            let body: String = c.body.chars().take(PROMPT_COMMENT_EXCERPT).collect();
            format!("- {} ({} points): {}\n", c.author, c.score, body)
        })
        .collect();

    format!(
        r#"You are a product analyst for a legal-tech company. Analyze this community post and respond with ONLY a JSON object, no prose.

Post title: {title}
Post body: {body}
Platform: {platform}
Score: {score}

Top comments:
{comments}

Respond with this JSON shape:
{{
  "feature_summary": "one-sentence summary of the product signal",
  "feature_category": "document_automation|workflow_management|research_tools|billing_timekeeping|client_communication|data_security|integrations|ai_analysis|other",
  "user_segment": "solo_practitioner|small_firm|mid_firm|large_firm|in_house|legal_ops|paralegal|unknown",
  "priority_score": 0-10,
  "competitors_mentioned": ["names"],
  "action_required": true|false,
  "suggested_action": "what the product team should do",
  "pain_points": ["specific pain points"],
  "sentiment": "positive|negative|neutral"
}}"#,
        title = post.title,
        body = post.body,
        platform = post.platform,
        score = post.score,
        comments = comments_text,
    )
}

/// Decode the model's JSON reply, tolerating markdown fences, and coerce it
/// into the closed enums.
fn parse_analysis(text: &str) -> Result<InsightFields> {
    #[derive(Deserialize)]
    struct RawAnalysis {
        #[serde(default)]
        feature_summary: String,
        #[serde(default)]
        feature_category: String,
        #[serde(default)]
        user_segment: String,
        #[serde(default)]
        priority_score: i64,
        #[serde(default)]
        competitors_mentioned: Vec<String>,
        #[serde(default)]
        action_required: bool,
        #[serde(default)]
        suggested_action: String,
        #[serde(default)]
        pain_points: Vec<String>,
        #[serde(default)]
        sentiment: Option<String>,
    }

    let trimmed = strip_fences(text);
    let raw: RawAnalysis = serde_json::from_str(trimmed)
        .map_err(|e| PulseError::Extraction(format!("model returned unparseable analysis: {e}")))?;

    Ok(InsightFields {
        feature_summary: raw.feature_summary,
        feature_category: FeatureCategory::from_str_loose(&raw.feature_category),
        user_segment: UserSegment::from_str_loose(&raw.user_segment),
        priority_score: raw.priority_score.clamp(0, 10) as u8,
        competitors_mentioned: raw.competitors_mentioned,
        action_required: raw.action_required,
        suggested_action: raw.suggested_action,
        pain_points: raw.pain_points,
        sentiment: raw.sentiment.as_deref().and_then(Sentiment::from_str_loose),
    })
}

fn strip_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let trimmed = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    trimmed.strip_suffix("```").unwrap_or(trimmed).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use prodpulse_common::Platform;

    #[test]
    fn parses_plain_json_analysis() {
        let fields = parse_analysis(
            r#"{"feature_summary": "wants automated demand letters",
                "feature_category": "document_automation",
                "user_segment": "small_firm",
                "priority_score": 8,
                "competitors_mentioned": ["Harvey"],
                "action_required": true,
                "suggested_action": "prioritize demand letter templates",
                "pain_points": ["manual drafting"],
                "sentiment": "negative"}"#,
        )
        .unwrap();

        assert_eq!(fields.feature_category, FeatureCategory::DocumentAutomation);
        assert_eq!(fields.user_segment, UserSegment::SmallFirm);
        assert_eq!(fields.priority_score, 8);
        assert_eq!(fields.competitors_mentioned, vec!["Harvey"]);
        assert_eq!(fields.sentiment, Some(Sentiment::Negative));
    }

    #[test]
    fn parses_fenced_json_and_clamps_priority() {
        let fields = parse_analysis(
            "```json\n{\"feature_summary\": \"s\", \"priority_score\": 14}\n```",
        )
        .unwrap();
        assert_eq!(fields.priority_score, 10);
        assert_eq!(fields.feature_category, FeatureCategory::Other);
        assert_eq!(fields.sentiment, None);
    }

    #[test]
    fn unparseable_reply_is_an_error() {
        assert!(parse_analysis("the post talks about billing").is_err());
    }

    #[test]
    fn prompt_includes_post_and_truncated_comments() {
        let mut post = crate::testing::raw_post("p1", "legaltech", "Title here", "Body here", 30);
        post.comments = vec![prodpulse_common::CommentNode {
            id: "c1".to_string(),
            parent_id: None,
            author: "alice".to_string(),
            body: "x".repeat(500),
            score: 7,
            created_at: chrono::Utc::now(),
            depth: 0,
            is_submitter: false,
            permalink: String::new(),
            content_hash: String::new(),
            replies: Vec::new(),
        }];
        assert_eq!(post.platform, Platform::Reddit);

        let prompt = build_prompt(&post);
        assert!(prompt.contains("Title here"));
        assert!(prompt.contains("alice (7 points)"));
        // Excerpted to 200 chars, not the full 500.
        assert!(!prompt.contains(&"x".repeat(201)));
    }
}
