use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// --- Enums ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Reddit,
    Twitter,
    Slack,
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Platform::Reddit => write!(f, "reddit"),
            Platform::Twitter => write!(f, "twitter"),
            Platform::Slack => write!(f, "slack"),
        }
    }
}

impl Platform {
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "reddit" => Some(Self::Reddit),
            "twitter" | "x" => Some(Self::Twitter),
            "slack" => Some(Self::Slack),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Post,
    Comment,
}

/// How a run discovers content: browse listing endpoints, keyword search,
/// or both unioned (de-duplicated by post id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CrawlType {
    Listing,
    Search,
    #[default]
    Both,
}

impl std::fmt::Display for CrawlType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CrawlType::Listing => write!(f, "listing"),
            CrawlType::Search => write!(f, "search"),
            CrawlType::Both => write!(f, "both"),
        }
    }
}

impl CrawlType {
    /// Accepts the legacy "crawl" spelling for the listing strategy.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "listing" | "crawl" => Some(Self::Listing),
            "search" => Some(Self::Search),
            "both" => Some(Self::Both),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureCategory {
    DocumentAutomation,
    WorkflowManagement,
    ResearchTools,
    BillingTimekeeping,
    ClientCommunication,
    DataSecurity,
    Integrations,
    AiAnalysis,
    Other,
}

impl std::fmt::Display for FeatureCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeatureCategory::DocumentAutomation => write!(f, "document_automation"),
            FeatureCategory::WorkflowManagement => write!(f, "workflow_management"),
            FeatureCategory::ResearchTools => write!(f, "research_tools"),
            FeatureCategory::BillingTimekeeping => write!(f, "billing_timekeeping"),
            FeatureCategory::ClientCommunication => write!(f, "client_communication"),
            FeatureCategory::DataSecurity => write!(f, "data_security"),
            FeatureCategory::Integrations => write!(f, "integrations"),
            FeatureCategory::AiAnalysis => write!(f, "ai_analysis"),
            FeatureCategory::Other => write!(f, "other"),
        }
    }
}

impl FeatureCategory {
    pub fn from_str_loose(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "document_automation" => Self::DocumentAutomation,
            "workflow_management" => Self::WorkflowManagement,
            "research_tools" => Self::ResearchTools,
            "billing_timekeeping" => Self::BillingTimekeeping,
            "client_communication" => Self::ClientCommunication,
            "data_security" => Self::DataSecurity,
            "integrations" => Self::Integrations,
            "ai_analysis" => Self::AiAnalysis,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserSegment {
    SoloPractitioner,
    SmallFirm,
    MidFirm,
    LargeFirm,
    InHouse,
    LegalOps,
    Paralegal,
    #[default]
    Unknown,
}

impl std::fmt::Display for UserSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UserSegment::SoloPractitioner => write!(f, "solo_practitioner"),
            UserSegment::SmallFirm => write!(f, "small_firm"),
            UserSegment::MidFirm => write!(f, "mid_firm"),
            UserSegment::LargeFirm => write!(f, "large_firm"),
            UserSegment::InHouse => write!(f, "in_house"),
            UserSegment::LegalOps => write!(f, "legal_ops"),
            UserSegment::Paralegal => write!(f, "paralegal"),
            UserSegment::Unknown => write!(f, "unknown"),
        }
    }
}

impl UserSegment {
    pub fn from_str_loose(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "solo_practitioner" | "solo" => Self::SoloPractitioner,
            "small_firm" => Self::SmallFirm,
            "mid_firm" => Self::MidFirm,
            "large_firm" => Self::LargeFirm,
            "in_house" => Self::InHouse,
            "legal_ops" => Self::LegalOps,
            "paralegal" => Self::Paralegal,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

impl std::fmt::Display for Sentiment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Sentiment::Positive => write!(f, "positive"),
            Sentiment::Negative => write!(f, "negative"),
            Sentiment::Neutral => write!(f, "neutral"),
        }
    }
}

impl Sentiment {
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "positive" => Some(Self::Positive),
            "negative" => Some(Self::Negative),
            "neutral" => Some(Self::Neutral),
            _ => None,
        }
    }
}

// --- Raw corpus types ---

/// One node of a post's reply forest. Depth is 0 for top-level comments and
/// increments per reply level; the collector never produces a node deeper
/// than the configured maximum.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentNode {
    pub id: String,
    pub parent_id: Option<String>,
    pub author: String,
    pub body: String,
    pub score: i64,
    pub created_at: DateTime<Utc>,
    pub depth: u32,
    /// True when the comment author is the post author.
    pub is_submitter: bool,
    pub permalink: String,
    pub content_hash: String,
    pub replies: Vec<CommentNode>,
}

/// A fetched post with its bounded comment tree. Immutable once written to
/// the raw archive; a re-fetch produces a new snapshot, not a patch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawPost {
    pub id: String,
    pub platform: Platform,
    /// Subreddit or channel the post came from, when the platform has one.
    pub subreddit: Option<String>,
    pub title: String,
    pub body: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub score: i64,
    pub upvote_ratio: Option<f64>,
    pub num_comments: u32,
    pub url: String,
    pub flair: Option<String>,
    pub edited: bool,
    pub collected_at: DateTime<Utc>,
    pub content_hash: String,
    pub comments: Vec<CommentNode>,
}

impl RawPost {
    /// Title and body joined for keyword matching. Link posts have an empty
    /// body, so the title alone still matches.
    pub fn full_text(&self) -> String {
        format!("{} {}", self.title, self.body).trim().to_string()
    }
}

/// A post or comment flattened out of the hierarchical corpus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawItem {
    pub id: String,
    pub platform: Platform,
    pub kind: ItemKind,
    pub parent_id: Option<String>,
    pub depth: u32,
    pub author: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub score: i64,
    pub content_hash: String,
}

/// Flatten a post and its reply forest into item records, depth-first in
/// platform order.
pub fn flatten_items(post: &RawPost) -> Vec<RawItem> {
    let mut items = vec![RawItem {
        id: post.id.clone(),
        platform: post.platform,
        kind: ItemKind::Post,
        parent_id: None,
        depth: 0,
        author: post.author.clone(),
        body: post.body.clone(),
        created_at: post.created_at,
        score: post.score,
        content_hash: post.content_hash.clone(),
    }];
    for c in &post.comments {
        flatten_comment(post.platform, c, &mut items);
    }
    items
}

fn flatten_comment(platform: Platform, node: &CommentNode, out: &mut Vec<RawItem>) {
    out.push(RawItem {
        id: node.id.clone(),
        platform,
        kind: ItemKind::Comment,
        parent_id: node.parent_id.clone(),
        depth: node.depth,
        author: node.author.clone(),
        body: node.body.clone(),
        created_at: node.created_at,
        score: node.score,
        content_hash: node.content_hash.clone(),
    });
    for r in &node.replies {
        flatten_comment(platform, r, out);
    }
}

/// Count comments in a reply forest, nested replies included.
pub fn count_comments(comments: &[CommentNode]) -> usize {
    comments.len() + comments.iter().map(|c| count_comments(&c.replies)).sum::<usize>()
}

// --- Insight types ---

/// Structured fields produced by the AI extractor for one post.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightFields {
    pub feature_summary: String,
    pub feature_category: FeatureCategory,
    pub user_segment: UserSegment,
    /// 0–10; how actionable the insight is.
    pub priority_score: u8,
    pub competitors_mentioned: Vec<String>,
    pub action_required: bool,
    pub suggested_action: String,
    pub pain_points: Vec<String>,
    pub sentiment: Option<Sentiment>,
}

/// The normalized, AI-enriched record stored per accepted source post.
/// Never mutated after creation; removed only by TTL expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Insight {
    pub insight_id: String,
    pub source_type: Platform,
    pub source_post_id: String,
    pub source_url: String,
    pub subreddit: Option<String>,
    pub feature_summary: String,
    pub feature_category: FeatureCategory,
    pub user_segment: UserSegment,
    pub priority_score: u8,
    pub competitors_mentioned: Vec<String>,
    pub action_required: bool,
    pub suggested_action: String,
    pub pain_points: Vec<String>,
    pub sentiment: Option<Sentiment>,
    pub post_score: i64,
    pub num_comments: u32,
    pub analyzed_at: DateTime<Utc>,
    pub collected_at: DateTime<Utc>,
    /// Epoch seconds after which the record is eligible for deletion.
    pub ttl: i64,
}
