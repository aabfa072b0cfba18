use std::collections::HashMap;

use serde::Serialize;

use crate::error::PulseError;
use crate::types::CrawlType;

/// Per-run collection tunables. Constructed from defaults, then overlaid
/// with stored overrides and trigger parameters; components receive the
/// resolved value instead of reading globals.
#[derive(Debug, Clone, Serialize)]
pub struct CollectorSettings {
    pub subreddits: Vec<String>,
    pub keywords: Vec<String>,
    pub crawl_type: CrawlType,
    /// Collection window in days; posts older than this are skipped.
    pub days_back: u32,
    /// Posts below this score are dropped before relevance filtering.
    pub min_post_score: i64,
    pub posts_per_listing: u32,
    pub comments_per_post: usize,
    pub search_limit: u32,
    pub search_comments_limit: usize,
    pub max_comment_depth: u32,
    pub max_replies_per_comment: usize,
    /// Comments below this score are skipped; nested replies get a 3-point
    /// allowance to preserve conversation context.
    pub min_comment_score: i64,
    /// Keep all nested replies regardless of keyword match.
    pub preserve_context: bool,
    /// Keep post-author comments regardless of keyword match.
    pub always_include_author: bool,
    /// Insights scoring below this are computed but not persisted.
    pub priority_threshold: u8,
    pub retention_days: i64,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            subreddits: vec![
                "LawFirm".to_string(),
                "Lawyertalk".to_string(),
                "legaltech".to_string(),
                "legaltechAI".to_string(),
            ],
            keywords: vec![
                "Supio".to_string(),
                "Harvey".to_string(),
                "Casetext".to_string(),
                "Lexis+".to_string(),
                "Westlaw".to_string(),
                "AI".to_string(),
                "automation".to_string(),
                "document review".to_string(),
                "contract analysis".to_string(),
            ],
            crawl_type: CrawlType::Both,
            days_back: 3,
            min_post_score: 10,
            posts_per_listing: 25,
            comments_per_post: 20,
            search_limit: 10,
            search_comments_limit: 10,
            max_comment_depth: 4,
            max_replies_per_comment: 10,
            min_comment_score: -5,
            preserve_context: true,
            always_include_author: true,
            priority_threshold: 5,
            retention_days: 90,
        }
    }
}

impl CollectorSettings {
    /// Overlay stored overrides onto the static defaults. Unknown keys and
    /// unparseable values are validation errors so a bad `PUT /config`
    /// cannot silently change nothing.
    pub fn apply_overrides(
        &mut self,
        overrides: &HashMap<String, String>,
    ) -> Result<(), PulseError> {
        for (key, value) in overrides {
            self.apply_one(key, value)?;
        }
        Ok(())
    }

    pub fn apply_one(&mut self, key: &str, value: &str) -> Result<(), PulseError> {
        let bad = |what: &str| {
            PulseError::Validation(format!("invalid value for {what}: {value:?}"))
        };
        match key {
            "subreddits" => self.subreddits = parse_list(value),
            "keywords" => self.keywords = parse_list(value),
            "crawl_type" => {
                self.crawl_type =
                    CrawlType::from_str_loose(value).ok_or_else(|| bad("crawl_type"))?
            }
            "days_back" => {
                let v: u32 = value.parse().map_err(|_| bad("days_back"))?;
                if v < 1 {
                    return Err(bad("days_back"));
                }
                self.days_back = v;
            }
            "min_post_score" => {
                self.min_post_score = value.parse().map_err(|_| bad("min_post_score"))?
            }
            "posts_per_listing" => {
                self.posts_per_listing = value.parse().map_err(|_| bad("posts_per_listing"))?
            }
            "comments_per_post" => {
                self.comments_per_post = value.parse().map_err(|_| bad("comments_per_post"))?
            }
            "search_limit" => self.search_limit = value.parse().map_err(|_| bad("search_limit"))?,
            "search_comments_limit" => {
                self.search_comments_limit =
                    value.parse().map_err(|_| bad("search_comments_limit"))?
            }
            "max_comment_depth" => {
                self.max_comment_depth = value.parse().map_err(|_| bad("max_comment_depth"))?
            }
            "max_replies_per_comment" => {
                self.max_replies_per_comment =
                    value.parse().map_err(|_| bad("max_replies_per_comment"))?
            }
            "min_comment_score" => {
                self.min_comment_score = value.parse().map_err(|_| bad("min_comment_score"))?
            }
            "preserve_context" => {
                self.preserve_context = value.parse().map_err(|_| bad("preserve_context"))?
            }
            "always_include_author" => {
                self.always_include_author =
                    value.parse().map_err(|_| bad("always_include_author"))?
            }
            "priority_threshold" => {
                let v: u8 = value.parse().map_err(|_| bad("priority_threshold"))?;
                if v > 10 {
                    return Err(bad("priority_threshold"));
                }
                self.priority_threshold = v;
            }
            "retention_days" => {
                self.retention_days = value.parse().map_err(|_| bad("retention_days"))?
            }
            _ => {
                return Err(PulseError::Validation(format!(
                    "unknown setting: {key:?}"
                )))
            }
        }
        Ok(())
    }
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
