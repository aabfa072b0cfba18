use serde::Deserialize;

// --- Listing envelope ---

/// Reddit wraps every collection in a `Listing` envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct Listing<T> {
    pub data: ListingData<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListingData<T> {
    pub children: Vec<Thing<T>>,
    #[serde(default)]
    pub after: Option<String>,
}

/// A typed thing: `t3` for posts, `t1` for comments.
#[derive(Debug, Clone, Deserialize)]
pub struct Thing<T> {
    pub kind: String,
    pub data: T,
}

// --- Post ---

#[derive(Debug, Clone, Deserialize)]
pub struct RedditPost {
    pub id: String,
    pub subreddit: String,
    pub title: String,
    #[serde(default)]
    pub selftext: String,
    /// None for deleted accounts.
    #[serde(default)]
    pub author: Option<String>,
    pub created_utc: f64,
    pub score: i64,
    #[serde(default)]
    pub upvote_ratio: Option<f64>,
    #[serde(default)]
    pub num_comments: u32,
    pub permalink: String,
    #[serde(default)]
    pub link_flair_text: Option<String>,
    #[serde(default)]
    pub edited: Edited,
}

// --- Comment ---

#[derive(Debug, Clone, Deserialize)]
pub struct RedditComment {
    pub id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub body: String,
    pub score: i64,
    pub created_utc: f64,
    #[serde(default)]
    pub is_submitter: bool,
    #[serde(default)]
    pub permalink: String,
    #[serde(default)]
    pub replies: Replies,
}

/// The `replies` field is a nested Listing when replies exist and the empty
/// string when there are none.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(untagged)]
pub enum Replies {
    Listing(Box<Listing<serde_json::Value>>),
    Empty(String),
    #[default]
    None,
}

impl Replies {
    /// Decode the nested children into comments, skipping non-`t1` things
    /// (Reddit interleaves `more` stubs in reply listings).
    pub fn comments(&self) -> Vec<RedditComment> {
        match self {
            Replies::Listing(listing) => listing
                .data
                .children
                .iter()
                .filter(|t| t.kind == "t1")
                .filter_map(|t| serde_json::from_value(t.data.clone()).ok())
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// `edited` is `false` or an edit timestamp.
#[derive(Debug, Clone, Copy, Deserialize, Default)]
#[serde(untagged)]
pub enum Edited {
    Flag(bool),
    Timestamp(f64),
    #[default]
    None,
}

impl Edited {
    pub fn is_edited(&self) -> bool {
        match self {
            Edited::Flag(b) => *b,
            Edited::Timestamp(_) => true,
            Edited::None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replies_empty_string_decodes_to_no_comments() {
        let comment: RedditComment = serde_json::from_value(serde_json::json!({
            "id": "c1",
            "body": "text",
            "score": 3,
            "created_utc": 1_700_000_000.0,
            "replies": ""
        }))
        .unwrap();
        assert!(comment.replies.comments().is_empty());
    }

    #[test]
    fn nested_replies_decode_and_skip_more_stubs() {
        let comment: RedditComment = serde_json::from_value(serde_json::json!({
            "id": "c1",
            "body": "parent",
            "score": 3,
            "created_utc": 1_700_000_000.0,
            "replies": {
                "data": {
                    "children": [
                        {"kind": "t1", "data": {"id": "c2", "body": "child", "score": 1, "created_utc": 1_700_000_100.0}},
                        {"kind": "more", "data": {"count": 12}}
                    ]
                }
            }
        }))
        .unwrap();
        let replies = comment.replies.comments();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].id, "c2");
    }

    #[test]
    fn edited_accepts_flag_and_timestamp() {
        let flag: Edited = serde_json::from_value(serde_json::json!(false)).unwrap();
        let ts: Edited = serde_json::from_value(serde_json::json!(1_700_000_000.0)).unwrap();
        assert!(!flag.is_edited());
        assert!(ts.is_edited());
    }
}
