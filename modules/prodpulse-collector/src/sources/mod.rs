pub mod reddit;
pub mod slack;
pub mod twitter;

pub use reddit::{RedditFetcher, RedditSource};
pub use slack::SlackSource;
pub use twitter::TwitterSource;

/// What one platform branch produced. Per-source failures are collected
/// here instead of aborting the run; an empty post list is a valid result.
#[derive(Debug, Default)]
pub struct FetchReport {
    pub posts: Vec<prodpulse_common::RawPost>,
    pub failures: Vec<String>,
    pub dropped_subtrees: u32,
}
