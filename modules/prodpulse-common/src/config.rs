use std::env;

/// Process configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Postgres
    pub database_url: String,

    // AI provider
    pub anthropic_api_key: String,

    // Platform credentials
    pub reddit_user_agent: String,
    pub twitter_bearer_token: String,
    pub slack_bot_token: String,
    pub slack_channels: Vec<String>,

    // Web server
    pub web_host: String,
    pub web_port: u16,
}

impl Config {
    /// Load full configuration for the collector. Panics with a clear
    /// message if required vars are missing.
    pub fn from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            anthropic_api_key: required_env("ANTHROPIC_API_KEY"),
            reddit_user_agent: env::var("REDDIT_USER_AGENT")
                .unwrap_or_else(|_| "prodpulse/0.1".to_string()),
            twitter_bearer_token: env::var("TWITTER_BEARER_TOKEN").unwrap_or_default(),
            slack_bot_token: env::var("SLACK_BOT_TOKEN").unwrap_or_default(),
            slack_channels: env::var("SLACK_CHANNELS")
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            web_host: env::var("WEB_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            web_port: env::var("WEB_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .expect("WEB_PORT must be a number"),
        }
    }

    /// Minimal config for a read-only API process (no platform or AI keys).
    pub fn api_from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            anthropic_api_key: env::var("ANTHROPIC_API_KEY").unwrap_or_default(),
            reddit_user_agent: env::var("REDDIT_USER_AGENT")
                .unwrap_or_else(|_| "prodpulse/0.1".to_string()),
            twitter_bearer_token: env::var("TWITTER_BEARER_TOKEN").unwrap_or_default(),
            slack_bot_token: env::var("SLACK_BOT_TOKEN").unwrap_or_default(),
            slack_channels: Vec::new(),
            web_host: env::var("WEB_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            web_port: env::var("WEB_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .expect("WEB_PORT must be a number"),
        }
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}
