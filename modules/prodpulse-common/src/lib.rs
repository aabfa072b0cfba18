pub mod config;
pub mod error;
pub mod hash;
pub mod insight_id;
pub mod settings;
pub mod types;

pub use config::Config;
pub use error::PulseError;
pub use hash::content_hash;
pub use insight_id::InsightId;
pub use settings::CollectorSettings;
pub use types::*;
