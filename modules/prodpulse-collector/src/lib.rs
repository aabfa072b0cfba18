pub mod change;
pub mod extractor;
pub mod filter;
pub mod pipeline;
pub mod sources;
pub mod traits;
pub mod tree;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use pipeline::{CollectorRun, RunOutput, RunStats};
pub use traits::{InsightExtractor, PostSource};
