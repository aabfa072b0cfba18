pub mod insights;
pub mod memory;
pub mod pg;

pub use insights::{
    clamp_limit, ConfigStore, InsightFilter, InsightPage, InsightStore, PutOutcome, RawStore,
    RunRecordStore, WritePolicy, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT,
};
pub use memory::{MemoryConfigStore, MemoryInsightStore, MemoryRawStore, MemoryRunRecordStore};
pub use pg::{migrate, PgConfigStore, PgInsightStore, PgRawStore, PgRunRecordStore};
