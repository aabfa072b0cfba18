// In-process execution registry and the pipeline seam behind POST /trigger.
// Each run owns a cancel flag; cancellation is cooperative and the pipeline
// only stops between items, so stores never see a half-written record.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info};

use prodpulse_collector::extractor::ClaudeExtractor;
use prodpulse_collector::sources::{RedditSource, SlackSource, TwitterSource};
use prodpulse_collector::{CollectorRun, RunOutput};
use prodpulse_common::{CollectorSettings, Config};
use prodpulse_store::{InsightStore, RawStore, RunRecordStore};
use reddit_client::RedditClient;

use crate::error::ApiError;

/// How many executions GET /executions returns.
const RECENT_EXECUTIONS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
    Aborted,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionRecord {
    pub name: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub input: serde_json::Value,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
}

struct ExecutionEntry {
    record: ExecutionRecord,
    cancel: Arc<AtomicBool>,
}

/// Registry of recent ingestion runs, keyed by execution name.
#[derive(Default)]
pub struct RunRegistry {
    entries: Mutex<HashMap<String, ExecutionEntry>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new run. Fails with Conflict if the name already exists.
    pub fn start(
        &self,
        name: &str,
        input: serde_json::Value,
        cancel: Arc<AtomicBool>,
    ) -> Result<(), ApiError> {
        let mut entries = self.entries.lock().unwrap();
        if entries.contains_key(name) {
            return Err(ApiError::Conflict(format!(
                "a crawl job named {name} is already running"
            )));
        }
        entries.insert(
            name.to_string(),
            ExecutionEntry {
                record: ExecutionRecord {
                    name: name.to_string(),
                    status: RunStatus::Running,
                    started_at: Utc::now(),
                    stopped_at: None,
                    input,
                    output: None,
                    error: None,
                },
                cancel,
            },
        );
        Ok(())
    }

    /// Record a run's terminal state.
    pub fn finish(&self, name: &str, result: Result<RunOutput, String>) {
        let mut entries = self.entries.lock().unwrap();
        let Some(entry) = entries.get_mut(name) else {
            return;
        };
        entry.record.stopped_at = Some(Utc::now());
        match result {
            Ok(output) => {
                entry.record.status = if output.stats.cancelled {
                    RunStatus::Aborted
                } else {
                    RunStatus::Succeeded
                };
                entry.record.output = serde_json::to_value(&output).ok();
            }
            Err(message) => {
                entry.record.status = RunStatus::Failed;
                entry.record.error = Some(message);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<ExecutionRecord> {
        self.entries
            .lock()
            .unwrap()
            .get(name)
            .map(|e| e.record.clone())
    }

    /// Recent executions, newest first.
    pub fn list_recent(&self) -> Vec<ExecutionRecord> {
        let entries = self.entries.lock().unwrap();
        let mut records: Vec<ExecutionRecord> =
            entries.values().map(|e| e.record.clone()).collect();
        records.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        records.truncate(RECENT_EXECUTIONS);
        records
    }

    /// Request cancellation. Cancelling an already-terminal run is a
    /// Conflict; an unknown name is NotFound.
    pub fn cancel(&self, name: &str) -> Result<(), ApiError> {
        let entries = self.entries.lock().unwrap();
        let Some(entry) = entries.get(name) else {
            return Err(ApiError::NotFound(format!("execution {name} not found")));
        };
        if entry.record.status.is_terminal() {
            return Err(ApiError::Conflict(format!(
                "execution {name} already finished with status {:?}",
                entry.record.status
            )));
        }
        entry.cancel.store(true, Ordering::Relaxed);
        Ok(())
    }

    /// True while any run is not terminal.
    pub fn any_running(&self) -> bool {
        self.entries
            .lock()
            .unwrap()
            .values()
            .any(|e| e.record.status == RunStatus::Running)
    }
}

// ---------------------------------------------------------------------------
// Pipeline seam
// ---------------------------------------------------------------------------

/// What POST /trigger actually launches. The live implementation wires the
/// platform clients; tests substitute a mock.
#[async_trait]
pub trait RunPipeline: Send + Sync {
    async fn run(
        &self,
        settings: CollectorSettings,
        incremental: bool,
        cancel: Arc<AtomicBool>,
    ) -> anyhow::Result<RunOutput>;
}

pub struct LivePipeline {
    pub config: Config,
    pub insights: Arc<dyn InsightStore>,
    pub raw: Arc<dyn RawStore>,
    pub records: Option<Arc<dyn RunRecordStore>>,
}

#[async_trait]
impl RunPipeline for LivePipeline {
    async fn run(
        &self,
        settings: CollectorSettings,
        incremental: bool,
        cancel: Arc<AtomicBool>,
    ) -> anyhow::Result<RunOutput> {
        let extractor = Arc::new(ClaudeExtractor::new(&self.config.anthropic_api_key));
        let reddit = RedditSource::new(RedditClient::new(&self.config.reddit_user_agent));

        let mut run = CollectorRun::new(
            settings,
            extractor,
            self.insights.clone(),
            self.raw.clone(),
        )
        .with_reddit(Arc::new(reddit));

        if !self.config.twitter_bearer_token.is_empty() {
            run = run.with_twitter(Arc::new(TwitterSource::new(
                &self.config.twitter_bearer_token,
            )));
        }
        if !self.config.slack_bot_token.is_empty() && !self.config.slack_channels.is_empty() {
            run = run.with_slack(Arc::new(SlackSource::new(
                &self.config.slack_bot_token,
                &self.config.slack_channels,
            )));
        }
        if let Some(records) = &self.records {
            run = run.with_records(records.clone(), incremental);
        }

        run.run(cancel).await
    }
}

/// Spawn a pipeline run on the runtime and wire its completion back into
/// the registry.
pub fn spawn_run(
    pipeline: Arc<dyn RunPipeline>,
    registry: Arc<RunRegistry>,
    name: String,
    settings: CollectorSettings,
    incremental: bool,
    cancel: Arc<AtomicBool>,
) {
    tokio::spawn(async move {
        info!(name, "crawl run starting");
        let result = pipeline.run(settings, incremental, cancel).await;
        match result {
            Ok(output) => {
                info!(name, "crawl run finished. {}", output.stats);
                registry.finish(&name, Ok(output));
            }
            Err(e) => {
                error!(name, error = %e, "crawl run failed");
                registry.finish(&name, Err(e.to_string()));
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use prodpulse_collector::RunStats;

    fn output(cancelled: bool) -> RunOutput {
        RunOutput {
            stats: RunStats {
                cancelled,
                ..RunStats::default()
            },
            snapshot_keys: Vec::new(),
        }
    }

    #[test]
    fn duplicate_run_name_is_a_conflict() {
        let registry = RunRegistry::new();
        let cancel = Arc::new(AtomicBool::new(false));
        registry
            .start("manual-1", serde_json::json!({}), cancel.clone())
            .unwrap();
        let err = registry
            .start("manual-1", serde_json::json!({}), cancel)
            .unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[test]
    fn cancel_flips_the_flag_and_double_cancel_conflicts() {
        let registry = RunRegistry::new();
        let cancel = Arc::new(AtomicBool::new(false));
        registry
            .start("manual-1", serde_json::json!({}), cancel.clone())
            .unwrap();

        registry.cancel("manual-1").unwrap();
        assert!(cancel.load(Ordering::Relaxed));

        registry.finish("manual-1", Ok(output(true)));
        assert_eq!(registry.get("manual-1").unwrap().status, RunStatus::Aborted);

        let err = registry.cancel("manual-1").unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[test]
    fn cancel_unknown_run_is_not_found() {
        let registry = RunRegistry::new();
        assert!(matches!(
            registry.cancel("nope").unwrap_err(),
            ApiError::NotFound(_)
        ));
    }

    #[test]
    fn finished_runs_report_terminal_status_and_output() {
        let registry = RunRegistry::new();
        let cancel = Arc::new(AtomicBool::new(false));
        registry
            .start("manual-1", serde_json::json!({"days_back": 3}), cancel)
            .unwrap();
        registry.finish("manual-1", Ok(output(false)));

        let record = registry.get("manual-1").unwrap();
        assert_eq!(record.status, RunStatus::Succeeded);
        assert!(record.stopped_at.is_some());
        assert!(record.output.is_some());
        assert!(!registry.any_running());
    }

    #[test]
    fn list_recent_is_newest_first() {
        let registry = RunRegistry::new();
        for i in 0..3 {
            registry
                .start(
                    &format!("manual-{i}"),
                    serde_json::json!({}),
                    Arc::new(AtomicBool::new(false)),
                )
                .unwrap();
        }
        let records = registry.list_recent();
        assert_eq!(records.len(), 3);
        assert!(records[0].started_at >= records[2].started_at);
    }
}
