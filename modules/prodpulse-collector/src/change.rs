// Change detection for incremental runs. Fingerprints are content hashes
// over the normalized body; a matching prior fingerprint means the item can
// skip re-analysis. A broken record store downgrades the run to full mode
// instead of failing it.

use std::sync::Arc;

use tracing::warn;

use prodpulse_common::content_hash;
use prodpulse_store::RunRecordStore;

pub struct ChangeDetector {
    records: Option<Arc<dyn RunRecordStore>>,
    incremental: bool,
}

impl ChangeDetector {
    pub fn new(records: Option<Arc<dyn RunRecordStore>>, incremental: bool) -> Self {
        Self {
            records,
            incremental,
        }
    }

    /// Full mode: every item is new.
    pub fn full() -> Self {
        Self::new(None, false)
    }

    /// Content fingerprint over the normalized body text.
    pub fn fingerprint(text: &str) -> String {
        content_hash(text)
    }

    /// True when the item changed since the last run (or is unseen). Always
    /// true outside incremental mode or when the record store is missing or
    /// erroring.
    pub async fn is_changed(&self, scope: &str, item_id: &str, text: &str) -> bool {
        if !self.incremental {
            return true;
        }
        let Some(records) = &self.records else {
            return true;
        };

        let fingerprint = Self::fingerprint(text);
        match records.get_fingerprint(scope, item_id).await {
            Ok(Some(prior)) => prior != fingerprint,
            Ok(None) => true,
            Err(e) => {
                warn!(scope, item_id, error = %e, "record store unreadable, treating item as new");
                true
            }
        }
    }

    /// Remember the item's current fingerprint. Failures are logged, not
    /// propagated; losing a record only costs a re-analysis next run.
    pub async fn record(&self, scope: &str, item_id: &str, text: &str) {
        let Some(records) = &self.records else {
            return;
        };
        let fingerprint = Self::fingerprint(text);
        if let Err(e) = records.put_fingerprint(scope, item_id, &fingerprint).await {
            warn!(scope, item_id, error = %e, "failed to record fingerprint");
        }
    }
}
