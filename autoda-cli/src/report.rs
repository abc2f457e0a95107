//! Trial records written to the results directory.

use anyhow::Context;
use autoda_core::training::{ObjectiveOutcome, TrialResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One finished trial as persisted in `config_<id>.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialRecord {
    pub config_id: u64,
    pub benchmark: String,
    pub dataset: String,
    /// Seconds spent building the model.
    pub compile_time: f64,
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(flatten)]
    pub result: TrialResult,
}

impl TrialRecord {
    pub fn new(
        config_id: u64,
        session_id: String,
        outcome: ObjectiveOutcome,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        Self {
            config_id,
            benchmark: outcome.benchmark,
            dataset: outcome.dataset,
            compile_time: outcome.compile_time,
            session_id,
            started_at,
            finished_at,
            result: outcome.result,
        }
    }

    pub fn file_name(&self) -> String {
        format!("config_{}.json", self.config_id)
    }
}

/// Write `record` into `results_dir`, replacing any earlier record for the same id.
pub async fn write_record(results_dir: &Path, record: &TrialRecord) -> anyhow::Result<PathBuf> {
    tokio::fs::create_dir_all(results_dir)
        .await
        .with_context(|| format!("creating results directory {}", results_dir.display()))?;

    let path = results_dir.join(record.file_name());
    let content = serde_json::to_string_pretty(record)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, content)
        .await
        .with_context(|| format!("writing {}", tmp.display()))?;
    tokio::fs::rename(&tmp, &path)
        .await
        .with_context(|| format!("moving result into place at {}", path.display()))?;
    Ok(path)
}
