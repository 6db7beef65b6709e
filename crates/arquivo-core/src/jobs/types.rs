//! Job identity and lifecycle states.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// State of an ingestion job.
///
/// Transitions are one-way: `Pending` to `Running` to either terminal
/// state. A terminal state never changes afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum JobState {
    /// Accepted, waiting for a worker slot.
    Pending,
    /// Extraction and persistence in progress.
    Running,
    /// Pipeline completed. `duplicate` is true when the document was
    /// already stored and the write was skipped.
    Succeeded { duplicate: bool },
    /// Pipeline failed; the document was not persisted.
    Failed { error: String },
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeeded { .. } | JobState::Failed { .. })
    }
}

/// Poll-visible snapshot of one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatus {
    pub id: String,
    /// Base name of the submitted file.
    pub filename: String,
    #[serde(flatten)]
    pub state: JobState,
    pub submitted_at: DateTime<Utc>,
}

/// Fresh opaque job identifier.
pub fn new_job_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
