//! Caller-visible error taxonomy for the ingestion pipeline.

use thiserror::Error;

use crate::storage::StoreError;

/// Errors surfaced by the pipeline to the submitting/polling caller.
///
/// OCR failures are deliberately absent: they are non-fatal, logged per
/// image, and never propagate past the page they occurred on.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The file could not be opened or parsed as a PDF. Fatal for the job.
    #[error("failed to open document {path}: {source}")]
    DocumentOpen {
        path: String,
        #[source]
        source: lopdf::Error,
    },

    /// The store rejected the write. Fatal for the job.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Filesystem trouble while preparing directories or staging files.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The polled job ID was never submitted or has been evicted.
    #[error("unknown job: {0}")]
    UnknownJob(String),

    /// The runner is shutting down and no longer accepts submissions.
    #[error("job runner stopped")]
    RunnerStopped,
}
