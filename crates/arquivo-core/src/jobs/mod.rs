//! Asynchronous ingestion jobs.
//!
//! Submissions are acknowledged immediately with a job id; the pipeline
//! (extract, normalize, mine dates, save) runs on blocking worker tasks
//! behind a bounded dispatch loop. Callers observe progress by polling
//! [`JobTracker`] snapshots through the runner.

pub mod types;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::IngestError;
use crate::pdf::DocumentExtractor;
use crate::storage::{DocumentStore, SaveOutcome};

pub use types::{new_job_id, JobState, JobStatus};

struct JobRequest {
    id: String,
    path: PathBuf,
}

#[derive(Debug, Clone)]
struct TrackedJob {
    status: JobStatus,
    finished_at: Option<Instant>,
}

/// Tracks every submitted job by id.
///
/// State changes only move forward: a job marked terminal stays terminal,
/// and `mark_running` is a no-op unless the job is still pending. Finished
/// jobs are evicted after a retention window so polling maps do not grow
/// without bound.
#[derive(Clone, Default)]
pub struct JobTracker {
    jobs: Arc<RwLock<HashMap<String, TrackedJob>>>,
}

impl JobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    async fn register(&self, id: &str, filename: &str) {
        let mut jobs = self.jobs.write().await;
        jobs.insert(
            id.to_string(),
            TrackedJob {
                status: JobStatus {
                    id: id.to_string(),
                    filename: filename.to_string(),
                    state: JobState::Pending,
                    submitted_at: chrono::Utc::now(),
                },
                finished_at: None,
            },
        );
    }

    async fn remove(&self, id: &str) {
        let mut jobs = self.jobs.write().await;
        jobs.remove(id);
    }

    async fn mark_running(&self, id: &str) {
        let mut jobs = self.jobs.write().await;
        if let Some(job) = jobs.get_mut(id) {
            if job.status.state == JobState::Pending {
                job.status.state = JobState::Running;
            }
        }
    }

    async fn finish(&self, id: &str, state: JobState) {
        debug_assert!(state.is_terminal());
        let mut jobs = self.jobs.write().await;
        if let Some(job) = jobs.get_mut(id) {
            if !job.status.state.is_terminal() {
                job.status.state = state;
                job.finished_at = Some(Instant::now());
            }
        }
    }

    /// Snapshot of one job, if it is still tracked.
    pub async fn status(&self, id: &str) -> Option<JobStatus> {
        let jobs = self.jobs.read().await;
        jobs.get(id).map(|j| j.status.clone())
    }

    /// Drop terminal jobs that finished more than `retention` ago.
    async fn evict_finished(&self, retention: Duration) {
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, j| match j.finished_at {
            Some(at) => at.elapsed() < retention,
            None => true,
        });
        let evicted = before - jobs.len();
        if evicted > 0 {
            tracing::debug!(evicted, "Evicted finished jobs past retention");
        }
    }
}

/// Handle to the ingestion worker.
///
/// Cloneable; the dispatch loop stops when [`JobRunner::shutdown`] is
/// called or every handle is dropped.
#[derive(Clone)]
pub struct JobRunner {
    tx: mpsc::Sender<JobRequest>,
    tracker: JobTracker,
    cancel: CancellationToken,
}

impl JobRunner {
    /// Spawn the dispatch loop.
    ///
    /// At most `max_concurrent` extractions run at once; extraction and
    /// persistence are CPU- and IO-bound, so each job executes on a
    /// blocking task. Finished jobs are kept visible for `retention`.
    pub fn spawn(
        extractor: Arc<DocumentExtractor>,
        store: DocumentStore,
        max_concurrent: usize,
        retention: Duration,
    ) -> Self {
        let (tx, mut rx) = mpsc::channel::<JobRequest>(64);
        let tracker = JobTracker::new();
        let cancel = CancellationToken::new();

        let runner = Self {
            tx,
            tracker: tracker.clone(),
            cancel: cancel.clone(),
        };

        tokio::spawn(async move {
            tracing::info!(max_concurrent, "Ingestion worker started");

            let mut in_flight: JoinSet<(String, JobState)> = JoinSet::new();
            let mut sweep = tokio::time::interval(Duration::from_secs(60));
            sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => {
                        tracing::debug!("Ingestion worker cancelled");
                        break;
                    }

                    Some(req) = rx.recv(), if in_flight.len() < max_concurrent => {
                        tracker.mark_running(&req.id).await;

                        let extractor = extractor.clone();
                        let store = store.clone();
                        in_flight.spawn_blocking(move || {
                            let state = run_pipeline(&extractor, &store, &req.path);
                            (req.id, state)
                        });
                    }

                    Some(result) = in_flight.join_next() => {
                        match result {
                            Ok((id, state)) => tracker.finish(&id, state).await,
                            Err(e) => tracing::error!("Ingestion task panicked: {}", e),
                        }
                    }

                    _ = sweep.tick() => {
                        tracker.evict_finished(retention).await;
                    }

                    else => {
                        if in_flight.is_empty() {
                            tracing::debug!("Ingestion worker shutting down, no more work");
                            break;
                        }
                    }
                }
            }

            // Let in-flight jobs reach a terminal state before stopping
            while let Some(result) = in_flight.join_next().await {
                match result {
                    Ok((id, state)) => tracker.finish(&id, state).await,
                    Err(e) => tracing::error!("Ingestion task panicked during shutdown: {}", e),
                }
            }

            tracing::info!("Ingestion worker stopped");
        });

        runner
    }

    /// Queue a PDF for ingestion. Returns the job id immediately.
    pub async fn submit(&self, path: PathBuf) -> Result<String, IngestError> {
        let filename = path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "unknown.pdf".to_string());

        let id = new_job_id();
        self.tracker.register(&id, &filename).await;

        let request = JobRequest {
            id: id.clone(),
            path,
        };
        if self.tx.send(request).await.is_err() {
            self.tracker.remove(&id).await;
            return Err(IngestError::RunnerStopped);
        }

        tracing::debug!(job = %id, file = %filename, "Job submitted");
        Ok(id)
    }

    /// Current snapshot of a job. Unknown ids (never submitted, or evicted
    /// past retention) are an error.
    pub async fn status(&self, id: &str) -> Result<JobStatus, IngestError> {
        self.tracker
            .status(id)
            .await
            .ok_or_else(|| IngestError::UnknownJob(id.to_string()))
    }

    /// Stop accepting and dispatching work. In-flight jobs still finish.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

fn run_pipeline(
    extractor: &DocumentExtractor,
    store: &DocumentStore,
    path: &std::path::Path,
) -> JobState {
    let document = match extractor.extract(path) {
        Ok(doc) => doc,
        Err(e) => {
            tracing::error!("Extraction failed for {:?}: {}", path, e);
            return JobState::Failed {
                error: e.to_string(),
            };
        }
    };

    match store.insert(&document) {
        Ok(SaveOutcome::Inserted) => {
            tracing::info!(file_id = %document.file_id, "Document ingested");
            JobState::Succeeded { duplicate: false }
        }
        Ok(SaveOutcome::AlreadyExists) => JobState::Succeeded { duplicate: true },
        Err(e) => {
            tracing::error!(file_id = %document.file_id, "Save failed: {}", e);
            JobState::Failed {
                error: e.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::NoOpOcr;
    use crate::pdf::test_pdf;

    fn runner_with_store() -> (JobRunner, DocumentStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::open_in_memory().unwrap();
        let extractor = Arc::new(DocumentExtractor::new(Arc::new(NoOpOcr), "por"));
        let runner = JobRunner::spawn(
            extractor,
            store.clone(),
            2,
            Duration::from_secs(900),
        );
        (runner, store, dir)
    }

    async fn wait_terminal(runner: &JobRunner, id: &str) -> JobStatus {
        for _ in 0..200 {
            let status = runner.status(id).await.unwrap();
            if status.state.is_terminal() {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {id} never reached a terminal state");
    }

    #[tokio::test]
    async fn submit_returns_immediately_and_job_succeeds() {
        let (runner, store, dir) = runner_with_store();

        let path = dir.path().join("relatorio.pdf");
        std::fs::write(&path, test_pdf::with_text("Hello World")).unwrap();

        let id = runner.submit(path).await.unwrap();
        let status = runner.status(&id).await.unwrap();
        assert!(matches!(
            status.state,
            JobState::Pending | JobState::Running | JobState::Succeeded { .. }
        ));
        assert_eq!(status.filename, "relatorio.pdf");

        let status = wait_terminal(&runner, &id).await;
        assert_eq!(status.state, JobState::Succeeded { duplicate: false });

        let docs = store.scan_all().unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].file_id, "relatorio");
        runner.shutdown();
    }

    #[tokio::test]
    async fn duplicate_submission_succeeds_with_flag() {
        let (runner, store, dir) = runner_with_store();

        let path = dir.path().join("um.pdf");
        std::fs::write(&path, test_pdf::with_text("Corpo unico")).unwrap();

        let first = runner.submit(path.clone()).await.unwrap();
        let status = wait_terminal(&runner, &first).await;
        assert_eq!(status.state, JobState::Succeeded { duplicate: false });

        let second = runner.submit(path).await.unwrap();
        let status = wait_terminal(&runner, &second).await;
        assert_eq!(status.state, JobState::Succeeded { duplicate: true });

        assert_eq!(store.scan_all().unwrap().len(), 1);
        runner.shutdown();
    }

    #[tokio::test]
    async fn concurrent_same_content_jobs_store_one_document() {
        let (runner, store, dir) = runner_with_store();

        // Same extracted content under two different ids; both jobs race
        // through the dedup guard at the same time
        let bytes = test_pdf::with_text("Corpo partilhado");
        let first = dir.path().join("primeiro.pdf");
        let second = dir.path().join("segundo.pdf");
        std::fs::write(&first, &bytes).unwrap();
        std::fs::write(&second, &bytes).unwrap();

        let id_a = runner.submit(first).await.unwrap();
        let id_b = runner.submit(second).await.unwrap();

        let state_a = wait_terminal(&runner, &id_a).await.state;
        let state_b = wait_terminal(&runner, &id_b).await.state;

        let duplicates = [&state_a, &state_b]
            .iter()
            .filter(|s| matches!(s, JobState::Succeeded { duplicate: true }))
            .count();
        let fresh = [&state_a, &state_b]
            .iter()
            .filter(|s| matches!(s, JobState::Succeeded { duplicate: false }))
            .count();
        assert_eq!(fresh, 1, "states: {state_a:?} / {state_b:?}");
        assert_eq!(duplicates, 1, "states: {state_a:?} / {state_b:?}");

        assert_eq!(store.scan_all().unwrap().len(), 1);
        runner.shutdown();
    }

    #[tokio::test]
    async fn corrupt_file_fails_without_persisting() {
        let (runner, store, dir) = runner_with_store();

        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"this is not a pdf").unwrap();

        let id = runner.submit(path).await.unwrap();
        let status = wait_terminal(&runner, &id).await;
        match status.state {
            JobState::Failed { error } => assert!(error.contains("broken")),
            other => panic!("expected failure, got {other:?}"),
        }

        assert!(store.scan_all().unwrap().is_empty());
        runner.shutdown();
    }

    #[tokio::test]
    async fn unknown_job_id_is_an_error() {
        let (runner, _store, _dir) = runner_with_store();
        let err = runner.status("no-such-job").await.unwrap_err();
        assert!(matches!(err, IngestError::UnknownJob(_)));
        runner.shutdown();
    }

    #[tokio::test]
    async fn terminal_state_is_stable_across_polls() {
        let (runner, _store, dir) = runner_with_store();

        let path = dir.path().join("estavel.pdf");
        std::fs::write(&path, test_pdf::with_text("conteudo estavel")).unwrap();

        let id = runner.submit(path).await.unwrap();
        let first = wait_terminal(&runner, &id).await;
        for _ in 0..5 {
            let again = runner.status(&id).await.unwrap();
            assert_eq!(again.state, first.state);
        }
        runner.shutdown();
    }

    #[tokio::test]
    async fn tracker_latch_ignores_backward_transitions() {
        let tracker = JobTracker::new();
        tracker.register("j", "f.pdf").await;

        tracker.finish("j", JobState::Succeeded { duplicate: false }).await;
        tracker.mark_running("j").await;
        tracker
            .finish("j", JobState::Failed { error: "late".to_string() })
            .await;

        let status = tracker.status("j").await.unwrap();
        assert_eq!(status.state, JobState::Succeeded { duplicate: false });
    }

    #[tokio::test]
    async fn eviction_drops_only_expired_terminal_jobs() {
        let tracker = JobTracker::new();
        tracker.register("done", "a.pdf").await;
        tracker.register("live", "b.pdf").await;
        tracker.finish("done", JobState::Succeeded { duplicate: false }).await;

        tracker.evict_finished(Duration::from_secs(3600)).await;
        assert!(tracker.status("done").await.is_some());

        tracker.evict_finished(Duration::ZERO).await;
        assert!(tracker.status("done").await.is_none());
        assert!(tracker.status("live").await.is_some());
    }
}
