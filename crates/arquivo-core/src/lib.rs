//! Arquivo Core - PDF ingestion pipeline with search
//!
//! This crate contains the full ingestion path for uploaded PDFs:
//! - Tiered text extraction (text layer, content-stream blocks, OCR) (lopdf)
//! - Text normalization and date-pair metadata mining (regex)
//! - Deduplicating document store (rusqlite)
//! - Asynchronous job queue with poll-based status (tokio)
//! - Substring + date-range search over the stored corpus

pub mod config;
pub mod error;
pub mod jobs;
pub mod metadata;
pub mod ocr;
pub mod pdf;
pub mod search;
pub mod storage;
pub mod text;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub use config::Config;
pub use error::IngestError;
pub use jobs::{JobRunner, JobState, JobStatus};
pub use ocr::{NoOpOcr, OcrEngine, TesseractOcr};
pub use pdf::DocumentExtractor;
pub use search::{SearchQuery, SearchService};
pub use storage::{DocumentStore, ExtractedDocument, SaveOutcome};

/// The assembled service: staging directory, job runner and search, wired
/// from one [`Config`].
pub struct IngestService {
    config: Config,
    runner: JobRunner,
    search: SearchService,
}

impl IngestService {
    /// Build the service, picking Tesseract when the configuration enables
    /// OCR and the binary is reachable, a no-op engine otherwise.
    pub fn new(config: Config) -> Result<Self, IngestError> {
        let ocr: Arc<dyn OcrEngine> =
            if config.ocr.enabled && TesseractOcr::is_available(&config.ocr.tesseract_path) {
                Arc::new(TesseractOcr::new(config.ocr.tesseract_path.clone()))
            } else {
                if config.ocr.enabled {
                    tracing::warn!(
                        path = %config.ocr.tesseract_path,
                        "Tesseract not available, embedded images will not be OCRed"
                    );
                }
                Arc::new(NoOpOcr)
            };
        Self::with_ocr(config, ocr)
    }

    /// Build the service with an explicit OCR engine.
    pub fn with_ocr(config: Config, ocr: Arc<dyn OcrEngine>) -> Result<Self, IngestError> {
        config.ensure_dirs()?;

        let store = DocumentStore::open(&config.database_path)?;
        let extractor = Arc::new(DocumentExtractor::new(ocr, config.ocr.language.clone()));
        let runner = JobRunner::spawn(
            extractor,
            store.clone(),
            config.max_concurrent_jobs,
            Duration::from_secs(config.job_retention_secs),
        );
        let search = SearchService::new(store);

        Ok(Self {
            config,
            runner,
            search,
        })
    }

    /// Directory uploads should be placed in before submission.
    pub fn staging_dir(&self) -> &std::path::Path {
        &self.config.staging_dir
    }

    /// Queue the staged file named `filename` for ingestion.
    pub async fn submit(&self, filename: &str) -> Result<String, IngestError> {
        let path = self.config.staging_dir.join(filename);
        self.runner.submit(path).await
    }

    /// Queue an arbitrary path for ingestion, bypassing the staging dir.
    pub async fn submit_path(&self, path: PathBuf) -> Result<String, IngestError> {
        self.runner.submit(path).await
    }

    /// Poll a job's current state.
    pub async fn status(&self, job_id: &str) -> Result<JobStatus, IngestError> {
        self.runner.status(job_id).await
    }

    /// Search the stored corpus.
    pub fn search(&self, query: &SearchQuery) -> Result<Vec<String>, IngestError> {
        Ok(self.search.search(query)?)
    }

    /// List every stored document.
    pub fn documents(&self) -> Result<Vec<ExtractedDocument>, IngestError> {
        Ok(self.search.documents()?)
    }

    /// Stop the job runner. In-flight jobs still finish.
    pub fn shutdown(&self) {
        self.runner.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::ImageEncoding;
    use crate::pdf::test_pdf;
    use std::time::Duration;

    fn test_config(dir: &tempfile::TempDir) -> Config {
        Config {
            staging_dir: dir.path().join("uploads"),
            database_path: dir.path().join("arquivo.db"),
            max_concurrent_jobs: 2,
            job_retention_secs: 900,
            ..Config::default()
        }
    }

    async fn wait_terminal(service: &IngestService, id: &str) -> JobStatus {
        for _ in 0..200 {
            let status = service.status(id).await.unwrap();
            if status.state.is_terminal() {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {id} never reached a terminal state");
    }

    #[tokio::test]
    async fn full_lifecycle_submit_poll_search() {
        let dir = tempfile::tempdir().unwrap();
        let service = IngestService::with_ocr(test_config(&dir), Arc::new(NoOpOcr)).unwrap();

        std::fs::write(
            service.staging_dir().join("relatorio.pdf"),
            test_pdf::with_text("Relatorio anual da empresa"),
        )
        .unwrap();

        let id = service.submit("relatorio.pdf").await.unwrap();
        let status = wait_terminal(&service, &id).await;
        assert_eq!(status.state, JobState::Succeeded { duplicate: false });

        let docs = service.documents().unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].file_id, "relatorio");
        assert!(docs[0].content.contains("Relatorio anual"));

        service.shutdown();
    }

    /// OCR text participates in date mining and search like any other text.
    struct InvoiceOcr;

    impl OcrEngine for InvoiceOcr {
        fn recognize(
            &self,
            _image: &[u8],
            _encoding: ImageEncoding,
            _language: &str,
        ) -> anyhow::Result<String> {
            Ok("Invoice 42\\nData de início: 01/01/2024\\nConclusão Efetiva: 31/01/2024"
                .to_string())
        }
    }

    #[tokio::test]
    async fn scanned_invoice_is_searchable_by_content_and_date() {
        let dir = tempfile::tempdir().unwrap();
        let service = IngestService::with_ocr(test_config(&dir), Arc::new(InvoiceOcr)).unwrap();

        std::fs::write(
            service.staging_dir().join("fatura.pdf"),
            test_pdf::with_gray_image(8, 8),
        )
        .unwrap();

        let id = service.submit("fatura.pdf").await.unwrap();
        let status = wait_terminal(&service, &id).await;
        assert_eq!(status.state, JobState::Succeeded { duplicate: false });

        let docs = service.documents().unwrap();
        assert_eq!(docs[0].start_date.as_deref(), Some("01/01/2024"));
        assert_eq!(docs[0].end_date.as_deref(), Some("31/01/2024"));
        // Escaped line breaks from the raw text are folded away
        assert!(!docs[0].content.contains("\\n"));

        let hits = service
            .search(&SearchQuery {
                substring: "Invoice".to_string(),
                date: "15/01/2024".to_string(),
            })
            .unwrap();
        assert_eq!(hits, vec!["fatura"]);

        let misses = service
            .search(&SearchQuery {
                substring: "Invoice".to_string(),
                date: "01/03/2024".to_string(),
            })
            .unwrap();
        assert!(misses.is_empty());

        service.shutdown();
    }

    #[tokio::test]
    async fn missing_staged_file_fails_the_job() {
        let dir = tempfile::tempdir().unwrap();
        let service = IngestService::with_ocr(test_config(&dir), Arc::new(NoOpOcr)).unwrap();

        let id = service.submit("nao-existe.pdf").await.unwrap();
        let status = wait_terminal(&service, &id).await;
        assert!(matches!(status.state, JobState::Failed { .. }));

        service.shutdown();
    }
}
