//! Query surface over the stored corpus.

use serde::{Deserialize, Serialize};

use crate::storage::{DocumentStore, ExtractedDocument, StoreError};

/// A search request: documents whose content contains `substring` and whose
/// mined date range brackets `date`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Case-sensitive needle; empty matches every document.
    pub substring: String,
    /// `dd/mm/yyyy`, compared textually against the stored bounds.
    pub date: String,
}

/// Read-only view over the document store.
#[derive(Clone)]
pub struct SearchService {
    store: DocumentStore,
}

impl SearchService {
    pub fn new(store: DocumentStore) -> Self {
        Self { store }
    }

    /// File IDs of every document matching both filter dimensions, in
    /// ascending id order.
    pub fn search(&self, query: &SearchQuery) -> Result<Vec<String>, StoreError> {
        let hits = self
            .store
            .search_by_content_and_date(&query.substring, &query.date)?;
        tracing::debug!(
            substring = %query.substring,
            date = %query.date,
            hits = hits.len(),
            "Search executed"
        );
        Ok(hits)
    }

    /// Full listing of the stored corpus, ordered by file id.
    pub fn documents(&self) -> Result<Vec<ExtractedDocument>, StoreError> {
        self.store.scan_all()
    }
}
