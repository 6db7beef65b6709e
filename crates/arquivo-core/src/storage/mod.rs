//! Persistence for extracted documents.
//!
//! A single SQLite table holds every ingested document. The insert path is
//! the deduplication guard: before writing, the candidate is checked against
//! existing rows by `file_id` *or* by exact `content` match, and the primary
//! key on `file_id` backstops races the in-process check cannot see (other
//! processes sharing the database file).

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The unit persisted: one document's identity, normalized text and mined
/// date pair. `file_id` derives from the uploaded file's base name, so a
/// re-upload of a same-named file lands on the same identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedDocument {
    pub file_id: String,
    pub content: String,
    /// `dd/mm/yyyy`, kept textual; absent when the source label is missing.
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// Result of a save: either the row was written, or an equivalent document
/// was already present and the write was skipped. The duplicate case is a
/// normal outcome, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveOutcome {
    Inserted,
    AlreadyExists,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store query failed: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// The uniqueness constraint on `file_id` rejected the row. Only
    /// reachable when a concurrent writer slipped between the existence
    /// check and the insert.
    #[error("duplicate document id: {0}")]
    DuplicateKey(String),
    #[error("store lock poisoned")]
    Poisoned,
}

/// SQLite-backed document store shared by all jobs and by search.
///
/// All access is serialized through one connection; the existence check and
/// the insert run under the same lock acquisition, making the save an
/// atomic test-and-set within the process.
#[derive(Clone)]
pub struct DocumentStore {
    conn: Arc<Mutex<Connection>>,
}

impl DocumentStore {
    /// Open (and initialize if needed) the database at `path`, creating
    /// parent directories when missing.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
            }
        }
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory store, used by tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_schema(conn: &Connection) -> Result<(), rusqlite::Error> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS pdf_data (
                file_id TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                start_date TEXT,
                end_date TEXT
            )",
            [],
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Does a document with this `file_id` or this exact `content` already
    /// exist?
    pub fn exists(&self, file_id: &str, content: &str) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        Self::exists_locked(&conn, file_id, content)
    }

    fn exists_locked(
        conn: &Connection,
        file_id: &str,
        content: &str,
    ) -> Result<bool, StoreError> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM pdf_data WHERE file_id = ?1 OR content = ?2",
            params![file_id, content],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Save a document unless an equivalent one is already stored.
    ///
    /// Duplicate by identity or by content skips the write and reports
    /// [`SaveOutcome::AlreadyExists`]. A primary-key violation from a
    /// concurrent writer surfaces as [`StoreError::DuplicateKey`].
    pub fn insert(&self, doc: &ExtractedDocument) -> Result<SaveOutcome, StoreError> {
        let conn = self.lock()?;

        if Self::exists_locked(&conn, &doc.file_id, &doc.content)? {
            tracing::warn!(
                file_id = %doc.file_id,
                "Document already stored (same id or identical content), skipping write"
            );
            return Ok(SaveOutcome::AlreadyExists);
        }

        let result = conn.execute(
            "INSERT INTO pdf_data (file_id, content, start_date, end_date)
             VALUES (?1, ?2, ?3, ?4)",
            params![doc.file_id, doc.content, doc.start_date, doc.end_date],
        );

        match result {
            Ok(_) => Ok(SaveOutcome::Inserted),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::DuplicateKey(doc.file_id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Every stored document, ordered by `file_id` for stable listings.
    pub fn scan_all(&self) -> Result<Vec<ExtractedDocument>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT file_id, content, start_date, end_date FROM pdf_data ORDER BY file_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(ExtractedDocument {
                file_id: row.get(0)?,
                content: row.get(1)?,
                start_date: row.get(2)?,
                end_date: row.get(3)?,
            })
        })?;
        let mut docs = Vec::new();
        for row in rows {
            docs.push(row?);
        }
        Ok(docs)
    }

    /// IDs of documents whose content contains `substring` (case-sensitive)
    /// and whose `[start_date, end_date]` pair brackets `date` inclusively.
    ///
    /// Dates are stored as `dd/mm/yyyy` text but compared as calendar
    /// dates, so a query date in March never falls inside a January range.
    /// A document missing either date, or carrying one that does not parse,
    /// never matches. An empty substring matches every content.
    pub fn search_by_content_and_date(
        &self,
        substring: &str,
        date: &str,
    ) -> Result<Vec<String>, StoreError> {
        let Some(needle_date) = parse_date(date) else {
            return Ok(Vec::new());
        };

        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT file_id, content, start_date, end_date FROM pdf_data
             WHERE start_date IS NOT NULL
               AND end_date IS NOT NULL
             ORDER BY file_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut ids = Vec::new();
        for row in rows {
            let (file_id, content, start, end) = row?;
            let in_range = match (parse_date(&start), parse_date(&end)) {
                (Some(start), Some(end)) => start <= needle_date && needle_date <= end,
                _ => false,
            };
            // Substring match stays in Rust: SQLite's LIKE is
            // case-insensitive for ASCII
            if in_range && content.contains(substring) {
                ids.push(file_id);
            }
        }
        Ok(ids)
    }
}

fn parse_date(text: &str) -> Option<chrono::NaiveDate> {
    chrono::NaiveDate::parse_from_str(text, "%d/%m/%Y").ok()
}
