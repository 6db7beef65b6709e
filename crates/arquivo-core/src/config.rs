use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::ocr::OcrConfig;

/// Service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory uploads are staged into before ingestion.
    pub staging_dir: PathBuf,
    /// SQLite database file.
    pub database_path: PathBuf,
    pub ocr: OcrConfig,
    /// Concurrent extraction cap.
    pub max_concurrent_jobs: usize,
    /// How long finished jobs stay pollable, in seconds.
    pub job_retention_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("arquivo");

        Self {
            staging_dir: data_dir.join("uploads"),
            database_path: data_dir.join("arquivo.db"),
            ocr: OcrConfig::default(),
            max_concurrent_jobs: 8,
            job_retention_secs: 900,
        }
    }
}

impl Config {
    /// Read configuration from a JSON file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Load `config.json` from the data directory, or fall back to
    /// defaults when it is missing or unreadable.
    pub fn load_or_default() -> Self {
        let path = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("arquivo")
            .join("config.json");

        if path.exists() {
            match Self::load(&path) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!("Failed to load {:?}, using defaults: {}", path, e);
                }
            }
        }
        Self::default()
    }

    /// Ensure the staging directory and the database's parent exist.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.staging_dir)?;
        if let Some(parent) = self.database_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }
}
