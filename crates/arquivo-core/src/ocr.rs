//! OCR collaborator for embedded raster images.
//!
//! OCR is an external concern: the pipeline only defines the contract it
//! needs (`OcrEngine`) and a Tesseract-CLI-backed implementation. Every
//! failure path here is non-fatal to the caller; the page extractor logs
//! and drops the affected image's fragment.

use std::process::Command;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// File encoding of an image handed to OCR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageEncoding {
    Jpeg,
    Png,
}

impl ImageEncoding {
    pub fn extension(self) -> &'static str {
        match self {
            ImageEncoding::Jpeg => "jpg",
            ImageEncoding::Png => "png",
        }
    }
}

/// Contract the extraction pipeline requires from an OCR engine.
///
/// `recognize` receives complete image file bytes (not raw samples) and a
/// language hint. Implementations may be slow; callers invoke this from
/// blocking contexts only.
pub trait OcrEngine: Send + Sync {
    fn recognize(&self, image: &[u8], encoding: ImageEncoding, language: &str) -> Result<String>;
}

/// Configuration for the Tesseract-backed engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    /// Tesseract language code passed via `-l` (default: "por").
    pub language: String,
    /// Path to the tesseract binary (default: "tesseract", relies on PATH).
    pub tesseract_path: String,
    /// Whether to run OCR on embedded images at all.
    pub enabled: bool,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            language: "por".to_string(),
            tesseract_path: "tesseract".to_string(),
            enabled: true,
        }
    }
}

/// OCR via the Tesseract CLI: the image bytes are written to a scratch file
/// and `tesseract <file> stdout -l <lang>` is invoked.
pub struct TesseractOcr {
    tesseract_path: String,
}

impl TesseractOcr {
    pub fn new(tesseract_path: impl Into<String>) -> Self {
        Self {
            tesseract_path: tesseract_path.into(),
        }
    }

    /// Check whether the configured binary responds to `--version`.
    pub fn is_available(tesseract_path: &str) -> bool {
        Command::new(tesseract_path)
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }
}

impl OcrEngine for TesseractOcr {
    fn recognize(&self, image: &[u8], encoding: ImageEncoding, language: &str) -> Result<String> {
        let dir = tempfile::tempdir()?;
        let input = dir.path().join(format!("page_image.{}", encoding.extension()));
        std::fs::write(&input, image)?;

        let output = Command::new(&self.tesseract_path)
            .arg(&input)
            .arg("stdout")
            .arg("-l")
            .arg(language)
            .output()
            .map_err(|e| {
                anyhow!(
                    "failed to run tesseract (path='{}'): {}",
                    self.tesseract_path,
                    e
                )
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!(
                "tesseract exited with {}: {}",
                output.status.code().unwrap_or(-1),
                stderr.trim()
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

/// Engine used when OCR is disabled or tesseract is not installed.
/// Recognizes nothing; the textual layer still flows through untouched.
pub struct NoOpOcr;

impl OcrEngine for NoOpOcr {
    fn recognize(&self, _image: &[u8], _encoding: ImageEncoding, _language: &str) -> Result<String> {
        Ok(String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = OcrConfig::default();
        assert_eq!(config.language, "por");
        assert_eq!(config.tesseract_path, "tesseract");
        assert!(config.enabled);
    }

    #[test]
    fn encoding_extensions() {
        assert_eq!(ImageEncoding::Jpeg.extension(), "jpg");
        assert_eq!(ImageEncoding::Png.extension(), "png");
    }

    #[test]
    fn noop_engine_recognizes_nothing() {
        let text = NoOpOcr
            .recognize(b"anything", ImageEncoding::Png, "por")
            .unwrap();
        assert!(text.is_empty());
    }

    #[test]
    fn availability_check_fails_for_missing_binary() {
        assert!(!TesseractOcr::is_available("/nonexistent/tesseract"));
    }

    #[test]
    fn missing_binary_yields_error_not_panic() {
        let engine = TesseractOcr::new("/nonexistent/tesseract");
        let result = engine.recognize(b"fake image", ImageEncoding::Png, "por");
        assert!(result.is_err());
    }
}
