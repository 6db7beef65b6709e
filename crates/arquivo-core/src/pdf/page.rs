//! Per-page tiered text extraction.
//!
//! A page offers up to three text sources: the direct (linear) text layer,
//! block-level text recovered from the content stream, and OCR over
//! embedded raster images. The textual layer is tiered - blocks are
//! consulted only when the direct layer is blank - while OCR output is
//! always additive on top of whichever textual tier won.

use crate::ocr::{ImageEncoding, OcrEngine};

/// An embedded raster image, already re-encoded into a file format OCR can
/// read (see `pdf::extractor` for the raw-sample conversion).
#[derive(Debug, Clone)]
pub struct PageImage {
    pub data: Vec<u8>,
    pub encoding: ImageEncoding,
}

/// One page's extraction inputs, before any tiering decision.
#[derive(Debug, Clone, Default)]
pub struct RawPage {
    /// Direct text-layer fragments in reading order.
    pub direct: Vec<String>,
    /// Block-level fragments in native block order. Only consulted when the
    /// direct layer is whitespace-only.
    pub blocks: Vec<String>,
    /// Embedded images in page order.
    pub images: Vec<PageImage>,
}

/// Produce the ordered text fragments for one page.
///
/// Direct text wins outright when any of it is non-blank; otherwise every
/// non-blank block is taken in order. Each image is then OCRed
/// independently and appended after the textual fragments. An OCR failure
/// drops only that image's fragment.
pub fn extract_fragments(page: &RawPage, ocr: &dyn OcrEngine, language: &str) -> Vec<String> {
    let mut fragments: Vec<String> = Vec::new();

    let direct_has_text = page.direct.iter().any(|f| !f.trim().is_empty());
    if direct_has_text {
        fragments.extend(
            page.direct
                .iter()
                .filter(|f| !f.trim().is_empty())
                .map(|f| f.trim().to_string()),
        );
    } else {
        fragments.extend(
            page.blocks
                .iter()
                .filter(|b| !b.trim().is_empty())
                .map(|b| b.trim().to_string()),
        );
    }

    for (index, image) in page.images.iter().enumerate() {
        match ocr.recognize(&image.data, image.encoding, language) {
            Ok(text) if !text.trim().is_empty() => fragments.push(text.trim().to_string()),
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(image = index, error = %e, "OCR failed for embedded image, skipping");
            }
        }
    }

    fragments
}
