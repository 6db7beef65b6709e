//! Whole-document extraction: drives the per-page tiered strategy over
//! every page, concatenates, normalizes and mines metadata.

use std::iter::Peekable;
use std::path::Path;
use std::str::Chars;
use std::sync::Arc;

use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

use crate::error::IngestError;
use crate::metadata;
use crate::ocr::{ImageEncoding, OcrEngine};
use crate::pdf::page::{extract_fragments, PageImage, RawPage};
use crate::storage::ExtractedDocument;
use crate::text;

/// Extracts one PDF into an [`ExtractedDocument`].
///
/// Holds the OCR collaborator and the document language; everything else is
/// per-call state. `extract` is blocking (PDF decode and OCR are CPU-bound)
/// and is expected to run inside `spawn_blocking` from async contexts.
pub struct DocumentExtractor {
    ocr: Arc<dyn OcrEngine>,
    language: String,
}

impl DocumentExtractor {
    pub fn new(ocr: Arc<dyn OcrEngine>, language: impl Into<String>) -> Self {
        Self {
            ocr,
            language: language.into(),
        }
    }

    /// Extract text and dates from the PDF at `path`.
    ///
    /// Fails only when the file cannot be opened or parsed as a PDF; page
    /// level trouble (missing text layer, undecodable image) degrades to
    /// fewer fragments, never to an error.
    pub fn extract(&self, path: &Path) -> Result<ExtractedDocument, IngestError> {
        let doc = Document::load(path).map_err(|source| IngestError::DocumentOpen {
            path: path.display().to_string(),
            source,
        })?;

        let file_id = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "unnamed".to_string());

        let mut fragments: Vec<String> = Vec::new();
        for (page_no, page_id) in doc.get_pages() {
            let raw = load_raw_page(&doc, page_no, page_id);
            fragments.extend(extract_fragments(&raw, self.ocr.as_ref(), &self.language));
        }

        let content = text::normalize(&fragments.join("\n"));
        let dates = metadata::extract_dates(&content);

        tracing::debug!(
            file_id = %file_id,
            chars = content.len(),
            start_date = ?dates.start_date,
            end_date = ?dates.end_date,
            "Extracted document"
        );

        Ok(ExtractedDocument {
            file_id,
            content,
            start_date: dates.start_date,
            end_date: dates.end_date,
        })
    }
}

/// Gather one page's raw extraction inputs.
///
/// The block parse is skipped whenever the direct text layer already has
/// content, since blocks are only ever consulted as a fallback.
fn load_raw_page(doc: &Document, page_no: u32, page_id: ObjectId) -> RawPage {
    let mut raw = RawPage::default();

    let direct = doc.extract_text(&[page_no]).unwrap_or_default();
    let direct_is_blank = direct.trim().is_empty();
    if !direct_is_blank {
        raw.direct.push(direct);
    }

    let page_dict = match doc.get_object(page_id).and_then(Object::as_dict) {
        Ok(dict) => dict,
        Err(e) => {
            tracing::warn!(page = page_no, error = %e, "Page object is not a dictionary");
            return raw;
        }
    };

    if direct_is_blank {
        if let Ok(contents) = page_dict.get(b"Contents") {
            match content_data(doc, contents) {
                Ok(data) => raw.blocks = parse_text_blocks(&String::from_utf8_lossy(&data)),
                Err(e) => {
                    tracing::warn!(page = page_no, error = %e, "Failed to read page content stream");
                }
            }
        }
    }

    raw.images = collect_page_images(doc, page_dict, page_no);
    raw
}

/// Flatten a page's `Contents` entry (stream, reference or array of either)
/// into one byte buffer.
fn content_data(doc: &Document, contents: &Object) -> Result<Vec<u8>, lopdf::Error> {
    match contents {
        Object::Reference(id) => content_data(doc, doc.get_object(*id)?),
        Object::Stream(stream) => Ok(stream
            .decompressed_content()
            .unwrap_or_else(|_| stream.content.clone())),
        Object::Array(items) => {
            let mut data = Vec::new();
            for item in items {
                data.extend_from_slice(&content_data(doc, item)?);
            }
            Ok(data)
        }
        _ => Ok(Vec::new()),
    }
}

/// Recover block-level text from a content stream.
///
/// Each `BT ... ET` run becomes one block; shown strings (`Tj`, `TJ`, `'`,
/// `"`) inside the run are concatenated. This is a fallback granularity for
/// pages whose linear text layer decodes to nothing, so a best-effort
/// string decode is sufficient.
fn parse_text_blocks(content: &str) -> Vec<String> {
    let mut blocks: Vec<String> = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut pending: Vec<String> = Vec::new();
    let mut in_text = false;
    let mut word = String::new();
    let mut chars = content.chars().peekable();

    fn apply_word(
        word: &mut String,
        in_text: &mut bool,
        blocks: &mut Vec<String>,
        current: &mut Vec<String>,
        pending: &mut Vec<String>,
    ) {
        if word.is_empty() {
            return;
        }
        match word.as_str() {
            "BT" => {
                *in_text = true;
                current.clear();
                pending.clear();
            }
            "ET" => {
                if *in_text {
                    let block = current.join(" ");
                    if !block.trim().is_empty() {
                        blocks.push(block.trim().to_string());
                    }
                }
                *in_text = false;
                current.clear();
                pending.clear();
            }
            "Tj" | "TJ" | "'" | "\"" => {
                if *in_text && !pending.is_empty() {
                    current.push(pending.concat());
                }
                pending.clear();
            }
            other => {
                // Operands (names, numbers) may sit between a string and its
                // show operator; only a real operator discards pending text
                let is_operand = other.starts_with('/')
                    || other.starts_with(|c: char| c.is_ascii_digit() || "+-.".contains(c));
                if !is_operand {
                    pending.clear();
                }
            }
        }
        word.clear();
    }

    while let Some(ch) = chars.next() {
        match ch {
            '(' => {
                apply_word(&mut word, &mut in_text, &mut blocks, &mut current, &mut pending);
                pending.push(read_literal_string(&mut chars));
            }
            '<' => {
                apply_word(&mut word, &mut in_text, &mut blocks, &mut current, &mut pending);
                // Hex strings are skipped; '<<' opens a dictionary whose
                // tokens are harmless to the scanner
                if chars.peek() == Some(&'<') {
                    chars.next();
                } else {
                    for c in chars.by_ref() {
                        if c == '>' {
                            break;
                        }
                    }
                }
            }
            '[' | ']' | '>' => {
                apply_word(&mut word, &mut in_text, &mut blocks, &mut current, &mut pending);
            }
            c if c.is_whitespace() => {
                apply_word(&mut word, &mut in_text, &mut blocks, &mut current, &mut pending);
            }
            c => word.push(c),
        }
    }
    apply_word(&mut word, &mut in_text, &mut blocks, &mut current, &mut pending);

    blocks
}

/// Read a PDF literal string, the opening `(` already consumed.
fn read_literal_string(chars: &mut Peekable<Chars<'_>>) -> String {
    let mut out = String::new();
    let mut depth = 1;

    while let Some(ch) = chars.next() {
        match ch {
            '\\' => {
                let Some(next) = chars.next() else { break };
                match next {
                    'n' => out.push('\n'),
                    'r' => out.push('\r'),
                    't' => out.push('\t'),
                    'b' => out.push('\x08'),
                    'f' => out.push('\x0c'),
                    '(' | ')' | '\\' => out.push(next),
                    '0'..='7' => {
                        let mut code = next.to_digit(8).unwrap_or(0);
                        for _ in 0..2 {
                            match chars.peek().and_then(|c| c.to_digit(8)) {
                                Some(d) => {
                                    code = code * 8 + d;
                                    chars.next();
                                }
                                None => break,
                            }
                        }
                        if let Some(c) = char::from_u32(code) {
                            out.push(c);
                        }
                    }
                    _ => out.push(next),
                }
            }
            '(' => {
                depth += 1;
                out.push('(');
            }
            ')' => {
                depth -= 1;
                if depth == 0 {
                    break;
                }
                out.push(')');
            }
            c => out.push(c),
        }
    }

    out
}

/// Walk the page's `Resources -> XObject` dictionary and return every image
/// XObject as file-format bytes OCR can consume. Undecodable images are
/// logged and skipped.
fn collect_page_images(doc: &Document, page_dict: &Dictionary, page_no: u32) -> Vec<PageImage> {
    let mut images = Vec::new();

    let Some(resources) = page_dict.get(b"Resources").ok().and_then(|r| resolve_dict(doc, r))
    else {
        return images;
    };
    let Some(xobjects) = resources.get(b"XObject").ok().and_then(|x| resolve_dict(doc, x))
    else {
        return images;
    };

    for (name, entry) in xobjects.iter() {
        let stream = match entry {
            Object::Reference(id) => match doc.get_object(*id) {
                Ok(Object::Stream(s)) => s,
                _ => continue,
            },
            Object::Stream(s) => s,
            _ => continue,
        };

        let is_image = stream
            .dict
            .get(b"Subtype")
            .ok()
            .and_then(|s| resolve_name(doc, s))
            .map(|n| n == b"Image")
            .unwrap_or(false);
        if !is_image {
            continue;
        }

        match encode_image(doc, stream) {
            Some(image) => images.push(image),
            None => {
                tracing::warn!(
                    page = page_no,
                    xobject = %String::from_utf8_lossy(name),
                    "Skipping embedded image with unsupported encoding"
                );
            }
        }
    }

    images
}

/// Turn an image XObject into bytes in a raster file format.
///
/// DCT-encoded streams are already complete JPEG files and pass through
/// untouched. Anything else is decompressed and re-encoded as PNG from its
/// raw samples, which requires 8 bits per component and an RGB or Gray
/// color space.
fn encode_image(doc: &Document, stream: &Stream) -> Option<PageImage> {
    let filters = filter_names(doc, &stream.dict);
    if filters.iter().any(|f| f == b"DCTDecode") {
        return Some(PageImage {
            data: stream.content.clone(),
            encoding: ImageEncoding::Jpeg,
        });
    }
    if filters.iter().any(|f| f == b"JPXDecode" || f == b"CCITTFaxDecode") {
        return None;
    }

    let data = if filters.is_empty() {
        stream.content.clone()
    } else {
        stream.decompressed_content().ok()?
    };
    let width = resolve_u32(doc, &stream.dict, b"Width")?;
    let height = resolve_u32(doc, &stream.dict, b"Height")?;
    let bits = resolve_u32(doc, &stream.dict, b"BitsPerComponent").unwrap_or(8);
    if bits != 8 {
        return None;
    }

    let color_space = stream
        .dict
        .get(b"ColorSpace")
        .ok()
        .and_then(|c| resolve_name(doc, c))?;

    let mut png = std::io::Cursor::new(Vec::new());
    match color_space {
        b"DeviceRGB" => {
            let img = image::RgbImage::from_raw(width, height, data)?;
            img.write_to(&mut png, image::ImageFormat::Png).ok()?;
        }
        b"DeviceGray" => {
            let img = image::GrayImage::from_raw(width, height, data)?;
            img.write_to(&mut png, image::ImageFormat::Png).ok()?;
        }
        _ => return None,
    }

    Some(PageImage {
        data: png.into_inner(),
        encoding: ImageEncoding::Png,
    })
}

fn resolve_dict<'a>(doc: &'a Document, object: &'a Object) -> Option<&'a Dictionary> {
    match object {
        Object::Reference(id) => match doc.get_object(*id) {
            Ok(Object::Dictionary(dict)) => Some(dict),
            _ => None,
        },
        Object::Dictionary(dict) => Some(dict),
        _ => None,
    }
}

fn resolve_name<'a>(doc: &'a Document, object: &'a Object) -> Option<&'a [u8]> {
    match object {
        Object::Reference(id) => match doc.get_object(*id) {
            Ok(Object::Name(name)) => Some(name),
            _ => None,
        },
        Object::Name(name) => Some(name),
        _ => None,
    }
}

fn resolve_u32(doc: &Document, dict: &Dictionary, key: &[u8]) -> Option<u32> {
    match dict.get(key).ok()? {
        Object::Integer(i) => u32::try_from(*i).ok(),
        Object::Reference(id) => match doc.get_object(*id) {
            Ok(Object::Integer(i)) => u32::try_from(*i).ok(),
            _ => None,
        },
        _ => None,
    }
}

fn filter_names(doc: &Document, dict: &Dictionary) -> Vec<Vec<u8>> {
    let Ok(filter) = dict.get(b"Filter") else {
        return Vec::new();
    };
    match filter {
        Object::Name(name) => vec![name.clone()],
        Object::Array(items) => items
            .iter()
            .filter_map(|item| resolve_name(doc, item))
            .map(|n| n.to_vec())
            .collect(),
        Object::Reference(id) => match doc.get_object(*id) {
            Ok(Object::Name(name)) => vec![name.clone()],
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}
