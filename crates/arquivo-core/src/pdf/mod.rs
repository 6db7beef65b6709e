//! PDF text extraction: per-page tiered strategy plus whole-document
//! driving, normalization and metadata mining.

pub mod extractor;
pub mod page;

pub use extractor::DocumentExtractor;
pub use page::{PageImage, RawPage};

/// Builders for minimal real PDFs used across the crate's tests.
#[cfg(test)]
pub(crate) mod test_pdf {
    use lopdf::{dictionary, Document, Object, Stream};

    /// Single page carrying `text` in its direct text layer.
    pub fn with_text(text: &str) -> Vec<u8> {
        with_pages(&[text])
    }

    /// One page per entry of `page_texts`.
    pub fn with_pages(page_texts: &[&str]) -> Vec<u8> {
        let mut doc = Document::with_version("1.4");

        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => font_id,
            },
        });

        let mut page_ids = Vec::new();
        for text in page_texts {
            let content = format!("BT /F1 12 Tf 100 700 Td ({}) Tj ET", escape(text));
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                "Resources" => resources_id,
                "Contents" => content_id,
            });
            page_ids.push(page_id);
        }

        finish(doc, page_ids)
    }

    /// Single page with no text layer and one uncompressed grayscale image
    /// XObject of the given dimensions.
    pub fn with_gray_image(width: u32, height: u32) -> Vec<u8> {
        let mut doc = Document::with_version("1.4");

        let samples = vec![0x80u8; (width * height) as usize];
        let image_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width as i64,
                "Height" => height as i64,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
            },
            samples,
        ));
        finish_image_page(doc, image_id)
    }

    /// Single page with no text layer and one DCT-encoded image XObject
    /// carrying `jpeg_bytes` verbatim.
    pub fn with_jpeg_image(jpeg_bytes: &[u8]) -> Vec<u8> {
        let mut doc = Document::with_version("1.4");

        let image_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 4,
                "Height" => 4,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
                "Filter" => "DCTDecode",
            },
            jpeg_bytes.to_vec(),
        ));
        finish_image_page(doc, image_id)
    }

    fn finish_image_page(mut doc: Document, image_id: lopdf::ObjectId) -> Vec<u8> {
        let resources_id = doc.add_object(dictionary! {
            "XObject" => dictionary! {
                "Im0" => image_id,
            },
        });
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            b"q 10 0 0 10 100 600 cm /Im0 Do Q".to_vec(),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Resources" => resources_id,
            "Contents" => content_id,
        });
        finish(doc, vec![page_id])
    }

    fn finish(mut doc: Document, page_ids: Vec<lopdf::ObjectId>) -> Vec<u8> {
        let kids: Vec<Object> = page_ids.iter().map(|&id| id.into()).collect();
        let pages_id = doc.add_object(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => Object::Integer(page_ids.len() as i64),
        });

        for page_id in &page_ids {
            if let Ok(Object::Dictionary(ref mut dict)) = doc.get_object_mut(*page_id) {
                dict.set("Parent", pages_id);
            }
        }

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).unwrap();
        buffer
    }

    fn escape(text: &str) -> String {
        text.replace('\\', "\\\\")
            .replace('(', "\\(")
            .replace(')', "\\)")
    }
}
