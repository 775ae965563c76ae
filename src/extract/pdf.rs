use log::debug;

use super::{ExtractError, FragmentSource};
use crate::document::{Document, DocumentFormat};

/// One fragment per page, in page order.
pub struct PdfSource;

impl FragmentSource for PdfSource {
    fn fragments(&self, document: &Document) -> Result<Vec<String>, ExtractError> {
        let pdf = lopdf::Document::load_mem(document.bytes())
            .map_err(|err| ExtractError::parse(DocumentFormat::Pdf, err))?;
        let pages = pdf.get_pages();
        debug!("{} has {} pages", document.name(), pages.len());

        let mut fragments = Vec::with_capacity(pages.len());
        for page_number in pages.keys() {
            let text = pdf.extract_text(&[*page_number]).map_err(|err| {
                ExtractError::with_details(
                    DocumentFormat::Pdf,
                    format!("page {page_number} could not be read"),
                    err.to_string(),
                )
            })?;
            // lopdf terminates every text object with a newline
            fragments.push(text.trim_end_matches(&['\r', '\n'][..]).to_string());
        }
        Ok(fragments)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::extract::Extractor;
    use lopdf::{
        content::{Content, Operation},
        dictionary, Object, Stream,
    };

    /// Builds a PDF with one Courier text line per page.
    pub(crate) fn build_pdf(pages: &[&str]) -> Vec<u8> {
        let mut doc = lopdf::Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids = Vec::new();
        for text in pages {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 24.into()]),
                    Operation::new("Td", vec![100.into(), 600.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*text)]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id =
                doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => resources_id,
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn three_pages_concatenate_in_order() {
        let bytes = build_pdf(&["Hello", "World", "Test"]);
        let document = Document::new("three.pdf", DocumentFormat::Pdf, bytes);
        let text = Extractor::standard().extract(&document).unwrap();
        assert_eq!(text.as_str(), "HelloWorldTest");
        assert_eq!(text.fragment_count(), 3);
    }

    #[test]
    fn corrupt_payload_is_an_extraction_error() {
        let document = Document::new("broken.pdf", DocumentFormat::Pdf, b"%PDF-1.5 nonsense".to_vec());
        let error = Extractor::standard().extract(&document).unwrap_err();
        assert!(matches!(
            error,
            ExtractError::Extraction {
                format: DocumentFormat::Pdf,
                ..
            }
        ));
    }
}
