use super::{ExtractError, FragmentSource};
use crate::document::{Document, DocumentFormat};

const BOM: char = '\u{feff}';

pub struct PlainTextSource;

impl FragmentSource for PlainTextSource {
    fn fragments(&self, document: &Document) -> Result<Vec<String>, ExtractError> {
        let text = std::str::from_utf8(document.bytes()).map_err(|err| {
            ExtractError::with_details(
                DocumentFormat::PlainText,
                "file is not valid UTF-8",
                err.to_string(),
            )
        })?;
        Ok(vec![text.strip_prefix(BOM).unwrap_or(text).to_string()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::Extractor;

    fn txt(bytes: &[u8]) -> Document {
        Document::new("notes.txt", DocumentFormat::PlainText, bytes.to_vec())
    }

    #[test]
    fn decodes_utf8_verbatim() {
        let text = Extractor::standard()
            .extract(&txt("Línea uno\nLínea dos".as_bytes()))
            .unwrap();
        assert_eq!(text.as_str(), "Línea uno\nLínea dos");
    }

    #[test]
    fn drops_byte_order_mark() {
        let text = Extractor::standard()
            .extract(&txt("\u{feff}Hello".as_bytes()))
            .unwrap();
        assert_eq!(text.as_str(), "Hello");
    }

    #[test]
    fn invalid_utf8_is_an_extraction_error() {
        let error = Extractor::standard()
            .extract(&txt(&[0x48, 0xff, 0xfe, 0x21]))
            .unwrap_err();
        match error {
            ExtractError::Extraction { format, details, .. } => {
                assert_eq!(format, DocumentFormat::PlainText);
                assert!(details.is_some());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn empty_file_is_empty_text_not_an_error() {
        let text = Extractor::standard().extract(&txt(b"")).unwrap();
        assert!(text.is_empty());
    }
}
