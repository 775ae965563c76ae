//! Text extraction for uploaded documents.
//!
//! [`Extractor`] keeps a registry of [`FragmentSource`] strategies keyed by
//! [`DocumentFormat`]. A strategy yields page or section ordered fragments and
//! the extractor joins them into a single [`ExtractedText`]. Dispatch looks at
//! the declared format only; payloads are never sniffed.

use std::{
    collections::HashMap,
    fmt,
    panic::{self, AssertUnwindSafe},
};

use log::{error, info, warn};
use serde::Serialize;
use thiserror::Error;

use crate::{
    document::{Document, DocumentFormat, UploadError},
    settings::Settings,
};

pub mod epub;
pub mod external;
pub mod markup;
pub mod mobi;
pub mod pdf;
pub mod plaintext;

pub use external::ExternalImporter;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported document format '{0}'")]
    UnsupportedFormat(String),
    #[error("could not extract text from {format} document: {message}")]
    Extraction {
        format: DocumentFormat,
        message: String,
        details: Option<String>,
    },
}

impl ExtractError {
    pub(crate) fn parse(format: DocumentFormat, err: impl fmt::Display) -> Self {
        ExtractError::Extraction {
            format,
            message: err.to_string(),
            details: None,
        }
    }

    pub(crate) fn with_details(
        format: DocumentFormat,
        message: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        ExtractError::Extraction {
            format,
            message: message.into(),
            details: Some(details.into()),
        }
    }
}

impl From<UploadError> for ExtractError {
    fn from(value: UploadError) -> Self {
        match value {
            UploadError::UnsupportedExtension(ext) => ExtractError::UnsupportedFormat(ext),
            UploadError::MissingExtension(name) => ExtractError::UnsupportedFormat(name),
            UploadError::Io(path, err) => ExtractError::UnsupportedFormat(format!("{path}: {err}")),
        }
    }
}

/// Yields the text fragments of a payload in source order.
pub trait FragmentSource: Send + Sync {
    fn fragments(&self, document: &Document) -> Result<Vec<String>, ExtractError>;
}

/// The flattened text of a document. Page and section boundaries are not kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtractedText {
    text: String,
    fragments: usize,
}

impl ExtractedText {
    pub fn new(text: impl Into<String>, fragments: usize) -> Self {
        Self {
            text: text.into(),
            fragments,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn fragment_count(&self) -> usize {
        self.fragments
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }

    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

impl fmt::Display for ExtractedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

pub struct Extractor {
    strategies: HashMap<DocumentFormat, Box<dyn FragmentSource>>,
    separator: String,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::standard()
    }
}

impl Extractor {
    /// An extractor with no strategies registered.
    pub fn empty() -> Self {
        Self {
            strategies: HashMap::new(),
            separator: String::new(),
        }
    }

    /// The built-in parsers for every supported format.
    pub fn standard() -> Self {
        Self::empty()
            .with_strategy(DocumentFormat::Pdf, pdf::PdfSource)
            .with_strategy(DocumentFormat::Epub, epub::EpubSource)
            .with_strategy(DocumentFormat::Mobi, mobi::MobiSource)
            .with_strategy(DocumentFormat::PlainText, plaintext::PlainTextSource)
    }

    /// Built-in parsers, replaced by external importers where the settings
    /// configure one, joined with the configured separator.
    pub fn from_settings(settings: &Settings) -> Self {
        let mut extractor = Self::standard().with_separator(settings.fragment_separator.clone());
        for (format, command) in &settings.importers {
            info!("Using external importer for {format}: {command}");
            extractor.register(*format, ExternalImporter::new(*format, command.clone()));
        }
        extractor
    }

    pub fn with_strategy(mut self, format: DocumentFormat, source: impl FragmentSource + 'static) -> Self {
        self.register(format, source);
        self
    }

    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    pub fn register(&mut self, format: DocumentFormat, source: impl FragmentSource + 'static) {
        self.strategies.insert(format, Box::new(source));
    }

    pub fn supports(&self, format: DocumentFormat) -> bool {
        self.strategies.contains_key(&format)
    }

    /// Validates an uploaded file name and extracts its text.
    pub fn extract_upload(&self, name: &str, bytes: Vec<u8>) -> Result<ExtractedText, ExtractError> {
        let document = Document::from_upload(name, bytes)?;
        self.extract(&document)
    }

    pub fn extract(&self, document: &Document) -> Result<ExtractedText, ExtractError> {
        let format = document.format();
        let strategy = self.strategies.get(&format).ok_or_else(|| {
            warn!("No extraction strategy registered for {format}");
            ExtractError::UnsupportedFormat(format.to_string())
        })?;

        info!(
            "Extracting {} ({format}, {} bytes)",
            document.name(),
            document.bytes().len()
        );
        let fragments = panic::catch_unwind(AssertUnwindSafe(|| strategy.fragments(document)))
            .unwrap_or_else(|payload| {
                let message = panic_message(payload.as_ref());
                Err(ExtractError::with_details(
                    format,
                    "parser aborted while reading the payload",
                    message,
                ))
            })
            .map_err(|err| {
                error!("Extraction of {} failed: {err}", document.name());
                err
            })?;

        let count = fragments.len();
        let text = fragments.join(&self.separator);
        info!(
            "Extracted {} characters from {count} fragments of {}",
            text.chars().count(),
            document.name()
        );
        Ok(ExtractedText::new(text, count))
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedPages(Vec<&'static str>);

    impl FragmentSource for FixedPages {
        fn fragments(&self, _document: &Document) -> Result<Vec<String>, ExtractError> {
            Ok(self.0.iter().map(|page| page.to_string()).collect())
        }
    }

    struct Exploding;

    impl FragmentSource for Exploding {
        fn fragments(&self, _document: &Document) -> Result<Vec<String>, ExtractError> {
            panic!("corrupt xref table");
        }
    }

    fn pdf(bytes: &[u8]) -> Document {
        Document::new("book.pdf", DocumentFormat::Pdf, bytes.to_vec())
    }

    #[test]
    fn joins_pages_without_separator() {
        let extractor = Extractor::empty()
            .with_strategy(DocumentFormat::Pdf, FixedPages(vec!["Hello", "World", "Test"]));
        let text = extractor.extract(&pdf(b"%PDF")).unwrap();
        assert_eq!(text.as_str(), "HelloWorldTest");
        assert_eq!(text.fragment_count(), 3);
    }

    #[test]
    fn separator_is_configurable() {
        let extractor = Extractor::empty()
            .with_strategy(DocumentFormat::Pdf, FixedPages(vec!["Hello", "World"]))
            .with_separator("\n\n");
        let text = extractor.extract(&pdf(b"%PDF")).unwrap();
        assert_eq!(text.as_str(), "Hello\n\nWorld");
        assert_eq!(text.word_count(), 2);
    }

    #[test]
    fn unregistered_format_is_unsupported() {
        let extractor = Extractor::empty();
        let error = extractor.extract(&pdf(b"%PDF")).unwrap_err();
        assert!(matches!(error, ExtractError::UnsupportedFormat(tag) if tag == "pdf"));
    }

    #[test]
    fn unknown_extension_never_reaches_a_parser() {
        let extractor = Extractor::empty().with_strategy(DocumentFormat::Pdf, Exploding);
        let error = extractor
            .extract_upload("slides.pptx", b"PK".to_vec())
            .unwrap_err();
        assert!(matches!(error, ExtractError::UnsupportedFormat(tag) if tag == "pptx"));
    }

    #[test]
    fn parser_panic_becomes_extraction_error() {
        let extractor = Extractor::empty().with_strategy(DocumentFormat::Pdf, Exploding);
        let error = extractor.extract(&pdf(b"garbage")).unwrap_err();
        match error {
            ExtractError::Extraction { format, details, .. } => {
                assert_eq!(format, DocumentFormat::Pdf);
                assert_eq!(details.as_deref(), Some("corrupt xref table"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn standard_extractor_covers_every_format() {
        let extractor = Extractor::standard();
        for format in DocumentFormat::ALL {
            assert!(extractor.supports(format), "{format} missing");
        }
    }
}
