use super::{markup, ExtractError, FragmentSource};
use crate::document::{Document, DocumentFormat};

/// The whole book text in a single fragment.
pub struct MobiSource;

impl FragmentSource for MobiSource {
    fn fragments(&self, document: &Document) -> Result<Vec<String>, ExtractError> {
        let book = ::mobi::Mobi::new(document.bytes().to_vec()).map_err(|err| {
            ExtractError::with_details(
                DocumentFormat::Mobi,
                "not a readable MOBI container",
                format!("{err:?}"),
            )
        })?;
        Ok(vec![markup::visible_text(&book.content_as_string_lossy())])
    }
}
