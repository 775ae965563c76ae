use std::{fmt, path::Path, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Formats accepted at the upload boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Pdf,
    Epub,
    Mobi,
    PlainText,
}

impl DocumentFormat {
    pub const ALL: [DocumentFormat; 4] = [
        DocumentFormat::Pdf,
        DocumentFormat::Epub,
        DocumentFormat::Mobi,
        DocumentFormat::PlainText,
    ];

    /// Maps a file extension (case-insensitive, without the dot) to a format.
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "pdf" => Some(DocumentFormat::Pdf),
            "epub" => Some(DocumentFormat::Epub),
            "mobi" => Some(DocumentFormat::Mobi),
            "txt" => Some(DocumentFormat::PlainText),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            DocumentFormat::Pdf => "pdf",
            DocumentFormat::Epub => "epub",
            DocumentFormat::Mobi => "mobi",
            DocumentFormat::PlainText => "txt",
        }
    }

    /// Upper-case label used in environment variable names.
    pub fn env_label(self) -> &'static str {
        match self {
            DocumentFormat::Pdf => "PDF",
            DocumentFormat::Epub => "EPUB",
            DocumentFormat::Mobi => "MOBI",
            DocumentFormat::PlainText => "TXT",
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for DocumentFormat {
    type Err = UploadError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        DocumentFormat::from_extension(value)
            .ok_or_else(|| UploadError::UnsupportedExtension(value.to_string()))
    }
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("unsupported file extension '{0}' (expected pdf, epub, mobi or txt)")]
    UnsupportedExtension(String),
    #[error("file name '{0}' has no extension")]
    MissingExtension(String),
    #[error("failed to read {0}: {1}")]
    Io(String, #[source] std::io::Error),
}

/// An uploaded payload. Never mutated after construction.
#[derive(Debug, Clone)]
pub struct Document {
    name: String,
    format: DocumentFormat,
    bytes: Vec<u8>,
}

impl Document {
    pub fn new(name: impl Into<String>, format: DocumentFormat, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            format,
            bytes,
        }
    }

    /// Builds a document from an uploaded file name, rejecting extensions
    /// outside the supported set.
    pub fn from_upload(name: impl Into<String>, bytes: Vec<u8>) -> Result<Self, UploadError> {
        let name = name.into();
        let extension = Path::new(&name)
            .extension()
            .and_then(|ext| ext.to_str())
            .ok_or_else(|| UploadError::MissingExtension(name.clone()))?;
        let format = extension.parse()?;
        Ok(Self::new(name, format, bytes))
    }

    pub fn open(path: &Path) -> Result<Self, UploadError> {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let bytes =
            std::fs::read(path).map_err(|err| UploadError::Io(path.display().to_string(), err))?;
        Self::from_upload(name, bytes)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn format(&self) -> DocumentFormat {
        self.format
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}
