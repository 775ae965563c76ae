use serde::Serialize;

use crate::{
    audio::PlaybackError,
    extract::ExtractError,
    narrate::SynthesisError,
};

pub const UNSUPPORTED_FORMAT: &str = "UNSUPPORTED_FORMAT";
pub const EXTRACTION_FAILED: &str = "EXTRACTION_FAILED";
pub const EMPTY_DOCUMENT: &str = "EMPTY_DOCUMENT";
pub const NO_TEXT: &str = "NO_TEXT";
pub const SYNTHESIS_FAILED: &str = "SYNTHESIS_FAILED";
pub const UNSUPPORTED_LANGUAGE: &str = "UNSUPPORTED_LANGUAGE";
pub const VOICE_UNAVAILABLE: &str = "VOICE_UNAVAILABLE";
pub const SYNTHESIS_WARNING: &str = "SYNTHESIS_WARNING";
pub const NOTHING_NARRATED: &str = "NOTHING_NARRATED";
pub const PLAYBACK_FAILED: &str = "PLAYBACK_FAILED";
pub const EXPORT_FAILED: &str = "EXPORT_FAILED";
pub const MP3_UNAVAILABLE: &str = "MP3_UNAVAILABLE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// A user-visible, non-fatal message about the last action.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub code: String,
    pub message: String,
    pub details: Option<String>,
}

impl Notice {
    pub fn new(level: NoticeLevel, code: &str, message: impl Into<String>, details: Option<String>) -> Self {
        Self {
            level,
            code: code.to_string(),
            message: message.into(),
            details,
        }
    }

    pub fn info(code: &str, message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Info, code, message, None)
    }

    pub fn warning(code: &str, message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Warning, code, message, None)
    }

    pub fn error(code: &str, message: impl Into<String>, details: Option<String>) -> Self {
        Self::new(NoticeLevel::Error, code, message, details)
    }
}

impl From<&ExtractError> for Notice {
    fn from(value: &ExtractError) -> Self {
        match value {
            ExtractError::UnsupportedFormat(_) => {
                Notice::error(UNSUPPORTED_FORMAT, value.to_string(), None)
            }
            ExtractError::Extraction { details, .. } => {
                Notice::error(EXTRACTION_FAILED, value.to_string(), details.clone())
            }
        }
    }
}

impl From<&SynthesisError> for Notice {
    fn from(value: &SynthesisError) -> Self {
        match value {
            SynthesisError::EmptyText => Notice::error(NO_TEXT, value.to_string(), None),
            SynthesisError::UnsupportedLanguage(_) => {
                Notice::error(UNSUPPORTED_LANGUAGE, value.to_string(), None)
            }
            SynthesisError::NoVoice(_) => Notice::error(VOICE_UNAVAILABLE, value.to_string(), None),
            SynthesisError::Backend { details, .. } => {
                Notice::error(SYNTHESIS_FAILED, value.to_string(), details.clone())
            }
            SynthesisError::Io(_) => Notice::error(SYNTHESIS_FAILED, value.to_string(), None),
        }
    }
}

impl From<&PlaybackError> for Notice {
    fn from(value: &PlaybackError) -> Self {
        match value {
            PlaybackError::NothingLoaded => Notice::warning(NOTHING_NARRATED, value.to_string()),
            _ => Notice::error(PLAYBACK_FAILED, value.to_string(), None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentFormat;

    #[test]
    fn extraction_details_are_kept() {
        let error = ExtractError::Extraction {
            format: DocumentFormat::Pdf,
            message: "bad xref".into(),
            details: Some("offset 42".into()),
        };
        let notice = Notice::from(&error);
        assert_eq!(notice.code, EXTRACTION_FAILED);
        assert_eq!(notice.level, NoticeLevel::Error);
        assert_eq!(notice.details.as_deref(), Some("offset 42"));
    }

    #[test]
    fn serialises_for_the_ui() {
        let notice = Notice::warning(SYNTHESIS_WARNING, "voice 'x' is not installed");
        let json = serde_json::to_value(&notice).unwrap();
        assert_eq!(json["level"], "warning");
        assert_eq!(json["code"], "SYNTHESIS_WARNING");
    }
}
