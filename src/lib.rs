//! Document narration: extract the text of an uploaded PDF, EPUB, MOBI or
//! plain-text file, synthesize it to speech and play or export the audio.

pub mod audio;
pub mod document;
pub mod extract;
pub mod narrate;
pub mod notice;
pub mod session;
pub mod settings;
pub mod util;

pub use document::{Document, DocumentFormat};
pub use extract::{ExtractError, ExtractedText, Extractor};
pub use narrate::{AudioArtifact, Engine, NarrationConfig, Narrator};
pub use notice::{Notice, NoticeLevel};
pub use session::Session;
pub use settings::Settings;
