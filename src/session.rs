//! Per-user pipeline state.
//!
//! A [`Session`] owns everything one user works with: the text of the last
//! upload, the last narration, the narration settings, playback and the
//! notices produced along the way. Every failure is turned into a
//! [`Notice`] and leaves the session usable.

use std::{path::PathBuf, sync::Arc};

use log::{error, info, warn};

use crate::{
    audio::{PlaybackController, PlaybackState},
    document::Document,
    extract::{ExtractedText, Extractor},
    narrate::{AudioArtifact, AudioEncoding, Engine, NarrationConfig, Narrator, VoiceLibrary},
    notice::{self, Notice},
    settings::Settings,
    util::ffmpeg::Ffmpeg,
};

pub struct Session {
    extractor: Extractor,
    narrator: Narrator,
    player: PlaybackController,
    config: NarrationConfig,
    output_dir: PathBuf,
    ffmpeg_path: Option<PathBuf>,
    document: Option<String>,
    text: Option<ExtractedText>,
    artifact: Option<AudioArtifact>,
    notices: Vec<Notice>,
}

impl Session {
    pub fn new(
        extractor: Extractor,
        narrator: Narrator,
        player: PlaybackController,
        config: NarrationConfig,
        output_dir: PathBuf,
    ) -> Self {
        Self {
            extractor,
            narrator,
            player,
            config,
            output_dir,
            ffmpeg_path: None,
            document: None,
            text: None,
            artifact: None,
            notices: Vec::new(),
        }
    }

    pub fn from_settings(settings: &Settings, voices: Arc<VoiceLibrary>) -> Self {
        Self::new(
            Extractor::from_settings(settings),
            Narrator::from_settings(settings, voices),
            PlaybackController::default(),
            NarrationConfig::from_settings(settings),
            settings.output_dir.clone(),
        )
        .with_ffmpeg(settings.ffmpeg_path.clone())
    }

    pub fn with_ffmpeg(mut self, path: Option<PathBuf>) -> Self {
        self.ffmpeg_path = path;
        self
    }

    /// Starts over with a new upload. Returns the extracted text, or `None`
    /// when the upload was rejected or could not be read; the reason is in
    /// [`Session::notices`]. A readable document without text yields
    /// `Some` empty text plus an informational notice.
    pub fn upload(&mut self, name: &str, bytes: Vec<u8>) -> Option<&ExtractedText> {
        self.reset();
        self.document = Some(name.to_string());
        match Document::from_upload(name, bytes) {
            Ok(document) => self.run_extraction(&document),
            Err(err) => {
                warn!("Rejected upload {name}: {err}");
                self.notices
                    .push(Notice::error(notice::UNSUPPORTED_FORMAT, err.to_string(), None));
                None
            }
        }
    }

    pub fn upload_document(&mut self, document: &Document) -> Option<&ExtractedText> {
        self.reset();
        self.document = Some(document.name().to_string());
        self.run_extraction(document)
    }

    fn run_extraction(&mut self, document: &Document) -> Option<&ExtractedText> {
        match self.extractor.extract(document) {
            Ok(text) => {
                if text.is_empty() {
                    self.notices.push(Notice::info(
                        notice::EMPTY_DOCUMENT,
                        format!("{} contains no readable text", document.name()),
                    ));
                }
                self.text = Some(text);
            }
            Err(err) => self.notices.push(Notice::from(&err)),
        }
        self.text.as_ref()
    }

    /// Narrates the current text with the current config, replacing any
    /// previous artifact.
    pub fn narrate(&mut self) -> Option<&AudioArtifact> {
        let Some(text) = &self.text else {
            self.notices.push(Notice::warning(
                notice::NO_TEXT,
                "upload a document with text before narrating",
            ));
            return None;
        };

        self.player.stop();
        self.artifact = None;
        match self.narrator.synthesize(text, &self.config) {
            Ok(synthesis) => {
                self.notices.extend(
                    synthesis
                        .warnings
                        .into_iter()
                        .map(|message| Notice::warning(notice::SYNTHESIS_WARNING, message)),
                );
                info!(
                    "Narration ready: {} bytes of {}",
                    synthesis.artifact.bytes().len(),
                    synthesis.artifact.encoding()
                );
                self.artifact = Some(synthesis.artifact);
            }
            Err(err) => {
                error!("Narration failed: {err}");
                self.notices.push(Notice::from(&err));
            }
        }
        self.artifact.as_ref()
    }

    pub fn play(&mut self) -> PlaybackState {
        let Some(artifact) = &self.artifact else {
            return self.nothing_narrated();
        };
        match self.player.play(artifact) {
            Ok(state) => state,
            Err(err) => {
                self.notices.push(Notice::from(&err));
                self.player.status()
            }
        }
    }

    pub fn toggle(&mut self) -> PlaybackState {
        let Some(artifact) = &self.artifact else {
            return self.nothing_narrated();
        };
        match self.player.toggle(artifact) {
            Ok(state) => state,
            Err(err) => {
                self.notices.push(Notice::from(&err));
                self.player.status()
            }
        }
    }

    pub fn pause(&mut self) -> PlaybackState {
        self.player.pause()
    }

    pub fn resume(&mut self) -> PlaybackState {
        match self.player.resume() {
            Ok(state) => state,
            Err(err) => {
                self.notices.push(Notice::from(&err));
                self.player.status()
            }
        }
    }

    pub fn stop(&mut self) -> PlaybackState {
        self.player.stop()
    }

    pub fn forward(&mut self, seconds: u64) -> PlaybackState {
        self.player.forward(seconds)
    }

    pub fn back(&mut self, seconds: u64) -> PlaybackState {
        self.player.back(seconds)
    }

    pub fn playback(&self) -> PlaybackState {
        self.player.status()
    }

    /// Writes the current narration to the output directory. With
    /// `prefer_mp3` a WAV narration is converted first; without ffmpeg the
    /// WAV is exported instead and a warning is recorded.
    pub fn export_audio(&mut self, prefer_mp3: bool) -> Option<PathBuf> {
        let Some(artifact) = &self.artifact else {
            self.nothing_narrated();
            return None;
        };

        let mut download = artifact.clone();
        if prefer_mp3 && artifact.encoding() == AudioEncoding::Wav {
            match Ffmpeg::locate(self.ffmpeg_path.as_deref())
                .and_then(|ffmpeg| artifact.transcode_mp3(&ffmpeg))
            {
                Ok(mp3) => download = mp3,
                Err(err) => {
                    warn!("Exporting WAV instead of MP3: {err}");
                    self.notices.push(Notice::warning(
                        notice::MP3_UNAVAILABLE,
                        format!("{err}; exported WAV instead"),
                    ));
                }
            }
        }

        match download.export(&self.output_dir) {
            Ok(path) => Some(path),
            Err(err) => {
                error!("Export to {} failed: {err}", self.output_dir.display());
                self.notices.push(Notice::error(
                    notice::EXPORT_FAILED,
                    format!("could not write audio to {}", self.output_dir.display()),
                    Some(err.to_string()),
                ));
                None
            }
        }
    }

    pub fn config(&self) -> &NarrationConfig {
        &self.config
    }

    pub fn set_speed(&mut self, speed: f32) {
        self.config.set_speed(speed);
    }

    pub fn set_voice(&mut self, voice: Option<String>) {
        self.config.voice = voice;
    }

    pub fn set_language(&mut self, language: impl Into<String>) {
        self.config.language = language.into();
    }

    pub fn set_engine(&mut self, engine: Engine) {
        self.config.engine = engine;
    }

    pub fn document_name(&self) -> Option<&str> {
        self.document.as_deref()
    }

    pub fn text(&self) -> Option<&ExtractedText> {
        self.text.as_ref()
    }

    pub fn artifact(&self) -> Option<&AudioArtifact> {
        self.artifact.as_ref()
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    fn nothing_narrated(&mut self) -> PlaybackState {
        self.notices.push(Notice::warning(
            notice::NOTHING_NARRATED,
            "narrate the document before playing it",
        ));
        self.player.status()
    }

    fn reset(&mut self) {
        self.player.stop();
        self.document = None;
        self.text = None;
        self.artifact = None;
        self.notices.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::player::tests::FakeEngine,
        extract::pdf::tests::build_pdf,
        narrate::{
            artifact::tests::silent_wav, Synthesis, SynthesisError, Synthesizer, BASE_RATE,
        },
        notice::NoticeLevel,
    };
    use assert_fs::TempDir;

    /// Produces a WAV artifact and warns about any voice other than "amy".
    struct FakeVoice;

    impl Synthesizer for FakeVoice {
        fn synthesize(&self, text: &ExtractedText, config: &NarrationConfig) -> Result<Synthesis, SynthesisError> {
            let warnings = match config.voice.as_deref() {
                Some("amy") | None => vec![],
                Some(other) => vec![format!("voice '{other}' is not installed, using 'amy'")],
            };
            Ok(Synthesis {
                artifact: AudioArtifact::new(
                    silent_wav(160),
                    AudioEncoding::Wav,
                    text.word_count(),
                    BASE_RATE,
                ),
                warnings,
            })
        }
    }

    struct Unreachable;

    impl Synthesizer for Unreachable {
        fn synthesize(&self, _text: &ExtractedText, _config: &NarrationConfig) -> Result<Synthesis, SynthesisError> {
            Err(SynthesisError::backend("speech service is unreachable", Some("connection refused".into())))
        }
    }

    fn session(temp: &TempDir) -> Session {
        Session::new(
            Extractor::standard(),
            Narrator::new(Box::new(FakeVoice), Box::new(Unreachable)),
            PlaybackController::new(Box::<FakeEngine>::default()),
            NarrationConfig::default(),
            temp.path().join("output"),
        )
        .with_ffmpeg(Some(temp.path().join("no-ffmpeg-here")))
    }

    fn codes(session: &Session) -> Vec<&str> {
        session.notices().iter().map(|n| n.code.as_str()).collect()
    }

    #[test]
    fn upload_narrate_play_and_export() {
        let temp = TempDir::new().unwrap();
        let mut session = session(&temp);

        let text = session.upload("three.pdf", build_pdf(&["Hello", "World", "Test"]));
        assert_eq!(text.map(ExtractedText::as_str), Some("HelloWorldTest"));

        assert!(session.narrate().is_some());
        assert!(session.play().is_playing);
        assert!(!session.pause().is_playing);

        let path = session.export_audio(false).unwrap();
        assert_eq!(path, temp.path().join("output").join("output_audio.wav"));
        assert!(session.notices().is_empty(), "{:?}", session.notices());
    }

    #[test]
    fn unsupported_extension_is_a_notice() {
        let temp = TempDir::new().unwrap();
        let mut session = session(&temp);
        assert!(session.upload("deck.pptx", b"PK".to_vec()).is_none());
        assert_eq!(codes(&session), vec![notice::UNSUPPORTED_FORMAT]);
        assert_eq!(session.notices()[0].level, NoticeLevel::Error);
    }

    #[test]
    fn failed_extraction_differs_from_empty_document() {
        let temp = TempDir::new().unwrap();
        let mut session = session(&temp);

        assert!(session.upload("broken.pdf", b"%PDF-1.4 garbage".to_vec()).is_none());
        assert_eq!(codes(&session), vec![notice::EXTRACTION_FAILED]);

        let empty = session.upload("empty.txt", Vec::new()).cloned();
        assert_eq!(empty, Some(ExtractedText::new("", 1)));
        assert_eq!(codes(&session), vec![notice::EMPTY_DOCUMENT]);
        assert_eq!(session.notices()[0].level, NoticeLevel::Info);
    }

    #[test]
    fn narrating_without_text_is_a_notice() {
        let temp = TempDir::new().unwrap();
        let mut session = session(&temp);
        assert!(session.narrate().is_none());
        assert!(!session.play().is_playing);
        assert_eq!(codes(&session), vec![notice::NO_TEXT, notice::NOTHING_NARRATED]);
    }

    #[test]
    fn unknown_voice_warning_is_recorded() {
        let temp = TempDir::new().unwrap();
        let mut session = session(&temp);
        session.upload("story.txt", b"Once upon a time".to_vec());
        session.set_voice(Some("hal".into()));
        assert!(session.narrate().is_some());
        assert_eq!(codes(&session), vec![notice::SYNTHESIS_WARNING]);
    }

    #[test]
    fn synthesis_failure_leaves_session_usable() {
        let temp = TempDir::new().unwrap();
        let mut session = session(&temp);
        session.upload("story.txt", b"Once upon a time".to_vec());
        session.set_engine(Engine::Cloud);
        assert!(session.narrate().is_none());
        assert_eq!(codes(&session), vec![notice::SYNTHESIS_FAILED]);
        assert_eq!(
            session.notices()[0].details.as_deref(),
            Some("connection refused")
        );

        session.set_engine(Engine::Offline);
        assert!(session.narrate().is_some());
    }

    #[test]
    fn new_upload_resets_previous_narration() {
        let temp = TempDir::new().unwrap();
        let mut session = session(&temp);
        session.upload("a.txt", b"first".to_vec());
        session.narrate();
        session.play();
        assert!(session.artifact().is_some());

        session.upload("b.txt", b"second".to_vec());
        assert!(session.artifact().is_none());
        assert!(!session.playback().is_playing);
        assert_eq!(session.document_name(), Some("b.txt"));
        assert_eq!(session.text().map(ExtractedText::as_str), Some("second"));
    }

    #[test]
    fn mp3_export_without_ffmpeg_falls_back_to_wav() {
        let temp = TempDir::new().unwrap();
        let mut session = session(&temp);
        session.upload("a.txt", b"words to say".to_vec());
        session.narrate();

        let path = session.export_audio(true).unwrap();
        let ffmpeg_on_path = which::which("ffmpeg").is_ok();
        if ffmpeg_on_path {
            assert_eq!(path.extension().unwrap(), "mp3");
        } else {
            assert_eq!(path.extension().unwrap(), "wav");
            assert_eq!(codes(&session), vec![notice::MP3_UNAVAILABLE]);
        }
    }

    #[test]
    fn opened_document_is_extracted_by_name() {
        let temp = TempDir::new().unwrap();
        let mut session = session(&temp);
        let document = Document::new("book.txt", crate::document::DocumentFormat::PlainText, b"Chapter one".to_vec());
        assert_eq!(
            session.upload_document(&document).map(ExtractedText::word_count),
            Some(2)
        );
        assert_eq!(session.document_name(), Some("book.txt"));
    }

    #[test]
    fn speed_changes_are_clamped() {
        let temp = TempDir::new().unwrap();
        let mut session = session(&temp);
        session.set_speed(3.0);
        assert_eq!(session.config().speed(), 2.0);
    }
}
