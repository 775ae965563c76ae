use std::{path::PathBuf, time::Duration};

use log::{error, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;

use super::{
    playback_factor, AudioArtifact, AudioEncoding, NarrationConfig, Synthesis, SynthesisError,
    Synthesizer, BASE_RATE,
};
use crate::{extract::ExtractedText, settings::Settings, util::ffmpeg::Ffmpeg};

/// Longest piece of text sent in a single request.
pub const MAX_CHUNK_CHARS: usize = 100;

static LANGUAGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z]{2,3}(?:[-_][A-Za-z0-9]{2,4})?$").expect("valid regex"));

/// A remote text-to-speech endpoint returning MP3 audio.
pub trait SpeechService {
    fn fetch(&self, chunk: &str, language: &str, index: usize, total: usize) -> Result<Vec<u8>, SynthesisError>;
}

/// Speaks through a translate_tts compatible HTTP endpoint.
pub struct HttpSpeechService {
    client: reqwest::blocking::Client,
    endpoint: String,
}

impl HttpSpeechService {
    pub fn new(endpoint: impl Into<String>) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("narrator/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|err| {
                warn!("Falling back to a default HTTP client: {err}");
                reqwest::blocking::Client::new()
            });
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

impl SpeechService for HttpSpeechService {
    fn fetch(&self, chunk: &str, language: &str, index: usize, total: usize) -> Result<Vec<u8>, SynthesisError> {
        let total = total.to_string();
        let index = index.to_string();
        let length = chunk.chars().count().to_string();
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("ie", "UTF-8"),
                ("q", chunk),
                ("tl", language),
                ("client", "tw-ob"),
                ("total", total.as_str()),
                ("idx", index.as_str()),
                ("textlen", length.as_str()),
            ])
            .send()
            .map_err(|err| {
                SynthesisError::backend("speech service is unreachable", Some(err.to_string()))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(SynthesisError::backend(
                format!("speech service answered {status}"),
                Some(body.chars().take(500).collect()),
            ));
        }
        response
            .bytes()
            .map(|bytes| bytes.to_vec())
            .map_err(|err| SynthesisError::backend("speech service response was cut short", Some(err.to_string())))
    }
}

/// Network narration: text is fetched chunk by chunk as MP3 and the joined
/// audio is time-stretched to honour the speed.
pub struct CloudSynthesizer {
    service: Box<dyn SpeechService>,
    ffmpeg_path: Option<PathBuf>,
}

impl CloudSynthesizer {
    pub fn new(service: Box<dyn SpeechService>, ffmpeg_path: Option<PathBuf>) -> Self {
        Self {
            service,
            ffmpeg_path,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            Box::new(HttpSpeechService::new(settings.tts_endpoint.clone())),
            settings.ffmpeg_path.clone(),
        )
    }
}

impl Synthesizer for CloudSynthesizer {
    fn synthesize(&self, text: &ExtractedText, config: &NarrationConfig) -> Result<Synthesis, SynthesisError> {
        if text.is_empty() {
            return Err(SynthesisError::EmptyText);
        }
        let language = config.language.trim();
        if !LANGUAGE_RE.is_match(language) {
            return Err(SynthesisError::UnsupportedLanguage(config.language.clone()));
        }

        let chunks = split_chunks(text.as_str(), MAX_CHUNK_CHARS);
        info!("Requesting {} speech chunks in '{language}'", chunks.len());
        let mut audio = Vec::new();
        for (index, chunk) in chunks.iter().enumerate() {
            let bytes = self
                .service
                .fetch(chunk, language, index, chunks.len())
                .map_err(|err| {
                    error!("Speech chunk {index} failed: {err}");
                    err
                })?;
            audio.extend_from_slice(&bytes);
        }

        let mut warnings = Vec::new();
        let mut applied = 1.0;
        let factor = playback_factor(config.speed());
        if factor > 1.0 + f32::EPSILON {
            match Ffmpeg::locate(self.ffmpeg_path.as_deref()) {
                Ok(ffmpeg) => {
                    audio = ffmpeg
                        .time_stretch(&audio, AudioEncoding::Mp3.extension(), factor)
                        .map_err(|err| {
                            SynthesisError::backend("could not apply narration speed", Some(err.to_string()))
                        })?;
                    applied = factor;
                }
                Err(err) => {
                    let message = format!("{err}; audio kept at normal speed");
                    warn!("{message}");
                    warnings.push(message);
                }
            }
        }

        let rate = (BASE_RATE as f32 * applied).round() as u32;
        Ok(Synthesis {
            artifact: AudioArtifact::new(audio, AudioEncoding::Mp3, text.word_count(), rate),
            warnings,
        })
    }
}

/// Splits text on whitespace into chunks of at most `max_chars` characters.
/// Words longer than the limit are cut.
pub fn split_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let mut word = word;
        while word.chars().count() > max_chars {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let cut = word
                .char_indices()
                .nth(max_chars)
                .map(|(at, _)| at)
                .unwrap_or(word.len());
            chunks.push(word[..cut].to_string());
            word = &word[cut..];
        }
        if word.is_empty() {
            continue;
        }

        let word_len = word.chars().count();
        if current_len > 0 && current_len + 1 + word_len > max_chars {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if current_len > 0 {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(word);
        current_len += word_len;
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
