//! Text-to-speech for extracted documents.
//!
//! A [`Synthesizer`] turns an [`ExtractedText`] into one complete
//! [`AudioArtifact`] according to a [`NarrationConfig`]. Two engines are
//! provided: [`offline::PiperSynthesizer`] drives a local Piper voice model
//! and [`cloud::CloudSynthesizer`] fetches speech from an HTTP service and
//! time-stretches it with ffmpeg. [`Narrator`] picks one per request.

use std::{fmt, str::FromStr, sync::Arc};

use log::info;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{extract::ExtractedText, settings::Settings};

pub mod artifact;
pub mod cloud;
pub mod offline;
pub mod voices;

pub use artifact::{AudioArtifact, AudioEncoding};
pub use voices::{VoiceInfo, VoiceLibrary};

/// Words per minute at speed 0.
pub const BASE_RATE: u32 = 150;
/// Extra words per minute for each unit of speed.
pub const RATE_SCALE: f32 = 50.0;
pub const MIN_SPEED: f32 = 0.0;
pub const MAX_SPEED: f32 = 2.0;
pub const DEFAULT_SPEED: f32 = 1.0;

/// Speaking rate of the offline engine for a speed multiplier.
pub fn speaking_rate(speed: f32) -> u32 {
    (BASE_RATE as f32 + clamp_speed(speed) * RATE_SCALE).round() as u32
}

/// Time-stretch factor applied to cloud audio for a speed multiplier.
pub fn playback_factor(speed: f32) -> f32 {
    1.0 + clamp_speed(speed) * 0.5
}

fn clamp_speed(speed: f32) -> f32 {
    if speed.is_finite() {
        speed.clamp(MIN_SPEED, MAX_SPEED)
    } else {
        DEFAULT_SPEED
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    #[default]
    Offline,
    Cloud,
}

impl FromStr for Engine {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "offline" | "piper" => Ok(Engine::Offline),
            "cloud" | "online" => Ok(Engine::Cloud),
            other => Err(format!("unknown engine '{other}' (expected offline or cloud)")),
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Engine::Offline => "offline",
            Engine::Cloud => "cloud",
        })
    }
}

/// Voice or language selection plus speed. The speed is kept inside
/// `MIN_SPEED..=MAX_SPEED`; anything non-finite becomes the default.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NarrationConfig {
    pub engine: Engine,
    pub voice: Option<String>,
    pub language: String,
    speed: f32,
}

impl Default for NarrationConfig {
    fn default() -> Self {
        Self {
            engine: Engine::default(),
            voice: None,
            language: "en".to_string(),
            speed: DEFAULT_SPEED,
        }
    }
}

impl NarrationConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            voice: settings.default_voice.clone(),
            language: settings.language.clone(),
            ..Self::default()
        }
    }

    pub fn with_engine(mut self, engine: Engine) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = Some(voice.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_speed(mut self, speed: f32) -> Self {
        self.set_speed(speed);
        self
    }

    pub fn set_speed(&mut self, speed: f32) {
        self.speed = clamp_speed(speed);
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }
}

#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("there is no text to narrate")]
    EmptyText,
    #[error("unsupported language code '{0}'")]
    UnsupportedLanguage(String),
    #[error("no voice available: {0}")]
    NoVoice(String),
    #[error("speech backend failed: {message}")]
    Backend {
        message: String,
        details: Option<String>,
    },
    #[error("audio i/o failure: {0}")]
    Io(#[from] std::io::Error),
}

impl SynthesisError {
    pub(crate) fn backend(message: impl Into<String>, details: Option<String>) -> Self {
        SynthesisError::Backend {
            message: message.into(),
            details,
        }
    }
}

/// A finished narration and any non-fatal warnings raised while producing it.
#[derive(Debug, Clone)]
pub struct Synthesis {
    pub artifact: AudioArtifact,
    pub warnings: Vec<String>,
}

pub trait Synthesizer {
    fn synthesize(&self, text: &ExtractedText, config: &NarrationConfig) -> Result<Synthesis, SynthesisError>;
}

/// Dispatches each request to the engine named in its config.
pub struct Narrator {
    offline: Box<dyn Synthesizer>,
    cloud: Box<dyn Synthesizer>,
}

impl Narrator {
    pub fn new(offline: Box<dyn Synthesizer>, cloud: Box<dyn Synthesizer>) -> Self {
        Self { offline, cloud }
    }

    pub fn from_settings(settings: &Settings, voices: Arc<VoiceLibrary>) -> Self {
        Self::new(
            Box::new(offline::PiperSynthesizer::from_settings(settings, voices)),
            Box::new(cloud::CloudSynthesizer::from_settings(settings)),
        )
    }

    pub fn synthesize(&self, text: &ExtractedText, config: &NarrationConfig) -> Result<Synthesis, SynthesisError> {
        if text.is_empty() {
            return Err(SynthesisError::EmptyText);
        }
        info!(
            "Narrating {} words with the {} engine at speed {:.2}",
            text.word_count(),
            config.engine,
            config.speed()
        );
        match config.engine {
            Engine::Offline => self.offline.synthesize(text, config),
            Engine::Cloud => self.cloud.synthesize(text, config),
        }
    }
}
