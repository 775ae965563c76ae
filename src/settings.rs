use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use log::info;
use serde::Deserialize;
use thiserror::Error;

use crate::document::DocumentFormat;

pub const ENV_CONFIG: &str = "NARRATOR_CONFIG";
pub const ENV_RUNTIME_DIR: &str = "NARRATOR_RUNTIME_DIR";
pub const ENV_VOICES_DIR: &str = "NARRATOR_VOICES_DIR";
pub const ENV_OUTPUT_DIR: &str = "NARRATOR_OUTPUT_DIR";
pub const ENV_DEFAULT_VOICE: &str = "NARRATOR_DEFAULT_VOICE";
pub const ENV_LANGUAGE: &str = "NARRATOR_LANGUAGE";
pub const ENV_PIPER_COMMAND: &str = "NARRATOR_PIPER_COMMAND";
pub const ENV_FFMPEG_PATH: &str = "NARRATOR_FFMPEG_PATH";
pub const ENV_TTS_ENDPOINT: &str = "NARRATOR_TTS_ENDPOINT";
pub const ENV_FRAGMENT_SEPARATOR: &str = "NARRATOR_FRAGMENT_SEPARATOR";

pub const DEFAULT_TTS_ENDPOINT: &str = "https://translate.google.com/translate_tts";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),
    #[error("failed to parse settings file {0}: {1}")]
    Parse(PathBuf, #[source] serde_json::Error),
}

/// Runtime configuration: defaults, then an optional JSON file named by
/// `NARRATOR_CONFIG`, then individual environment variables.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub runtime_dir: PathBuf,
    pub voices_dir: PathBuf,
    pub output_dir: PathBuf,
    pub default_voice: Option<String>,
    pub language: String,
    pub piper_command: Option<String>,
    pub ffmpeg_path: Option<PathBuf>,
    pub tts_endpoint: String,
    pub fragment_separator: String,
    pub importers: BTreeMap<DocumentFormat, String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            runtime_dir: PathBuf::from("runtime"),
            voices_dir: PathBuf::from("assets/voices"),
            output_dir: PathBuf::from("runtime/output"),
            default_voice: None,
            language: "en".to_string(),
            piper_command: None,
            ffmpeg_path: None,
            tts_endpoint: DEFAULT_TTS_ENDPOINT.to_string(),
            fragment_separator: String::new(),
            importers: BTreeMap::new(),
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self, SettingsError> {
        let mut settings = match std::env::var_os(ENV_CONFIG) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        settings.apply_env();
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
        info!("Loading settings from {}", path.display());
        let data =
            fs::read_to_string(path).map_err(|err| SettingsError::Io(path.to_path_buf(), err))?;
        serde_json::from_str(&data).map_err(|err| SettingsError::Parse(path.to_path_buf(), err))
    }

    pub fn apply_env(&mut self) {
        if let Some(dir) = env_path(ENV_RUNTIME_DIR) {
            self.runtime_dir = dir;
        }
        if let Some(dir) = env_path(ENV_VOICES_DIR) {
            self.voices_dir = dir;
        }
        if let Some(dir) = env_path(ENV_OUTPUT_DIR) {
            self.output_dir = dir;
        }
        if let Some(voice) = env_string(ENV_DEFAULT_VOICE) {
            self.default_voice = Some(voice);
        }
        if let Some(language) = env_string(ENV_LANGUAGE) {
            self.language = language;
        }
        if let Some(command) = env_string(ENV_PIPER_COMMAND) {
            self.piper_command = Some(command);
        }
        if let Some(path) = env_path(ENV_FFMPEG_PATH) {
            self.ffmpeg_path = Some(path);
        }
        if let Some(endpoint) = env_string(ENV_TTS_ENDPOINT) {
            self.tts_endpoint = endpoint;
        }
        // an empty separator is meaningful, so only absence keeps the current value
        if let Ok(separator) = std::env::var(ENV_FRAGMENT_SEPARATOR) {
            self.fragment_separator = separator.replace("\\n", "\n");
        }
        for format in DocumentFormat::ALL {
            if let Some(command) = env_string(&importer_env_key(format)) {
                self.importers.insert(format, command);
            }
        }
    }
}

pub fn importer_env_key(format: DocumentFormat) -> String {
    format!("NARRATOR_IMPORT_{}_COMMAND", format.env_label())
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_path(key: &str) -> Option<PathBuf> {
    env_string(key).map(PathBuf::from)
}
