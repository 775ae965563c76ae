use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use log::warn;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum VoiceError {
    #[error("voice '{0}' not found")]
    NotFound(String),
    #[error("no voices installed in {0}")]
    Empty(PathBuf),
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct VoiceInfo {
    pub id: String,
    pub label: String,
    pub language: Option<String>,
    pub quality: Option<String>,
    pub model_path: PathBuf,
    pub config_path: Option<PathBuf>,
}

/// The voice picked for a narration, plus a warning when the requested one
/// had to be replaced.
#[derive(Debug, Clone)]
pub struct VoiceChoice {
    pub voice: VoiceInfo,
    pub fallback_warning: Option<String>,
}

/// Piper voice models (`*.onnx`) found under a directory.
#[derive(Default)]
pub struct VoiceLibrary {
    base_dir: PathBuf,
    voices: RwLock<HashMap<String, VoiceInfo>>,
}

impl VoiceLibrary {
    pub fn new(base_dir: PathBuf) -> Self {
        let library = Self {
            base_dir,
            voices: RwLock::new(HashMap::new()),
        };
        library.refresh();
        library
    }

    pub fn refresh(&self) {
        let mut discovered = HashMap::new();
        if self.base_dir.exists() {
            for entry in WalkDir::new(&self.base_dir)
                .into_iter()
                .filter_map(Result::ok)
            {
                if !entry.file_type().is_file() {
                    continue;
                }
                let path = entry.path();
                if path.extension().and_then(|ext| ext.to_str()) != Some("onnx") {
                    continue;
                }
                if let Some(info) = build_voice_info(path) {
                    discovered.insert(info.id.clone(), info);
                }
            }
        }
        *self.voices.write() = discovered;
    }

    pub fn list(&self) -> Vec<VoiceInfo> {
        let mut voices: Vec<_> = self.voices.read().values().cloned().collect();
        voices.sort_by(|a, b| a.label.cmp(&b.label).then_with(|| a.id.cmp(&b.id)));
        voices
    }

    pub fn get(&self, id: &str) -> Result<VoiceInfo, VoiceError> {
        self.voices
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| VoiceError::NotFound(id.to_string()))
    }

    /// Finds `requested`, falling back to `default_id` and then to the first
    /// voice by label. Only an empty library is an error.
    pub fn choose(&self, requested: Option<&str>, default_id: Option<&str>) -> Result<VoiceChoice, VoiceError> {
        if let Some(id) = requested {
            if let Ok(voice) = self.get(id) {
                return Ok(VoiceChoice {
                    voice,
                    fallback_warning: None,
                });
            }
        }

        let fallback = default_id
            .and_then(|id| self.get(id).ok())
            .or_else(|| self.list().into_iter().next())
            .ok_or_else(|| VoiceError::Empty(self.base_dir.clone()))?;

        let fallback_warning = requested.map(|id| {
            let message = format!("voice '{id}' is not installed, using '{}'", fallback.id);
            warn!("{message}");
            message
        });
        Ok(VoiceChoice {
            voice: fallback,
            fallback_warning,
        })
    }
}

fn build_voice_info(path: &Path) -> Option<VoiceInfo> {
    let id = path.file_stem()?.to_string_lossy().to_string();
    let metadata_path = metadata_path_for(path);
    let metadata = metadata_path
        .as_ref()
        .and_then(|path| match fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str::<Value>(&contents)
                .map_err(|err| {
                    warn!("Failed to parse metadata {}: {err}", path.display());
                    err
                })
                .ok(),
            Err(err) => {
                warn!("Failed to read metadata {}: {err}", path.display());
                None
            }
        });

    let language = metadata.as_ref().and_then(|value| value.get("language"));

    let label = language
        .and_then(|lang| lang.get("name_native").or_else(|| lang.get("name")))
        .and_then(Value::as_str)
        .map(|lang| format!("{lang} · {id}"))
        .unwrap_or_else(|| id.clone());

    let quality = metadata
        .as_ref()
        .and_then(|value| value.get("audio"))
        .and_then(|audio| audio.get("quality"))
        .and_then(Value::as_str)
        .map(str::to_string);

    Some(VoiceInfo {
        label,
        language: language
            .and_then(|lang| lang.get("code"))
            .and_then(Value::as_str)
            .map(str::to_string),
        quality,
        model_path: path.to_path_buf(),
        config_path: metadata_path,
        id,
    })
}

fn metadata_path_for(path: &Path) -> Option<PathBuf> {
    let mut metadata_path = path.to_path_buf();
    metadata_path.set_extension("onnx.json");
    metadata_path.exists().then_some(metadata_path)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use assert_fs::prelude::*;

    pub(crate) fn library_with(temp: &assert_fs::TempDir, ids: &[&str]) -> VoiceLibrary {
        for id in ids {
            temp.child(format!("{id}.onnx")).touch().unwrap();
        }
        VoiceLibrary::new(temp.path().to_path_buf())
    }

    #[test]
    fn discovers_voices_in_nested_directories() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("en/amy.onnx").touch().unwrap();
        temp.child("es/carlfm.onnx").touch().unwrap();
        temp.child("README.md").touch().unwrap();
        let library = VoiceLibrary::new(temp.path().to_path_buf());
        let ids: Vec<_> = library.list().into_iter().map(|voice| voice.id).collect();
        assert_eq!(ids, vec!["amy", "carlfm"]);
    }

    #[test]
    fn build_voice_info_reads_metadata() {
        let temp = assert_fs::TempDir::new().unwrap();
        let model = temp.child("demo.onnx");
        model.touch().unwrap();
        temp.child("demo.onnx.json")
            .write_str(r#"{"language":{"code":"es_ES","name_native":"Español"},"audio":{"quality":"high"}}"#)
            .unwrap();
        let info = build_voice_info(model.path()).unwrap();
        assert_eq!(info.label, "Español · demo");
        assert_eq!(info.language.as_deref(), Some("es_ES"));
        assert_eq!(info.quality.as_deref(), Some("high"));
    }

    #[test]
    fn known_voice_is_chosen_without_warning() {
        let temp = assert_fs::TempDir::new().unwrap();
        let library = library_with(&temp, &["amy", "ryan"]);
        let choice = library.choose(Some("ryan"), Some("amy")).unwrap();
        assert_eq!(choice.voice.id, "ryan");
        assert!(choice.fallback_warning.is_none());
    }

    #[test]
    fn unknown_voice_falls_back_with_warning() {
        let temp = assert_fs::TempDir::new().unwrap();
        let library = library_with(&temp, &["amy", "ryan"]);
        let choice = library.choose(Some("hal9000"), Some("ryan")).unwrap();
        assert_eq!(choice.voice.id, "ryan");
        assert!(choice.fallback_warning.unwrap().contains("hal9000"));
    }

    #[test]
    fn missing_default_uses_first_voice() {
        let temp = assert_fs::TempDir::new().unwrap();
        let library = library_with(&temp, &["zoe", "amy"]);
        let choice = library.choose(None, Some("nobody")).unwrap();
        assert_eq!(choice.voice.id, "amy");
        assert!(choice.fallback_warning.is_none());
    }

    #[test]
    fn empty_library_is_an_error() {
        let temp = assert_fs::TempDir::new().unwrap();
        let library = VoiceLibrary::new(temp.path().join("missing"));
        assert!(matches!(library.choose(Some("amy"), None), Err(VoiceError::Empty(_))));
    }
}
