use std::{
    fs,
    io::Write,
    path::PathBuf,
    process::{Command, Stdio},
    sync::Arc,
    thread,
    time::Instant,
};

use log::{error, info, warn};
use thiserror::Error;

use super::{
    speaking_rate, AudioArtifact, AudioEncoding, NarrationConfig, Synthesis, SynthesisError,
    Synthesizer, VoiceLibrary, BASE_RATE,
};
use crate::{
    extract::ExtractedText,
    settings::Settings,
    util::piper_path::{self, PiperPathError},
};

#[derive(Debug, Error)]
pub enum PiperFailure {
    #[error("voice model not found at {0}")]
    VoiceNotFound(PathBuf),
    #[error(transparent)]
    Launcher(#[from] PiperPathError),
    #[error("failed to spawn Piper process: {0}")]
    SpawnFailure(#[source] std::io::Error),
    #[error("Piper exited with status {status}: {stderr}")]
    ProcessFailed { status: i32, stderr: String },
    #[error("{0}")]
    Other(String),
}

impl From<PiperFailure> for SynthesisError {
    fn from(value: PiperFailure) -> Self {
        match value {
            PiperFailure::VoiceNotFound(path) => {
                SynthesisError::NoVoice(format!("model file {} is missing", path.display()))
            }
            PiperFailure::Launcher(err) => SynthesisError::backend(err.to_string(), None),
            PiperFailure::SpawnFailure(err) => {
                SynthesisError::backend("failed to launch Piper", Some(err.to_string()))
            }
            PiperFailure::ProcessFailed { status, stderr } => {
                SynthesisError::backend(format!("Piper exited with status {status}"), Some(stderr))
            }
            PiperFailure::Other(message) => SynthesisError::backend(message, None),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpeakRequest {
    pub text: String,
    pub model_path: PathBuf,
    pub output_path: PathBuf,
    pub speaker: Option<String>,
    pub length_scale: Option<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpeakResponse {
    pub output_path: PathBuf,
    pub duration_ms: u128,
    pub stderr: Option<String>,
}

/// Runs one Piper synthesis that writes a WAV file.
pub trait PiperInvoker {
    fn invoke(&self, request: &SpeakRequest) -> Result<SpeakResponse, PiperFailure>;
}

/// Launches Piper as a child process and feeds the text on stdin.
pub struct ProcessInvoker {
    configured: Option<String>,
    runtime_dir: PathBuf,
}

impl ProcessInvoker {
    pub fn new(configured: Option<String>, runtime_dir: PathBuf) -> Self {
        Self {
            configured,
            runtime_dir,
        }
    }

    fn build_command(&self, request: &SpeakRequest) -> Result<Command, PiperFailure> {
        if !request.model_path.exists() {
            return Err(PiperFailure::VoiceNotFound(request.model_path.clone()));
        }

        if let Some(parent) = request
            .output_path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
        {
            fs::create_dir_all(parent).map_err(|err| {
                PiperFailure::Other(format!(
                    "Unable to create output directory {}: {err}",
                    parent.display()
                ))
            })?;
        }

        let resolved = piper_path::resolve(self.configured.as_deref(), &self.runtime_dir)?;
        let (program, args) = piper_path::command_to_args(&resolved);
        let mut command = Command::new(program);
        command.args(args);
        Ok(command)
    }

    fn command_arguments(command: &mut Command, request: &SpeakRequest) {
        command.arg("--model");
        command.arg(&request.model_path);
        command.arg("--output_file");
        command.arg(&request.output_path);
        if let Some(speaker) = &request.speaker {
            command.arg("--speaker");
            command.arg(speaker);
        }
        if let Some(scale) = request.length_scale {
            command.arg("--length_scale");
            command.arg(format!("{scale:.3}"));
        }
    }
}

impl PiperInvoker for ProcessInvoker {
    fn invoke(&self, request: &SpeakRequest) -> Result<SpeakResponse, PiperFailure> {
        let start = Instant::now();
        let mut command = self.build_command(request)?;
        Self::command_arguments(&mut command, request);
        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(PiperFailure::SpawnFailure)?;
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| PiperFailure::Other("Failed to access Piper stdin".into()))?;
        // Piper logs to stderr while it reads; stdin is fed from another
        // thread so both pipes drain at once.
        let text = request.text.clone();
        let feeder = thread::spawn(move || stdin.write_all(text.as_bytes()));
        let output = child
            .wait_with_output()
            .map_err(|err| PiperFailure::Other(err.to_string()))?;
        let fed = feeder
            .join()
            .map_err(|_| PiperFailure::Other("Piper stdin writer panicked".into()))?;
        let duration_ms = start.elapsed().as_millis();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if !output.status.success() {
            let code = output.status.code().unwrap_or_default();
            error!("Piper command exited with status {code}: {stderr}");
            return Err(PiperFailure::ProcessFailed {
                status: code,
                stderr,
            });
        }

        if let Err(err) = fed {
            return Err(PiperFailure::Other(format!(
                "Piper stopped reading its input: {err}"
            )));
        }

        if !request.output_path.exists() {
            warn!(
                "Piper succeeded but the expected output {:?} was not created",
                request.output_path
            );
        }

        Ok(SpeakResponse {
            output_path: request.output_path.clone(),
            duration_ms,
            stderr: (!stderr.is_empty()).then_some(stderr),
        })
    }
}

/// Offline narration with a locally installed Piper voice.
pub struct PiperSynthesizer {
    voices: Arc<VoiceLibrary>,
    default_voice: Option<String>,
    invoker: Box<dyn PiperInvoker>,
}

impl PiperSynthesizer {
    pub fn new(
        voices: Arc<VoiceLibrary>,
        default_voice: Option<String>,
        invoker: Box<dyn PiperInvoker>,
    ) -> Self {
        Self {
            voices,
            default_voice,
            invoker,
        }
    }

    pub fn from_settings(settings: &Settings, voices: Arc<VoiceLibrary>) -> Self {
        Self::new(
            voices,
            settings.default_voice.clone(),
            Box::new(ProcessInvoker::new(
                settings.piper_command.clone(),
                settings.runtime_dir.clone(),
            )),
        )
    }

    /// The explicit voice if one was asked for, otherwise the first voice
    /// whose language matches the configured language.
    fn requested_voice(&self, config: &NarrationConfig) -> Option<String> {
        if let Some(voice) = &config.voice {
            return Some(voice.clone());
        }
        let language = config.language.to_ascii_lowercase().replace('-', "_");
        self.voices
            .list()
            .into_iter()
            .find(|voice| {
                voice
                    .language
                    .as_deref()
                    .map(|code| code.to_ascii_lowercase().starts_with(&language))
                    .unwrap_or(false)
            })
            .map(|voice| voice.id)
    }
}

impl Synthesizer for PiperSynthesizer {
    fn synthesize(&self, text: &ExtractedText, config: &NarrationConfig) -> Result<Synthesis, SynthesisError> {
        if text.is_empty() {
            return Err(SynthesisError::EmptyText);
        }

        let requested = self.requested_voice(config);
        let choice = self
            .voices
            .choose(requested.as_deref(), self.default_voice.as_deref())
            .map_err(|err| SynthesisError::NoVoice(err.to_string()))?;

        let rate = speaking_rate(config.speed());
        let workdir = tempfile::tempdir()?;
        let request = SpeakRequest {
            text: text.as_str().to_string(),
            model_path: choice.voice.model_path.clone(),
            output_path: workdir.path().join("narration.wav"),
            speaker: None,
            length_scale: Some(BASE_RATE as f32 / rate as f32),
        };
        info!(
            "Invoking Piper with voice {} at {rate} words per minute",
            choice.voice.id
        );

        let response = self.invoker.invoke(&request).map_err(|err| {
            error!("Offline synthesis failed: {err}");
            SynthesisError::from(err)
        })?;
        let bytes = fs::read(&response.output_path).map_err(|err| {
            SynthesisError::backend("Piper did not produce an audio file", Some(err.to_string()))
        })?;
        info!(
            "Piper produced {} bytes in {} ms",
            bytes.len(),
            response.duration_ms
        );

        Ok(Synthesis {
            artifact: AudioArtifact::new(bytes, AudioEncoding::Wav, text.word_count(), rate),
            warnings: choice.fallback_warning.into_iter().collect(),
        })
    }
}
