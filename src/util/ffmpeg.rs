use std::{
    fs,
    path::{Path, PathBuf},
    process::Command,
};

use log::{error, info};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FfmpegError {
    #[error("ffmpeg is not available; install it or set NARRATOR_FFMPEG_PATH")]
    Missing,
    #[error("ffmpeg i/o failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("ffmpeg exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
}

/// A located ffmpeg binary.
#[derive(Debug, Clone)]
pub struct Ffmpeg {
    program: PathBuf,
}

impl Ffmpeg {
    /// Uses `configured` when it points at an existing file, otherwise looks
    /// ffmpeg up on PATH.
    pub fn locate(configured: Option<&Path>) -> Result<Self, FfmpegError> {
        if let Some(candidate) = configured.filter(|path| path.exists()) {
            return Ok(Self {
                program: candidate.to_path_buf(),
            });
        }
        which::which("ffmpeg")
            .map(|program| Self { program })
            .map_err(|_| FfmpegError::Missing)
    }

    /// Mono 22.05 kHz MP3 from any input ffmpeg can decode.
    pub fn encode_mp3(&self, input: &[u8], input_ext: &str) -> Result<Vec<u8>, FfmpegError> {
        info!("Encoding {input_ext} audio to mp3 with ffmpeg");
        self.run(input, input_ext, "mp3", &["-vn", "-ar", "22050", "-ac", "1"])
    }

    /// Speeds audio up (factor > 1) or down without changing pitch.
    pub fn time_stretch(&self, input: &[u8], ext: &str, factor: f32) -> Result<Vec<u8>, FfmpegError> {
        info!("Time-stretching {ext} audio by {factor:.2} with ffmpeg");
        let filter = atempo_chain(factor);
        self.run(input, ext, ext, &["-vn", "-filter:a", &filter])
    }

    fn run(
        &self,
        input: &[u8],
        input_ext: &str,
        output_ext: &str,
        args: &[&str],
    ) -> Result<Vec<u8>, FfmpegError> {
        let workdir = tempfile::tempdir()?;
        let source = workdir.path().join(format!("input.{input_ext}"));
        let target = workdir.path().join(format!("output.{output_ext}"));
        fs::write(&source, input)?;

        let output = Command::new(&self.program)
            .arg("-y")
            .arg("-i")
            .arg(&source)
            .args(args)
            .arg(&target)
            .output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            error!("ffmpeg failed with {}: {stderr}", output.status);
            return Err(FfmpegError::Failed {
                status: output.status.to_string(),
                stderr,
            });
        }
        Ok(fs::read(&target)?)
    }
}

/// atempo accepts 0.5..=2.0 per instance, so larger factors are chained.
fn atempo_chain(factor: f32) -> String {
    let mut remaining = factor.clamp(0.25, 4.0);
    let mut stages = Vec::new();
    while remaining > 2.0 {
        stages.push("atempo=2.0".to_string());
        remaining /= 2.0;
    }
    while remaining < 0.5 {
        stages.push("atempo=0.5".to_string());
        remaining /= 0.5;
    }
    stages.push(format!("atempo={remaining:.3}"));
    stages.join(",")
}
