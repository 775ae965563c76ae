use std::{
    fmt, fs,
    io::Cursor,
    path::{Path, PathBuf},
    time::Duration,
};

use log::info;
use serde::Serialize;

use crate::util::ffmpeg::{Ffmpeg, FfmpegError};

/// Base name of the downloadable file.
pub const DOWNLOAD_BASENAME: &str = "output_audio";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioEncoding {
    Wav,
    Mp3,
}

impl AudioEncoding {
    pub fn extension(self) -> &'static str {
        match self {
            AudioEncoding::Wav => "wav",
            AudioEncoding::Mp3 => "mp3",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            AudioEncoding::Wav => "audio/wav",
            AudioEncoding::Mp3 => "audio/mpeg",
        }
    }
}

impl fmt::Display for AudioEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Synthesised audio. Replaced, never edited, on the next narration.
#[derive(Clone, PartialEq, Eq)]
pub struct AudioArtifact {
    bytes: Vec<u8>,
    encoding: AudioEncoding,
    word_count: usize,
    words_per_minute: u32,
}

impl fmt::Debug for AudioArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioArtifact")
            .field("bytes", &self.bytes.len())
            .field("encoding", &self.encoding)
            .field("word_count", &self.word_count)
            .field("words_per_minute", &self.words_per_minute)
            .finish()
    }
}

impl AudioArtifact {
    pub fn new(
        bytes: Vec<u8>,
        encoding: AudioEncoding,
        word_count: usize,
        words_per_minute: u32,
    ) -> Self {
        Self {
            bytes,
            encoding,
            word_count,
            words_per_minute: words_per_minute.max(1),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn encoding(&self) -> AudioEncoding {
        self.encoding
    }

    pub fn mime_type(&self) -> &'static str {
        self.encoding.mime_type()
    }

    pub fn word_count(&self) -> usize {
        self.word_count
    }

    pub fn file_name(&self) -> String {
        format!("{DOWNLOAD_BASENAME}.{}", self.encoding.extension())
    }

    /// Exact length read from the WAV header. `None` for MP3 or an
    /// unreadable header.
    pub fn duration(&self) -> Option<Duration> {
        if self.encoding != AudioEncoding::Wav {
            return None;
        }
        let reader = hound::WavReader::new(Cursor::new(&self.bytes)).ok()?;
        let rate = reader.spec().sample_rate;
        if rate == 0 {
            return None;
        }
        Some(Duration::from_secs_f64(
            f64::from(reader.duration()) / f64::from(rate),
        ))
    }

    /// Length derived from the word count and the speaking rate; drives
    /// the progress display.
    pub fn estimated_duration(&self) -> Duration {
        Duration::from_secs_f64(self.word_count as f64 * 60.0 / f64::from(self.words_per_minute))
    }

    /// Writes the download file into `dir` and returns its path.
    pub fn export(&self, dir: &Path) -> std::io::Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let path = dir.join(self.file_name());
        fs::write(&path, &self.bytes)?;
        info!("Exported {} ({} bytes)", path.display(), self.bytes.len());
        Ok(path)
    }

    /// An MP3 copy of this artifact; MP3 artifacts are returned unchanged.
    pub fn transcode_mp3(&self, ffmpeg: &Ffmpeg) -> Result<AudioArtifact, FfmpegError> {
        if self.encoding == AudioEncoding::Mp3 {
            return Ok(self.clone());
        }
        let bytes = ffmpeg.encode_mp3(&self.bytes, self.encoding.extension())?;
        Ok(Self {
            bytes,
            encoding: AudioEncoding::Mp3,
            ..*self
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A silent mono 16-bit WAV lasting `samples / 16000` seconds.
    pub(crate) fn silent_wav(samples: u32) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for _ in 0..samples {
                writer.write_sample(0i16).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn wav_duration_comes_from_header() {
        let artifact = AudioArtifact::new(silent_wav(8_000), AudioEncoding::Wav, 3, 150);
        assert_eq!(artifact.duration(), Some(Duration::from_millis(500)));
    }

    #[test]
    fn mp3_has_no_exact_duration() {
        let artifact = AudioArtifact::new(b"ID3".to_vec(), AudioEncoding::Mp3, 3, 150);
        assert_eq!(artifact.duration(), None);
        assert_eq!(artifact.mime_type(), "audio/mpeg");
    }

    #[test]
    fn estimate_follows_word_count_and_rate() {
        let artifact = AudioArtifact::new(vec![], AudioEncoding::Wav, 300, 150);
        assert_eq!(artifact.estimated_duration(), Duration::from_secs(120));
        let faster = AudioArtifact::new(vec![], AudioEncoding::Wav, 300, 250);
        assert!(faster.estimated_duration() < artifact.estimated_duration());
    }

    #[test]
    fn export_uses_fixed_name() {
        let temp = assert_fs::TempDir::new().unwrap();
        let artifact = AudioArtifact::new(b"ID3data".to_vec(), AudioEncoding::Mp3, 1, 150);
        let path = artifact.export(&temp.path().join("out")).unwrap();
        assert_eq!(path.file_name().unwrap(), "output_audio.mp3");
        assert_eq!(fs::read(path).unwrap(), b"ID3data");
    }

    #[cfg(unix)]
    #[test]
    fn transcode_switches_encoding() {
        let temp = assert_fs::TempDir::new().unwrap();
        let ffmpeg =
            Ffmpeg::locate(Some(&crate::util::ffmpeg::tests::stub_ffmpeg(&temp))).unwrap();
        let wav = AudioArtifact::new(silent_wav(10), AudioEncoding::Wav, 2, 150);
        let mp3 = wav.transcode_mp3(&ffmpeg).unwrap();
        assert_eq!(mp3.encoding(), AudioEncoding::Mp3);
        assert_eq!(mp3.word_count(), 2);
        assert_eq!(mp3.file_name(), "output_audio.mp3");
    }
}
