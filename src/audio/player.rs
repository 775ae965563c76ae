use std::{
    cell::Cell,
    io::Cursor,
    time::{Duration, Instant},
};

use log::{info, warn};
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink};
use serde::Serialize;
use thiserror::Error;

use crate::narrate::AudioArtifact;

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("no playback device available: {0}")]
    Device(String),
    #[error("the audio could not be decoded: {0}")]
    Decode(String),
    #[error("nothing has been narrated yet")]
    NothingLoaded,
}

/// A started audio output for one artifact.
pub trait ManagedSink {
    fn play(&self);
    fn pause(&self);
    fn stop(&self);
    fn is_paused(&self) -> bool;
    fn is_finished(&self) -> bool;
}

/// Opens sinks on an output device.
pub trait AudioEngine {
    fn open(&mut self, artifact: &AudioArtifact) -> Result<Box<dyn ManagedSink>, PlaybackError>;
}

/// The default output device through rodio. The stream is opened on first
/// use and kept for the lifetime of the engine.
#[derive(Default)]
pub struct RodioEngine {
    output: Option<(OutputStream, OutputStreamHandle)>,
}

impl RodioEngine {
    fn handle(&mut self) -> Result<&OutputStreamHandle, PlaybackError> {
        if self.output.is_none() {
            let output =
                OutputStream::try_default().map_err(|err| PlaybackError::Device(err.to_string()))?;
            self.output = Some(output);
        }
        self.output
            .as_ref()
            .map(|(_, handle)| handle)
            .ok_or_else(|| PlaybackError::Device("output stream closed".into()))
    }
}

impl AudioEngine for RodioEngine {
    fn open(&mut self, artifact: &AudioArtifact) -> Result<Box<dyn ManagedSink>, PlaybackError> {
        let decoder = Decoder::new(Cursor::new(artifact.bytes().to_vec()))
            .map_err(|err| PlaybackError::Decode(err.to_string()))?;
        let sink = Sink::try_new(self.handle()?).map_err(|err| PlaybackError::Device(err.to_string()))?;
        sink.pause();
        sink.append(decoder);
        Ok(Box::new(RodioSink(sink)))
    }
}

struct RodioSink(Sink);

impl ManagedSink for RodioSink {
    fn play(&self) {
        self.0.play();
    }

    fn pause(&self) {
        self.0.pause();
    }

    fn stop(&self) {
        self.0.stop();
    }

    fn is_paused(&self) -> bool {
        self.0.is_paused()
    }

    fn is_finished(&self) -> bool {
        self.0.empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PlaybackState {
    pub is_playing: bool,
    pub position_seconds: u64,
}

/// Play, pause and resume through a real output handle. The position shown
/// to the user follows wall-clock play time and stops once the sink runs dry;
/// `forward` and `back` shift only that counter and never seek the audio.
pub struct PlaybackController {
    engine: Box<dyn AudioEngine>,
    sink: Option<Box<dyn ManagedSink>>,
    started: Option<Instant>,
    played: Duration,
    length: Option<Duration>,
    frozen: Cell<Option<Duration>>,
    offset_seconds: i64,
}

impl Default for PlaybackController {
    fn default() -> Self {
        Self::new(Box::<RodioEngine>::default())
    }
}

impl PlaybackController {
    pub fn new(engine: Box<dyn AudioEngine>) -> Self {
        Self {
            engine,
            sink: None,
            started: None,
            played: Duration::ZERO,
            length: None,
            frozen: Cell::new(None),
            offset_seconds: 0,
        }
    }

    /// Starts `artifact` from position 0, replacing anything loaded before.
    pub fn play(&mut self, artifact: &AudioArtifact) -> Result<PlaybackState, PlaybackError> {
        self.stop();
        let sink = self.engine.open(artifact)?;
        sink.play();
        self.sink = Some(sink);
        self.length = artifact.duration();
        self.started = Some(Instant::now());
        info!("Playback started ({} bytes of {})", artifact.bytes().len(), artifact.encoding());
        Ok(self.status())
    }

    pub fn pause(&mut self) -> PlaybackState {
        if let (Some(sink), Some(started)) = (&self.sink, self.started.take()) {
            sink.pause();
            self.played += started.elapsed();
        }
        self.status()
    }

    pub fn resume(&mut self) -> Result<PlaybackState, PlaybackError> {
        let sink = self.sink.as_ref().ok_or(PlaybackError::NothingLoaded)?;
        if sink.is_finished() {
            warn!("Resume requested after playback finished");
        } else if self.started.is_none() {
            sink.play();
            self.started = Some(Instant::now());
        }
        Ok(self.status())
    }

    /// Pauses while playing; otherwise resumes, or starts `artifact` over
    /// when nothing resumable is loaded.
    pub fn toggle(&mut self, artifact: &AudioArtifact) -> Result<PlaybackState, PlaybackError> {
        if self.is_playing() {
            return Ok(self.pause());
        }
        match &self.sink {
            Some(sink) if !sink.is_finished() => self.resume(),
            _ => self.play(artifact),
        }
    }

    pub fn stop(&mut self) -> PlaybackState {
        if let Some(sink) = self.sink.take() {
            sink.stop();
        }
        self.started = None;
        self.played = Duration::ZERO;
        self.length = None;
        self.frozen.set(None);
        self.offset_seconds = 0;
        self.status()
    }

    pub fn forward(&mut self, seconds: u64) -> PlaybackState {
        let step = i64::try_from(seconds).unwrap_or(i64::MAX);
        self.offset_seconds = self.offset_seconds.saturating_add(step);
        self.status()
    }

    pub fn back(&mut self, seconds: u64) -> PlaybackState {
        let position = i64::try_from(self.position_seconds()).unwrap_or(i64::MAX);
        let step = i64::try_from(seconds).unwrap_or(i64::MAX).min(position);
        self.offset_seconds = self.offset_seconds.saturating_sub(step);
        self.status()
    }

    pub fn is_playing(&self) -> bool {
        self.started.is_some()
            && self
                .sink
                .as_ref()
                .map(|sink| !sink.is_paused() && !sink.is_finished())
                .unwrap_or(false)
    }

    pub fn status(&self) -> PlaybackState {
        PlaybackState {
            is_playing: self.is_playing(),
            position_seconds: self.position_seconds(),
        }
    }

    fn position_seconds(&self) -> u64 {
        let elapsed = i64::try_from(self.elapsed().as_secs()).unwrap_or(i64::MAX);
        elapsed.saturating_add(self.offset_seconds).max(0) as u64
    }

    /// Play time so far, frozen the first time the sink is seen finished.
    fn elapsed(&self) -> Duration {
        if let Some(frozen) = self.frozen.get() {
            return frozen;
        }
        let running = self.started.map(|at| at.elapsed()).unwrap_or_default();
        let mut elapsed = self.played + running;
        if let Some(length) = self.length {
            elapsed = elapsed.min(length);
        }
        if self.sink.as_ref().map(|sink| sink.is_finished()).unwrap_or(false) {
            self.frozen.set(Some(elapsed));
        }
        elapsed
    }
}
