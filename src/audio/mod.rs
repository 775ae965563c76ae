//! Playback of narrated audio.
//!
//! [`PlaybackController`] owns a sink opened through an [`AudioEngine`].
//! [`RodioEngine`] talks to the default output device; tests inject an
//! engine that never touches real hardware.

pub mod player;

pub use player::{
    AudioEngine, ManagedSink, PlaybackController, PlaybackError, PlaybackState, RodioEngine,
};
