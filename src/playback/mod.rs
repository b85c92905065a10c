#[cfg(feature = "native-audio")]
pub mod rodio_output;

use crate::api::ApiError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("Audio output unavailable: {0}")]
    Unavailable(String),

    #[error("Could not decode audio: {0}")]
    Decode(String),

    #[error("Could not fetch audio: {0}")]
    Fetch(#[from] ApiError),
}

/// Encoded audio ready to hand to an output (mp3, wav, webm...)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    pub bytes: Vec<u8>,
    pub label: String,
}

impl AudioClip {
    pub fn new(label: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            label: label.into(),
        }
    }
}

/// One loaded audio object. Dropping it releases the underlying voice.
pub trait AudioSink {
    fn play(&mut self);

    fn pause(&mut self);

    /// True once playback ran to the end on its own
    fn is_finished(&self) -> bool;
}

pub trait AudioOutput {
    fn load(&self, clip: &AudioClip) -> Result<Box<dyn AudioSink>, PlaybackError>;

    fn name(&self) -> &str;
}

/// Output used when no playback backend is compiled in.
pub struct NoAudioOutput;

impl AudioOutput for NoAudioOutput {
    fn load(&self, clip: &AudioClip) -> Result<Box<dyn AudioSink>, PlaybackError> {
        Err(PlaybackError::Unavailable(format!(
            "no playback backend for '{}'",
            clip.label
        )))
    }

    fn name(&self) -> &str {
        "none"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PlaybackState {
    Empty,
    Playing,
    Paused,
    Finished,
}

/// Owns the single audio channel. Loading a clip tears down whatever was there first.
pub struct PlaybackController {
    output: Box<dyn AudioOutput>,
    current: Option<Box<dyn AudioSink>>,
    current_label: Option<String>,
    state: PlaybackState,
}

impl PlaybackController {
    pub fn new(output: Box<dyn AudioOutput>) -> Self {
        Self {
            output,
            current: None,
            current_label: None,
            state: PlaybackState::Empty,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn current_label(&self) -> Option<&str> {
        self.current_label.as_deref()
    }

    /// Preempt anything playing and start `clip` from the beginning.
    pub fn play(&mut self, clip: AudioClip) -> Result<(), PlaybackError> {
        self.release();

        let mut sink = self.output.load(&clip).map_err(|e| {
            tracing::warn!("Playback of '{}' failed on {}: {}", clip.label, self.output.name(), e);
            e
        })?;
        sink.play();
        tracing::debug!("Playing '{}' ({} bytes)", clip.label, clip.bytes.len());

        self.current = Some(sink);
        self.current_label = Some(clip.label);
        self.state = PlaybackState::Playing;
        Ok(())
    }

    /// Flip between playing and paused. No-op when nothing is loaded or the clip has ended.
    pub fn toggle_play_pause(&mut self) {
        let Some(sink) = self.current.as_mut() else {
            return;
        };
        match self.state {
            PlaybackState::Playing => {
                sink.pause();
                self.state = PlaybackState::Paused;
            }
            PlaybackState::Paused => {
                sink.play();
                self.state = PlaybackState::Playing;
            }
            PlaybackState::Empty | PlaybackState::Finished => {}
        }
    }

    /// Pick up natural completion. Returns the state after the check.
    pub fn refresh(&mut self) -> PlaybackState {
        if self.state == PlaybackState::Playing
            && self.current.as_ref().is_some_and(|sink| sink.is_finished())
        {
            tracing::debug!("Playback finished");
            self.state = PlaybackState::Finished;
        }
        self.state
    }

    /// Pause and release the current audio object.
    pub fn stop(&mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(mut sink) = self.current.take() {
            sink.pause();
        }
        self.current_label = None;
        self.state = PlaybackState::Empty;
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        self.release();
    }
}
