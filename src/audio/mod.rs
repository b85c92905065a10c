pub mod buffer;
#[cfg(feature = "native-audio")]
pub mod capture;

pub use buffer::{AudioChunk, AudioRecording, ChunkBuffer};

use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Microphone unavailable: {0}")]
    MicrophoneUnavailable(String),

    #[error("Already recording")]
    AlreadyRecording,

    #[error("Not recording")]
    NotRecording,

    #[error("Capture buffer poisoned")]
    BufferPoisoned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Requesting,
    Recording,
}

/// A live device handle. Dropping it stops every track and releases the device.
pub trait MicrophoneStream {
    fn sample_rate(&self) -> u32;

    fn channels(&self) -> u16;

    /// False once the device reported a fatal error (unplugged, permission revoked).
    fn is_alive(&self) -> bool {
        true
    }
}

/// Grants access to a microphone
pub trait MicrophoneSource {
    /// Acquire the device and start delivering samples into `sink`.
    fn open(
        &mut self,
        sink: Arc<Mutex<ChunkBuffer>>,
    ) -> Result<Box<dyn MicrophoneStream>, CaptureError>;

    fn name(&self) -> &str;
}

/// Source used when no capture backend is compiled in; every request is refused.
pub struct NoMicrophone;

impl MicrophoneSource for NoMicrophone {
    fn open(
        &mut self,
        _sink: Arc<Mutex<ChunkBuffer>>,
    ) -> Result<Box<dyn MicrophoneStream>, CaptureError> {
        Err(CaptureError::MicrophoneUnavailable(
            "no capture backend available".to_string(),
        ))
    }

    fn name(&self) -> &str {
        "none"
    }
}

/// Exclusive start/stop lifecycle around a `MicrophoneSource`
pub struct AudioRecorder {
    source: Box<dyn MicrophoneSource>,
    stream: Option<Box<dyn MicrophoneStream>>,
    buffer: Arc<Mutex<ChunkBuffer>>,
    state: CaptureState,
}

impl AudioRecorder {
    pub fn new(source: Box<dyn MicrophoneSource>) -> Self {
        Self {
            source,
            stream: None,
            buffer: Arc::new(Mutex::new(ChunkBuffer::new(16000, 1))),
            state: CaptureState::Idle,
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state == CaptureState::Recording
    }

    pub fn start(&mut self) -> Result<(), CaptureError> {
        if self.state != CaptureState::Idle {
            tracing::warn!("Ignoring start: capture is {:?}", self.state);
            return Err(CaptureError::AlreadyRecording);
        }

        self.buffer
            .lock()
            .map_err(|_| CaptureError::BufferPoisoned)?
            .clear();
        self.state = CaptureState::Requesting;

        match self.source.open(self.buffer.clone()) {
            Ok(stream) => {
                tracing::info!(
                    "Recording from '{}' at {} Hz, {} ch",
                    self.source.name(),
                    stream.sample_rate(),
                    stream.channels()
                );
                self.stream = Some(stream);
                self.state = CaptureState::Recording;
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Microphone request failed: {}", e);
                self.state = CaptureState::Idle;
                Err(match e {
                    CaptureError::MicrophoneUnavailable(reason) => {
                        CaptureError::MicrophoneUnavailable(reason)
                    }
                    other => CaptureError::MicrophoneUnavailable(other.to_string()),
                })
            }
        }
    }

    /// Release the device and hand back everything captured since `start`.
    pub fn stop(&mut self) -> Result<AudioRecording, CaptureError> {
        if self.state != CaptureState::Recording {
            return Err(CaptureError::NotRecording);
        }

        self.stream.take();
        self.state = CaptureState::Idle;

        let mut guard = self.buffer.lock().map_err(|_| CaptureError::BufferPoisoned)?;
        let recording = guard.finalize();
        tracing::info!(
            "Recording finished: {} chunks, {:.1}s",
            guard.chunks.len(),
            recording.duration_secs
        );
        guard.clear();
        Ok(recording)
    }

    /// Release the device and drop whatever was captured. Safe to call in any state.
    pub fn cancel(&mut self) {
        if self.stream.take().is_some() {
            tracing::info!("Recording cancelled, microphone released");
        }
        self.state = CaptureState::Idle;
        if let Ok(mut guard) = self.buffer.lock() {
            guard.clear();
        }
    }

    /// Cancel the capture if the device died underneath us. Returns true if it did.
    pub fn check_device(&mut self) -> bool {
        let lost = self.stream.as_ref().is_some_and(|s| !s.is_alive());
        if lost {
            tracing::warn!("Microphone lost during recording");
            self.cancel();
        }
        lost
    }
}

impl Drop for AudioRecorder {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Test source that writes a fixed block on open and counts live handles.
    pub struct FakeMicrophone {
        pub samples: Vec<i16>,
        pub deny: bool,
        pub open_handles: Arc<AtomicUsize>,
        pub alive: Arc<AtomicBool>,
    }

    impl FakeMicrophone {
        pub fn new(samples: Vec<i16>) -> Self {
            Self {
                samples,
                deny: false,
                open_handles: Arc::new(AtomicUsize::new(0)),
                alive: Arc::new(AtomicBool::new(true)),
            }
        }

        pub fn denied() -> Self {
            Self {
                deny: true,
                ..Self::new(Vec::new())
            }
        }
    }

    struct FakeStream {
        open_handles: Arc<AtomicUsize>,
        alive: Arc<AtomicBool>,
    }

    impl MicrophoneStream for FakeStream {
        fn sample_rate(&self) -> u32 {
            16000
        }

        fn channels(&self) -> u16 {
            1
        }

        fn is_alive(&self) -> bool {
            self.alive.load(Ordering::SeqCst)
        }
    }

    impl Drop for FakeStream {
        fn drop(&mut self) {
            self.open_handles.fetch_sub(1, Ordering::SeqCst);
        }
    }

    impl MicrophoneSource for FakeMicrophone {
        fn open(
            &mut self,
            sink: Arc<Mutex<ChunkBuffer>>,
        ) -> Result<Box<dyn MicrophoneStream>, CaptureError> {
            if self.deny {
                return Err(CaptureError::MicrophoneUnavailable("permission denied".into()));
            }
            {
                let mut guard = sink.lock().map_err(|_| CaptureError::BufferPoisoned)?;
                guard.reset(16000, 1);
                guard.append(&self.samples);
            }
            self.open_handles.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeStream {
                open_handles: self.open_handles.clone(),
                alive: self.alive.clone(),
            }))
        }

        fn name(&self) -> &str {
            "fake"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FakeMicrophone;
    use super::*;
    use std::sync::atomic::Ordering;

    #[test]
    fn test_start_stop_cycle_releases_device() {
        let mic = FakeMicrophone::new(vec![1, 2, 3, 4]);
        let handles = mic.open_handles.clone();
        let mut recorder = AudioRecorder::new(Box::new(mic));

        assert_eq!(recorder.state(), CaptureState::Idle);
        recorder.start().unwrap();
        assert_eq!(recorder.state(), CaptureState::Recording);
        assert_eq!(handles.load(Ordering::SeqCst), 1);

        let recording = recorder.stop().unwrap();
        assert_eq!(recorder.state(), CaptureState::Idle);
        assert_eq!(handles.load(Ordering::SeqCst), 0);
        assert_eq!(recording.bytes.len(), 44 + 8);
    }

    #[test]
    fn test_second_start_is_rejected() {
        let mic = FakeMicrophone::new(vec![7; 16]);
        let handles = mic.open_handles.clone();
        let mut recorder = AudioRecorder::new(Box::new(mic));

        recorder.start().unwrap();
        assert!(matches!(recorder.start(), Err(CaptureError::AlreadyRecording)));
        assert_eq!(handles.load(Ordering::SeqCst), 1);
        assert!(recorder.is_recording());
    }

    #[test]
    fn test_stop_without_start_fails() {
        let mut recorder = AudioRecorder::new(Box::new(FakeMicrophone::new(vec![])));
        assert!(matches!(recorder.stop(), Err(CaptureError::NotRecording)));
    }

    #[test]
    fn test_denied_permission_returns_to_idle() {
        let mut recorder = AudioRecorder::new(Box::new(FakeMicrophone::denied()));
        assert!(matches!(
            recorder.start(),
            Err(CaptureError::MicrophoneUnavailable(_))
        ));
        assert_eq!(recorder.state(), CaptureState::Idle);
    }

    #[test]
    fn test_no_microphone_source_is_unavailable() {
        let mut recorder = AudioRecorder::new(Box::new(NoMicrophone));
        assert!(matches!(
            recorder.start(),
            Err(CaptureError::MicrophoneUnavailable(_))
        ));
    }

    #[test]
    fn test_drop_and_device_loss_release_handle() {
        let mic = FakeMicrophone::new(vec![1; 8]);
        let handles = mic.open_handles.clone();
        let alive = mic.alive.clone();
        let mut recorder = AudioRecorder::new(Box::new(mic));

        recorder.start().unwrap();
        assert!(!recorder.check_device());
        alive.store(false, Ordering::SeqCst);
        assert!(recorder.check_device());
        assert_eq!(recorder.state(), CaptureState::Idle);
        assert_eq!(handles.load(Ordering::SeqCst), 0);

        alive.store(true, Ordering::SeqCst);
        recorder.start().unwrap();
        assert_eq!(handles.load(Ordering::SeqCst), 1);
        drop(recorder);
        assert_eq!(handles.load(Ordering::SeqCst), 0);
    }
}
