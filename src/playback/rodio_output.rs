use super::{AudioClip, AudioOutput, AudioSink, PlaybackError};
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink};
use std::io::Cursor;

/// Default output device through rodio. The stream must outlive every sink it hands out.
pub struct RodioOutput {
    _stream: OutputStream,
    handle: OutputStreamHandle,
}

impl RodioOutput {
    pub fn from_default_device() -> Result<Self, PlaybackError> {
        let (stream, handle) =
            OutputStream::try_default().map_err(|e| PlaybackError::Unavailable(e.to_string()))?;
        tracing::info!("Audio output opened on default device");
        Ok(Self {
            _stream: stream,
            handle,
        })
    }
}

struct RodioSink {
    sink: Sink,
}

impl AudioSink for RodioSink {
    fn play(&mut self) {
        self.sink.play();
    }

    fn pause(&mut self) {
        self.sink.pause();
    }

    fn is_finished(&self) -> bool {
        self.sink.empty()
    }
}

impl Drop for RodioSink {
    fn drop(&mut self) {
        self.sink.stop();
    }
}

impl AudioOutput for RodioOutput {
    fn load(&self, clip: &AudioClip) -> Result<Box<dyn AudioSink>, PlaybackError> {
        let source = Decoder::new(Cursor::new(clip.bytes.clone()))
            .map_err(|e| PlaybackError::Decode(e.to_string()))?;
        let sink =
            Sink::try_new(&self.handle).map_err(|e| PlaybackError::Unavailable(e.to_string()))?;
        sink.pause();
        sink.append(source);
        Ok(Box::new(RodioSink { sink }))
    }

    fn name(&self) -> &str {
        "rodio"
    }
}
