use chrono::{DateTime, Utc};

pub const WAV_MIME: &str = "audio/wav";

/// A block of interleaved PCM samples as delivered by the device callback
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub samples: Vec<i16>,
    pub captured_at: DateTime<Utc>,
}

/// Ordered chunks accumulated while recording
#[derive(Debug, Clone)]
pub struct ChunkBuffer {
    pub chunks: Vec<AudioChunk>,
    pub sample_rate: u32,
    pub channels: u16,
    /// Cached duration in seconds
    pub duration_secs: f32,
    sample_count: usize,
}

impl ChunkBuffer {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            chunks: Vec::new(),
            sample_rate,
            channels,
            duration_secs: 0.0,
            sample_count: 0,
        }
    }

    /// Recalculate and update duration_secs
    pub fn update_duration(&mut self) {
        if self.sample_rate == 0 {
            self.duration_secs = 0.0;
        } else {
            let channels = self.channels.max(1) as f32;
            self.duration_secs = self.sample_count as f32 / (self.sample_rate as f32 * channels);
        }
    }

    pub fn reset(&mut self, sample_rate: u32, channels: u16) {
        self.sample_rate = sample_rate;
        self.channels = channels;
        self.clear();
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
        self.sample_count = 0;
        self.duration_secs = 0.0;
    }

    /// Empty blocks are dropped so they never appear as zero-length chunks.
    pub fn append(&mut self, data: &[i16]) {
        if data.is_empty() {
            return;
        }
        self.chunks.push(AudioChunk {
            samples: data.to_vec(),
            captured_at: Utc::now(),
        });
        self.sample_count += data.len();
        self.update_duration();
    }

    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    pub fn is_empty(&self) -> bool {
        self.sample_count == 0
    }

    /// Concatenate the chunks, in capture order, into one WAV recording.
    pub fn finalize(&self) -> AudioRecording {
        let samples = self
            .chunks
            .iter()
            .flat_map(|chunk| chunk.samples.iter().copied())
            .collect::<Vec<_>>();

        AudioRecording {
            bytes: encode_wav(&samples, self.sample_rate, self.channels),
            mime_type: WAV_MIME.to_string(),
            duration_secs: self.duration_secs,
        }
    }
}

/// Finished capture, ready for upload
#[derive(Debug, Clone, PartialEq)]
pub struct AudioRecording {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub duration_secs: f32,
}

impl AudioRecording {
    pub fn file_name(&self) -> String {
        let ext = match self.mime_type.split(';').next().unwrap_or_default().trim() {
            "audio/wav" | "audio/x-wav" | "audio/wave" => "wav",
            "audio/mpeg" => "mp3",
            "audio/ogg" => "ogg",
            _ => "webm",
        };
        format!("recording.{}", ext)
    }
}

/// 16-bit PCM WAV container
pub fn encode_wav(samples: &[i16], sample_rate: u32, channels: u16) -> Vec<u8> {
    let data_size = (samples.len() * 2) as u32;
    let mut wav = Vec::with_capacity(44 + samples.len() * 2);

    // RIFF header
    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&(36 + data_size).to_le_bytes());
    wav.extend_from_slice(b"WAVE");

    // fmt chunk
    wav.extend_from_slice(b"fmt ");
    wav.extend_from_slice(&16u32.to_le_bytes()); // chunk size
    wav.extend_from_slice(&1u16.to_le_bytes()); // PCM format
    wav.extend_from_slice(&channels.to_le_bytes());
    wav.extend_from_slice(&sample_rate.to_le_bytes());
    let byte_rate = sample_rate * channels as u32 * 2;
    wav.extend_from_slice(&byte_rate.to_le_bytes());
    wav.extend_from_slice(&(channels * 2).to_le_bytes()); // block align
    wav.extend_from_slice(&16u16.to_le_bytes()); // bits per sample

    // data chunk
    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&data_size.to_le_bytes());
    for &sample in samples {
        wav.extend_from_slice(&sample.to_le_bytes());
    }

    wav
}
