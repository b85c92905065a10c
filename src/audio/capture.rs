use crate::audio::{CaptureError, ChunkBuffer, MicrophoneSource, MicrophoneStream};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use tracing::{error, info};

/// Microphone backed by the default cpal host
pub struct CpalMicrophone {
    selected_input_device: Option<String>,
}

struct CpalStream {
    _stream: cpal::Stream,
    sample_rate: u32,
    channels: u16,
    alive: Arc<AtomicBool>,
}

impl MicrophoneStream for CpalStream {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }
}

impl CpalMicrophone {
    pub fn new(selected_input_device: Option<String>) -> Self {
        Self {
            selected_input_device: selected_input_device
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
        }
    }

    fn pick_input_device(host: &cpal::Host, preferred_name: Option<&str>) -> Option<cpal::Device> {
        if let Some(name) = preferred_name {
            if let Ok(mut devices) = host.input_devices() {
                if let Some(device) = devices.find(|d| Self::device_display_name(d) == name) {
                    return Some(device);
                }
            }
            tracing::warn!(
                "Preferred input device '{}' not found, falling back to default",
                name
            );
        }
        let default_device = host.default_input_device()?;

        let default_name = Self::device_display_name(&default_device);
        if !Self::looks_like_loopback(&default_name) {
            return Some(default_device);
        }

        tracing::warn!(
            "Default device '{}' looks like loopback, trying to pick a microphone input",
            default_name
        );

        if let Ok(mut devices) = host.input_devices() {
            if let Some(alternative) = devices.find(|d| {
                let name = Self::device_display_name(d);
                !Self::looks_like_loopback(&name)
            }) {
                return Some(alternative);
            }
        }

        Some(default_device)
    }

    fn device_display_name(device: &cpal::Device) -> String {
        device
            .name()
            .unwrap_or_else(|_| "Unknown input".to_string())
    }

    fn looks_like_loopback(name: &str) -> bool {
        let lower = name.to_ascii_lowercase();
        let patterns = ["stereo mix", "what u hear", "wave out", "loopback", "monitor"];
        patterns.iter().any(|p| lower.contains(p))
    }
}

impl MicrophoneSource for CpalMicrophone {
    fn open(
        &mut self,
        sink: Arc<Mutex<ChunkBuffer>>,
    ) -> Result<Box<dyn MicrophoneStream>, CaptureError> {
        let unavailable = |e: String| CaptureError::MicrophoneUnavailable(e);

        let host = cpal::default_host();
        let device = Self::pick_input_device(&host, self.selected_input_device.as_deref())
            .ok_or_else(|| unavailable("No input device available".into()))?;
        info!("Input device: {}", Self::device_display_name(&device));

        let config = device
            .default_input_config()
            .map_err(|e| unavailable(e.to_string()))?;
        let sample_rate = config.sample_rate().0;
        let channels = config.channels();
        sink.lock()
            .map_err(|_| CaptureError::BufferPoisoned)?
            .reset(sample_rate, channels);

        let alive = Arc::new(AtomicBool::new(true));
        let alive_on_error = alive.clone();
        let err_fn = move |err: cpal::StreamError| {
            error!("an error occurred on stream: {}", err);
            alive_on_error.store(false, Ordering::Relaxed);
        };

        let stream = match config.sample_format() {
            cpal::SampleFormat::I16 => {
                let sink = sink.clone();
                device.build_input_stream(
                    &config.into(),
                    move |data: &[i16], _: &_| write_input_data(data, &sink),
                    err_fn,
                    None,
                )
            }
            cpal::SampleFormat::F32 => {
                let sink = sink.clone();
                device.build_input_stream(
                    &config.into(),
                    move |data: &[f32], _: &_| write_input_data_f32(data, &sink),
                    err_fn,
                    None,
                )
            }
            other => return Err(unavailable(format!("Unsupported sample format {:?}", other))),
        }
        .map_err(|e| unavailable(e.to_string()))?;

        stream.play().map_err(|e| unavailable(e.to_string()))?;

        Ok(Box::new(CpalStream {
            _stream: stream,
            sample_rate,
            channels,
            alive,
        }))
    }

    fn name(&self) -> &str {
        self.selected_input_device.as_deref().unwrap_or("default input")
    }
}

fn write_input_data(input: &[i16], buffer: &Arc<Mutex<ChunkBuffer>>) {
    if let Ok(mut guard) = buffer.lock() {
        guard.append(input);
    }
}

fn write_input_data_f32(input: &[f32], buffer: &Arc<Mutex<ChunkBuffer>>) {
    let samples: Vec<i16> = input
        .iter()
        .map(|&x| (x.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
        .collect();
    if let Ok(mut guard) = buffer.lock() {
        guard.append(&samples);
    }
}
