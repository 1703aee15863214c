use anyhow::Result;
use std::path::PathBuf;
use tokio::sync::mpsc;

use crate::error::CaptureError;

/// One block of captured audio (f32 in [-1.0, 1.0], mono)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Samples in capture order
    pub samples: Vec<f32>,
    /// Sample rate the block was captured at
    pub sample_rate: u32,
    /// Number of channels (always 1 after downmix)
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

impl AudioFrame {
    pub fn mono(samples: Vec<f32>, sample_rate: u32, timestamp_ms: u64) -> Self {
        Self {
            samples,
            sample_rate,
            channels: 1,
            timestamp_ms,
        }
    }

    /// Duration of this frame in milliseconds
    pub fn duration_ms(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 * 1000.0 / self.sample_rate as f64
    }
}

/// Configuration handed to a backend when a capture episode begins
#[derive(Debug, Clone)]
pub struct AudioBackendConfig {
    /// Rate the session wants; the device may run at a different native rate
    pub requested_sample_rate: u32,
    /// Channel count delivered to the session (1 = mono)
    pub channels: u16,
    /// Processing quantum in milliseconds, for backends that choose their own block size
    pub buffer_duration_ms: u64,
    /// Capacity of the frame queue between the device callback and the session
    pub frame_queue: usize,
}

impl Default for AudioBackendConfig {
    fn default() -> Self {
        Self {
            requested_sample_rate: 16000,
            channels: 1,
            buffer_duration_ms: 100,
            frame_queue: 64,
        }
    }
}

/// Audio capture backend trait
///
/// One backend instance covers one capture episode:
/// - Microphone: cpal input stream on a dedicated capture thread
/// - File: replays a WAV file in real time (hosts without a microphone, tests)
#[async_trait::async_trait]
pub trait AudioBackend: Send {
    /// Acquire the device and start delivering frames
    ///
    /// Permission and availability failures are reported here, once.
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>, CaptureError>;

    /// Stop the callback and release the device
    ///
    /// Must be safe to call repeatedly, and after the device went away on its own.
    async fn stop(&mut self) -> Result<()>;

    /// Check if backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Creates a fresh backend for every capture episode.
///
/// The session only talks to this seam, so hosts and tests can substitute
/// their own sources.
pub trait CaptureSource: Send + Sync {
    fn create(&self, config: AudioBackendConfig) -> Result<Box<dyn AudioBackend>, CaptureError>;

    fn name(&self) -> &str;
}

/// Audio source type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioSource {
    /// Microphone input, optionally a named device
    Microphone { device: Option<String> },
    /// WAV file replayed at real-time pace
    File(PathBuf),
}

/// Audio backend factory
#[derive(Debug, Clone)]
pub struct AudioBackendFactory {
    source: AudioSource,
}

impl AudioBackendFactory {
    pub fn new(source: AudioSource) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &AudioSource {
        &self.source
    }

    /// Create audio backend based on source and configuration
    pub fn create_backend(
        source: &AudioSource,
        config: AudioBackendConfig,
    ) -> Result<Box<dyn AudioBackend>, CaptureError> {
        match source {
            AudioSource::Microphone { device } => {
                use super::microphone::MicrophoneBackend;
                Ok(Box::new(MicrophoneBackend::new(config, device.clone())))
            }

            AudioSource::File(path) => {
                use super::file::FileBackend;
                Ok(Box::new(FileBackend::new(config, path.clone())))
            }
        }
    }
}

impl CaptureSource for AudioBackendFactory {
    fn create(&self, config: AudioBackendConfig) -> Result<Box<dyn AudioBackend>, CaptureError> {
        Self::create_backend(&self.source, config)
    }

    fn name(&self) -> &str {
        match self.source {
            AudioSource::Microphone { .. } => "microphone",
            AudioSource::File(_) => "file",
        }
    }
}
