// File replay backend: streams a WAV file as if it were a live microphone

use anyhow::{Context, Result};
use hound::{SampleFormat, WavReader};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::backend::{AudioBackend, AudioBackendConfig, AudioFrame};
use super::resample::downmix;
use crate::error::CaptureError;

pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    /// Mono samples normalised to [-1.0, 1.0]
    pub samples: Vec<f32>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path).context("Failed to open WAV file")?;

        let spec = reader.spec();
        let interleaved: Vec<f32> = match spec.sample_format {
            SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<Result<Vec<_>, _>>()
                .context("Failed to read audio samples")?,
            SampleFormat::Int => {
                let scale = (1_i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<Result<Vec<_>, _>>()
                    .context("Failed to read audio samples")?
            }
        };

        let samples = downmix(&interleaved, spec.channels);
        let duration_seconds = if spec.sample_rate == 0 {
            0.0
        } else {
            samples.len() as f64 / spec.sample_rate as f64
        };

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }
}

/// Replays a WAV file at real-time pace, one buffer-duration block per tick.
///
/// The file keeps its own sample rate; the session resamples it like any
/// other device whose native rate differs from the request.
pub struct FileBackend {
    config: AudioBackendConfig,
    path: PathBuf,
    task: Option<JoinHandle<()>>,
}

impl FileBackend {
    pub fn new(config: AudioBackendConfig, path: PathBuf) -> Self {
        Self {
            config,
            path,
            task: None,
        }
    }
}

#[async_trait::async_trait]
impl AudioBackend for FileBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>, CaptureError> {
        if self.task.is_some() {
            return Err(CaptureError::Backend("already capturing".to_string()));
        }

        let path = self.path.clone();
        let audio = tokio::task::spawn_blocking(move || AudioFile::open(path))
            .await
            .map_err(|e| CaptureError::Backend(e.to_string()))?
            .map_err(|e| CaptureError::Unavailable(format!("{e:#}")))?;

        if audio.sample_rate == 0 {
            return Err(CaptureError::Unavailable(format!(
                "{} has no sample rate",
                audio.path
            )));
        }

        let block_ms = self.config.buffer_duration_ms.max(1);
        let block_len = ((audio.sample_rate as u64 * block_ms) / 1000).max(1) as usize;
        let (tx, rx) = mpsc::channel(self.config.frame_queue.max(1));

        info!(
            "Replaying {} ({}Hz, {} samples per block)",
            audio.path, audio.sample_rate, block_len
        );

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(block_ms));
            for (i, block) in audio.samples.chunks(block_len).enumerate() {
                ticker.tick().await;
                let frame = AudioFrame::mono(block.to_vec(), audio.sample_rate, i as u64 * block_ms);
                if tx.try_send(frame).is_err() && tx.is_closed() {
                    break;
                }
            }
            info!("Replay of {} finished", audio.path);
        });

        self.task = Some(task);
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        let Some(task) = self.task.take() else {
            return Ok(());
        };

        task.abort();
        if let Err(e) = task.await {
            if !e.is_cancelled() {
                warn!("Replay task failed: {}", e);
            }
        }

        info!("File replay stopped");

        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    fn name(&self) -> &str {
        "file replay"
    }
}
