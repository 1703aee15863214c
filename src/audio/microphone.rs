// Microphone audio backend using cpal

use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SizedSample, Stream, StreamConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, trace, warn};

use super::backend::{AudioBackend, AudioBackendConfig, AudioFrame};
use crate::error::CaptureError;

/// List input device names so hosts can offer a selector.
pub fn list_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let devices = host.input_devices().context("no input devices available")?;
    Ok(devices.filter_map(|d| d.name().ok()).collect())
}

/// Microphone backend
///
/// `cpal::Stream` is not `Send` on every platform, so the stream is built,
/// played and dropped on one dedicated capture thread. The session only ever
/// sees the frame receiver.
pub struct MicrophoneBackend {
    config: AudioBackendConfig,
    device_name: Option<String>,
    worker: Option<CaptureWorker>,
    capturing: Arc<AtomicBool>,
}

struct CaptureWorker {
    // Dropping the sender also releases the thread, so a dropped backend never
    // keeps the device open.
    stop_tx: std::sync::mpsc::Sender<()>,
    thread: JoinHandle<()>,
}

impl MicrophoneBackend {
    pub fn new(config: AudioBackendConfig, device_name: Option<String>) -> Self {
        Self {
            config,
            device_name,
            worker: None,
            capturing: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[async_trait::async_trait]
impl AudioBackend for MicrophoneBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>, CaptureError> {
        if self.worker.is_some() {
            return Err(CaptureError::Backend("already capturing".to_string()));
        }

        info!(
            "Starting microphone capture (requested {}Hz)",
            self.config.requested_sample_rate
        );

        let (frame_tx, frame_rx) = mpsc::channel(self.config.frame_queue.max(1));
        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = std::sync::mpsc::channel();

        let device_name = self.device_name.clone();
        let requested_rate = self.config.requested_sample_rate;
        let capturing = Arc::clone(&self.capturing);

        let thread = std::thread::Builder::new()
            .name("audio-capture".to_string())
            .spawn(move || {
                run_capture_thread(
                    device_name,
                    requested_rate,
                    frame_tx,
                    capturing,
                    ready_tx,
                    stop_rx,
                )
            })
            .map_err(|e| CaptureError::Backend(format!("failed to spawn capture thread: {e}")))?;

        match ready_rx.await {
            Ok(Ok(device_rate)) => {
                info!("Microphone capture started at {}Hz", device_rate);
                self.worker = Some(CaptureWorker { stop_tx, thread });
                Ok(frame_rx)
            }
            Ok(Err(e)) => {
                // The thread has already returned after reporting.
                let _ = tokio::task::spawn_blocking(move || thread.join()).await;
                Err(e)
            }
            Err(_) => Err(CaptureError::Backend(
                "capture thread exited before the device was ready".to_string(),
            )),
        }
    }

    async fn stop(&mut self) -> Result<()> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };

        info!("Stopping microphone capture");

        // The thread may already be gone if the device was revoked.
        let _ = worker.stop_tx.send(());
        tokio::task::spawn_blocking(move || worker.thread.join())
            .await
            .context("capture join task failed")?
            .map_err(|_| anyhow!("capture thread panicked"))?;

        self.capturing.store(false, Ordering::SeqCst);

        info!("Microphone capture stopped");

        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "cpal microphone"
    }
}

fn run_capture_thread(
    device_name: Option<String>,
    requested_rate: u32,
    frame_tx: mpsc::Sender<AudioFrame>,
    capturing: Arc<AtomicBool>,
    ready_tx: oneshot::Sender<Result<u32, CaptureError>>,
    stop_rx: std::sync::mpsc::Receiver<()>,
) {
    let (stream, device_rate) =
        match open_stream(device_name.as_deref(), requested_rate, frame_tx, &capturing) {
            Ok(opened) => opened,
            Err(e) => {
                let _ = ready_tx.send(Err(e));
                return;
            }
        };

    capturing.store(true, Ordering::SeqCst);
    if ready_tx.send(Ok(device_rate)).is_err() {
        // Nobody is waiting for this capture any more.
        capturing.store(false, Ordering::SeqCst);
        return;
    }

    // Blocks until stop() or until the backend is dropped.
    let _ = stop_rx.recv();

    if let Err(e) = stream.pause() {
        warn!("Failed to pause input stream: {}", e);
    }
    drop(stream);
    capturing.store(false, Ordering::SeqCst);
}

fn open_stream(
    device_name: Option<&str>,
    requested_rate: u32,
    frame_tx: mpsc::Sender<AudioFrame>,
    capturing: &Arc<AtomicBool>,
) -> Result<(Stream, u32), CaptureError> {
    let host = cpal::default_host();

    let device = match device_name {
        Some(name) => host
            .input_devices()
            .map_err(|e| classify(e.to_string()))?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| CaptureError::Unavailable(format!("input device '{name}' not found")))?,
        None => host
            .default_input_device()
            .ok_or_else(|| CaptureError::Unavailable("no default input device".to_string()))?,
    };

    let dev_name = device.name().unwrap_or_else(|_| "unknown".into());

    let default_config = device
        .default_input_config()
        .map_err(|e| classify(e.to_string()))?;
    let format = default_config.sample_format();
    let channels = default_config.channels().max(1);

    // Run at the requested rate when the device can; otherwise the session
    // resamples from the native rate.
    let supports_requested = device
        .supported_input_configs()
        .map(|mut ranges| {
            ranges.any(|r| {
                r.channels() == channels
                    && r.sample_format() == format
                    && r.min_sample_rate().0 <= requested_rate
                    && requested_rate <= r.max_sample_rate().0
            })
        })
        .unwrap_or(false);
    let device_rate = if supports_requested {
        requested_rate
    } else {
        default_config.sample_rate().0
    };

    let stream_config = StreamConfig {
        channels,
        sample_rate: cpal::SampleRate(device_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    info!(
        device = %dev_name,
        device_rate,
        channels,
        ?format,
        "Input device config (downmixed to mono)"
    );

    let sink = FrameSink {
        tx: frame_tx,
        sample_rate: device_rate,
        started: Instant::now(),
    };

    let stream = match format {
        SampleFormat::F32 => build_stream::<f32, _>(&device, &stream_config, |s| s, sink, capturing),
        SampleFormat::I16 => build_stream::<i16, _>(
            &device,
            &stream_config,
            |s| s as f32 / 32_768.0,
            sink,
            capturing,
        ),
        SampleFormat::U16 => build_stream::<u16, _>(
            &device,
            &stream_config,
            |s| (s as f32 - 32_768.0) / 32_768.0,
            sink,
            capturing,
        ),
        other => {
            return Err(CaptureError::Backend(format!(
                "unsupported sample format: {other:?}"
            )))
        }
    }
    .map_err(|e| classify(e.to_string()))?;

    stream.play().map_err(|e| classify(e.to_string()))?;

    Ok((stream, device_rate))
}

/// Hands frames from the device callback to the session without blocking.
struct FrameSink {
    tx: mpsc::Sender<AudioFrame>,
    sample_rate: u32,
    started: Instant,
}

impl FrameSink {
    fn push(&self, samples: Vec<f32>) {
        let frame = AudioFrame::mono(
            samples,
            self.sample_rate,
            self.started.elapsed().as_millis() as u64,
        );
        if let Err(mpsc::error::TrySendError::Full(_)) = self.tx.try_send(frame) {
            trace!("Frame queue full, dropping audio block");
        }
    }
}

fn build_stream<T, F>(
    device: &cpal::Device,
    config: &StreamConfig,
    convert: F,
    sink: FrameSink,
    capturing: &Arc<AtomicBool>,
) -> Result<Stream, cpal::BuildStreamError>
where
    T: SizedSample,
    F: Fn(T) -> f32 + Send + 'static,
{
    let channels = config.channels.max(1) as usize;
    let capturing = Arc::clone(capturing);

    device.build_input_stream(
        config,
        move |data: &[T], _info: &cpal::InputCallbackInfo| {
            let mono: Vec<f32> = data
                .chunks_exact(channels)
                .map(|frame| frame.iter().map(|&s| convert(s)).sum::<f32>() / channels as f32)
                .collect();
            sink.push(mono);
        },
        move |err| {
            error!("Audio input stream error: {}", err);
            if matches!(err, cpal::StreamError::DeviceNotAvailable) {
                capturing.store(false, Ordering::SeqCst);
            }
        },
        None,
    )
}

fn classify(description: String) -> CaptureError {
    let lower = description.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("not authorized") {
        CaptureError::PermissionDenied(description)
    } else if lower.contains("not available") || lower.contains("no longer available") || lower.contains("busy") {
        CaptureError::Unavailable(description)
    } else {
        CaptureError::Backend(description)
    }
}
