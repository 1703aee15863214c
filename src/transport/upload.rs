// Batch transport: buffers one episode and uploads it as a single WAV file

use anyhow::{Context, Result};
use reqwest::multipart;
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, warn};

use super::{Connection, ConnectionState, Endpoint, EventSink, SharedState, Transport, TransportEvent};
use crate::error::TransportError;

/// Form field carrying the recording
pub const UPLOAD_FIELD: &str = "audio";
/// File name announced for the recording
pub const UPLOAD_FILE_NAME: &str = "audio.wav";

/// Encode little-endian i16 PCM as a mono 16-bit WAV file in memory.
pub fn wav_bytes(pcm: &[u8], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(44 + pcm.len()));
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).context("Failed to create WAV writer")?;
        for pair in pcm.chunks_exact(2) {
            writer
                .write_sample(i16::from_le_bytes([pair[0], pair[1]]))
                .context("Failed to write sample to WAV")?;
        }
        writer.finalize().context("Failed to finalize WAV data")?;
    }

    Ok(cursor.into_inner())
}

/// Accumulates every chunk of an episode, then submits it with one
/// multipart POST when the connection closes.
#[derive(Debug, Clone)]
pub struct UploadTransport {
    client: reqwest::Client,
}

impl UploadTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl Transport for UploadTransport {
    async fn open(
        &self,
        endpoint: &Endpoint,
        sample_rate: u32,
        events: EventSink,
    ) -> Result<Arc<dyn Connection>, TransportError> {
        let url = endpoint.url();
        reqwest::Url::parse(&url).map_err(|e| TransportError::InvalidEndpoint {
            url: url.clone(),
            reason: e.to_string(),
        })?;

        info!("Buffering {}Hz recording for upload to {}", sample_rate, url);
        let _ = events.send(TransportEvent::Opened);

        Ok(Arc::new(UploadConnection {
            url,
            client: self.client.clone(),
            sample_rate,
            state: SharedState::new(ConnectionState::Open),
            buffer: Mutex::new(Vec::new()),
            events,
        }))
    }

    fn name(&self) -> &str {
        "upload"
    }
}

struct UploadConnection {
    url: String,
    client: reqwest::Client,
    sample_rate: u32,
    state: Arc<SharedState>,
    buffer: Mutex<Vec<u8>>,
    events: EventSink,
}

impl UploadConnection {
    async fn upload(&self, pcm: Vec<u8>) -> Result<String> {
        let wav = wav_bytes(&pcm, self.sample_rate)?;
        info!(bytes = wav.len(), "Uploading recording to {}", self.url);

        let part = multipart::Part::bytes(wav)
            .file_name(UPLOAD_FILE_NAME)
            .mime_str("audio/wav")?;
        let form = multipart::Form::new().part(UPLOAD_FIELD, part);

        let response = self
            .client
            .post(&self.url)
            .multipart(form)
            .send()
            .await
            .context("Upload request failed")?
            .error_for_status()
            .context("Upload rejected")?;

        response.text().await.context("Failed to read upload response")
    }
}

#[async_trait::async_trait]
impl Connection for UploadConnection {
    fn send(&self, payload: Vec<u8>) -> bool {
        if self.state.get() != ConnectionState::Open {
            return false;
        }
        match self.buffer.lock() {
            Ok(mut buffer) => {
                buffer.extend_from_slice(&payload);
                true
            }
            Err(_) => false,
        }
    }

    fn state(&self) -> ConnectionState {
        self.state.get()
    }

    async fn close(&self) {
        if !self
            .state
            .transition(ConnectionState::Open, ConnectionState::Closing)
        {
            return;
        }

        let pcm = match self.buffer.lock() {
            Ok(mut buffer) => std::mem::take(&mut *buffer),
            Err(_) => Vec::new(),
        };

        if pcm.is_empty() {
            info!("Nothing recorded, skipping upload");
        } else {
            match self.upload(pcm).await {
                Ok(body) => info!("Upload response: {}", body),
                Err(e) => {
                    warn!("Upload failed: {:#}", e);
                    let _ = self.events.send(TransportEvent::Error(format!("{e:#}")));
                }
            }
        }

        self.state.set(ConnectionState::Closed);
        let _ = self.events.send(TransportEvent::Closed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wav_bytes_round_trips_through_hound() {
        let pcm: Vec<u8> = [1000_i16, -1000, 32767]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();
        let wav = wav_bytes(&pcm, 16000).unwrap();

        let reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
        assert_eq!(reader.spec().sample_rate, 16000);
        assert_eq!(reader.spec().channels, 1);
        let samples: Vec<i16> = reader.into_samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![1000, -1000, 32767]);
    }
}
