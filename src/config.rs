use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::audio::AudioSource;
use crate::error::ConfigError;
use crate::session::{InteractionMode, SampleRate, SessionConfig};
use crate::transport::{Endpoint, Scheme};

/// Prefix for environment overrides, e.g. `INTERCOM__TRANSPORT__ADDRESS`
pub const ENV_PREFIX: &str = "INTERCOM";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub audio: AudioConfig,
    pub transport: TransportConfig,
    pub control: ControlConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Target sample rate in Hz
    pub sample_rate: u32,
    /// `microphone` or `file`
    pub source: String,
    /// Input device name (microphone source); default device when unset
    pub device: Option<String>,
    /// WAV file to replay (file source)
    pub file: Option<String>,
    pub buffer_duration_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Live WebSocket stream
    Stream,
    /// One multipart upload per recording
    Upload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    pub kind: TransportKind,
    /// Use TLS (`wss`/`https`)
    pub secure: bool,
    pub address: String,
    pub path: String,
    pub subprotocol: Option<String>,
    pub connect_timeout_ms: u64,
    pub upload_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlConfig {
    pub mode: InteractionMode,
    /// Debounce between a momentary release and the stop
    pub release_delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: ServiceConfig {
                name: "intercom-stream".to_string(),
                http: HttpConfig {
                    bind: "127.0.0.1".to_string(),
                    port: 8090,
                },
            },
            audio: AudioConfig {
                sample_rate: 16000,
                source: "microphone".to_string(),
                device: None,
                file: None,
                buffer_duration_ms: 100,
            },
            transport: TransportConfig {
                kind: TransportKind::Stream,
                secure: true,
                address: "192.168.2.1".to_string(),
                path: "/".to_string(),
                subprotocol: Some("audio-protocol".to_string()),
                connect_timeout_ms: 5000,
                upload_timeout_ms: 30_000,
            },
            control: ControlConfig {
                mode: InteractionMode::Momentary,
                release_delay_ms: 300,
            },
        }
    }
}

impl Config {
    /// Load built-in defaults, then `path` (any format the `config` crate
    /// knows, extension optional, may be absent), then `INTERCOM__*` variables.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(
                config::Config::try_from(&Config::default())
                    .context("Failed to serialize default configuration")?,
            )
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .map_err(ConfigError::from)?;

        Ok(settings.try_deserialize().map_err(ConfigError::from)?)
    }

    /// Validate everything a session needs. Runs before any session exists.
    pub fn session_config(&self) -> Result<SessionConfig, ConfigError> {
        let sample_rate = SampleRate::try_from(self.audio.sample_rate)?;
        let endpoint = Endpoint::new(
            self.scheme(),
            self.transport.address.clone(),
            self.transport.path.clone(),
            self.transport.subprotocol.clone(),
        )?;

        let mut session = SessionConfig::new(sample_rate, endpoint).with_mode(self.control.mode);
        session.buffer_duration_ms = self.audio.buffer_duration_ms.max(1);
        session.validate()?;
        Ok(session)
    }

    pub fn audio_source(&self) -> Result<AudioSource, ConfigError> {
        match self.audio.source.trim().to_ascii_lowercase().as_str() {
            "microphone" | "mic" => Ok(AudioSource::Microphone {
                device: self.audio.device.clone().filter(|d| !d.trim().is_empty()),
            }),
            "file" => match self.audio.file.as_deref().map(str::trim) {
                Some(path) if !path.is_empty() => Ok(AudioSource::File(PathBuf::from(path))),
                _ => Err(ConfigError::InvalidSource(
                    "audio.source = \"file\" requires audio.file".to_string(),
                )),
            },
            other => Err(ConfigError::InvalidSource(format!(
                "{other} (expected \"microphone\" or \"file\")"
            ))),
        }
    }

    pub fn scheme(&self) -> Scheme {
        match (self.transport.kind, self.transport.secure) {
            (TransportKind::Stream, true) => Scheme::Wss,
            (TransportKind::Stream, false) => Scheme::Ws,
            (TransportKind::Upload, true) => Scheme::Https,
            (TransportKind::Upload, false) => Scheme::Http,
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.transport.connect_timeout_ms.max(1))
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_millis(self.transport.upload_timeout_ms.max(1))
    }

    pub fn release_delay(&self) -> Duration {
        Duration::from_millis(self.control.release_delay_ms)
    }
}
