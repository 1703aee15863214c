use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ConfigError;
use crate::transport::Endpoint;

/// Sample rates a session may target
pub const SUPPORTED_SAMPLE_RATES: [u32; 7] = [8000, 16000, 24000, 32000, 44100, 48000, 96000];

/// A target sample rate from [`SUPPORTED_SAMPLE_RATES`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct SampleRate(u32);

impl SampleRate {
    pub const HZ_16000: SampleRate = SampleRate(16000);

    pub fn hz(self) -> u32 {
        self.0
    }
}

impl Default for SampleRate {
    fn default() -> Self {
        Self::HZ_16000
    }
}

impl TryFrom<u32> for SampleRate {
    type Error = ConfigError;

    fn try_from(hz: u32) -> Result<Self, Self::Error> {
        if SUPPORTED_SAMPLE_RATES.contains(&hz) {
            Ok(Self(hz))
        } else {
            Err(ConfigError::UnsupportedSampleRate(hz))
        }
    }
}

impl From<SampleRate> for u32 {
    fn from(rate: SampleRate) -> Self {
        rate.0
    }
}

impl fmt::Display for SampleRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}Hz", self.0)
    }
}

/// How press/release gestures map onto start/stop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionMode {
    /// Record while held; stop shortly after release
    #[default]
    Momentary,
    /// Each activation alternates start and stop
    Toggle,
}

impl fmt::Display for InteractionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Momentary => write!(f, "momentary"),
            Self::Toggle => write!(f, "toggle"),
        }
    }
}

/// Configuration for a streaming session, immutable while the session exists
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Unique session identifier used in logs
    pub session_id: String,

    /// Rate every frame is resampled to before encoding
    pub sample_rate: SampleRate,

    /// Number of audio channels (always 1)
    pub channels: u16,

    /// Remote listener
    pub endpoint: Endpoint,

    /// Interaction mode the input controller applies
    pub mode: InteractionMode,

    /// Processing quantum requested from capture backends
    pub buffer_duration_ms: u64,
}

impl SessionConfig {
    pub fn new(sample_rate: SampleRate, endpoint: Endpoint) -> Self {
        Self {
            session_id: format!("session-{}", uuid::Uuid::new_v4()),
            sample_rate,
            channels: 1,
            endpoint,
            mode: InteractionMode::default(),
            buffer_duration_ms: 100,
        }
    }

    pub fn with_mode(mut self, mode: InteractionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Re-check invariants for configs assembled by hand or deserialized
    pub fn validate(&self) -> Result<(), ConfigError> {
        SampleRate::try_from(self.sample_rate.hz())?;
        if self.channels != 1 {
            return Err(ConfigError::UnsupportedChannels(self.channels));
        }
        self.endpoint.validate()
    }
}
