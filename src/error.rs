//! Error types for the streaming pipeline.
//!
//! Device and connection failures are recovered inside the pipeline and only
//! surface here when a caller has to react to them: capture acquisition at
//! `start()` and configuration validation before a session exists.

use crate::session::SessionState;

/// Configuration rejected before any session is created.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unsupported sample rate: {0} Hz (expected one of 8000, 16000, 24000, 32000, 44100, 48000, 96000)")]
    UnsupportedSampleRate(u32),

    #[error("unsupported channel count: {0} (only mono capture is supported)")]
    UnsupportedChannels(u16),

    #[error("invalid transport address: {0}")]
    InvalidAddress(String),

    #[error("invalid transport path: {0}")]
    InvalidPath(String),

    #[error("invalid audio source: {0}")]
    InvalidSource(String),

    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

/// Microphone (or replay source) acquisition failure. Reported once, never retried.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("microphone permission denied: {0}")]
    PermissionDenied(String),

    #[error("audio input unavailable: {0}")]
    Unavailable(String),

    #[error("audio backend failure: {0}")]
    Backend(String),
}

/// Transport could not even begin connecting.
///
/// Network failures after `open` are reported as [`TransportEvent::Error`]
/// instead.
///
/// [`TransportEvent::Error`]: crate::transport::TransportEvent::Error
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("invalid endpoint {url}: {reason}")]
    InvalidEndpoint { url: String, reason: String },
}

/// Why a session request was refused.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Settings may only change while idle.
    #[error("session is {0}, settings can only change while idle")]
    Busy(SessionState),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}
