//! Outbound transports for encoded audio.
//!
//! A [`Transport`] opens one [`Connection`] per recording episode:
//! - [`WebSocketTransport`] streams every chunk as one binary message
//! - [`UploadTransport`] buffers the episode and posts it as a single WAV file

mod endpoint;
mod upload;
mod websocket;

pub use endpoint::{Endpoint, Scheme};
pub use upload::{wav_bytes, UploadTransport};
pub use websocket::WebSocketTransport;

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::TransportError;

/// Connection lifecycle notifications, for diagnostics only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Opened,
    Error(String),
    Closed,
}

/// Where a transport reports [`TransportEvent`]s. Send failures are ignored.
pub type EventSink = mpsc::UnboundedSender<TransportEvent>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl ConnectionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Connecting,
            1 => Self::Open,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Open => write!(f, "open"),
            Self::Closing => write!(f, "closing"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Lock-free connection state shared between a handle and its I/O task.
#[derive(Debug)]
pub(crate) struct SharedState(AtomicU8);

impl SharedState {
    pub(crate) fn new(state: ConnectionState) -> Arc<Self> {
        Arc::new(Self(AtomicU8::new(state as u8)))
    }

    pub(crate) fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, state: ConnectionState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Move to `to` only from `from`. Returns whether the transition happened.
    pub(crate) fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// One open (or opening) connection.
#[async_trait::async_trait]
pub trait Connection: Send + Sync {
    /// Queue one binary message. Never blocks; returns `false` when the payload
    /// was dropped because the connection is not open or its queue is full.
    fn send(&self, payload: Vec<u8>) -> bool;

    fn state(&self) -> ConnectionState;

    /// Graceful shutdown. Safe to call repeatedly and before the handshake
    /// finished.
    async fn close(&self);
}

/// Opens connections. Never closes a previous one on its own.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Start connecting to `endpoint`. Returns without waiting for the
    /// handshake; progress and failures arrive on `events`. `sample_rate` is
    /// the rate of every PCM payload sent on this connection.
    async fn open(
        &self,
        endpoint: &Endpoint,
        sample_rate: u32,
        events: EventSink,
    ) -> Result<Arc<dyn Connection>, TransportError>;

    /// Get transport name for logging
    fn name(&self) -> &str;
}
