use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

use super::state::SessionState;

/// Statistics about a streaming session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    /// Session identifier
    pub session_id: String,

    /// Current state
    pub state: SessionState,

    /// UI-facing status label
    pub status: String,

    /// Target sample rate in Hz for the current (or next) episode
    pub sample_rate: u32,

    /// When the current episode started, if one is active
    pub started_at: Option<DateTime<Utc>>,

    /// Duration of the current episode in seconds
    pub duration_secs: f64,

    /// Number of recording episodes started so far
    pub episodes: u64,

    /// Frames handed to the transport
    pub frames_sent: u64,

    /// Frames the transport dropped (not open, or queue full)
    pub frames_dropped: u64,

    /// Frames discarded because a stop was already in progress
    pub frames_discarded: u64,

    /// PCM bytes handed to the transport
    pub bytes_sent: u64,

    /// Connection errors reported by the transport
    pub connection_errors: u64,
}

/// Counters updated from the frame pump and event tasks
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub(crate) episodes: AtomicU64,
    pub(crate) frames_sent: AtomicU64,
    pub(crate) frames_dropped: AtomicU64,
    pub(crate) frames_discarded: AtomicU64,
    pub(crate) bytes_sent: AtomicU64,
    pub(crate) connection_errors: AtomicU64,
}

impl Counters {
    pub(crate) fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(
        &self,
        session_id: &str,
        state: SessionState,
        sample_rate: u32,
        started_at: Option<DateTime<Utc>>,
    ) -> SessionStats {
        let duration_secs = started_at
            .map(|t| Utc::now().signed_duration_since(t).num_milliseconds() as f64 / 1000.0)
            .unwrap_or(0.0);

        SessionStats {
            session_id: session_id.to_string(),
            state,
            status: state.label().to_string(),
            sample_rate,
            started_at,
            duration_secs,
            episodes: self.episodes.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            frames_discarded: self.frames_discarded.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            connection_errors: self.connection_errors.load(Ordering::Relaxed),
        }
    }
}
