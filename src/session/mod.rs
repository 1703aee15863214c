//! Streaming session management
//!
//! This module provides the `StreamingSession` state machine that manages:
//! - Capture device lifetime (one backend per recording episode)
//! - Connection lifetime (one transport connection per episode)
//! - The per-frame pipeline: resample → encode → send
//! - Idempotent start/stop, partial-failure rollback, and stop-during-start
//!   cancellation

mod config;
mod session;
mod state;
mod stats;

pub use config::{InteractionMode, SampleRate, SessionConfig, SUPPORTED_SAMPLE_RATES};
pub use session::{process_frame, StreamingSession};
pub use state::SessionState;
pub use stats::SessionStats;
