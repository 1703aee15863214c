//! HTTP control API for a host UI
//!
//! This module exposes one session over REST:
//! - POST /ptt/press, /ptt/release - momentary gestures
//! - POST /ptt/activate - toggle gesture
//! - PUT /ptt/mode - switch interaction mode
//! - POST /session/start, /session/stop - direct control
//! - PUT /session/sample_rate - target rate for the next recording
//! - GET /session/status - status label and counters
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
