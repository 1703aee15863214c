use serde::{Deserialize, Serialize};
use std::fmt;

/// Session lifecycle: Idle → Recording → Closing → Idle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No capture, no connection
    Idle,
    /// A start claimed the session; capture and connection are open or opening
    Recording,
    /// Teardown in progress
    Closing,
}

impl SessionState {
    /// Status text a host can show next to its record control.
    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Recording => "listening",
            Self::Closing => "stopping",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
