pub mod audio;
pub mod config;
pub mod control;
pub mod error;
pub mod http;
pub mod session;
pub mod transport;

pub use audio::{
    AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFile, AudioFrame, AudioSource,
    CaptureSource,
};
pub use config::Config;
pub use control::InputController;
pub use error::{CaptureError, ConfigError, SessionError, TransportError};
pub use http::{create_router, AppState};
pub use session::{
    InteractionMode, SampleRate, SessionConfig, SessionState, SessionStats, StreamingSession,
};
pub use transport::{Connection, Endpoint, Transport, UploadTransport, WebSocketTransport};
