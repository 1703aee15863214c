pub mod backend;
pub mod file;
pub mod microphone;
pub mod pcm;
pub mod resample;

pub use backend::{
    AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFrame, AudioSource, CaptureSource,
};
pub use file::{AudioFile, FileBackend};
pub use microphone::{list_devices, MicrophoneBackend};
pub use pcm::{encode, EncodedChunk};
pub use resample::resample;
