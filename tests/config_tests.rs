// Integration tests for layered configuration loading and validation

use anyhow::Result;
use intercom_stream::audio::AudioSource;
use intercom_stream::config::{Config, TransportKind};
use intercom_stream::error::ConfigError;
use intercom_stream::session::InteractionMode;
use intercom_stream::transport::Scheme;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

fn write_config(dir: &TempDir, body: &str) -> Result<String> {
    let path = dir.path().join("intercom.toml");
    std::fs::write(&path, body)?;
    Ok(path.display().to_string())
}

#[test]
fn test_missing_file_falls_back_to_defaults() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("absent");

    let cfg = Config::load(&path.display().to_string())?;

    assert_eq!(cfg.audio.sample_rate, 16000);
    assert_eq!(cfg.transport.kind, TransportKind::Stream);
    assert_eq!(cfg.control.mode, InteractionMode::Momentary);
    assert_eq!(cfg.release_delay(), Duration::from_millis(300));

    let session = cfg.session_config()?;
    assert_eq!(session.endpoint.url(), "wss://192.168.2.1/");
    assert_eq!(session.endpoint.subprotocol.as_deref(), Some("audio-protocol"));
    assert_eq!(session.channels, 1);

    Ok(())
}

#[test]
fn test_file_overrides_defaults() -> Result<()> {
    let dir = TempDir::new()?;
    let path = write_config(
        &dir,
        r#"
[audio]
sample_rate = 48000
buffer_duration_ms = 20

[transport]
secure = false
address = "10.0.0.5:8089"
path = "/audio"

[control]
mode = "toggle"
release_delay_ms = 150
"#,
    )?;

    let cfg = Config::load(&path)?;
    let session = cfg.session_config()?;

    assert_eq!(session.sample_rate.hz(), 48000);
    assert_eq!(session.buffer_duration_ms, 20);
    assert_eq!(session.mode, InteractionMode::Toggle);
    assert_eq!(session.endpoint.url(), "ws://10.0.0.5:8089/audio");
    assert_eq!(cfg.release_delay(), Duration::from_millis(150));
    // Untouched sections keep their defaults
    assert_eq!(cfg.service.http.port, 8090);

    Ok(())
}

#[test]
fn test_upload_kind_uses_http_schemes() -> Result<()> {
    let dir = TempDir::new()?;
    let path = write_config(
        &dir,
        r#"
[transport]
kind = "upload"
address = "stt.local"
path = "/transcribe"
"#,
    )?;

    let cfg = Config::load(&path)?;
    assert_eq!(cfg.scheme(), Scheme::Https);
    assert_eq!(cfg.session_config()?.endpoint.url(), "https://stt.local/transcribe");

    Ok(())
}

#[test]
fn test_unsupported_sample_rate_rejected() -> Result<()> {
    let dir = TempDir::new()?;
    let path = write_config(&dir, "[audio]\nsample_rate = 22050\n")?;

    let cfg = Config::load(&path)?;
    assert!(matches!(
        cfg.session_config(),
        Err(ConfigError::UnsupportedSampleRate(22050))
    ));

    Ok(())
}

#[test]
fn test_invalid_address_rejected() {
    let mut cfg = Config::default();

    cfg.transport.address = "wss://192.168.2.1".to_string();
    assert!(matches!(cfg.session_config(), Err(ConfigError::InvalidAddress(_))));

    cfg.transport.address = String::new();
    assert!(matches!(cfg.session_config(), Err(ConfigError::InvalidAddress(_))));

    cfg.transport.address = "192.168.2.1".to_string();
    cfg.transport.path = "audio".to_string();
    assert!(matches!(cfg.session_config(), Err(ConfigError::InvalidPath(_))));
}

#[test]
fn test_audio_source_selection() {
    let mut cfg = Config::default();
    assert_eq!(
        cfg.audio_source().unwrap(),
        AudioSource::Microphone { device: None }
    );

    cfg.audio.device = Some("USB Mic".to_string());
    assert_eq!(
        cfg.audio_source().unwrap(),
        AudioSource::Microphone {
            device: Some("USB Mic".to_string())
        }
    );

    cfg.audio.source = "file".to_string();
    assert!(matches!(cfg.audio_source(), Err(ConfigError::InvalidSource(_))));

    cfg.audio.file = Some("fixtures/hello.wav".to_string());
    assert_eq!(
        cfg.audio_source().unwrap(),
        AudioSource::File(PathBuf::from("fixtures/hello.wav"))
    );

    cfg.audio.source = "line-in".to_string();
    assert!(matches!(cfg.audio_source(), Err(ConfigError::InvalidSource(_))));
}

#[test]
fn test_malformed_file_is_a_load_error() -> Result<()> {
    let dir = TempDir::new()?;
    let path = write_config(&dir, "[audio]\nsample_rate = \"fast\"\n")?;

    assert!(Config::load(&path).is_err());
    Ok(())
}
