use super::config::{SampleRate, SessionConfig};
use super::state::SessionState;
use super::stats::{Counters, SessionStats};
use crate::audio::{self, AudioBackend, AudioBackendConfig, AudioFrame, CaptureSource};
use crate::error::{CaptureError, ConfigError, SessionError};
use crate::transport::{Connection, Transport, TransportEvent};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

/// Upper bound on waiting for the frame pump to drain during teardown.
const PUMP_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// A push-to-talk streaming session.
///
/// Owns at most one capture backend and one connection at a time. All state
/// transitions go through one mutex, which is never held across an `.await`.
/// `start()` re-checks its episode after every suspension point, so a `stop()`
/// that lands while the device or the connection is still being acquired wins.
/// The session then stays `Closing` until the cancelled start has released
/// whatever it acquired late, so the next episode never overlaps the last.
pub struct StreamingSession {
    /// Session configuration. `sample_rate` is the initial target rate; see
    /// [`StreamingSession::sample_rate`] for the current one.
    config: SessionConfig,

    /// Creates a capture backend for each episode
    capture: Arc<dyn CaptureSource>,

    /// Opens the outbound connection for each episode
    transport: Arc<dyn Transport>,

    /// State plus the resources owned by the current episode
    inner: Mutex<Inner>,

    /// Counters shared with the frame pump and transport event task
    counters: Arc<Counters>,
}

struct Inner {
    state: SessionState,
    /// Publishes every state change to waiters
    watch: watch::Sender<SessionState>,
    /// Bumped on every successful start claim
    episode: u64,
    started_at: Option<DateTime<Utc>>,
    /// Target rate for the next episode; fixed while one runs
    sample_rate: SampleRate,
    /// Cleared as soon as a stop begins; the pump discards frames while unset
    live: Arc<AtomicBool>,
    /// The current episode's `start()` has not installed its resources yet
    acquiring: bool,
    /// A teardown is releasing resources outside the lock
    releasing: bool,
    backend: Option<Box<dyn AudioBackend>>,
    connection: Option<Arc<dyn Connection>>,
    pump: Option<JoinHandle<()>>,
}

impl Inner {
    fn is_current(&self, episode: u64) -> bool {
        self.state == SessionState::Recording && self.episode == episode
    }

    fn set_state(&mut self, state: SessionState) {
        self.state = state;
        self.watch.send_replace(state);
    }

    /// Detach the episode's resources and enter `Closing`.
    fn begin_teardown(&mut self) -> Teardown {
        self.set_state(SessionState::Closing);
        self.live.store(false, Ordering::SeqCst);
        self.releasing = true;
        Teardown {
            backend: self.backend.take(),
            pump: self.pump.take(),
            connection: self.connection.take(),
        }
    }

    /// Back to idle once neither a teardown nor a cancelled start still holds
    /// anything.
    fn settle(&mut self) -> bool {
        if self.state == SessionState::Closing && !self.releasing && !self.acquiring {
            self.set_state(SessionState::Idle);
            self.started_at = None;
            true
        } else {
            false
        }
    }
}

/// Resources detached from the session for release outside the lock
#[derive(Default)]
struct Teardown {
    backend: Option<Box<dyn AudioBackend>>,
    pump: Option<JoinHandle<()>>,
    connection: Option<Arc<dyn Connection>>,
}

impl StreamingSession {
    /// Create a new session. The configuration is validated here, before any
    /// `start()` is reachable.
    pub fn new(
        config: SessionConfig,
        capture: Arc<dyn CaptureSource>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        info!(
            "Creating session {} ({} capture, {} transport, {})",
            config.session_id,
            capture.name(),
            transport.name(),
            config.sample_rate
        );

        let (watch, _) = watch::channel(SessionState::Idle);

        Ok(Self {
            inner: Mutex::new(Inner {
                state: SessionState::Idle,
                watch,
                episode: 0,
                started_at: None,
                sample_rate: config.sample_rate,
                live: Arc::new(AtomicBool::new(false)),
                acquiring: false,
                releasing: false,
                backend: None,
                connection: None,
                pump: None,
            }),
            config,
            capture,
            transport,
            counters: Arc::new(Counters::default()),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    /// UI-facing status label (`idle`, `listening`, `stopping`)
    pub fn status(&self) -> &'static str {
        self.state().label()
    }

    pub fn is_recording(&self) -> bool {
        self.state() == SessionState::Recording
    }

    /// Observe state changes, starting from the current state.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.lock().watch.subscribe()
    }

    /// Resolve once the session is idle.
    pub async fn wait_idle(&self) {
        let mut states = self.subscribe();
        // The sender lives as long as the session, so this only returns once idle.
        let _ = states.wait_for(|s| *s == SessionState::Idle).await;
    }

    /// Target rate the next episode records at
    pub fn sample_rate(&self) -> SampleRate {
        self.lock().sample_rate
    }

    /// Choose the target rate for the next episode. Only accepted while idle,
    /// so a running episode never changes rate.
    pub fn set_sample_rate(&self, rate: SampleRate) -> Result<(), SessionError> {
        let mut inner = self.lock();
        if inner.state != SessionState::Idle {
            return Err(SessionError::Busy(inner.state));
        }
        if inner.sample_rate != rate {
            info!(session = %self.config.session_id, "Target rate: {} -> {}", inner.sample_rate, rate);
            inner.sample_rate = rate;
        }
        Ok(())
    }

    /// Get current session statistics
    pub fn stats(&self) -> SessionStats {
        let (state, sample_rate, started_at) = {
            let inner = self.lock();
            (inner.state, inner.sample_rate, inner.started_at)
        };
        self.counters
            .snapshot(&self.config.session_id, state, sample_rate.hz(), started_at)
    }

    /// Start streaming
    ///
    /// No-op unless idle. Opens the transport, then the capture device. A
    /// capture failure closes the connection again and returns the session to
    /// idle.
    pub async fn start(&self) -> Result<(), SessionError> {
        let (episode, live, rate) = {
            let mut inner = self.lock();
            if inner.state != SessionState::Idle {
                debug!(state = ?inner.state, "Start ignored, session not idle");
                return Ok(());
            }
            inner.set_state(SessionState::Recording);
            inner.episode += 1;
            inner.started_at = Some(Utc::now());
            inner.live = Arc::new(AtomicBool::new(false));
            inner.acquiring = true;
            (inner.episode, Arc::clone(&inner.live), inner.sample_rate)
        };
        Counters::bump(&self.counters.episodes, 1);

        info!(
            session = %self.config.session_id,
            episode,
            "Starting {} stream to {}",
            rate,
            self.config.endpoint
        );

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let connection = match self
            .transport
            .open(&self.config.endpoint, rate.hz(), event_tx)
            .await
        {
            Ok(connection) => connection,
            Err(e) => {
                error!("Failed to open transport: {}", e);
                self.abandon(episode).await;
                return Err(e.into());
            }
        };
        self.spawn_event_logger(event_rx);

        let connected = {
            let mut inner = self.lock();
            if inner.is_current(episode) {
                inner.connection = Some(Arc::clone(&connection));
                true
            } else {
                false
            }
        };
        if !connected {
            info!(episode, "Start cancelled while connecting");
            connection.close().await;
            self.finish_cancelled();
            return Ok(());
        }

        let (mut backend, frames) = match self.acquire_capture(rate).await {
            Ok(acquired) => acquired,
            Err(e) => {
                warn!(episode, "Capture acquisition failed: {}", e);
                self.abandon(episode).await;
                return Err(e.into());
            }
        };

        let installed = {
            let mut inner = self.lock();
            if inner.is_current(episode) {
                live.store(true, Ordering::SeqCst);
                let pump = tokio::spawn(pump_frames(
                    frames,
                    connection,
                    Arc::clone(&live),
                    Arc::clone(&self.counters),
                    rate.hz(),
                ));
                inner.backend = Some(backend);
                inner.pump = Some(pump);
                inner.acquiring = false;
                None
            } else {
                Some(backend)
            }
        };

        match installed {
            None => {
                info!(session = %self.config.session_id, episode, "Recording");
                Ok(())
            }
            Some(mut backend) => {
                info!(episode, "Start cancelled during device acquisition");
                if let Err(e) = backend.stop().await {
                    warn!("Failed to release cancelled capture: {:#}", e);
                }
                self.finish_cancelled();
                Ok(())
            }
        }
    }

    /// Stop streaming
    ///
    /// No-op when idle or already stopping. Releases the capture device,
    /// drains the frame pump, then closes the connection, so every frame that
    /// was sent precedes the close. If the episode's `start()` is still
    /// acquiring, the session stays `Closing` until that start has released
    /// what it got.
    pub async fn stop(&self) -> SessionStats {
        let teardown = {
            let mut inner = self.lock();
            if inner.state != SessionState::Recording {
                debug!(state = ?inner.state, "Stop ignored, session not recording");
                None
            } else {
                Some(inner.begin_teardown())
            }
        };

        if let Some(teardown) = teardown {
            info!(session = %self.config.session_id, "Stopping stream");
            release(teardown).await;
            if self.finish_teardown() {
                info!(session = %self.config.session_id, "Stream stopped");
            } else {
                debug!(session = %self.config.session_id, "Stream stopped, waiting for cancelled start");
            }
        }

        self.stats()
    }

    /// Release everything before the host goes away.
    pub async fn shutdown(&self) {
        self.stop().await;
        self.wait_idle().await;
    }

    /// Roll back a start that failed part-way.
    async fn abandon(&self, episode: u64) {
        let teardown = {
            let mut inner = self.lock();
            if inner.is_current(episode) {
                inner.acquiring = false;
                Some(inner.begin_teardown())
            } else {
                // A concurrent stop already tore down what was installed.
                None
            }
        };

        match teardown {
            Some(teardown) => {
                release(teardown).await;
                self.finish_teardown();
            }
            None => self.finish_cancelled(),
        }
    }

    async fn acquire_capture(
        &self,
        rate: SampleRate,
    ) -> Result<(Box<dyn AudioBackend>, mpsc::Receiver<AudioFrame>), CaptureError> {
        let backend_config = AudioBackendConfig {
            requested_sample_rate: rate.hz(),
            channels: self.config.channels,
            buffer_duration_ms: self.config.buffer_duration_ms,
            ..AudioBackendConfig::default()
        };

        let mut backend = self.capture.create(backend_config)?;
        let frames = backend.start().await?;
        debug!("Capture acquired from {}", backend.name());
        Ok((backend, frames))
    }

    /// A teardown released its resources. Returns whether the session is idle.
    fn finish_teardown(&self) -> bool {
        let mut inner = self.lock();
        inner.releasing = false;
        inner.settle()
    }

    /// A cancelled start released what it acquired after the stop.
    fn finish_cancelled(&self) {
        let mut inner = self.lock();
        inner.acquiring = false;
        if inner.settle() {
            info!(session = %self.config.session_id, "Stream stopped");
        }
    }

    fn spawn_event_logger(&self, mut events: mpsc::UnboundedReceiver<TransportEvent>) {
        let counters = Arc::clone(&self.counters);
        let session_id = self.config.session_id.clone();

        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    TransportEvent::Opened => info!(session = %session_id, "Transport open"),
                    TransportEvent::Error(detail) => {
                        warn!(session = %session_id, "Transport error: {}", detail);
                        Counters::bump(&counters.connection_errors, 1);
                    }
                    TransportEvent::Closed => info!(session = %session_id, "Transport closed"),
                }
            }
        });
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for StreamingSession {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        inner.live.store(false, Ordering::SeqCst);
        if let Some(pump) = inner.pump.take() {
            pump.abort();
        }
        if inner.backend.is_some() || inner.connection.is_some() {
            warn!(
                session = %self.config.session_id,
                "Session dropped while {}, releasing resources",
                inner.state
            );
        }
        // Backends and connections release their device/socket on drop.
        inner.backend = None;
        inner.connection = None;
    }
}

async fn release(teardown: Teardown) {
    if let Some(mut backend) = teardown.backend {
        if let Err(e) = backend.stop().await {
            warn!("Failed to stop audio backend: {:#}", e);
        }
    }

    if let Some(mut pump) = teardown.pump {
        if tokio::time::timeout(PUMP_DRAIN_TIMEOUT, &mut pump).await.is_err() {
            warn!("Frame pump did not drain in time, aborting");
            pump.abort();
        }
    }

    if let Some(connection) = teardown.connection {
        connection.close().await;
    }
}

/// Resample one captured frame to `target_rate` and encode it for the wire.
pub fn process_frame(frame: &AudioFrame, target_rate: u32) -> Vec<u8> {
    let resampled = audio::resample(&frame.samples, frame.sample_rate, target_rate);
    audio::encode(&resampled).into_bytes()
}

/// Per-episode frame pump: capture order in, one message per frame out.
///
/// The body never awaits anything but the next frame, so a slow network can
/// only cost dropped frames, never back-pressure on the device callback.
async fn pump_frames(
    mut frames: mpsc::Receiver<AudioFrame>,
    connection: Arc<dyn Connection>,
    live: Arc<AtomicBool>,
    counters: Arc<Counters>,
    target_rate: u32,
) {
    while let Some(frame) = frames.recv().await {
        if !live.load(Ordering::SeqCst) {
            Counters::bump(&counters.frames_discarded, 1);
            continue;
        }

        let payload = process_frame(&frame, target_rate);
        if payload.is_empty() {
            continue;
        }

        let bytes = payload.len() as u64;
        if connection.send(payload) {
            Counters::bump(&counters.frames_sent, 1);
            Counters::bump(&counters.bytes_sent, bytes);
        } else {
            trace!(bytes, "Frame dropped by transport");
            Counters::bump(&counters.frames_dropped, 1);
        }
    }

    if live.load(Ordering::SeqCst) {
        warn!("Capture ended while still recording; waiting for stop");
    } else {
        debug!("Frame pump finished");
    }
}
