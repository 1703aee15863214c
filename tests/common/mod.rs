// Scriptable capture and transport doubles shared by the session and
// controller tests.

#![allow(dead_code)]

use anyhow::Result;
use intercom_stream::audio::{AudioBackend, AudioBackendConfig, AudioFrame, CaptureSource};
use intercom_stream::error::{CaptureError, TransportError};
use intercom_stream::session::{SampleRate, SessionConfig, StreamingSession};
use intercom_stream::transport::{
    Connection, ConnectionState, Endpoint, EventSink, Scheme, Transport, TransportEvent,
};
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};

pub fn session_config(rate: u32) -> SessionConfig {
    let endpoint = Endpoint::new(Scheme::Ws, "127.0.0.1:9", "/", None).unwrap();
    SessionConfig::new(SampleRate::try_from(rate).unwrap(), endpoint)
}

pub fn session(rate: u32, capture: &Arc<MockCapture>, transport: &Arc<MockTransport>) -> Arc<StreamingSession> {
    Arc::new(
        StreamingSession::new(
            session_config(rate),
            Arc::clone(capture) as Arc<dyn CaptureSource>,
            Arc::clone(transport) as Arc<dyn Transport>,
        )
        .unwrap(),
    )
}

/// Poll `condition` until it holds or two seconds pass.
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

// ============================================================================
// Capture
// ============================================================================

#[derive(Default)]
pub struct CaptureProbe {
    pub creates: AtomicUsize,
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
    /// When set, `start` waits for one notification before acquiring
    pub gate: Mutex<Option<Arc<Notify>>>,
    /// When set, the next `start` fails with permission denied
    pub deny: AtomicBool,
    /// When set, `stop` delivers one more frame before releasing the device
    pub late_frame_on_stop: AtomicBool,
    /// Feed for the most recent backend
    pub frames: Mutex<Option<mpsc::Sender<AudioFrame>>>,
}

impl CaptureProbe {
    pub fn gated(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    pub fn push(&self, frame: AudioFrame) -> bool {
        match self.frames.lock().unwrap().as_ref() {
            Some(tx) => tx.try_send(frame).is_ok(),
            None => false,
        }
    }
}

#[derive(Default)]
pub struct MockCapture {
    probe: Arc<CaptureProbe>,
}

impl MockCapture {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl Deref for MockCapture {
    type Target = CaptureProbe;

    fn deref(&self) -> &CaptureProbe {
        &self.probe
    }
}

impl CaptureSource for MockCapture {
    fn create(&self, _config: AudioBackendConfig) -> Result<Box<dyn AudioBackend>, CaptureError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockBackend {
            capture: Arc::clone(&self.probe),
            capturing: false,
        }))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

struct MockBackend {
    capture: Arc<CaptureProbe>,
    capturing: bool,
}

#[async_trait::async_trait]
impl AudioBackend for MockBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>, CaptureError> {
        self.capture.starts.fetch_add(1, Ordering::SeqCst);
        let gate = self.capture.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.capture.deny.swap(false, Ordering::SeqCst) {
            return Err(CaptureError::PermissionDenied("denied by test".to_string()));
        }

        let (tx, rx) = mpsc::channel(64);
        *self.capture.frames.lock().unwrap() = Some(tx);
        self.capturing = true;
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        if !self.capturing {
            return Ok(());
        }
        self.capturing = false;
        self.capture.stops.fetch_add(1, Ordering::SeqCst);

        let tx = self.capture.frames.lock().unwrap().take();
        if let Some(tx) = tx {
            if self.capture.late_frame_on_stop.load(Ordering::SeqCst) {
                let _ = tx.try_send(AudioFrame::mono(vec![0.25; 160], 16000, 0));
            }
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing
    }

    fn name(&self) -> &str {
        "mock"
    }
}

// ============================================================================
// Transport
// ============================================================================

#[derive(Default)]
pub struct MockTransport {
    pub opens: AtomicUsize,
    /// How long each connection's `close` takes
    pub close_delay: Mutex<Duration>,
    /// Rate handed to each `open`
    pub rates: Mutex<Vec<u32>>,
    /// When set, `open` waits for one notification before returning
    pub gate: Mutex<Option<Arc<Notify>>>,
    pub connections: Mutex<Vec<Arc<MockConnection>>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn gated(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    pub fn last(&self) -> Option<Arc<MockConnection>> {
        self.connections.lock().unwrap().last().cloned()
    }

    /// Connections opened and not yet closed
    pub fn unclosed(&self) -> usize {
        self.connections
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.closes.load(Ordering::SeqCst) == 0)
            .count()
    }

    pub fn closes(&self) -> usize {
        self.connections
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.closes.load(Ordering::SeqCst))
            .sum()
    }
}

#[async_trait::async_trait]
impl Transport for MockTransport {
    async fn open(
        &self,
        _endpoint: &Endpoint,
        sample_rate: u32,
        events: EventSink,
    ) -> Result<Arc<dyn Connection>, TransportError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.rates.lock().unwrap().push(sample_rate);
        let connection = Arc::new(MockConnection {
            close_delay: *self.close_delay.lock().unwrap(),
            events: Mutex::new(Some(events.clone())),
            ..MockConnection::default()
        });
        self.connections.lock().unwrap().push(Arc::clone(&connection));

        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let _ = events.send(TransportEvent::Opened);
        Ok(connection)
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Records everything it is asked to do, in order.
#[derive(Default)]
pub struct MockConnection {
    pub closes: AtomicUsize,
    pub log: Mutex<Vec<Op>>,
    /// When set, `send` reports every payload as dropped
    pub refuse: AtomicBool,
    pub close_delay: Duration,
    /// The session's event sink, for injecting transport events
    pub events: Mutex<Option<EventSink>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Send(Vec<u8>),
    Close,
}

impl MockConnection {
    pub fn emit(&self, event: TransportEvent) {
        if let Some(events) = self.events.lock().unwrap().as_ref() {
            let _ = events.send(event);
        }
    }

    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter_map(|op| match op {
                Op::Send(payload) => Some(payload.clone()),
                Op::Close => None,
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl Connection for MockConnection {
    fn send(&self, payload: Vec<u8>) -> bool {
        if self.closes.load(Ordering::SeqCst) > 0 || self.refuse.load(Ordering::SeqCst) {
            return false;
        }
        self.log.lock().unwrap().push(Op::Send(payload));
        true
    }

    fn state(&self) -> ConnectionState {
        if self.closes.load(Ordering::SeqCst) > 0 {
            ConnectionState::Closed
        } else {
            ConnectionState::Open
        }
    }

    async fn close(&self) {
        if self.closes.fetch_add(1, Ordering::SeqCst) == 0 {
            self.log.lock().unwrap().push(Op::Close);
            tokio::time::sleep(self.close_delay).await;
        }
    }
}
