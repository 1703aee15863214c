// Streaming transport: one binary WebSocket message per encoded chunk

use futures::stream::{SplitStream, StreamExt};
use futures::SinkExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, SEC_WEBSOCKET_PROTOCOL};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace, warn};

use super::{Connection, ConnectionState, Endpoint, EventSink, SharedState, Transport, TransportEvent};
use crate::error::TransportError;

/// How long to wait for the peer's close frame after sending ours.
const CLOSE_HANDSHAKE_GRACE: Duration = Duration::from_millis(500);

/// WebSocket client transport
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    connect_timeout: Duration,
    close_timeout: Duration,
    queue_capacity: usize,
}

impl WebSocketTransport {
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            ..Self::default()
        }
    }

    /// Bound on frames waiting for the socket; overflow is dropped.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            close_timeout: Duration::from_secs(2),
            queue_capacity: 256,
        }
    }
}

#[async_trait::async_trait]
impl Transport for WebSocketTransport {
    async fn open(
        &self,
        endpoint: &Endpoint,
        _sample_rate: u32,
        events: EventSink,
    ) -> Result<Arc<dyn Connection>, TransportError> {
        let url = endpoint.url();
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::InvalidEndpoint {
                url: url.clone(),
                reason: e.to_string(),
            })?;

        if let Some(protocol) = &endpoint.subprotocol {
            let value = HeaderValue::from_str(protocol).map_err(|e| TransportError::InvalidEndpoint {
                url: url.clone(),
                reason: format!("bad sub-protocol {protocol:?}: {e}"),
            })?;
            request.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, value);
        }

        info!("Connecting to {}", endpoint);

        let state = SharedState::new(ConnectionState::Connecting);
        let (outbound_tx, outbound_rx) = mpsc::channel(self.queue_capacity);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(run_connection(
            request,
            url.clone(),
            Arc::clone(&state),
            outbound_rx,
            shutdown_rx,
            events,
            self.connect_timeout,
        ));

        Ok(Arc::new(WebSocketConnection {
            url,
            state,
            outbound: outbound_tx,
            shutdown: shutdown_tx,
            task: Mutex::new(Some(task)),
            close_timeout: self.close_timeout,
        }))
    }

    fn name(&self) -> &str {
        "websocket"
    }
}

struct WebSocketConnection {
    url: String,
    state: Arc<SharedState>,
    outbound: mpsc::Sender<Vec<u8>>,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
    close_timeout: Duration,
}

#[async_trait::async_trait]
impl Connection for WebSocketConnection {
    fn send(&self, payload: Vec<u8>) -> bool {
        if self.state.get() != ConnectionState::Open {
            trace!(bytes = payload.len(), state = %self.state.get(), "Dropping frame, socket not open");
            return false;
        }
        match self.outbound.try_send(payload) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(payload)) => {
                trace!(bytes = payload.len(), "Dropping frame, outbound queue full");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    fn state(&self) -> ConnectionState {
        self.state.get()
    }

    async fn close(&self) {
        let Some(mut task) = self.task.lock().await.take() else {
            return;
        };

        if !self
            .state
            .transition(ConnectionState::Open, ConnectionState::Closing)
        {
            self.state
                .transition(ConnectionState::Connecting, ConnectionState::Closing);
        }
        let _ = self.shutdown.send(true);

        if tokio::time::timeout(self.close_timeout, &mut task).await.is_err() {
            warn!("Connection to {} did not close in time, aborting", self.url);
            task.abort();
            self.state.set(ConnectionState::Closed);
        }
    }
}

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn run_connection(
    request: Request,
    url: String,
    state: Arc<SharedState>,
    mut outbound: mpsc::Receiver<Vec<u8>>,
    mut shutdown: watch::Receiver<bool>,
    events: EventSink,
    connect_timeout: Duration,
) {
    let connect = tokio::time::timeout(connect_timeout, tokio_tungstenite::connect_async(request));

    let socket: Socket = tokio::select! {
        result = connect => match result {
            Ok(Ok((socket, _response))) => socket,
            Ok(Err(e)) => {
                fail(&state, &events, format!("connection to {url} failed: {e}"));
                return;
            }
            Err(_) => {
                fail(&state, &events, format!("connection to {url} timed out after {connect_timeout:?}"));
                return;
            }
        },
        _ = shutdown.changed() => {
            debug!("Connection to {} closed before it opened", url);
            state.set(ConnectionState::Closed);
            let _ = events.send(TransportEvent::Closed);
            return;
        }
    };

    let (mut sink, mut incoming) = socket.split();

    if !state.transition(ConnectionState::Connecting, ConnectionState::Open) {
        // close() raced the handshake
        let _ = sink.close().await;
        state.set(ConnectionState::Closed);
        let _ = events.send(TransportEvent::Closed);
        return;
    }

    info!("WebSocket connection opened: {}", url);
    let _ = events.send(TransportEvent::Opened);

    loop {
        tokio::select! {
            biased;

            frame = outbound.recv() => match frame {
                Some(payload) => {
                    if let Err(e) = sink.send(Message::Binary(payload)).await {
                        state.set(ConnectionState::Closing);
                        let _ = events.send(TransportEvent::Error(format!("send failed: {e}")));
                        break;
                    }
                }
                None => {
                    let _ = sink.close().await;
                    break;
                }
            },

            _ = shutdown.changed() => {
                // Everything queued before close() goes out ahead of the close frame.
                while let Ok(payload) = outbound.try_recv() {
                    if sink.send(Message::Binary(payload)).await.is_err() {
                        break;
                    }
                }
                let _ = sink.close().await;
                await_peer_close(&mut incoming).await;
                break;
            }

            message = incoming.next() => match message {
                Some(Ok(Message::Close(frame))) => {
                    info!("WebSocket closed by peer: {:?}", frame);
                    break;
                }
                Some(Ok(_)) => {
                    // Listener messages are opaque to us.
                }
                Some(Err(e)) => {
                    state.set(ConnectionState::Closing);
                    let _ = events.send(TransportEvent::Error(format!("receive failed: {e}")));
                    break;
                }
                None => break,
            },
        }
    }

    state.set(ConnectionState::Closed);
    info!("WebSocket connection closed: {}", url);
    let _ = events.send(TransportEvent::Closed);
}

async fn await_peer_close(incoming: &mut SplitStream<Socket>) {
    let _ = tokio::time::timeout(CLOSE_HANDSHAKE_GRACE, async {
        while let Some(Ok(message)) = incoming.next().await {
            if message.is_close() {
                break;
            }
        }
    })
    .await;
}

fn fail(state: &SharedState, events: &EventSink, detail: String) {
    warn!("{}", detail);
    state.set(ConnectionState::Closed);
    let _ = events.send(TransportEvent::Error(detail));
    let _ = events.send(TransportEvent::Closed);
}
