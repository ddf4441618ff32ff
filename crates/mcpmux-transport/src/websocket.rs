//! Full-duplex WebSocket transport (§4.1 WebSocket).
//!
//! Reader and writer run as independent tasks. The writer also emits
//! protocol-level ping frames on a 54-second cadence; the read deadline is
//! 60 seconds, refreshed on every frame (including pongs). Inbound envelopes
//! are validated before entering the bounded read queue; invalid frames push
//! an error onto a bounded error channel instead of blocking the reader. A
//! `send` that cannot enqueue within 5 seconds fails with
//! [`TransportError::SendTimeout`].

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use mcpmux_protocol::JsonRpcMessage;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::{now_unix, BoxFuture, Transport, TransportError, TransportKind};

/// Keep-alive ping cadence.
pub const PING_INTERVAL: Duration = Duration::from_secs(54);
/// Read deadline, refreshed on every received frame (data or pong).
pub const READ_DEADLINE: Duration = Duration::from_secs(60);
/// Maximum time a `send` waits for a free queue slot before failing.
pub const SEND_TIMEOUT: Duration = Duration::from_secs(5);

const IN_QUEUE_CAPACITY: usize = 100;
const OUT_QUEUE_CAPACITY: usize = 100;
const ERROR_QUEUE_CAPACITY: usize = 10;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A frame the reader task failed to interpret as a JSON-RPC envelope.
#[derive(Debug)]
pub struct InboundError {
    /// Description of what went wrong decoding the frame.
    pub message: String,
}

/// Full-duplex WebSocket transport.
pub struct WebSocketTransport {
    connected: AtomicBool,
    last_activity: AtomicI64,
    inbound: Mutex<mpsc::Receiver<JsonRpcMessage>>,
    outbound: mpsc::Sender<WsMessage>,
    errors: Mutex<mpsc::Receiver<InboundError>>,
    _reader: tokio::task::JoinHandle<()>,
    _writer: tokio::task::JoinHandle<()>,
}

impl WebSocketTransport {
    /// Connects to `url` and spawns the reader/writer/keep-alive tasks.
    pub async fn connect(url: &str) -> Result<Self, TransportError> {
        let (stream, _response) = connect_async(url)
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;
        Ok(Self::from_stream(stream))
    }

    fn from_stream(stream: WsStream) -> Self {
        let (sink, source) = stream.split();
        let (in_tx, in_rx) = mpsc::channel(IN_QUEUE_CAPACITY);
        let (out_tx, out_rx) = mpsc::channel::<WsMessage>(OUT_QUEUE_CAPACITY);
        let (err_tx, err_rx) = mpsc::channel(ERROR_QUEUE_CAPACITY);

        // The loops signal closure by dropping their ends of the in/out
        // channels; `send`/`recv` observe that as a channel error and flip
        // this transport's `connected` flag from the caller's side.
        let reader = tokio::spawn(read_loop(source, in_tx, err_tx));
        let writer = tokio::spawn(write_loop(sink, out_rx));

        Self {
            connected: AtomicBool::new(true),
            last_activity: AtomicI64::new(now_unix()),
            inbound: Mutex::new(in_rx),
            outbound: out_tx,
            errors: Mutex::new(err_rx),
            _reader: reader,
            _writer: writer,
        }
    }

    /// Drains the bounded error channel of frames the reader could not parse.
    /// Non-blocking: returns `None` if no error is currently queued.
    pub async fn try_recv_error(&self) -> Option<InboundError> {
        self.errors.lock().await.try_recv().ok()
    }
}

async fn read_loop(
    mut source: futures_util::stream::SplitStream<WsStream>,
    in_tx: mpsc::Sender<JsonRpcMessage>,
    err_tx: mpsc::Sender<InboundError>,
) {
    loop {
        let next = tokio::time::timeout(READ_DEADLINE, source.next()).await;
        let frame = match next {
            Ok(Some(Ok(frame))) => frame,
            Ok(Some(Err(_)) | None) | Err(_) => {
                return;
            }
        };
        match frame {
            WsMessage::Text(text) => match serde_json::from_str::<JsonRpcMessage>(&text) {
                Ok(message) => {
                    if in_tx.send(message).await.is_err() {
                        return;
                    }
                }
                Err(e) => {
                    let _ = err_tx.try_send(InboundError {
                        message: e.to_string(),
                    });
                }
            },
            WsMessage::Pong(_) | WsMessage::Ping(_) => {}
            WsMessage::Close(_) => {
                return;
            }
            WsMessage::Binary(_) | WsMessage::Frame(_) => {
                let _ = err_tx.try_send(InboundError {
                    message: "unexpected binary frame".to_owned(),
                });
            }
        }
    }
}

async fn write_loop(
    mut sink: futures_util::stream::SplitSink<WsStream, WsMessage>,
    mut out_rx: mpsc::Receiver<WsMessage>,
) {
    let mut ping_timer = tokio::time::interval(PING_INTERVAL);
    ping_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            maybe_msg = out_rx.recv() => {
                match maybe_msg {
                    Some(msg) => {
                        if sink.send(msg).await.is_err() {
                            return;
                        }
                    }
                    None => return,
                }
            }
            _ = ping_timer.tick() => {
                if sink.send(WsMessage::Ping(Vec::new().into())).await.is_err() {
                    return;
                }
            }
        }
    }
}

impl Transport for WebSocketTransport {
    fn send<'a>(
        &'a self,
        message: &'a JsonRpcMessage,
    ) -> BoxFuture<'a, Result<(), TransportError>> {
        Box::pin(async move {
            let text = serde_json::to_string(message).map_err(|e| {
                TransportError::Codec(crate::codec::CodecError::Json(e))
            })?;
            match tokio::time::timeout(
                SEND_TIMEOUT,
                self.outbound.send(WsMessage::Text(text.into())),
            )
            .await
            {
                Ok(Ok(())) => {
                    self.last_activity.store(now_unix(), Ordering::Relaxed);
                    Ok(())
                }
                Ok(Err(_)) => {
                    self.connected.store(false, Ordering::Relaxed);
                    Err(TransportError::Closed)
                }
                Err(_) => Err(TransportError::SendTimeout),
            }
        })
    }

    fn recv(&self) -> BoxFuture<'_, Result<JsonRpcMessage, TransportError>> {
        Box::pin(async move {
            let mut rx = self.inbound.lock().await;
            match rx.recv().await {
                Some(message) => {
                    self.last_activity.store(now_unix(), Ordering::Relaxed);
                    Ok(message)
                }
                None => {
                    self.connected.store(false, Ordering::Relaxed);
                    Err(TransportError::Closed)
                }
            }
        })
    }

    fn close(&self) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move {
            self.connected.store(false, Ordering::Relaxed);
            let _ = self.outbound.send(WsMessage::Close(None)).await;
            Ok(())
        })
    }

    fn kind(&self) -> TransportKind {
        TransportKind::WebSocket
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    fn last_activity(&self) -> i64 {
        self.last_activity.load(Ordering::Relaxed)
    }

    fn supports_progress(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timing_constants_match_the_spec() {
        assert_eq!(PING_INTERVAL, Duration::from_secs(54));
        assert_eq!(READ_DEADLINE, Duration::from_secs(60));
        assert_eq!(SEND_TIMEOUT, Duration::from_secs(5));
    }

    #[test]
    fn queue_capacities_match_the_spec() {
        assert_eq!(IN_QUEUE_CAPACITY, 100);
        assert_eq!(OUT_QUEUE_CAPACITY, 100);
        assert_eq!(ERROR_QUEUE_CAPACITY, 10);
    }
}
