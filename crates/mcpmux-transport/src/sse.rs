//! Server-sent events transport: a long-lived `GET` event stream paired with
//! a short-lived `POST` endpoint for client→server traffic (§4.1 SSE).
//!
//! Events are parsed line-wise; only `data:` lines are considered and each
//! payload must be a complete envelope. A background task drives the event
//! stream into a bounded channel that [`Transport::recv`] drains; stream
//! failures (non-2xx, a scanner error, EOF) mark the transport unhealthy.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;

use futures_util::StreamExt;
use mcpmux_protocol::JsonRpcMessage;
use reqwest::Client;
use tokio::sync::mpsc;
use tokio::sync::Mutex;

use crate::{now_unix, BoxFuture, Transport, TransportError, TransportKind};

/// Default heartbeat interval, per §6.
pub const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(30);

/// Bounded capacity of the inbound event queue.
const QUEUE_CAPACITY: usize = 100;

/// SSE transport: a `GET` stream for inbound events, a `POST` endpoint for
/// outbound requests.
pub struct SseTransport {
    client: Client,
    post_url: String,
    connected: AtomicBool,
    last_activity: AtomicI64,
    inbound: Mutex<mpsc::Receiver<JsonRpcMessage>>,
    _driver: tokio::task::JoinHandle<()>,
}

impl SseTransport {
    /// Connects the event stream at `stream_url` and prepares to post
    /// client→server traffic to `post_url`.
    pub async fn connect(
        stream_url: impl Into<String>,
        post_url: impl Into<String>,
    ) -> Result<Self, TransportError> {
        let client = Client::builder().build().unwrap_or_default();
        let stream_url = stream_url.into();
        let post_url = post_url.into();

        let response = client
            .get(&stream_url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(TransportError::Http(format!(
                "event stream returned {}",
                response.status()
            )));
        }

        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let driver = tokio::spawn(drive_event_stream(response, tx));

        Ok(Self {
            client,
            post_url,
            connected: AtomicBool::new(true),
            last_activity: AtomicI64::new(now_unix()),
            inbound: Mutex::new(rx),
            _driver: driver,
        })
    }

    fn touch(&self) {
        self.last_activity.store(now_unix(), Ordering::Relaxed);
    }
}

/// Reads the event stream body, extracting `data:` lines and forwarding any
/// that parse as a complete envelope. Exits (dropping `tx`) on stream end or
/// error, which surfaces to the consumer as a channel close.
async fn drive_event_stream(
    response: reqwest::Response,
    tx: mpsc::Sender<JsonRpcMessage>,
) {
    let mut stream = response.bytes_stream();
    let mut buffer = String::new();

    while let Some(chunk) = stream.next().await {
        let Ok(bytes) = chunk else {
            return;
        };
        let Ok(text) = std::str::from_utf8(&bytes) else {
            continue;
        };
        buffer.push_str(text);

        while let Some(pos) = buffer.find('\n') {
            let line: String = buffer.drain(..=pos).collect();
            let line = line.trim_end_matches(['\n', '\r']);
            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            let payload = data.trim_start();
            if payload.is_empty() {
                continue;
            }
            let Ok(message) = serde_json::from_str::<JsonRpcMessage>(payload) else {
                continue;
            };
            if tx.send(message).await.is_err() {
                return;
            }
        }
    }
}

impl Transport for SseTransport {
    fn send<'a>(
        &'a self,
        message: &'a JsonRpcMessage,
    ) -> BoxFuture<'a, Result<(), TransportError>> {
        Box::pin(async move {
            let response = self
                .client
                .post(&self.post_url)
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .json(message)
                .send()
                .await
                .map_err(|e| {
                    self.connected.store(false, Ordering::Relaxed);
                    TransportError::Http(e.to_string())
                })?;
            if !response.status().is_success() {
                self.connected.store(false, Ordering::Relaxed);
                return Err(TransportError::Http(format!(
                    "unexpected status: {}",
                    response.status()
                )));
            }
            self.touch();
            Ok(())
        })
    }

    fn recv(&self) -> BoxFuture<'_, Result<JsonRpcMessage, TransportError>> {
        Box::pin(async move {
            let mut rx = self.inbound.lock().await;
            match rx.recv().await {
                Some(message) => {
                    self.touch();
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
            self._driver.abort();
            Ok(())
        })
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Sse
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
    fn default_heartbeat_is_30_seconds() {
        assert_eq!(DEFAULT_HEARTBEAT, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn event_stream_parser_extracts_data_lines_only() {
        let (tx, mut rx) = mpsc::channel(10);
        let body = b"event: message\ndata: {\"jsonrpc\":\"2.0\",\"method\":\"ping\",\"id\":1}\n\n".to_vec();

        // Exercise the line-parsing logic directly against a synthetic buffer,
        // mirroring what `drive_event_stream` does per chunk.
        let mut buffer = String::from_utf8(body).unwrap();
        let mut sent = Vec::new();
        while let Some(pos) = buffer.find('\n') {
            let line: String = buffer.drain(..=pos).collect();
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(data) = line.strip_prefix("data:") {
                let payload = data.trim_start();
                if !payload.is_empty() {
                    if let Ok(msg) = serde_json::from_str::<JsonRpcMessage>(payload) {
                        sent.push(msg);
                    }
                }
            }
        }
        for msg in sent {
            tx.send(msg).await.unwrap();
        }
        drop(tx);
        let received = rx.recv().await.unwrap();
        match received {
            JsonRpcMessage::Request(r) => assert_eq!(r.method, "ping"),
            JsonRpcMessage::Response(_) => panic!("expected request"),
        }
        assert!(rx.recv().await.is_none());
    }
}
