//! Standard I/O transport: newline-delimited JSON over a paired
//! reader/writer (§4.1 Stdio).
//!
//! `recv` blocks until a full envelope decodes off the reader; EOF surfaces
//! as [`TransportError::Closed`]. Progress notifications flow on the same
//! channel as requests/responses, so [`Transport::supports_progress`] is
//! always `true`.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Mutex;

use mcpmux_protocol::{JsonRpcMessage, JsonRpcRequest, JsonRpcResponse};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::{codec::Codec, now_unix, BoxFuture, Transport, TransportError, TransportKind};

/// Stdio transport over any pair of async reader/writer halves.
///
/// Generic so tests can drive it with in-memory pipes; [`StdioTransport::stdio`]
/// wires it to the process's real stdin/stdout.
pub struct StdioTransport<R, W> {
    reader: Mutex<BufReader<R>>,
    writer: Mutex<W>,
    connected: AtomicBool,
    last_activity: AtomicI64,
}

impl<R, W> StdioTransport<R, W>
where
    R: tokio::io::AsyncRead + Unpin + Send,
    W: tokio::io::AsyncWrite + Unpin + Send,
{
    /// Wraps an async reader/writer pair.
    #[must_use]
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: Mutex::new(BufReader::new(reader)),
            writer: Mutex::new(writer),
            connected: AtomicBool::new(true),
            last_activity: AtomicI64::new(now_unix()),
        }
    }

    fn touch(&self) {
        self.last_activity.store(now_unix(), Ordering::Relaxed);
    }

    fn mark_unhealthy(&self) {
        self.connected.store(false, Ordering::Relaxed);
    }
}

impl StdioTransport<tokio::io::Stdin, tokio::io::Stdout> {
    /// Creates a transport over the process's real stdin/stdout. The primary
    /// constructor for a server reached as a subprocess.
    #[must_use]
    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout())
    }
}

fn encode(message: &JsonRpcMessage) -> Result<Vec<u8>, TransportError> {
    let codec = Codec::new();
    let bytes = match message {
        JsonRpcMessage::Request(req) => codec.encode_request(req)?,
        JsonRpcMessage::Response(resp) => codec.encode_response(resp)?,
    };
    Ok(bytes)
}

impl<R, W> Transport for StdioTransport<R, W>
where
    R: tokio::io::AsyncRead + Unpin + Send,
    W: tokio::io::AsyncWrite + Unpin + Send,
{
    fn send<'a>(
        &'a self,
        message: &'a JsonRpcMessage,
    ) -> BoxFuture<'a, Result<(), TransportError>> {
        Box::pin(async move {
            let result = async {
                let bytes = encode(message)?;
                let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
                writer.write_all(&bytes).await?;
                writer.flush().await?;
                Ok::<_, TransportError>(())
            }
            .await;
            match &result {
                Ok(()) => self.touch(),
                Err(_) => self.mark_unhealthy(),
            }
            result
        })
    }

    fn recv(&self) -> BoxFuture<'_, Result<JsonRpcMessage, TransportError>> {
        Box::pin(async move {
            loop {
                let mut line = String::new();
                let bytes_read = {
                    let mut reader = self.reader.lock().unwrap_or_else(|e| e.into_inner());
                    reader.read_line(&mut line).await?
                };
                if bytes_read == 0 {
                    self.mark_unhealthy();
                    return Err(TransportError::Closed);
                }
                let trimmed = line.trim_end_matches(['\n', '\r']);
                if trimmed.is_empty() {
                    continue;
                }
                let message: JsonRpcMessage = serde_json::from_str(trimmed)
                    .map_err(crate::codec::CodecError::Json)?;
                self.touch();
                return Ok(message);
            }
        })
    }

    fn close(&self) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move {
            self.connected.store(false, Ordering::Relaxed);
            let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
            writer.flush().await?;
            Ok(())
        })
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Stdio
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

/// Encodes a raw request directly, bypassing the [`Transport`] trait object
/// boundary. Used by callers that already hold a concrete `StdioTransport`
/// and want to avoid constructing a [`JsonRpcMessage`] wrapper.
pub fn encode_request(request: &JsonRpcRequest) -> Result<Vec<u8>, TransportError> {
    Ok(Codec::new().encode_request(request)?)
}

/// Encodes a raw response directly, mirroring [`encode_request`].
pub fn encode_response(response: &JsonRpcResponse) -> Result<Vec<u8>, TransportError> {
    Ok(Codec::new().encode_response(response)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcpmux_protocol::RequestId;
    use tokio::io::duplex;

    #[tokio::test]
    async fn round_trips_a_request_over_an_in_memory_pipe() {
        let (client, server) = duplex(4096);
        let (client_r, client_w) = tokio::io::split(client);
        let (server_r, server_w) = tokio::io::split(server);

        let client_transport = StdioTransport::new(client_r, client_w);
        let server_transport = StdioTransport::new(server_r, server_w);

        let req = JsonRpcMessage::Request(JsonRpcRequest::new("ping", None, 1i64));
        client_transport.send(&req).await.unwrap();

        let received = server_transport.recv().await.unwrap();
        match received {
            JsonRpcMessage::Request(r) => assert_eq!(r.method, "ping"),
            JsonRpcMessage::Response(_) => panic!("expected request"),
        }
        assert!(server_transport.is_connected());
    }

    #[tokio::test]
    async fn recv_surfaces_closed_on_eof() {
        let (client, server) = duplex(64);
        drop(client);
        let (server_r, server_w) = tokio::io::split(server);
        let transport = StdioTransport::new(server_r, server_w);
        let err = transport.recv().await.unwrap_err();
        assert!(matches!(err, TransportError::Closed));
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn supports_progress_is_always_true() {
        let (client, server) = duplex(64);
        let (r, w) = tokio::io::split(client);
        drop(server);
        let transport = StdioTransport::new(r, w);
        assert!(transport.supports_progress());
    }

    #[tokio::test]
    async fn empty_lines_are_skipped() {
        let (client, server) = duplex(4096);
        let (client_r, client_w) = tokio::io::split(client);
        let (server_r, server_w) = tokio::io::split(server);
        let client_transport = StdioTransport::new(client_r, client_w);
        let server_transport = StdioTransport::new(server_r, server_w);

        {
            let mut w = client_transport.writer.lock().unwrap();
            w.write_all(b"\n\n").await.unwrap();
            w.flush().await.unwrap();
        }
        let req = JsonRpcMessage::Response(JsonRpcResponse::success(
            RequestId::Number(1),
            serde_json::json!({}),
        ));
        client_transport.send(&req).await.unwrap();

        let received = server_transport.recv().await.unwrap();
        assert!(matches!(received, JsonRpcMessage::Response(_)));
    }
}
