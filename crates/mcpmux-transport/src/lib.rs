//! Transport abstraction: a uniform send/receive/close surface implemented
//! by stdio, HTTP, SSE, and WebSocket peers.
//!
//! Every transport satisfies the same contract (§4.1): `send` is safe for
//! concurrent callers, `recv` is single-consumer, `close` is idempotent, and
//! a failed `send` marks the transport unhealthy so the next `is_connected`
//! observes `false` and the session supervisor can evict it.

#![forbid(unsafe_code)]
#![allow(dead_code)]

pub mod codec;
pub mod http;
pub mod sse;
pub mod stdio;
pub mod websocket;

use std::future::Future;
use std::pin::Pin;
use std::time::{SystemTime, UNIX_EPOCH};

pub use codec::{Codec, CodecError};
pub use http::HttpTransport;
pub use sse::SseTransport;
pub use stdio::StdioTransport;
pub use websocket::WebSocketTransport;
use mcpmux_protocol::JsonRpcMessage;

/// A boxed, `Send` future, used instead of `async_trait` so `Transport` stays
/// object-safe (trait objects are how the dispatcher holds heterogeneous
/// transports in one session table).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Which concrete transport kind backs a [`Transport`] instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// Newline-delimited JSON over stdin/stdout.
    Stdio,
    /// Strict request/response over HTTP POST.
    Http,
    /// Server-sent events plus a companion POST endpoint.
    Sse,
    /// Full-duplex WebSocket.
    WebSocket,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TransportKind::Stdio => "stdio",
            TransportKind::Http => "http",
            TransportKind::Sse => "sse",
            TransportKind::WebSocket => "websocket",
        };
        write!(f, "{s}")
    }
}

/// Transport-level failure.
#[derive(Debug)]
pub enum TransportError {
    /// The peer closed the connection (EOF, stream end, socket close).
    Closed,
    /// The in-flight operation was cancelled.
    Cancelled,
    /// Message framing/parsing failed.
    Codec(CodecError),
    /// An operation this transport does not support was attempted, e.g.
    /// `recv` on an [`http::HttpTransport`].
    Unsupported(&'static str),
    /// A bounded queue could not accept a message within its send timeout.
    SendTimeout,
    /// An I/O error from the underlying stream.
    Io(std::io::Error),
    /// An HTTP-level failure (non-2xx status, connection error).
    Http(String),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Closed => write!(f, "transport closed"),
            TransportError::Cancelled => write!(f, "operation cancelled"),
            TransportError::Codec(e) => write!(f, "codec error: {e}"),
            TransportError::Unsupported(op) => write!(f, "unsupported operation: {op}"),
            TransportError::SendTimeout => write!(f, "send timeout"),
            TransportError::Io(e) => write!(f, "I/O error: {e}"),
            TransportError::Http(msg) => write!(f, "HTTP error: {msg}"),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransportError::Codec(e) => Some(e),
            TransportError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<CodecError> for TransportError {
    fn from(err: CodecError) -> Self {
        TransportError::Codec(err)
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        TransportError::Io(err)
    }
}

impl From<TransportError> for mcpmux_core::McpError {
    fn from(err: TransportError) -> Self {
        mcpmux_core::McpError::transport_error(err.to_string())
    }
}

/// Current Unix time in seconds.
#[must_use]
pub fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// The uniform transport contract every variant implements.
///
/// `send` must be safe for concurrent callers on the same instance; `recv`
/// is single-consumer (the dispatcher's reader task owns it exclusively).
/// `close` is idempotent.
pub trait Transport: Send + Sync {
    /// Sends one envelope. A failure marks the transport unhealthy.
    fn send<'a>(&'a self, message: &'a JsonRpcMessage) -> BoxFuture<'a, Result<(), TransportError>>;

    /// Receives the next envelope, suspending until one arrives.
    fn recv(&self) -> BoxFuture<'_, Result<JsonRpcMessage, TransportError>>;

    /// Closes the transport. Safe to call more than once.
    fn close(&self) -> BoxFuture<'_, Result<(), TransportError>>;

    /// Which concrete kind this is.
    fn kind(&self) -> TransportKind;

    /// Whether the transport is still considered healthy.
    fn is_connected(&self) -> bool;

    /// Unix timestamp (seconds) of the last successful send or receive.
    fn last_activity(&self) -> i64;

    /// Whether this transport can carry `notifications/progress` messages
    /// alongside its request/response traffic (all transports except a bare
    /// request/response HTTP exchange can).
    fn supports_progress(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_kind_display() {
        assert_eq!(TransportKind::Stdio.to_string(), "stdio");
        assert_eq!(TransportKind::Http.to_string(), "http");
        assert_eq!(TransportKind::Sse.to_string(), "sse");
        assert_eq!(TransportKind::WebSocket.to_string(), "websocket");
    }

    #[test]
    fn transport_error_converts_to_mcp_error() {
        let err: mcpmux_core::McpError = TransportError::Closed.into();
        assert_eq!(err.code.code(), mcpmux_core::McpErrorCode::TransportError.code());
    }

    #[test]
    fn now_unix_is_positive() {
        assert!(now_unix() > 0);
    }
}
