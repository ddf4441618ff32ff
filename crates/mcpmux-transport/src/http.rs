//! Strict request/response HTTP transport (§4.1 HTTP).
//!
//! Each [`Transport::send`] is a `POST` of the envelope. Session affinity is
//! carried in the `Mcp-Session-Id` header: the server may assign one on its
//! first response, and every subsequent request echoes it back. `recv` is
//! unsupported — callers that need push-style delivery reach for
//! [`crate::sse::SseTransport`] instead. `close` issues a best-effort `DELETE`
//! carrying the session header.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use mcpmux_protocol::JsonRpcMessage;
use reqwest::Client;

use crate::{now_unix, BoxFuture, Transport, TransportError, TransportKind};

/// Default per-request timeout, per §4.1.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Header carrying the server-assigned session id.
pub const SESSION_HEADER: &str = "Mcp-Session-Id";

/// Strict request/response transport over HTTP.
pub struct HttpTransport {
    client: Client,
    url: String,
    session_id: RwLock<Option<String>>,
    connected: AtomicBool,
    last_activity: AtomicI64,
}

impl HttpTransport {
    /// Builds a transport posting to `url`, using [`DEFAULT_TIMEOUT`].
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_timeout(url, DEFAULT_TIMEOUT)
    }

    /// Builds a transport posting to `url` with a custom per-request timeout.
    #[must_use]
    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            url: url.into(),
            session_id: RwLock::new(None),
            connected: AtomicBool::new(true),
            last_activity: AtomicI64::new(now_unix()),
        }
    }

    /// The session id assigned by the server on a prior response, if any.
    #[must_use]
    pub fn session_id(&self) -> Option<String> {
        self.session_id.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn touch(&self) {
        self.last_activity.store(now_unix(), Ordering::Relaxed);
    }
}

impl Transport for HttpTransport {
    fn send<'a>(
        &'a self,
        message: &'a JsonRpcMessage,
    ) -> BoxFuture<'a, Result<(), TransportError>> {
        Box::pin(async move {
            let mut req = self
                .client
                .post(&self.url)
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .header(reqwest::header::ACCEPT, "application/json")
                .json(message);
            if let Some(id) = self.session_id() {
                req = req.header(SESSION_HEADER, id);
            }

            let response = req.send().await.map_err(|e| {
                self.connected.store(false, Ordering::Relaxed);
                TransportError::Http(e.to_string())
            })?;

            if let Some(id) = response.headers().get(SESSION_HEADER) {
                if let Ok(id) = id.to_str() {
                    *self.session_id.write().unwrap_or_else(|e| e.into_inner()) =
                        Some(id.to_owned());
                }
            }

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
        Box::pin(async move { Err(TransportError::Unsupported("async receive")) })
    }

    fn close(&self) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move {
            self.connected.store(false, Ordering::Relaxed);
            if let Some(id) = self.session_id() {
                // Best-effort: a failed DELETE does not fail the close.
                let _ = self
                    .client
                    .delete(&self.url)
                    .header(SESSION_HEADER, id)
                    .send()
                    .await;
            }
            Ok(())
        })
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Http
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    fn last_activity(&self) -> i64 {
        self.last_activity.load(Ordering::Relaxed)
    }

    fn supports_progress(&self) -> bool {
        false
    }
}
