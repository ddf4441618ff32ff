//! The pluggable collaborator that connects a backend server.
//!
//! mcpmux never spawns a child process or opens a socket itself: callers
//! supply a [`ServerRuntime`] that produces an already-connected
//! [`Transport`] however fits their deployment (spawn a stdio subprocess,
//! dial a remote HTTP/SSE/WebSocket endpoint, hand back an in-process
//! duplex for tests).

use std::sync::Arc;

use mcpmux_core::McpResult;
use mcpmux_transport::{BoxFuture, Transport};

/// Produces a connected transport for one backend server.
///
/// `connect` may be called more than once over a backend's lifetime (e.g.
/// after a reconnect following a transport failure); each call should
/// establish a fresh connection. Boxed the same way [`Transport`] is, so
/// implementations stay object-safe behind `Arc<dyn ServerRuntime>`.
pub trait ServerRuntime: Send + Sync {
    /// Establishes (or re-establishes) the transport used to reach this
    /// backend server.
    fn connect(&self) -> BoxFuture<'_, McpResult<Arc<dyn Transport>>>;
}

/// Wraps a transport that is already connected, for callers (tests, simple
/// single-shot setups) that don't need reconnect semantics.
pub struct StaticRuntime {
    transport: Arc<dyn Transport>,
}

impl StaticRuntime {
    /// Wraps an already-connected transport.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }
}

impl ServerRuntime for StaticRuntime {
    fn connect(&self) -> BoxFuture<'_, McpResult<Arc<dyn Transport>>> {
        let transport = self.transport.clone();
        Box::pin(async move { Ok(transport) })
    }
}
