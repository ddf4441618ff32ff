//! Session lifecycle (§3 Session, §4.3 Standard Methods).
//!
//! A session moves `Created → Initializing → Ready → Closing` in lockstep
//! with the `initialize` request, the `notifications/initialized`
//! notification, and transport close. No method other than `initialize` or
//! `ping` is accepted before `Ready`; violating this is a [`McpError::state_error`].

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;

use mcpmux_core::{McpError, McpResult};
use mcpmux_protocol::{ClientCapabilities, ClientInfo, Root, ServerCapabilities};
use mcpmux_transport::now_unix;

/// Lifecycle stage of a session, per §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionLifecycle {
    /// Transport just connected; no `initialize` exchanged yet.
    Created,
    /// `initialize` request received, awaiting `notifications/initialized`.
    Initializing,
    /// Fully negotiated; the full method surface is available.
    Ready,
    /// Transport closed or `DELETE` received; the session is being torn down.
    Closing,
}

impl SessionLifecycle {
    /// Human-readable name, used in `StateError` messages.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            SessionLifecycle::Created => "created",
            SessionLifecycle::Initializing => "initializing",
            SessionLifecycle::Ready => "ready",
            SessionLifecycle::Closing => "closing",
        }
    }
}

/// Methods permitted before a session reaches [`SessionLifecycle::Ready`].
///
/// Per invariant 2 (§8): any other method called in an earlier state is a
/// `StateError`.
#[must_use]
pub fn is_pre_ready_method(method: &str) -> bool {
    matches!(method, "initialize" | "ping")
}

/// Mutable fields of a [`Session`], guarded by one lock so transitions are
/// atomic with respect to concurrent reads.
struct SessionInner {
    lifecycle: SessionLifecycle,
    client_info: Option<ClientInfo>,
    client_capabilities: Option<ClientCapabilities>,
    server_capabilities: ServerCapabilities,
    roots: Vec<Root>,
}

/// A live MCP session: one peer connection, tracked from transport connect
/// through close.
pub struct Session {
    id: String,
    inner: RwLock<SessionInner>,
    last_activity: AtomicI64,
}

impl Session {
    /// Creates a session in [`SessionLifecycle::Created`] for a freshly
    /// connected transport.
    #[must_use]
    pub fn new(id: impl Into<String>, server_capabilities: ServerCapabilities) -> Self {
        Self {
            id: id.into(),
            inner: RwLock::new(SessionInner {
                lifecycle: SessionLifecycle::Created,
                client_info: None,
                client_capabilities: None,
                server_capabilities,
                roots: Vec::new(),
            }),
            last_activity: AtomicI64::new(now_unix()),
        }
    }

    /// The session's unique id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The current lifecycle stage.
    #[must_use]
    pub fn lifecycle(&self) -> SessionLifecycle {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).lifecycle
    }

    /// Whether `method` is callable given the current lifecycle stage.
    #[must_use]
    pub fn can_call(&self, method: &str) -> bool {
        self.lifecycle() == SessionLifecycle::Ready || is_pre_ready_method(method)
    }

    /// Validates that `method` is callable now, returning a [`McpError::state_error`]
    /// otherwise.
    pub fn require_ready_for(&self, method: &str) -> McpResult<()> {
        if self.can_call(method) {
            Ok(())
        } else {
            Err(McpError::state_error(method, SessionLifecycle::Ready.name())
                .with_context("session_id", self.id.clone())
                .with_context("current_state", self.lifecycle().name()))
        }
    }

    /// Records the `initialize` request: stores client info/capabilities and
    /// the negotiated roots, and moves to [`SessionLifecycle::Initializing`].
    pub fn begin_initialize(
        &self,
        client_info: ClientInfo,
        client_capabilities: ClientCapabilities,
        roots: Vec<Root>,
    ) -> McpResult<()> {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        if inner.lifecycle != SessionLifecycle::Created {
            return Err(McpError::state_error("initialize", "created")
                .with_context("session_id", self.id.clone())
                .with_context("current_state", inner.lifecycle.name()));
        }
        inner.client_info = Some(client_info);
        inner.client_capabilities = Some(client_capabilities);
        inner.roots = roots;
        inner.lifecycle = SessionLifecycle::Initializing;
        self.touch();
        Ok(())
    }

    /// Records `notifications/initialized`, moving to
    /// [`SessionLifecycle::Ready`]. Per §4.3, issuing this from any other
    /// state is a `StateError`.
    pub fn complete_initialize(&self) -> McpResult<()> {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        if inner.lifecycle != SessionLifecycle::Initializing {
            return Err(McpError::state_error(
                "notifications/initialized",
                SessionLifecycle::Initializing.name(),
            )
            .with_context("session_id", self.id.clone())
            .with_context("current_state", inner.lifecycle.name()));
        }
        inner.lifecycle = SessionLifecycle::Ready;
        self.touch();
        Ok(())
    }

    /// Marks the session as closing (transport close or `DELETE`).
    pub fn begin_close(&self) {
        self.inner.write().unwrap_or_else(|e| e.into_inner()).lifecycle =
            SessionLifecycle::Closing;
    }

    /// The client info recorded at `initialize`, if any.
    #[must_use]
    pub fn client_info(&self) -> Option<ClientInfo> {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).client_info.clone()
    }

    /// The client capabilities recorded at `initialize`, if any.
    #[must_use]
    pub fn client_capabilities(&self) -> Option<ClientCapabilities> {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .client_capabilities
            .clone()
    }

    /// The server capabilities advertised by this session.
    #[must_use]
    pub fn server_capabilities(&self) -> ServerCapabilities {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .server_capabilities
            .clone()
    }

    /// The roots registered for this session.
    #[must_use]
    pub fn roots(&self) -> Vec<Root> {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).roots.clone()
    }

    /// Unix timestamp (seconds) of the last observed activity.
    #[must_use]
    pub fn last_activity(&self) -> i64 {
        self.last_activity.load(Ordering::Relaxed)
    }

    /// Records activity now.
    pub fn touch(&self) {
        self.last_activity.store(now_unix(), Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_info() -> ClientInfo {
        ClientInfo {
            name: "t".into(),
            version: "1".into(),
        }
    }

    #[test]
    fn new_session_starts_created_and_permits_initialize_and_ping() {
        let session = Session::new("s-1", ServerCapabilities::default());
        assert_eq!(session.lifecycle(), SessionLifecycle::Created);
        assert!(session.can_call("initialize"));
        assert!(session.can_call("ping"));
        assert!(!session.can_call("tools/list"));
    }

    #[test]
    fn s1_scenario_tools_list_before_initialized_is_state_error() {
        let session = Session::new("s-1", ServerCapabilities::default());
        session
            .begin_initialize(client_info(), ClientCapabilities::default(), vec![])
            .unwrap();
        // Still Initializing: tools/list must fail.
        let err = session.require_ready_for("tools/list").unwrap_err();
        assert_eq!(
            err.code.code(),
            mcpmux_core::McpErrorCode::StateError.code()
        );
        assert_eq!(err.code.code(), -31989);
    }

    #[test]
    fn full_lifecycle_reaches_ready_and_then_permits_any_method() {
        let session = Session::new("s-1", ServerCapabilities::default());
        session
            .begin_initialize(client_info(), ClientCapabilities::default(), vec![])
            .unwrap();
        session.complete_initialize().unwrap();
        assert_eq!(session.lifecycle(), SessionLifecycle::Ready);
        assert!(session.require_ready_for("tools/list").is_ok());
    }

    #[test]
    fn initialized_from_created_state_is_rejected() {
        let session = Session::new("s-1", ServerCapabilities::default());
        let err = session.complete_initialize().unwrap_err();
        assert_eq!(
            err.code.code(),
            mcpmux_core::McpErrorCode::StateError.code()
        );
    }

    #[test]
    fn double_initialize_is_rejected() {
        let session = Session::new("s-1", ServerCapabilities::default());
        session
            .begin_initialize(client_info(), ClientCapabilities::default(), vec![])
            .unwrap();
        let err = session
            .begin_initialize(client_info(), ClientCapabilities::default(), vec![])
            .unwrap_err();
        assert_eq!(
            err.code.code(),
            mcpmux_core::McpErrorCode::StateError.code()
        );
    }

    #[test]
    fn begin_close_moves_to_closing_from_any_state() {
        let session = Session::new("s-1", ServerCapabilities::default());
        session.begin_close();
        assert_eq!(session.lifecycle(), SessionLifecycle::Closing);
    }
}
