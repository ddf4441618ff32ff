//! Outbound request/response correlation: every request mcpmux sends to a
//! peer (a backend server, or a downstream client capable of sampling) gets
//! a fresh id and a waiting slot here; the peer's reader task resolves the
//! slot when a response with the matching id arrives.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use mcpmux_core::{McpError, McpResult};
use mcpmux_protocol::jsonrpc::{JsonRpcResponse, RequestId};
use tokio::sync::oneshot;

/// Tracks in-flight requests awaiting a correlated response.
pub struct PendingCalls {
    next_id: AtomicI64,
    waiting: Mutex<HashMap<RequestId, oneshot::Sender<JsonRpcResponse>>>,
}

impl Default for PendingCalls {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingCalls {
    /// Creates an empty table, ids starting at 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            waiting: Mutex::new(HashMap::new()),
        }
    }

    /// Mints the next outbound request id.
    pub fn next_id(&self) -> RequestId {
        RequestId::Number(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Registers a waiting slot for `id`, returning the receiver half.
    pub fn register(&self, id: RequestId) -> oneshot::Receiver<JsonRpcResponse> {
        let (tx, rx) = oneshot::channel();
        self.waiting.lock().unwrap_or_else(|e| e.into_inner()).insert(id, tx);
        rx
    }

    /// Resolves the slot for `response.id`, if one is still waiting. Returns
    /// `true` if a waiter was found (false means the response was
    /// unsolicited or arrived after the caller gave up).
    pub fn resolve(&self, response: JsonRpcResponse) -> bool {
        let Some(id) = response.id.clone() else {
            return false;
        };
        let sender = self.waiting.lock().unwrap_or_else(|e| e.into_inner()).remove(&id);
        match sender {
            Some(tx) => tx.send(response).is_ok(),
            None => false,
        }
    }

    /// Drops every waiting slot, failing any caller still awaiting a
    /// response (e.g. on transport close). The dropped `oneshot::Sender`
    /// resolves the receiver with `RecvError`, which callers should map to a
    /// transport error.
    pub fn cancel_all(&self) {
        self.waiting.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    /// Number of requests currently awaiting a response, for introspection.
    pub fn pending_count(&self) -> usize {
        self.waiting.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Awaits `rx`, mapping a dropped sender (peer closed before responding) to
/// a transport error.
pub async fn await_response(rx: oneshot::Receiver<JsonRpcResponse>) -> McpResult<JsonRpcResponse> {
    rx.await.map_err(|_| McpError::transport_error("peer closed before responding"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolve_delivers_the_response_to_the_waiting_receiver() {
        let pending = PendingCalls::new();
        let id = pending.next_id();
        let rx = pending.register(id.clone());

        let resolved = pending.resolve(JsonRpcResponse::success(id, serde_json::json!(42)));
        assert!(resolved);

        let response = await_response(rx).await.unwrap();
        assert_eq!(response.result, Some(serde_json::json!(42)));
    }

    #[tokio::test]
    async fn resolve_with_no_matching_waiter_returns_false() {
        let pending = PendingCalls::new();
        let resolved = pending.resolve(JsonRpcResponse::success(RequestId::Number(99), serde_json::json!(null)));
        assert!(!resolved);
    }

    #[tokio::test]
    async fn cancel_all_fails_outstanding_waiters() {
        let pending = PendingCalls::new();
        let id = pending.next_id();
        let rx = pending.register(id);
        pending.cancel_all();
        assert!(await_response(rx).await.is_err());
    }

    #[test]
    fn ids_are_monotonically_increasing() {
        let pending = PendingCalls::new();
        let a = pending.next_id();
        let b = pending.next_id();
        assert_ne!(a, b);
    }
}
