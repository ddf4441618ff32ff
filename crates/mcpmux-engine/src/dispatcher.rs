//! Standard methods + dispatcher (§4.2, §4.3): message routing, the
//! `initialize`/`initialized`/`ping`/`roots/list` handlers, and
//! `$/cancelled` propagation.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use mcpmux_core::{log_engine, McpContext, McpError, McpResult};
use mcpmux_protocol::jsonrpc::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, RequestId};
use mcpmux_protocol::messages::{
    CancelledParams, InitializeParams, InitializeResult, ListRootsResult, PingResult,
};
use mcpmux_protocol::types::{Root, RootPermissions, ServerInfo};
use mcpmux_protocol::PROTOCOL_VERSION;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::root::RootManager;
use crate::session::Session;

/// A future-returning method handler, registered for a single method name.
///
/// Boxed the same way [`mcpmux_transport::Transport`] is, so the dispatcher
/// can hold a heterogeneous table of handlers behind one trait object.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Handles one non-standard method (`tools/call`, `resources/read`, ...).
pub trait MethodHandler: Send + Sync {
    /// Executes the method against `params`, returning the JSON result value.
    fn call<'a>(&'a self, ctx: McpContext, params: Option<Value>) -> BoxFuture<'a, McpResult<Value>>;
}

/// Routes incoming envelopes for one session: the standard methods are
/// handled directly; anything else goes through a registered
/// [`MethodHandler`] or fails with `MethodNotFound`.
pub struct Dispatcher {
    session: Arc<Session>,
    roots: Arc<RootManager>,
    server_info: ServerInfo,
    engine_version: String,
    handlers: Mutex<HashMap<String, Arc<dyn MethodHandler>>>,
    cancellations: Mutex<HashMap<RequestId, CancellationToken>>,
}

impl Dispatcher {
    /// Creates a dispatcher for a freshly connected session.
    #[must_use]
    pub fn new(session: Arc<Session>, roots: Arc<RootManager>, server_info: ServerInfo, engine_version: impl Into<String>) -> Self {
        Self {
            session,
            roots,
            server_info,
            engine_version: engine_version.into(),
            handlers: Mutex::new(HashMap::new()),
            cancellations: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a handler for a non-standard method.
    pub async fn register_handler(&self, method: impl Into<String>, handler: Arc<dyn MethodHandler>) {
        self.handlers.lock().await.insert(method.into(), handler);
    }

    /// Routes one request (an envelope carrying an `id`), returning the
    /// response to write back through the owning transport.
    pub async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let Some(id) = request.id.clone() else {
            // Not reachable via a well-formed `JsonRpcRequest::id` check at
            // the caller, but handled defensively rather than panicking.
            return JsonRpcResponse::error(None, JsonRpcError::from(McpError::invalid_request(
                "request missing id",
            )));
        };

        if let Err(err) = self.session.require_ready_for(&request.method) {
            return JsonRpcResponse::error(Some(id), err.into());
        }

        let result = match request.method.as_str() {
            "initialize" => self.dispatch_initialize(request.params).await,
            "ping" => self.dispatch_ping(),
            "roots/list" => self.dispatch_roots_list(),
            method => self.dispatch_registered(method, id.clone(), request.params).await,
        };

        self.session.touch();
        match result {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(err) => JsonRpcResponse::error(Some(id), err.into()),
        }
    }

    /// Routes one notification (an envelope with no `id`). Failures are
    /// logged, never surfaced, per §4.2.
    pub async fn handle_notification(&self, request: JsonRpcRequest) {
        let result = match request.method.as_str() {
            "notifications/initialized" => self.session.complete_initialize(),
            "$/cancelled" => self.dispatch_cancelled(request.params).await,
            other => {
                log_engine!(log::Level::Debug, "ignoring unknown notification: {other}");
                Ok(())
            }
        };
        if let Err(err) = result {
            log_engine!(log::Level::Warn, "notification {} failed: {}", request.method, err.message);
        }
        self.session.touch();
    }

    async fn dispatch_initialize(&self, params: Option<Value>) -> McpResult<Value> {
        let params: InitializeParams = parse_params(params)?;
        if params.protocol_version != PROTOCOL_VERSION {
            return Err(McpError::protocol_error(&params.protocol_version, PROTOCOL_VERSION));
        }

        let roots = match params.roots.filter(|r| !r.is_empty()) {
            Some(client_roots) => client_roots
                .into_iter()
                .map(|root| Root {
                    uri: root.uri,
                    name: root.name,
                    permissions: RootPermissions::default_grant(),
                })
                .collect(),
            None => default_roots(),
        };
        for root in &roots {
            self.roots.add_root(&root.uri, root.name.clone(), root.permissions).await;
        }

        self.session.begin_initialize(params.client_info, params.capabilities, roots.clone())?;

        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_owned(),
            capabilities: self.session.server_capabilities(),
            server_info: self.server_info.clone(),
            roots,
            instructions: None,
        };
        serde_json::to_value(result).map_err(|e| McpError::internal_error(e.to_string()))
    }

    /// Registers roots the client exposed via its own `roots/list`, once
    /// the post-initialize capability round trip completes. Supersedes the
    /// default `file://<cwd>` root registered at `initialize` time, mirroring
    /// how a client's `RootsCapability` is only confirmed after the
    /// handshake. Client-supplied roots are granted read + list, not write.
    pub async fn register_client_roots(&self, roots: &[Root]) {
        for root in roots {
            self.roots
                .add_root(&root.uri, root.name.clone(), RootPermissions::default_grant())
                .await;
        }
    }

    fn dispatch_ping(&self) -> McpResult<Value> {
        let result = PingResult {
            timestamp: mcpmux_transport::now_unix(),
            status: "ok".to_owned(),
            version: self.engine_version.clone(),
        };
        serde_json::to_value(result).map_err(|e| McpError::internal_error(e.to_string()))
    }

    fn dispatch_roots_list(&self) -> McpResult<Value> {
        let result = ListRootsResult {
            roots: self.session.roots(),
        };
        serde_json::to_value(result).map_err(|e| McpError::internal_error(e.to_string()))
    }

    async fn dispatch_registered(&self, method: &str, id: RequestId, params: Option<Value>) -> McpResult<Value> {
        let handler = self.handlers.lock().await.get(method).cloned();
        let Some(handler) = handler else {
            return Err(McpError::method_not_found(method));
        };

        let token = CancellationToken::new();
        self.cancellations.lock().await.insert(id.clone(), token.clone());
        let request_id_hash = request_id_as_u64(&id);
        let ctx = McpContext::new(token, request_id_hash);

        let result = handler.call(ctx, params).await;
        self.cancellations.lock().await.remove(&id);
        result
    }

    async fn dispatch_cancelled(&self, params: Option<Value>) -> McpResult<()> {
        let params: CancelledParams = parse_params(params)?;
        if let Some(token) = self.cancellations.lock().await.get(&params.request_id) {
            token.cancel();
        }
        Ok(())
    }

    /// Validates that the session's negotiated server capabilities include
    /// `path` (e.g. `"resources.subscribe"`).
    pub fn validate_capability(&self, path: &str) -> McpResult<()> {
        if self.session.server_capabilities().has(path) {
            Ok(())
        } else {
            Err(McpError::capability_error(path))
        }
    }

    /// The session this dispatcher serves.
    #[must_use]
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(params: Option<Value>) -> McpResult<T> {
    let value = params.unwrap_or(Value::Null);
    serde_json::from_value(value).map_err(|e| McpError::invalid_params(e.to_string()))
}

fn default_roots() -> Vec<Root> {
    let cwd = std::env::current_dir()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "/".to_owned());
    vec![Root {
        uri: format!("file://{cwd}"),
        name: None,
        permissions: RootPermissions {
            read: true,
            write: false,
            list: true,
            watch: true,
        },
    }]
}

/// Request ids correlate progress tokens to a `u64` elsewhere in the engine;
/// string ids hash to a stable value so two calls on the same id agree.
fn request_id_as_u64(id: &RequestId) -> u64 {
    use std::hash::{Hash, Hasher};
    match id {
        RequestId::Number(n) => *n as u64,
        RequestId::String(s) => {
            let mut hasher = std::collections::hash_map::DefaultHasher::new();
            s.hash(&mut hasher);
            hasher.finish()
        }
    }
}
