//! One upstream MCP server connection: handshake, cached catalog, and the
//! background reader task that routes inbound responses to the pending-call
//! map and inbound server-initiated requests to the orchestrator.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use mcpmux_core::{McpError, McpResult};
use mcpmux_core::{log_engine, log_transport};
use mcpmux_protocol::jsonrpc::{JsonRpcMessage, JsonRpcRequest, JsonRpcResponse};
use mcpmux_protocol::messages::{
    InitializeParams, InitializeResult, ListPromptsParams, ListPromptsResult,
    ListResourceTemplatesParams, ListResourceTemplatesResult, ListResourcesParams, ListResourcesResult,
    ListToolsParams, ListToolsResult,
};
use mcpmux_protocol::types::{ClientCapabilities, ClientInfo, Prompt, Resource, ResourceTemplate, Tool};
use mcpmux_protocol::PROTOCOL_VERSION;
use mcpmux_transport::Transport;
use serde_json::Value;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;

use crate::pending::{await_response, PendingCalls};
use crate::runtime::ServerRuntime;

/// An event surfaced by a backend's reader task to the orchestrator driving
/// it: either an inbound request/notification the backend initiated, or
/// notice that the connection dropped.
pub enum BackendEvent {
    /// A server-initiated request or notification (`sampling/createMessage`,
    /// `notifications/tools/list_changed`, ...).
    Inbound { backend: String, request: JsonRpcRequest },
    /// The backend's transport closed or failed.
    Disconnected { backend: String },
}

struct Catalog {
    initialize: Option<InitializeResult>,
    tools: Vec<Tool>,
    resources: Vec<Resource>,
    resource_templates: Vec<ResourceTemplate>,
    prompts: Vec<Prompt>,
}

impl Catalog {
    fn empty() -> Self {
        Self {
            initialize: None,
            tools: Vec::new(),
            resources: Vec::new(),
            resource_templates: Vec::new(),
            prompts: Vec::new(),
        }
    }
}

/// One backend MCP server: its transport, pending-call map, and cached
/// tool/resource/prompt catalog.
pub struct Backend {
    name: String,
    runtime: Arc<dyn ServerRuntime>,
    transport: RwLock<Option<Arc<dyn Transport>>>,
    pending: Arc<PendingCalls>,
    catalog: RwLock<Catalog>,
    reader: RwLock<Option<JoinHandle<()>>>,
    connected: AtomicBool,
}

impl Backend {
    /// Creates a backend with no live connection yet.
    #[must_use]
    pub fn new(name: impl Into<String>, runtime: Arc<dyn ServerRuntime>) -> Self {
        Self {
            name: name.into(),
            runtime,
            transport: RwLock::new(None),
            pending: Arc::new(PendingCalls::new()),
            catalog: RwLock::new(Catalog::empty()),
            reader: RwLock::new(None),
            connected: AtomicBool::new(false),
        }
    }

    /// This backend's registered name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the backend's transport is currently healthy.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Connects via the backend's [`ServerRuntime`] and starts the reader
    /// task, which forwards inbound requests on `events`.
    pub async fn connect(self: &Arc<Self>, events: mpsc::Sender<BackendEvent>) -> McpResult<()> {
        let transport = self.runtime.connect().await?;
        *self.transport.write().await = Some(transport.clone());
        self.connected.store(true, Ordering::Relaxed);

        let backend = self.clone();
        let handle = tokio::spawn(async move {
            loop {
                match transport.recv().await {
                    Ok(JsonRpcMessage::Response(response)) => {
                        backend.pending.resolve(response);
                    }
                    Ok(JsonRpcMessage::Request(request)) => {
                        if events
                            .send(BackendEvent::Inbound {
                                backend: backend.name.clone(),
                                request,
                            })
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    Err(err) => {
                        log_transport!(log::Level::Warn, "backend {} disconnected: {err}", backend.name);
                        break;
                    }
                }
            }
            backend.connected.store(false, Ordering::Relaxed);
            backend.pending.cancel_all();
            let _ = events
                .send(BackendEvent::Disconnected {
                    backend: backend.name.clone(),
                })
                .await;
        });
        *self.reader.write().await = Some(handle);
        Ok(())
    }

    /// Performs the `initialize`/`notifications/initialized` handshake and
    /// primes the tool/resource/prompt catalog. The backend must already be
    /// connected.
    pub async fn initialize(&self, client_info: ClientInfo) -> McpResult<InitializeResult> {
        let params = InitializeParams {
            protocol_version: PROTOCOL_VERSION.to_owned(),
            capabilities: ClientCapabilities {
                sampling: Some(mcpmux_protocol::types::SamplingCapability {}),
                roots: Some(mcpmux_protocol::types::RootsCapability { list_changed: false }),
            },
            client_info,
            roots: None,
        };
        let value = self.call("initialize", Some(serde_json::to_value(params).map_err(encode_err)?)).await?;
        let result: InitializeResult = serde_json::from_value(value).map_err(decode_err)?;
        self.notify("notifications/initialized", None).await?;
        self.catalog.write().await.initialize = Some(result.clone());

        if result.capabilities.has("tools") {
            self.refresh_tools().await?;
        }
        if result.capabilities.has("resources") {
            self.refresh_resources().await?;
            self.refresh_resource_templates().await?;
        }
        if result.capabilities.has("prompts") {
            self.refresh_prompts().await?;
        }
        Ok(result)
    }

    /// The capabilities/server info recorded at `initialize`, if connected.
    pub async fn initialize_result(&self) -> Option<InitializeResult> {
        self.catalog.read().await.initialize.clone()
    }

    /// Sends a request, awaiting its correlated response.
    pub async fn call(&self, method: &str, params: Option<Value>) -> McpResult<Value> {
        let transport = self.current_transport().await?;
        let id = self.pending.next_id();
        let rx = self.pending.register(id.clone());
        let request = JsonRpcRequest::new(method, params, id);
        transport
            .send(&JsonRpcMessage::Request(request))
            .await
            .map_err(McpError::from)?;
        let response = await_response(rx).await?;
        match response.error {
            Some(err) => Err(McpError::new(
                mcpmux_core::McpErrorCode::from_code(err.code).unwrap_or(mcpmux_core::McpErrorCode::ExecutionError),
                err.message,
            )),
            None => Ok(response.result.unwrap_or(Value::Null)),
        }
    }

    /// Sends a fire-and-forget notification.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> McpResult<()> {
        let transport = self.current_transport().await?;
        transport
            .send(&JsonRpcMessage::Request(JsonRpcRequest::notification(method, params)))
            .await
            .map_err(McpError::from)
    }

    /// Sends a response back to the backend, correlating a reply to one of
    /// its own server-initiated requests (e.g. `sampling/createMessage`).
    pub async fn respond(&self, response: JsonRpcResponse) -> McpResult<()> {
        let transport = self.current_transport().await?;
        transport
            .send(&JsonRpcMessage::Response(response))
            .await
            .map_err(McpError::from)
    }

    async fn current_transport(&self) -> McpResult<Arc<dyn Transport>> {
        self.transport
            .read()
            .await
            .clone()
            .ok_or_else(|| McpError::transport_error(format!("backend {} is not connected", self.name)))
    }

    /// Re-fetches `tools/list` (paginating to exhaustion) and caches it.
    pub async fn refresh_tools(&self) -> McpResult<Vec<Tool>> {
        let mut tools = Vec::new();
        let mut cursor = None;
        loop {
            let params = ListToolsParams { cursor };
            let value = self.call("tools/list", Some(serde_json::to_value(params).map_err(encode_err)?)).await?;
            let result: ListToolsResult = serde_json::from_value(value).map_err(decode_err)?;
            tools.extend(result.tools);
            cursor = result.next_cursor;
            if cursor.is_none() {
                break;
            }
        }
        self.catalog.write().await.tools = tools.clone();
        log_engine!(log::Level::Debug, "backend {} advertises {} tools", self.name, tools.len());
        Ok(tools)
    }

    /// Re-fetches `resources/list` to exhaustion and caches it.
    pub async fn refresh_resources(&self) -> McpResult<Vec<Resource>> {
        let mut resources = Vec::new();
        let mut cursor = None;
        loop {
            let params = ListResourcesParams { cursor };
            let value = self.call("resources/list", Some(serde_json::to_value(params).map_err(encode_err)?)).await?;
            let result: ListResourcesResult = serde_json::from_value(value).map_err(decode_err)?;
            resources.extend(result.resources);
            cursor = result.next_cursor;
            if cursor.is_none() {
                break;
            }
        }
        self.catalog.write().await.resources = resources.clone();
        Ok(resources)
    }

    /// Re-fetches `resources/templates/list` and caches it.
    pub async fn refresh_resource_templates(&self) -> McpResult<Vec<ResourceTemplate>> {
        let params = ListResourceTemplatesParams { cursor: None };
        let value = self
            .call("resources/templates/list", Some(serde_json::to_value(params).map_err(encode_err)?))
            .await?;
        let result: ListResourceTemplatesResult = serde_json::from_value(value).map_err(decode_err)?;
        self.catalog.write().await.resource_templates = result.resource_templates.clone();
        Ok(result.resource_templates)
    }

    /// Re-fetches `prompts/list` to exhaustion and caches it.
    pub async fn refresh_prompts(&self) -> McpResult<Vec<Prompt>> {
        let mut prompts = Vec::new();
        let mut cursor = None;
        loop {
            let params = ListPromptsParams { cursor };
            let value = self.call("prompts/list", Some(serde_json::to_value(params).map_err(encode_err)?)).await?;
            let result: ListPromptsResult = serde_json::from_value(value).map_err(decode_err)?;
            prompts.extend(result.prompts);
            cursor = result.next_cursor;
            if cursor.is_none() {
                break;
            }
        }
        self.catalog.write().await.prompts = prompts.clone();
        Ok(prompts)
    }

    /// Snapshot of the cached tool list.
    pub async fn tools(&self) -> Vec<Tool> {
        self.catalog.read().await.tools.clone()
    }

    /// Snapshot of the cached resource list.
    pub async fn resources(&self) -> Vec<Resource> {
        self.catalog.read().await.resources.clone()
    }

    /// Snapshot of the cached resource template list.
    pub async fn resource_templates(&self) -> Vec<ResourceTemplate> {
        self.catalog.read().await.resource_templates.clone()
    }

    /// Snapshot of the cached prompt list.
    pub async fn prompts(&self) -> Vec<Prompt> {
        self.catalog.read().await.prompts.clone()
    }

    /// Closes the transport and aborts the reader task.
    pub async fn close(&self) {
        if let Some(handle) = self.reader.write().await.take() {
            handle.abort();
        }
        if let Some(transport) = self.transport.write().await.take() {
            let _ = transport.close().await;
        }
        self.connected.store(false, Ordering::Relaxed);
        self.pending.cancel_all();
    }
}

fn encode_err(err: serde_json::Error) -> McpError {
    McpError::internal_error(err.to_string())
}

fn decode_err(err: serde_json::Error) -> McpError {
    McpError::invalid_params(err.to_string())
}
