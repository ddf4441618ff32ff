//! Ties every backend and every downstream client to one shared aggregated
//! catalog: namespaces tool/prompt names and resource URIs by backend,
//! routes backend-initiated requests (chiefly forwarded sampling), and
//! drives the engine's change/subscription managers off backend events.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use mcpmux_core::{log_engine, McpError, McpErrorCode, McpResult};
use mcpmux_engine::{ChangeNotifier, ProgressManager, SamplingManager, SubscriptionManager};
use mcpmux_protocol::jsonrpc::{JsonRpcRequest, JsonRpcResponse};
use mcpmux_protocol::messages::{
    CallToolParams, CallToolResult, CreateMessageParams, GetPromptParams, GetPromptResult, ListRootsResult,
    ReadResourceParams, ReadResourceResult, ResourceUpdatedNotificationParams,
};
use mcpmux_protocol::types::{
    ClientInfo, LoggingCapability, Prompt, PromptsCapability, Resource, ResourceTemplate, SamplingRequest,
    SamplingStatus, ServerCapabilities, ServerInfo, SubscriptionFilter, SubscriptionOptions, Tool, ToolsCapability,
};
use mcpmux_transport::Transport;
use serde_json::Value;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;

use crate::backend::{Backend, BackendEvent};
use crate::client::ClientConnection;
use crate::runtime::ServerRuntime;

const BACKEND_EVENT_QUEUE_CAPACITY: usize = 256;

/// Joins a backend name and a tool/prompt name into the name downstream
/// clients see (`"weather.get_forecast"`).
fn namespaced_name(backend: &str, name: &str) -> String {
    format!("{backend}.{name}")
}

/// Splits an aggregated tool/prompt name back into `(backend, name)`.
fn split_namespaced_name(name: &str) -> Option<(&str, &str)> {
    name.split_once('.')
}

/// Joins a backend name and the backend's own resource URI into the URI
/// downstream clients see (`"mux:weather:file:///forecast.json"`).
fn namespaced_uri(backend: &str, uri: &str) -> String {
    format!("mux:{backend}:{uri}")
}

/// Splits an aggregated resource URI back into `(backend, uri)`. Only the
/// first `:` after the `mux:` prefix separates the backend name, so the
/// original URI (itself often containing `:`, e.g. `file:///x`) survives
/// intact. Backend names are validated at registration to exclude `:`.
fn split_namespaced_uri(uri: &str) -> Option<(&str, &str)> {
    uri.strip_prefix("mux:")?.split_once(':')
}

fn encode_err(err: serde_json::Error) -> McpError {
    McpError::internal_error(err.to_string())
}

fn decode_err(err: serde_json::Error) -> McpError {
    McpError::invalid_params(err.to_string())
}

/// Checks `arguments` against `tool`'s `inputSchema`, returning a
/// `ValidationError` naming the tool on the first rejected call.
fn validate_tool_arguments(tool: &Tool, arguments: Option<&Value>) -> McpResult<()> {
    let value = arguments.cloned().unwrap_or(Value::Null);
    mcpmux_protocol::schema::validate(&tool.input_schema, &value).map_err(|errors| {
        let detail = errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ");
        McpError::validation_error(&tool.name, detail)
    })
}

fn parse_params<T: serde::de::DeserializeOwned>(params: Option<Value>) -> McpResult<T> {
    serde_json::from_value(params.unwrap_or(Value::Null)).map_err(decode_err)
}

/// The shared hub: every registered backend and every connected client hangs
/// off one `Arc<Orchestrator>`.
pub struct Orchestrator {
    backends: RwLock<HashMap<String, Arc<Backend>>>,
    clients: RwLock<HashMap<String, Arc<ClientConnection>>>,
    change_notifier: Arc<ChangeNotifier>,
    subscriptions: Arc<SubscriptionManager>,
    sampling: Arc<SamplingManager>,
    progress: Arc<ProgressManager>,
    client_info: ClientInfo,
    events_tx: mpsc::Sender<BackendEvent>,
    driver: StdMutex<Option<JoinHandle<()>>>,
}

impl Orchestrator {
    /// Creates an orchestrator with no backends or clients. `client_info`
    /// identifies mcpmux itself during the `initialize` handshake it
    /// performs against each backend.
    #[must_use]
    pub fn new(client_info: ClientInfo) -> Arc<Self> {
        let (events_tx, events_rx) = mpsc::channel(BACKEND_EVENT_QUEUE_CAPACITY);
        let orchestrator = Arc::new(Self {
            backends: RwLock::new(HashMap::new()),
            clients: RwLock::new(HashMap::new()),
            change_notifier: Arc::new(ChangeNotifier::new()),
            subscriptions: Arc::new(SubscriptionManager::new()),
            sampling: Arc::new(SamplingManager::new()),
            progress: Arc::new(ProgressManager::new()),
            client_info,
            events_tx,
            driver: StdMutex::new(None),
        });

        let driver_handle = {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move { orchestrator.drive(events_rx).await })
        };
        *orchestrator.driver.lock().unwrap_or_else(|e| e.into_inner()) = Some(driver_handle);
        orchestrator
    }

    /// The sampling request tracker, exposed so a host can register
    /// [`mcpmux_engine::SamplingHandler`]s, set human-control policies, or
    /// approve/reject requests awaiting review.
    #[must_use]
    pub fn sampling(&self) -> &Arc<SamplingManager> {
        &self.sampling
    }

    /// The progress-token manager. mcpmux issues tokens for a call it
    /// proxies on a client's behalf but does not yet relay a backend's own
    /// `notifications/progress` across the hop; exposed so a host can attach
    /// listeners for the calls it originates directly.
    #[must_use]
    pub fn progress(&self) -> &Arc<ProgressManager> {
        &self.progress
    }

    /// Capabilities advertised to downstream clients: the union of what
    /// every currently registered backend advertises, plus the
    /// subscribe/logging support mcpmux itself always provides once at least
    /// one backend exposes resources.
    pub async fn aggregated_capabilities(&self) -> ServerCapabilities {
        let backends = self.backends.read().await;
        let (mut tools, mut resources, mut prompts) = (false, false, false);
        for backend in backends.values() {
            if let Some(result) = backend.initialize_result().await {
                tools |= result.capabilities.has("tools");
                resources |= result.capabilities.has("resources");
                prompts |= result.capabilities.has("prompts");
            }
        }
        ServerCapabilities {
            tools: tools.then(|| ToolsCapability { list_changed: true }),
            resources: resources.then(|| mcpmux_protocol::types::ResourcesCapability {
                subscribe: true,
                list_changed: true,
            }),
            prompts: prompts.then(|| PromptsCapability { list_changed: true }),
            logging: Some(LoggingCapability {}),
        }
    }

    /// Connects to and registers a backend server: performs the
    /// `initialize`/`notifications/initialized` handshake, primes its
    /// catalog, and seeds the change notifier so a later catalog change
    /// fans out rather than firing on first contact.
    pub async fn register_backend(self: &Arc<Self>, name: impl Into<String>, runtime: Arc<dyn ServerRuntime>) -> McpResult<()> {
        let name = name.into();
        if name.is_empty() || name.contains('.') || name.contains(':') {
            return Err(McpError::validation_error(
                "name",
                "backend name must be non-empty and must not contain '.' or ':'",
            ));
        }
        if self.backends.read().await.contains_key(&name) {
            return Err(McpError::validation_error("name", format!("backend already registered: {name}")));
        }

        let backend = Arc::new(Backend::new(name.clone(), runtime));
        backend.connect(self.events_tx.clone()).await?;
        if let Err(err) = backend.initialize(self.client_info.clone()).await {
            backend.close().await;
            return Err(err);
        }

        self.change_notifier.update_tools(&name, &backend.tools().await).await;
        self.change_notifier.update_prompts(&name, &backend.prompts().await).await;

        self.backends.write().await.insert(name, backend);
        Ok(())
    }

    /// Disconnects and forgets a backend.
    pub async fn remove_backend(&self, name: &str) {
        if let Some(backend) = self.backends.write().await.remove(name) {
            backend.close().await;
        }
    }

    /// Accepts a freshly connected downstream client, registering it as both
    /// a [`SubscriptionSink`] and a [`ChangeSubscriber`] so the engine's
    /// fan-out managers can reach it.
    pub async fn register_client(
        self: &Arc<Self>,
        id: impl Into<String>,
        transport: Arc<dyn Transport>,
        server_info: ServerInfo,
    ) -> Arc<ClientConnection> {
        let id = id.into();
        let connection = ClientConnection::accept(id.clone(), transport, self.clone(), server_info).await;
        self.subscriptions.register_sink(connection.clone()).await;
        self.change_notifier.subscribe(connection.clone()).await;
        self.clients.write().await.insert(id, connection.clone());
        connection
    }

    /// Forgets a disconnected client and stops routing fan-out to it.
    pub async fn remove_client(&self, id: &str) {
        self.clients.write().await.remove(id);
        self.change_notifier.unsubscribe(id).await;
        self.subscriptions.unregister_sink(id).await;
    }

    async fn get_backend(&self, name: &str) -> McpResult<Arc<Backend>> {
        self.backends
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| McpError::validation_error("backend", format!("unknown backend: {name}")))
    }

    /// The aggregated, namespaced tool catalog across every backend.
    pub async fn list_tools(&self) -> Vec<Tool> {
        let backends = self.backends.read().await;
        let mut tools = Vec::new();
        for backend in backends.values() {
            for mut tool in backend.tools().await {
                tool.name = namespaced_name(backend.name(), &tool.name);
                tools.push(tool);
            }
        }
        tools
    }

    /// Invokes a namespaced tool (`"backend.tool"`) against its owning
    /// backend.
    pub async fn call_tool(&self, name: &str, arguments: Option<Value>) -> McpResult<CallToolResult> {
        let (backend_name, tool_name) = split_namespaced_name(name)
            .ok_or_else(|| McpError::validation_error("name", format!("tool name not namespaced as backend.tool: {name}")))?;
        let backend = self.get_backend(backend_name).await?;
        if let Some(tool) = backend.tools().await.into_iter().find(|t| t.name == tool_name) {
            validate_tool_arguments(&tool, arguments.as_ref())?;
        }
        let params = CallToolParams {
            name: tool_name.to_owned(),
            arguments,
            meta: None,
        };
        let value = backend
            .call("tools/call", Some(serde_json::to_value(params).map_err(encode_err)?))
            .await?;
        serde_json::from_value(value).map_err(decode_err)
    }

    /// The aggregated, namespaced resource catalog across every backend.
    pub async fn list_resources(&self) -> Vec<Resource> {
        let backends = self.backends.read().await;
        let mut resources = Vec::new();
        for backend in backends.values() {
            for mut resource in backend.resources().await {
                resource.uri = namespaced_uri(backend.name(), &resource.uri);
                resources.push(resource);
            }
        }
        resources
    }

    /// The aggregated, namespaced resource template catalog.
    pub async fn list_resource_templates(&self) -> Vec<ResourceTemplate> {
        let backends = self.backends.read().await;
        let mut templates = Vec::new();
        for backend in backends.values() {
            for mut template in backend.resource_templates().await {
                template.uri_template = namespaced_uri(backend.name(), &template.uri_template);
                templates.push(template);
            }
        }
        templates
    }

    /// Reads a namespaced resource URI (`"mux:backend:uri"`) from its owning
    /// backend, rewriting the result's URIs back into namespaced form.
    pub async fn read_resource(&self, uri: &str) -> McpResult<ReadResourceResult> {
        let (backend_name, inner_uri) = split_namespaced_uri(uri).ok_or_else(|| McpError::resource_not_found(uri))?;
        let backend = self.get_backend(backend_name).await?;
        let params = ReadResourceParams {
            uri: inner_uri.to_owned(),
            meta: None,
        };
        let value = backend
            .call("resources/read", Some(serde_json::to_value(params).map_err(encode_err)?))
            .await?;
        let mut result: ReadResourceResult = serde_json::from_value(value).map_err(decode_err)?;
        for content in &mut result.contents {
            content.uri = namespaced_uri(backend_name, &content.uri);
        }
        Ok(result)
    }

    /// Subscribes a client to a namespaced resource URI or template.
    /// Subscriptions are owned by mcpmux, not forwarded upstream: the
    /// backend is polled for changes via its own `list_changed`/`updated`
    /// notifications, which this orchestrator already consumes and
    /// redistributes per-subscriber.
    pub async fn subscribe_resource(
        &self,
        client_id: &str,
        session_id: &str,
        uri: &str,
        filters: Vec<SubscriptionFilter>,
        options: SubscriptionOptions,
    ) -> McpResult<String> {
        self.subscriptions.subscribe(client_id, session_id, uri, filters, options).await
    }

    /// Removes a subscription. Only the owning client may unsubscribe.
    pub async fn unsubscribe_resource(&self, client_id: &str, subscription_id: &str) -> McpResult<()> {
        self.subscriptions.unsubscribe(client_id, subscription_id).await
    }

    /// The aggregated, namespaced prompt catalog across every backend.
    pub async fn list_prompts(&self) -> Vec<Prompt> {
        let backends = self.backends.read().await;
        let mut prompts = Vec::new();
        for backend in backends.values() {
            for mut prompt in backend.prompts().await {
                prompt.name = namespaced_name(backend.name(), &prompt.name);
                prompts.push(prompt);
            }
        }
        prompts
    }

    /// Renders a namespaced prompt (`"backend.prompt"`) against its owning
    /// backend.
    pub async fn get_prompt(&self, name: &str, arguments: Option<HashMap<String, String>>) -> McpResult<GetPromptResult> {
        let (backend_name, prompt_name) =
            split_namespaced_name(name).ok_or_else(|| McpError::prompt_not_found(name))?;
        let backend = self.get_backend(backend_name).await?;
        let params = GetPromptParams {
            name: prompt_name.to_owned(),
            arguments,
            meta: None,
        };
        let value = backend
            .call("prompts/get", Some(serde_json::to_value(params).map_err(encode_err)?))
            .await?;
        serde_json::from_value(value).map_err(decode_err)
    }

    async fn drive(self: Arc<Self>, mut events_rx: mpsc::Receiver<BackendEvent>) {
        while let Some(event) = events_rx.recv().await {
            match event {
                BackendEvent::Inbound { backend, request } if request.is_notification() => {
                    self.handle_backend_notification(&backend, request).await;
                }
                BackendEvent::Inbound { backend, request } => {
                    self.handle_backend_request(&backend, request).await;
                }
                BackendEvent::Disconnected { backend } => {
                    log_engine!(log::Level::Warn, "backend {backend} disconnected");
                }
            }
        }
    }

    async fn handle_backend_notification(&self, backend: &str, request: JsonRpcRequest) {
        match request.method.as_str() {
            "notifications/tools/list_changed" => {
                if let Some(b) = self.backends.read().await.get(backend).cloned() {
                    if let Ok(tools) = b.refresh_tools().await {
                        self.change_notifier.update_tools(backend, &tools).await;
                    }
                }
            }
            "notifications/prompts/list_changed" => {
                if let Some(b) = self.backends.read().await.get(backend).cloned() {
                    if let Ok(prompts) = b.refresh_prompts().await {
                        self.change_notifier.update_prompts(backend, &prompts).await;
                    }
                }
            }
            "notifications/resources/list_changed" => {
                if let Some(b) = self.backends.read().await.get(backend).cloned() {
                    let _ = b.refresh_resources().await;
                    let _ = b.refresh_resource_templates().await;
                }
            }
            "notifications/resources/updated" => {
                let Ok(params) = parse_params::<ResourceUpdatedNotificationParams>(request.params) else {
                    return;
                };
                let update = mcpmux_engine::ResourceUpdate {
                    uri: namespaced_uri(backend, &params.uri),
                    update_type: params.update_type,
                    mime_type: params.content.as_ref().and_then(|c| c.mime_type.clone()),
                    size: None,
                    metadata: params
                        .metadata
                        .iter()
                        .map(|(k, v)| (k.clone(), v.to_string()))
                        .collect(),
                };
                self.subscriptions.notify_resource_update(update).await;
            }
            "notifications/message" => {
                log_engine!(log::Level::Debug, "backend {backend} log: {:?}", request.params);
            }
            "notifications/progress" => {
                log_engine!(
                    log::Level::Debug,
                    "backend {backend} emitted a progress notification; cross-hop relay is not yet implemented"
                );
            }
            other => {
                log_engine!(log::Level::Debug, "ignoring unknown notification from backend {backend}: {other}");
            }
        }
    }

    async fn handle_backend_request(&self, backend_name: &str, request: JsonRpcRequest) {
        let Some(id) = request.id.clone() else {
            return;
        };
        let Some(backend) = self.backends.read().await.get(backend_name).cloned() else {
            return;
        };

        let result = match request.method.as_str() {
            "sampling/createMessage" => self.handle_sampling_request(backend_name, request.params).await,
            "roots/list" => serde_json::to_value(ListRootsResult { roots: Vec::new() }).map_err(encode_err),
            other => Err(McpError::method_not_found(other)),
        };

        let response = match result {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(err) => JsonRpcResponse::error(Some(id), err.into()),
        };
        let _ = backend.respond(response).await;
    }

    /// Submits a backend's `sampling/createMessage` request to the sampling
    /// manager, which applies the server's human-control policy. A request
    /// left `awaiting_approval` cannot be satisfied synchronously — it
    /// surfaces as an `ExecutionError` carrying the tracked request's id so a
    /// host can drive the review separately. Otherwise tries a locally
    /// registered handler first, then falls back to forwarding the request
    /// to a connected client that advertises its own sampling capability.
    async fn handle_sampling_request(&self, backend_name: &str, params: Option<Value>) -> McpResult<Value> {
        let create_params: CreateMessageParams = parse_params(params)?;
        let sampling_request = SamplingRequest {
            id: String::new(),
            server_name: backend_name.to_owned(),
            messages: create_params.messages.clone(),
            model_prefs: create_params.model_preferences.clone().unwrap_or_default(),
            max_tokens: Some(create_params.max_tokens),
            stop_sequence: create_params.stop_sequences.clone(),
            temperature: create_params.temperature,
            context: None,
            status: SamplingStatus::Pending,
            human_review: None,
        };
        let id = self.sampling.submit(backend_name, sampling_request).await;
        let current = self
            .sampling
            .get(&id)
            .await
            .ok_or_else(|| McpError::internal_error("sampling request vanished immediately after submit"))?;

        if current.status == SamplingStatus::AwaitingApproval {
            return Err(McpError::execution_error("sampling request awaiting human approval").with_context("sampling_id", id));
        }

        match self.sampling.process(&id).await {
            Ok(result) => serde_json::to_value(result).map_err(encode_err),
            Err(err) if err.code == McpErrorCode::ExecutionError => match self.forward_sampling_to_client(&create_params).await {
                Ok(value) => {
                    let _ = self.sampling.complete_externally(&id).await;
                    Ok(value)
                }
                Err(err) => {
                    let _ = self.sampling.fail_externally(&id).await;
                    Err(err)
                }
            },
            Err(err) => {
                let _ = self.sampling.fail_externally(&id).await;
                Err(err)
            }
        }
    }

    async fn forward_sampling_to_client(&self, params: &CreateMessageParams) -> McpResult<Value> {
        let target = self
            .clients
            .read()
            .await
            .values()
            .find(|c| c.client_capabilities().is_some_and(|caps| caps.sampling.is_some()))
            .cloned();
        let Some(client) = target else {
            return Err(McpError::execution_error(
                "no sampling handler registered and no connected client advertises sampling",
            ));
        };
        client
            .call("sampling/createMessage", Some(serde_json::to_value(params).map_err(encode_err)?))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespaced_uri_roundtrips_through_split() {
        let namespaced = namespaced_uri("weather", "file:///forecast.json");
        assert_eq!(namespaced, "mux:weather:file:///forecast.json");
        let (backend, uri) = split_namespaced_uri(&namespaced).unwrap();
        assert_eq!(backend, "weather");
        assert_eq!(uri, "file:///forecast.json");
    }

    #[test]
    fn namespaced_name_roundtrips_through_split() {
        let namespaced = namespaced_name("weather", "get_forecast");
        let (backend, name) = split_namespaced_name(&namespaced).unwrap();
        assert_eq!(backend, "weather");
        assert_eq!(name, "get_forecast");
    }

    #[test]
    fn split_namespaced_uri_rejects_unprefixed_uris() {
        assert!(split_namespaced_uri("file:///forecast.json").is_none());
    }

    fn tool_with_schema(schema: Value) -> Tool {
        Tool {
            name: "get_forecast".to_owned(),
            description: None,
            input_schema: schema,
        }
    }

    #[test]
    fn validate_tool_arguments_accepts_conforming_input() {
        let tool = tool_with_schema(serde_json::json!({
            "type": "object",
            "properties": {"city": {"type": "string"}},
            "required": ["city"]
        }));
        assert!(validate_tool_arguments(&tool, Some(&serde_json::json!({"city": "Boston"}))).is_ok());
    }

    #[test]
    fn validate_tool_arguments_rejects_missing_required_field() {
        let tool = tool_with_schema(serde_json::json!({
            "type": "object",
            "properties": {"city": {"type": "string"}},
            "required": ["city"]
        }));
        let err = validate_tool_arguments(&tool, Some(&serde_json::json!({}))).unwrap_err();
        assert_eq!(err.code, McpErrorCode::ValidationError);
    }

    #[test]
    fn validate_tool_arguments_treats_absent_arguments_as_null() {
        let tool = tool_with_schema(serde_json::json!({"type": "object"}));
        assert!(validate_tool_arguments(&tool, None).is_ok());
    }
}
