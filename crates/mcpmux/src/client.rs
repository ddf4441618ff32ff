//! A downstream client connection: a session/dispatcher pair bound to one
//! transport, wired to the shared [`Orchestrator`] for every non-standard
//! method, and doubling as a [`SubscriptionSink`]/[`ChangeSubscriber`] so
//! the engine's fan-out managers can reach it directly.

use std::sync::Arc;

use mcpmux_core::{log_session, McpError, McpResult};
use mcpmux_engine::{ChangeSubscriber, Dispatcher, RootManager, Session, SubscriptionSink};
use mcpmux_protocol::jsonrpc::{JsonRpcMessage, JsonRpcRequest, JsonRpcResponse};
use mcpmux_protocol::messages::ResourceUpdatedNotificationParams;
use mcpmux_protocol::types::{BatchInfo, ClientCapabilities, ServerInfo};
use mcpmux_transport::Transport;
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::orchestrator::Orchestrator;
use crate::pending::{await_response, PendingCalls};
use mcpmux_engine::subscription::ResourceUpdate;

const OUTBOUND_QUEUE_CAPACITY: usize = 100;

/// One connected downstream client: the peer mcpmux serves an aggregated
/// tool/resource/prompt catalog to.
pub struct ClientConnection {
    id: String,
    dispatcher: Arc<Dispatcher>,
    pending: Arc<PendingCalls>,
    outbound: mpsc::Sender<JsonRpcMessage>,
    reader: Mutex<Option<JoinHandle<()>>>,
    writer: Mutex<Option<JoinHandle<()>>>,
}

impl ClientConnection {
    /// Accepts a freshly connected transport as a downstream client: builds
    /// the session/dispatcher pair, registers method handlers that delegate
    /// to `orchestrator`, and spawns the reader/writer tasks.
    pub async fn accept(
        id: impl Into<String>,
        transport: Arc<dyn Transport>,
        orchestrator: Arc<Orchestrator>,
        server_info: ServerInfo,
    ) -> Arc<Self> {
        let id = id.into();
        let session = Arc::new(Session::new(id.clone(), orchestrator.aggregated_capabilities().await));
        let roots = Arc::new(RootManager::new());
        let dispatcher = Arc::new(Dispatcher::new(session, roots, server_info, env!("CARGO_PKG_VERSION")));

        let (out_tx, mut out_rx) = mpsc::channel::<JsonRpcMessage>(OUTBOUND_QUEUE_CAPACITY);
        let connection = Arc::new(Self {
            id: id.clone(),
            dispatcher: dispatcher.clone(),
            pending: Arc::new(PendingCalls::new()),
            outbound: out_tx.clone(),
            reader: Mutex::new(None),
            writer: Mutex::new(None),
        });

        crate::handlers::register(&dispatcher, orchestrator.clone(), &id).await;

        let writer = {
            let transport = transport.clone();
            let id = id.clone();
            tokio::spawn(async move {
                while let Some(message) = out_rx.recv().await {
                    if transport.send(&message).await.is_err() {
                        log_session!(log::Level::Warn, "client {id} write failed, closing");
                        break;
                    }
                }
            })
        };

        let reader = {
            let transport = transport.clone();
            let connection = connection.clone();
            let orchestrator = orchestrator.clone();
            let out_tx = out_tx.clone();
            tokio::spawn(async move {
                loop {
                    match transport.recv().await {
                        Ok(JsonRpcMessage::Request(request)) if request.is_notification() => {
                            connection.dispatcher.handle_notification(request).await;
                        }
                        Ok(JsonRpcMessage::Request(request)) => {
                            let response = connection.dispatcher.handle_request(request).await;
                            if out_tx.send(JsonRpcMessage::Response(response)).await.is_err() {
                                break;
                            }
                        }
                        Ok(JsonRpcMessage::Response(response)) => {
                            connection.pending.resolve(response);
                        }
                        Err(_) => break,
                    }
                }
                let _ = transport.close().await;
                connection.pending.cancel_all();
                orchestrator.remove_client(&connection.id).await;
            })
        };

        *connection.reader.lock().await = Some(reader);
        *connection.writer.lock().await = Some(writer);
        connection
    }

    /// This connection's client id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The client's negotiated capabilities, once initialized.
    #[must_use]
    pub fn client_capabilities(&self) -> Option<ClientCapabilities> {
        self.dispatcher.session().client_capabilities()
    }

    /// Sends a server-initiated request to this client (e.g.
    /// `sampling/createMessage` proxied from a backend), awaiting the
    /// correlated response.
    pub async fn call(&self, method: &str, params: Option<Value>) -> McpResult<Value> {
        let id = self.pending.next_id();
        let rx = self.pending.register(id.clone());
        let request = JsonRpcRequest::new(method, params, id);
        self.outbound
            .send(JsonRpcMessage::Request(request))
            .await
            .map_err(|_| McpError::transport_error("client connection closed"))?;
        let response = await_response(rx).await?;
        match response.error {
            Some(err) => Err(McpError::new(
                mcpmux_core::McpErrorCode::from_code(err.code).unwrap_or(mcpmux_core::McpErrorCode::ExecutionError),
                err.message,
            )),
            None => Ok(response.result.unwrap_or(Value::Null)),
        }
    }

    /// Best-effort push of a one-way notification (no response awaited).
    fn push_notification(&self, method: &str, params: Option<Value>) -> Result<(), String> {
        self.outbound
            .try_send(JsonRpcMessage::Request(JsonRpcRequest::notification(method, params)))
            .map_err(|e| e.to_string())
    }

    /// Closes the underlying transport and reader/writer tasks.
    pub async fn close(&self) {
        if let Some(handle) = self.reader.lock().await.take() {
            handle.abort();
        }
        if let Some(handle) = self.writer.lock().await.take() {
            handle.abort();
        }
    }
}

impl SubscriptionSink for ClientConnection {
    fn client_id(&self) -> &str {
        &self.id
    }

    fn deliver(&self, subscription_id: &str, update: &ResourceUpdate, batch: Option<&BatchInfo>) {
        let params = ResourceUpdatedNotificationParams {
            uri: update.uri.clone(),
            update_type: update.update_type,
            content: None,
            metadata: update
                .metadata
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect(),
            batch: batch.cloned(),
        };
        let Ok(value) = serde_json::to_value(params) else {
            return;
        };
        if self.push_notification("notifications/resources/updated", Some(value)).is_err() {
            log_session!(
                log::Level::Warn,
                "resources/updated delivery to {} for subscription {} dropped: queue full or closed",
                self.id,
                subscription_id
            );
        }
    }
}

impl ChangeSubscriber for ClientConnection {
    fn id(&self) -> &str {
        &self.id
    }

    fn notify_tools_changed(&self, server: &str) -> Result<(), String> {
        self.push_notification("notifications/tools/list_changed", Some(serde_json::json!({ "server": server })))
    }

    fn notify_prompts_changed(&self, server: &str) -> Result<(), String> {
        self.push_notification("notifications/prompts/list_changed", Some(serde_json::json!({ "server": server })))
    }
}
