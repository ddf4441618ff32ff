//! Non-standard method handlers (`tools/*`, `resources/*`, `prompts/*`)
//! registered on every client's [`Dispatcher`], each delegating to the
//! shared [`Orchestrator`] and namespacing/un-namespacing names and URIs at
//! the boundary.

use std::sync::Arc;

use mcpmux_core::{McpContext, McpError, McpResult};
use mcpmux_engine::{BoxFuture, Dispatcher, MethodHandler};
use mcpmux_protocol::messages::{
    CallToolParams, GetPromptParams, GetPromptResult, ListPromptsResult, ListResourceTemplatesResult,
    ListResourcesResult, ListToolsResult, ReadResourceParams, SubscribeResourceParams, SubscribeResourceResult,
    UnsubscribeResourceParams,
};
use serde_json::Value;

use crate::orchestrator::Orchestrator;

fn parse_params<T: serde::de::DeserializeOwned>(params: Option<Value>) -> McpResult<T> {
    serde_json::from_value(params.unwrap_or(Value::Null)).map_err(|e| McpError::invalid_params(e.to_string()))
}

fn encode(value: impl serde::Serialize) -> McpResult<Value> {
    serde_json::to_value(value).map_err(|e| McpError::internal_error(e.to_string()))
}

struct ToolsListHandler {
    orchestrator: Arc<Orchestrator>,
}

impl MethodHandler for ToolsListHandler {
    fn call<'a>(&'a self, _ctx: McpContext, _params: Option<Value>) -> BoxFuture<'a, McpResult<Value>> {
        Box::pin(async move {
            let tools = self.orchestrator.list_tools().await;
            encode(ListToolsResult { tools, next_cursor: None })
        })
    }
}

struct ToolsCallHandler {
    orchestrator: Arc<Orchestrator>,
}

impl MethodHandler for ToolsCallHandler {
    fn call<'a>(&'a self, _ctx: McpContext, params: Option<Value>) -> BoxFuture<'a, McpResult<Value>> {
        Box::pin(async move {
            let params: CallToolParams = parse_params(params)?;
            let result = self.orchestrator.call_tool(&params.name, params.arguments).await?;
            encode(result)
        })
    }
}

struct ResourcesListHandler {
    orchestrator: Arc<Orchestrator>,
}

impl MethodHandler for ResourcesListHandler {
    fn call<'a>(&'a self, _ctx: McpContext, _params: Option<Value>) -> BoxFuture<'a, McpResult<Value>> {
        Box::pin(async move {
            let resources = self.orchestrator.list_resources().await;
            encode(ListResourcesResult { resources, next_cursor: None })
        })
    }
}

struct ResourceTemplatesListHandler {
    orchestrator: Arc<Orchestrator>,
}

impl MethodHandler for ResourceTemplatesListHandler {
    fn call<'a>(&'a self, _ctx: McpContext, _params: Option<Value>) -> BoxFuture<'a, McpResult<Value>> {
        Box::pin(async move {
            let resource_templates = self.orchestrator.list_resource_templates().await;
            encode(ListResourceTemplatesResult { resource_templates })
        })
    }
}

struct ResourcesReadHandler {
    orchestrator: Arc<Orchestrator>,
}

impl MethodHandler for ResourcesReadHandler {
    fn call<'a>(&'a self, _ctx: McpContext, params: Option<Value>) -> BoxFuture<'a, McpResult<Value>> {
        Box::pin(async move {
            let params: ReadResourceParams = parse_params(params)?;
            let result = self.orchestrator.read_resource(&params.uri).await?;
            encode(result)
        })
    }
}

struct ResourcesSubscribeHandler {
    orchestrator: Arc<Orchestrator>,
    client_id: String,
}

impl MethodHandler for ResourcesSubscribeHandler {
    fn call<'a>(&'a self, _ctx: McpContext, params: Option<Value>) -> BoxFuture<'a, McpResult<Value>> {
        Box::pin(async move {
            let params: SubscribeResourceParams = parse_params(params)?;
            let subscription_id = self
                .orchestrator
                .subscribe_resource(&self.client_id, &self.client_id, &params.uri, params.filters, params.options)
                .await?;
            encode(SubscribeResourceResult { subscription_id })
        })
    }
}

struct ResourcesUnsubscribeHandler {
    orchestrator: Arc<Orchestrator>,
    client_id: String,
}

impl MethodHandler for ResourcesUnsubscribeHandler {
    fn call<'a>(&'a self, _ctx: McpContext, params: Option<Value>) -> BoxFuture<'a, McpResult<Value>> {
        Box::pin(async move {
            let params: UnsubscribeResourceParams = parse_params(params)?;
            self.orchestrator
                .unsubscribe_resource(&self.client_id, &params.subscription_id)
                .await?;
            encode(serde_json::json!({}))
        })
    }
}

struct PromptsListHandler {
    orchestrator: Arc<Orchestrator>,
}

impl MethodHandler for PromptsListHandler {
    fn call<'a>(&'a self, _ctx: McpContext, _params: Option<Value>) -> BoxFuture<'a, McpResult<Value>> {
        Box::pin(async move {
            let prompts = self.orchestrator.list_prompts().await;
            encode(ListPromptsResult { prompts })
        })
    }
}

struct PromptsGetHandler {
    orchestrator: Arc<Orchestrator>,
}

impl MethodHandler for PromptsGetHandler {
    fn call<'a>(&'a self, _ctx: McpContext, params: Option<Value>) -> BoxFuture<'a, McpResult<Value>> {
        Box::pin(async move {
            let params: GetPromptParams = parse_params(params)?;
            let result: GetPromptResult = self.orchestrator.get_prompt(&params.name, params.arguments).await?;
            encode(result)
        })
    }
}

/// Registers every non-standard method this orchestrator answers on behalf
/// of `client_id`'s dispatcher. Called once per accepted client connection
/// (see [`crate::client::ClientConnection::accept`]).
pub async fn register(dispatcher: &Arc<Dispatcher>, orchestrator: Arc<Orchestrator>, client_id: &str) {
    dispatcher
        .register_handler(
            "tools/list",
            Arc::new(ToolsListHandler {
                orchestrator: orchestrator.clone(),
            }),
        )
        .await;
    dispatcher
        .register_handler(
            "tools/call",
            Arc::new(ToolsCallHandler {
                orchestrator: orchestrator.clone(),
            }),
        )
        .await;
    dispatcher
        .register_handler(
            "resources/list",
            Arc::new(ResourcesListHandler {
                orchestrator: orchestrator.clone(),
            }),
        )
        .await;
    dispatcher
        .register_handler(
            "resources/templates/list",
            Arc::new(ResourceTemplatesListHandler {
                orchestrator: orchestrator.clone(),
            }),
        )
        .await;
    dispatcher
        .register_handler(
            "resources/read",
            Arc::new(ResourcesReadHandler {
                orchestrator: orchestrator.clone(),
            }),
        )
        .await;
    dispatcher
        .register_handler(
            "resources/subscribe",
            Arc::new(ResourcesSubscribeHandler {
                orchestrator: orchestrator.clone(),
                client_id: client_id.to_owned(),
            }),
        )
        .await;
    dispatcher
        .register_handler(
            "resources/unsubscribe",
            Arc::new(ResourcesUnsubscribeHandler {
                orchestrator: orchestrator.clone(),
                client_id: client_id.to_owned(),
            }),
        )
        .await;
    dispatcher
        .register_handler(
            "prompts/list",
            Arc::new(PromptsListHandler {
                orchestrator: orchestrator.clone(),
            }),
        )
        .await;
    dispatcher
        .register_handler(
            "prompts/get",
            Arc::new(PromptsGetHandler { orchestrator }),
        )
        .await;
}
