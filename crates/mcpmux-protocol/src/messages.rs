//! Request and response payloads for every MCP method, plus the
//! server-to-client notifications the engine emits.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::jsonrpc::RequestId;
use crate::types::{
    BatchInfo, ClientCapabilities, ClientInfo, Content, ModelPreferences, Prompt, PromptMessage,
    Resource, ResourceContent, ResourceTemplate, ResourceUpdateType, Role, ServerCapabilities,
    ServerInfo, SubscriptionFilter, SubscriptionOptions, Tool,
};

/// Correlates progress notifications with the request that requested them.
/// Per the MCP schema, either a string or an integer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProgressToken {
    /// String token.
    String(String),
    /// Integer token.
    Number(i64),
}

impl From<String> for ProgressToken {
    fn from(s: String) -> Self {
        ProgressToken::String(s)
    }
}

impl From<&str> for ProgressToken {
    fn from(s: &str) -> Self {
        ProgressToken::String(s.to_owned())
    }
}

impl From<i64> for ProgressToken {
    fn from(n: i64) -> Self {
        ProgressToken::Number(n)
    }
}

impl std::fmt::Display for ProgressToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProgressToken::String(s) => write!(f, "{s}"),
            ProgressToken::Number(n) => write!(f, "{n}"),
        }
    }
}

/// `_meta` carried on any request, currently only used for progress opt-in.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestMeta {
    /// Progress token the caller wants updates delivered against.
    #[serde(rename = "progressToken", skip_serializing_if = "Option::is_none")]
    pub progress_token: Option<ProgressToken>,
}

// ---------------------------------------------------------------------------
// initialize
// ---------------------------------------------------------------------------

/// `initialize` request params.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeParams {
    /// Protocol version the client requests.
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    /// Client capabilities.
    pub capabilities: ClientCapabilities,
    /// Client identification.
    #[serde(rename = "clientInfo")]
    pub client_info: ClientInfo,
    /// Filesystem/URL roots the client exposes to the server. Registered
    /// read + list (never write); when absent or empty, the server falls
    /// back to a default `file://<cwd>` root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roots: Option<Vec<crate::types::Root>>,
}

/// `initialize` response result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeResult {
    /// Protocol version the server accepted.
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    /// Server capabilities.
    pub capabilities: ServerCapabilities,
    /// Server identification.
    #[serde(rename = "serverInfo")]
    pub server_info: ServerInfo,
    /// The roots registered for this session (client-supplied, or the
    /// default `file://<cwd>` root when none were supplied).
    pub roots: Vec<crate::types::Root>,
    /// Optional free-text instructions for the client.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

// ---------------------------------------------------------------------------
// ping / roots
// ---------------------------------------------------------------------------

/// `ping` response result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingResult {
    /// Unix timestamp (seconds) the server answered at.
    pub timestamp: i64,
    /// Always `"ok"`.
    pub status: String,
    /// The engine's reported version string.
    pub version: String,
}

/// `roots/list` response result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListRootsResult {
    /// Registered roots for the calling session.
    pub roots: Vec<crate::types::Root>,
}

// ---------------------------------------------------------------------------
// tools
// ---------------------------------------------------------------------------

/// `tools/list` request params.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListToolsParams {
    /// Opaque pagination cursor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

/// `tools/list` response result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListToolsResult {
    /// Available tools.
    pub tools: Vec<Tool>,
    /// Cursor to continue pagination, if more tools remain.
    #[serde(rename = "nextCursor", skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// `tools/call` request params.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolParams {
    /// Tool name.
    pub name: String,
    /// Tool arguments, validated against the tool's input schema.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
    /// Request metadata (progress token, etc).
    #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<RequestMeta>,
}

/// `tools/call` response result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolResult {
    /// Output content blocks.
    pub content: Vec<Content>,
    /// Whether the tool reported failure (content still carries details).
    #[serde(
        rename = "isError",
        default,
        skip_serializing_if = "std::ops::Not::not"
    )]
    pub is_error: bool,
}

// ---------------------------------------------------------------------------
// resources
// ---------------------------------------------------------------------------

/// `resources/list` request params.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListResourcesParams {
    /// Opaque pagination cursor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

/// `resources/list` response result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResourcesResult {
    /// Available resources.
    pub resources: Vec<Resource>,
    /// Cursor to continue pagination, if more resources remain.
    #[serde(rename = "nextCursor", skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// `resources/templates/list` request params.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListResourceTemplatesParams {
    /// Opaque pagination cursor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

/// `resources/templates/list` response result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResourceTemplatesResult {
    /// Available resource templates.
    #[serde(rename = "resourceTemplates")]
    pub resource_templates: Vec<ResourceTemplate>,
}

/// `resources/read` request params.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadResourceParams {
    /// URI of the resource to read.
    pub uri: String,
    /// Request metadata (progress token, etc).
    #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<RequestMeta>,
}

/// `resources/read` response result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadResourceResult {
    /// Resource body, one entry per matched URI (templates may expand to
    /// more than one).
    pub contents: Vec<ResourceContent>,
}

/// `resources/subscribe` request params.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscribeResourceParams {
    /// URI or URI template to subscribe to.
    pub uri: String,
    /// Filters narrowing which updates are delivered.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<SubscriptionFilter>,
    /// Delivery options (batching, debouncing).
    #[serde(default)]
    pub options: SubscriptionOptions,
}

/// `resources/subscribe` response result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscribeResourceResult {
    /// Identifier of the created subscription.
    #[serde(rename = "subscriptionId")]
    pub subscription_id: String,
}

/// `resources/unsubscribe` request params.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnsubscribeResourceParams {
    /// Identifier of the subscription to remove.
    #[serde(rename = "subscriptionId")]
    pub subscription_id: String,
}

// ---------------------------------------------------------------------------
// prompts
// ---------------------------------------------------------------------------

/// `prompts/list` request params.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListPromptsParams {
    /// Opaque pagination cursor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

/// `prompts/list` response result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListPromptsResult {
    /// Available prompts.
    pub prompts: Vec<Prompt>,
    /// Cursor to continue pagination, if more prompts remain.
    #[serde(rename = "nextCursor", skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// `prompts/get` request params.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetPromptParams {
    /// Prompt name.
    pub name: String,
    /// Prompt arguments, keyed by argument name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<HashMap<String, String>>,
    /// Request metadata (progress token, etc).
    #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<RequestMeta>,
}

/// `prompts/get` response result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetPromptResult {
    /// Optional description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Rendered prompt messages.
    pub messages: Vec<PromptMessage>,
}

// ---------------------------------------------------------------------------
// logging
// ---------------------------------------------------------------------------

/// Logging levels per the MCP `logging/setLevel` method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Debug level.
    Debug,
    /// Info level.
    Info,
    /// Warning level.
    Warning,
    /// Error level.
    Error,
}

/// `logging/setLevel` request params.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetLogLevelParams {
    /// The minimum level the client wants to receive.
    pub level: LogLevel,
}

// ---------------------------------------------------------------------------
// notifications
// ---------------------------------------------------------------------------

/// `$/cancelled` notification params.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelledParams {
    /// The id of the request to cancel.
    #[serde(rename = "requestId")]
    pub request_id: RequestId,
    /// Optional human-readable reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Whether the sender wants to await cleanup before proceeding.
    #[serde(rename = "awaitCleanup", skip_serializing_if = "Option::is_none")]
    pub await_cleanup: Option<bool>,
}

/// `notifications/progress` params.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressParams {
    /// Token from the original request's `_meta.progressToken`.
    #[serde(rename = "progressToken")]
    pub progress_token: ProgressToken,
    /// Progress value; `0..=1`, or `-1` to signal failure.
    pub progress: f64,
    /// Known total, for determinate progress.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,
    /// Status message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ProgressParams {
    /// Creates a bare progress notification.
    #[must_use]
    pub fn new(token: impl Into<ProgressToken>, progress: f64) -> Self {
        Self {
            progress_token: token.into(),
            progress,
            total: None,
            message: None,
        }
    }

    /// Creates a progress notification against a known total.
    #[must_use]
    pub fn with_total(token: impl Into<ProgressToken>, progress: f64, total: f64) -> Self {
        Self {
            progress_token: token.into(),
            progress,
            total: Some(total),
            message: None,
        }
    }

    /// Attaches a status message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Progress expressed as a fraction of `total`, if known.
    #[must_use]
    pub fn fraction(&self) -> Option<f64> {
        self.total
            .map(|t| if t > 0.0 { self.progress / t } else { 0.0 })
    }
}

/// `notifications/resources/updated` params.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceUpdatedNotificationParams {
    /// Updated resource URI.
    pub uri: String,
    /// The kind of change.
    #[serde(rename = "type")]
    pub update_type: ResourceUpdateType,
    /// The resource body, when the update includes new content.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<ResourceContent>,
    /// Metadata relevant to subscriber filters (e.g. `mimeType`, tags).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
    /// Present when this delivery is part of a batched sequence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch: Option<BatchInfo>,
}

/// `notifications/message` (log) params.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogMessageParams {
    /// Log level.
    pub level: LogLevel,
    /// Logger name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logger: Option<String>,
    /// Structured log payload.
    pub data: Value,
}

// ---------------------------------------------------------------------------
// sampling
// ---------------------------------------------------------------------------

/// A single message in a sampling conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingMessage {
    /// Speaker role.
    pub role: Role,
    /// Message content.
    pub content: SamplingContent,
}

/// Content of a sampling message (text or image; no embedded-resource
/// variant, unlike [`Content`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SamplingContent {
    /// Plain text.
    Text {
        /// The text.
        text: String,
    },
    /// An inline image.
    Image {
        /// Base64-encoded image bytes.
        data: String,
        /// Image MIME type.
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
}

/// Why generation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StopReason {
    /// The model reached a natural stopping point.
    EndTurn,
    /// A configured stop sequence was matched.
    StopSequence,
    /// The token budget was exhausted.
    MaxTokens,
}

/// How much MCP-server context to include alongside a sampling request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IncludeContext {
    /// No MCP context.
    None,
    /// Context from the originating server only.
    ThisServer,
    /// Context from every connected server.
    AllServers,
}

/// `sampling/createMessage` request params.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMessageParams {
    /// Conversation messages.
    pub messages: Vec<SamplingMessage>,
    /// Maximum tokens to generate.
    #[serde(rename = "maxTokens")]
    pub max_tokens: u32,
    /// Optional system prompt.
    #[serde(rename = "systemPrompt", skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Stop sequences.
    #[serde(
        rename = "stopSequences",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub stop_sequences: Vec<String>,
    /// Model selection preferences.
    #[serde(rename = "modelPreferences", skip_serializing_if = "Option::is_none")]
    pub model_preferences: Option<ModelPreferences>,
    /// How much MCP context to attach.
    #[serde(rename = "includeContext", skip_serializing_if = "Option::is_none")]
    pub include_context: Option<IncludeContext>,
    /// Request metadata.
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<RequestMeta>,
}

impl CreateMessageParams {
    /// Creates a request with default options.
    #[must_use]
    pub fn new(messages: Vec<SamplingMessage>, max_tokens: u32) -> Self {
        Self {
            messages,
            max_tokens,
            system_prompt: None,
            temperature: None,
            stop_sequences: Vec::new(),
            model_preferences: None,
            include_context: None,
            meta: None,
        }
    }

    /// Sets the system prompt.
    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Sets the sampling temperature.
    #[must_use]
    pub fn with_temperature(mut self, temp: f64) -> Self {
        self.temperature = Some(temp);
        self
    }

    /// Sets the stop sequences.
    #[must_use]
    pub fn with_stop_sequences(mut self, sequences: Vec<String>) -> Self {
        self.stop_sequences = sequences;
        self
    }
}

/// `sampling/createMessage` response result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMessageResult {
    /// Generated content.
    pub content: SamplingContent,
    /// Always [`Role::Assistant`].
    pub role: Role,
    /// The model that produced the completion.
    pub model: String,
    /// Why generation stopped.
    #[serde(rename = "stopReason")]
    pub stop_reason: StopReason,
}

impl CreateMessageResult {
    /// Creates a text completion result with [`StopReason::EndTurn`].
    #[must_use]
    pub fn text(text: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            content: SamplingContent::Text { text: text.into() },
            role: Role::Assistant,
            model: model.into(),
            stop_reason: StopReason::EndTurn,
        }
    }

    /// Overrides the stop reason.
    #[must_use]
    pub fn with_stop_reason(mut self, reason: StopReason) -> Self {
        self.stop_reason = reason;
        self
    }

    /// The text content, if this result carries text.
    #[must_use]
    pub fn text_content(&self) -> Option<&str> {
        match &self.content {
            SamplingContent::Text { text } => Some(text),
            SamplingContent::Image { .. } => None,
        }
    }
}
