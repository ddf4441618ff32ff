//! MCP protocol types: capabilities, tool/resource/prompt definitions, and
//! the richer domain models (resources, roots, subscriptions, sampling
//! requests) that the engine's managers operate on.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// MCP protocol version this engine negotiates.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Server capabilities advertised during initialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerCapabilities {
    /// Tool-related capabilities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolsCapability>,
    /// Resource-related capabilities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourcesCapability>,
    /// Prompt-related capabilities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompts: Option<PromptsCapability>,
    /// Logging capability.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingCapability>,
}

impl ServerCapabilities {
    /// Whether the given dotted capability path (e.g. `"resources.subscribe"`)
    /// is advertised. Used by `validateCapabilities`.
    #[must_use]
    pub fn has(&self, path: &str) -> bool {
        match path {
            "tools" => self.tools.is_some(),
            "tools.listChanged" => self.tools.as_ref().is_some_and(|t| t.list_changed),
            "resources" => self.resources.is_some(),
            "resources.subscribe" => self.resources.as_ref().is_some_and(|r| r.subscribe),
            "resources.listChanged" => self.resources.as_ref().is_some_and(|r| r.list_changed),
            "prompts" => self.prompts.is_some(),
            "prompts.listChanged" => self.prompts.as_ref().is_some_and(|p| p.list_changed),
            "logging" => self.logging.is_some(),
            _ => false,
        }
    }
}

/// Tool capabilities.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsCapability {
    /// Whether the server emits `notifications/tools/list_changed`.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub list_changed: bool,
}

/// Resource capabilities.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourcesCapability {
    /// Whether the server supports `resources/subscribe`.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub subscribe: bool,
    /// Whether the server emits `notifications/resources/list_changed`.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub list_changed: bool,
}

/// Prompt capabilities.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptsCapability {
    /// Whether the server emits `notifications/prompts/list_changed`.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub list_changed: bool,
}

/// Logging capability (no sub-options at this protocol version).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingCapability {}

/// Client capabilities.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientCapabilities {
    /// Sampling capability (server-initiated LLM generation via the client).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampling: Option<SamplingCapability>,
    /// Roots capability (filesystem roots the client exposes).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roots: Option<RootsCapability>,
}

/// Sampling capability.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SamplingCapability {}

/// Roots capability.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RootsCapability {
    /// Whether the client emits `notifications/roots/list_changed`.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub list_changed: bool,
}

/// Server identification sent during `initialize`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    /// Server name.
    pub name: String,
    /// Server version.
    pub version: String,
}

/// Client identification sent during `initialize`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    /// Client name.
    pub name: String,
    /// Client version.
    pub version: String,
}

/// Tool definition as returned by `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    /// Tool name, unique within a server.
    pub name: String,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema describing the tool's `arguments` object.
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Permission matrix checked by [`crate::McpErrorCode::AuthorizationError`]
/// paths in the root manager.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RootPermissions {
    /// May read file contents / resource bodies under this root.
    #[serde(default)]
    pub read: bool,
    /// May create, update, or delete under this root.
    #[serde(default)]
    pub write: bool,
    /// May enumerate entries under this root.
    #[serde(default)]
    pub list: bool,
    /// May register filesystem watches under this root.
    #[serde(default)]
    pub watch: bool,
}

impl RootPermissions {
    /// The default permission set granted to a client-supplied root:
    /// read and list, but not write or watch.
    #[must_use]
    pub fn default_grant() -> Self {
        Self {
            read: true,
            write: false,
            list: true,
            watch: false,
        }
    }
}

/// A filesystem or URL root the client has exposed to the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Root {
    /// Root URI: `file://` (path required), `http(s)://` (host required), or
    /// an absolute local path.
    pub uri: String,
    /// Human-readable name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Derived permission matrix, not sent over the wire.
    #[serde(skip)]
    pub permissions: RootPermissions,
}

/// Auto-derived MIME type and content digest for a resource body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceContentMeta {
    /// Content digest (hex-encoded SHA-256 of the body), used for change
    /// detection and cache validation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

/// Cache policy and state attached to a resource.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceCache {
    /// Whether this resource participates in the content cache.
    #[serde(default)]
    pub enabled: bool,
    /// Time-to-live in seconds; `0` disables expiry while still caching.
    #[serde(default)]
    pub ttl: u64,
}

/// Strategy used when embedding a resource body into a prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingStrategy {
    /// Embed the full body inline.
    Inline,
    /// Embed only a URI reference.
    Reference,
    /// Embed a truncated summary.
    Summary,
}

/// Embedding policy for a resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceEmbedding {
    /// Maximum body size, in bytes, eligible for `inline` embedding.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_size: Option<u64>,
    /// Strategy to fall back to when `inline` exceeds `max_size`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<EmbeddingStrategy>,
}

/// A resource definition as returned by `resources/list` and operated on by
/// the resource manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    /// Resource URI.
    pub uri: String,
    /// Resource name.
    pub name: String,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// MIME type, auto-derived from the URI extension when absent.
    #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Body size in bytes.
    #[serde(default)]
    pub size: u64,
    /// The resource body, when loaded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<ResourceContent>,
    /// Free-form metadata (tags, custom properties used by subscription
    /// filters).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
    /// Client-facing annotations (audience, priority) per the MCP schema.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Value>,
    /// Set when this resource was materialized from a [`ResourceTemplate`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    /// Embedding policy used by `EmbedResourceInPrompt`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<ResourceEmbedding>,
    /// Cache policy for this resource.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<ResourceCache>,
    /// Unix timestamp (seconds) the resource was first registered.
    pub created: i64,
    /// Unix timestamp (seconds) of the last content modification.
    pub modified: i64,
    /// Unix timestamp (seconds) of the last read access.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accessed: Option<i64>,
}

/// Resource template definition as returned by `resources/templates/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceTemplate {
    /// URI template (RFC 6570).
    #[serde(rename = "uriTemplate")]
    pub uri_template: String,
    /// Template name.
    pub name: String,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// MIME type of resources materialized from this template.
    #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// Prompt definition as returned by `prompts/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prompt {
    /// Prompt name.
    pub name: String,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Accepted arguments.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<PromptArgument>,
}

/// A single prompt argument.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptArgument {
    /// Argument name.
    pub name: String,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Whether the argument must be supplied.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub required: bool,
}

/// Content block carried in tool results and prompt messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Content {
    /// Plain text.
    Text {
        /// The text content.
        text: String,
    },
    /// An inline image.
    Image {
        /// Base64-encoded image bytes.
        data: String,
        /// Image MIME type, e.g. `"image/png"`.
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    /// An embedded resource reference.
    Resource {
        /// The embedded resource body.
        resource: ResourceContent,
    },
}

/// The body of a resource, as embedded in `resources/read` results or
/// `Content::Resource` blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceContent {
    /// Resource URI.
    pub uri: String,
    /// MIME type.
    #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// UTF-8 text body, when the resource is text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Base64-encoded binary body, when the resource is binary.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blob: Option<String>,
}

/// Speaker role in a prompt or sampling message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The human user.
    User,
    /// The LLM assistant.
    Assistant,
}

/// A single message in a prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptMessage {
    /// Speaker role.
    pub role: Role,
    /// Message content.
    pub content: Content,
}

/// Filter kinds evaluated by the subscription manager against a resource
/// update's `{type, uri, mimeType, size, <metadata property>}` tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterKind {
    /// Property value equals `value` exactly.
    Exact,
    /// Property value starts with `value`.
    Prefix,
    /// Property value matches `value` as a glob pattern.
    Glob,
    /// Property value matches `value` as a regular expression.
    Regex,
}

/// A single subscription filter clause.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionFilter {
    /// The property being filtered, e.g. `"mimeType"` or a metadata key.
    pub property: String,
    /// The filter kind.
    #[serde(rename = "type")]
    pub kind: FilterKind,
    /// The value to compare against.
    pub value: String,
}

/// Delivery options attached to a subscription.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubscriptionOptions {
    /// When `> 0`, updates are delivered in batches of this size.
    #[serde(default)]
    pub batch_size: usize,
    /// When `> 0`, bursts of updates within this many milliseconds are
    /// coalesced into a single delivery.
    #[serde(default)]
    pub debounce_ms: u64,
}

/// Batch metadata attached to a `notifications/resources/updated` payload
/// when the owning subscription requested batching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchInfo {
    /// Total number of updates in this batch sequence.
    pub total: usize,
    /// 1-based index of this delivery within the sequence.
    pub current: usize,
    /// Identifier shared by every delivery in the sequence.
    pub batch_id: String,
    /// Whether this is the final delivery in the sequence.
    pub last_batch: bool,
}

/// The kind of event associated with a resource-update notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceUpdateType {
    /// A new resource was registered.
    Created,
    /// An existing resource's content or metadata changed.
    Updated,
    /// A resource was removed.
    Deleted,
}

/// Preference hints for sampling model selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelPreferences {
    /// Ordered model name hints; the first with a registered handler wins.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hints: Vec<String>,
    /// Relative priority of cost (0..1).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_priority: Option<f64>,
    /// Relative priority of speed (0..1).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed_priority: Option<f64>,
    /// Relative priority of intelligence (0..1).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intelligence_priority: Option<f64>,
}

/// Lifecycle status of a [`SamplingRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingStatus {
    /// Newly submitted, not yet evaluated against approval policy.
    Pending,
    /// Held for a human decision.
    AwaitingApproval,
    /// Approved (automatically or by a human) and eligible for execution.
    Approved,
    /// Rejected by a human reviewer. Terminal.
    Rejected,
    /// Executed successfully. Terminal.
    Completed,
    /// Execution failed. Terminal.
    Failed,
}

impl SamplingStatus {
    /// Whether this status is terminal (no further transitions are valid).
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SamplingStatus::Completed | SamplingStatus::Failed | SamplingStatus::Rejected
        )
    }
}

/// A record of a human reviewer's decision on a sampling request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HumanReview {
    /// Identifier of the reviewer who made the decision.
    pub reviewer: String,
    /// Unix timestamp (seconds) the decision was recorded.
    pub review_time: i64,
    /// Optional free-text comments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
}

/// A server-initiated LLM sampling request routed through the client,
/// tracked by the sampling manager across its approval lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingRequest {
    /// Unique request identifier.
    pub id: String,
    /// Name of the server that originated the request.
    pub server_name: String,
    /// Conversation messages to sample against.
    pub messages: Vec<super::messages::SamplingMessage>,
    /// Model selection preferences.
    #[serde(default)]
    pub model_prefs: ModelPreferences,
    /// Maximum tokens the caller requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Stop sequences requested by the caller.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop_sequence: Vec<String>,
    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Opaque context payload forwarded to the handler.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
    /// Current lifecycle status.
    pub status: SamplingStatus,
    /// Present once a human has reviewed the request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub human_review: Option<HumanReview>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_has_checks_dotted_paths() {
        let caps = ServerCapabilities {
            resources: Some(ResourcesCapability {
                subscribe: true,
                list_changed: false,
            }),
            ..Default::default()
        };
        assert!(caps.has("resources"));
        assert!(caps.has("resources.subscribe"));
        assert!(!caps.has("resources.listChanged"));
        assert!(!caps.has("tools"));
    }

    #[test]
    fn default_root_grant_is_read_list_only() {
        let perms = RootPermissions::default_grant();
        assert!(perms.read);
        assert!(perms.list);
        assert!(!perms.write);
        assert!(!perms.watch);
    }

    #[test]
    fn sampling_status_terminal_states() {
        assert!(SamplingStatus::Completed.is_terminal());
        assert!(SamplingStatus::Failed.is_terminal());
        assert!(SamplingStatus::Rejected.is_terminal());
        assert!(!SamplingStatus::Pending.is_terminal());
        assert!(!SamplingStatus::AwaitingApproval.is_terminal());
        assert!(!SamplingStatus::Approved.is_terminal());
    }

    #[test]
    fn content_tagged_enum_round_trips() {
        let text = Content::Text {
            text: "hello".into(),
        };
        let json = serde_json::to_value(&text).unwrap();
        assert_eq!(json["type"], "text");
        let back: Content = serde_json::from_value(json).unwrap();
        assert!(matches!(back, Content::Text { .. }));
    }

    #[test]
    fn resource_omits_optional_fields_when_absent() {
        let resource = Resource {
            uri: "file:///a.txt".into(),
            name: "a.txt".into(),
            description: None,
            mime_type: None,
            size: 0,
            content: None,
            metadata: HashMap::new(),
            annotations: None,
            template: None,
            embedding: None,
            cache: None,
            created: 0,
            modified: 0,
            accessed: None,
        };
        let json = serde_json::to_value(&resource).unwrap();
        assert!(json.get("mimeType").is_none());
        assert!(json.get("accessed").is_none());
    }
}
