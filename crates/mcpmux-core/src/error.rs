//! MCP error taxonomy.
//!
//! Every failure path in the protocol engine returns a [`McpError`] rather
//! than panicking. Codes are grouped into JSON-RPC reserved codes, the
//! implementation-defined range, and an extended MCP range used for
//! negotiation, policy, and data errors specific to this engine.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Taxonomy of error kinds a handler or manager can fail with.
///
/// Code ranges:
/// - `-32700..=-32600`: standard JSON-RPC (protocol) errors.
/// - `-32002..=-32000`: implementation-defined timing errors.
/// - `-31999..=-31988`: extended MCP errors (transport, negotiation, policy, data).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum McpErrorCode {
    /// Invalid JSON was received by the server.
    ParseError,
    /// The JSON sent is not a valid request object.
    InvalidRequest,
    /// The method does not exist or is not available.
    MethodNotFound,
    /// Invalid method parameter(s).
    InvalidParams,
    /// Internal JSON-RPC error.
    InternalError,
    /// A request exceeded its deadline.
    RequestTimeout,
    /// A request was cancelled via `$/cancelled` or transport close.
    RequestCancelled,
    /// A request failed for a reason not covered by a more specific code.
    RequestFailed,
    /// A transport-level I/O or framing failure occurred.
    TransportError,
    /// A method was called before the session reached the required state.
    StateError,
    /// The session referenced by a request no longer exists.
    SessionError,
    /// A required capability was not advertised by the peer.
    CapabilityError,
    /// Negotiated protocol versions did not match.
    ProtocolError,
    /// The caller could not be authenticated.
    AuthenticationError,
    /// The caller is authenticated but not permitted to perform the operation.
    AuthorizationError,
    /// The caller exceeded an allotted rate limit.
    RateLimitError,
    /// A referenced resource does not exist or could not be read.
    ResourceError,
    /// Input failed schema or structural validation.
    ValidationError,
    /// A handler executed but failed to produce a result.
    ExecutionError,
    /// The server or a referenced server is misconfigured.
    ConfigurationError,
}

impl McpErrorCode {
    /// Returns the numeric JSON-RPC error code.
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            McpErrorCode::ParseError => -32700,
            McpErrorCode::InvalidRequest => -32600,
            McpErrorCode::MethodNotFound => -32601,
            McpErrorCode::InvalidParams => -32602,
            McpErrorCode::InternalError => -32603,
            McpErrorCode::RequestTimeout => -32000,
            McpErrorCode::RequestCancelled => -32001,
            McpErrorCode::RequestFailed => -32002,
            McpErrorCode::TransportError => -31988,
            McpErrorCode::StateError => -31989,
            McpErrorCode::SessionError => -31990,
            McpErrorCode::CapabilityError => -31991,
            McpErrorCode::ProtocolError => -31992,
            McpErrorCode::AuthenticationError => -31993,
            McpErrorCode::AuthorizationError => -31994,
            McpErrorCode::RateLimitError => -31995,
            McpErrorCode::ResourceError => -31996,
            McpErrorCode::ValidationError => -31997,
            McpErrorCode::ExecutionError => -31998,
            McpErrorCode::ConfigurationError => -31999,
        }
    }

    /// Reconstructs a code from its numeric value, if recognized.
    #[must_use]
    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            -32700 => McpErrorCode::ParseError,
            -32600 => McpErrorCode::InvalidRequest,
            -32601 => McpErrorCode::MethodNotFound,
            -32602 => McpErrorCode::InvalidParams,
            -32603 => McpErrorCode::InternalError,
            -32000 => McpErrorCode::RequestTimeout,
            -32001 => McpErrorCode::RequestCancelled,
            -32002 => McpErrorCode::RequestFailed,
            -31988 => McpErrorCode::TransportError,
            -31989 => McpErrorCode::StateError,
            -31990 => McpErrorCode::SessionError,
            -31991 => McpErrorCode::CapabilityError,
            -31992 => McpErrorCode::ProtocolError,
            -31993 => McpErrorCode::AuthenticationError,
            -31994 => McpErrorCode::AuthorizationError,
            -31995 => McpErrorCode::RateLimitError,
            -31996 => McpErrorCode::ResourceError,
            -31997 => McpErrorCode::ValidationError,
            -31998 => McpErrorCode::ExecutionError,
            -31999 => McpErrorCode::ConfigurationError,
            _ => return None,
        })
    }

    /// Returns the `type` discriminator stamped into `error.data.type`.
    #[must_use]
    pub fn type_tag(self) -> &'static str {
        match self {
            McpErrorCode::ParseError => "parse_error",
            McpErrorCode::InvalidRequest => "invalid_request",
            McpErrorCode::MethodNotFound => "method_not_found",
            McpErrorCode::InvalidParams => "invalid_params",
            McpErrorCode::InternalError => "internal_error",
            McpErrorCode::RequestTimeout => "request_timeout",
            McpErrorCode::RequestCancelled => "request_cancelled",
            McpErrorCode::RequestFailed => "request_failed",
            McpErrorCode::TransportError => "transport_error",
            McpErrorCode::StateError => "state_error",
            McpErrorCode::SessionError => "session_error",
            McpErrorCode::CapabilityError => "capability_error",
            McpErrorCode::ProtocolError => "protocol_error",
            McpErrorCode::AuthenticationError => "authentication_error",
            McpErrorCode::AuthorizationError => "authorization_error",
            McpErrorCode::RateLimitError => "rate_limit_error",
            McpErrorCode::ResourceError => "resource_error",
            McpErrorCode::ValidationError => "validation_error",
            McpErrorCode::ExecutionError => "execution_error",
            McpErrorCode::ConfigurationError => "configuration_error",
        }
    }

    /// Whether a caller may usefully retry a request that failed with this code.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            McpErrorCode::RequestTimeout
                | McpErrorCode::TransportError
                | McpErrorCode::SessionError
                | McpErrorCode::RateLimitError
        )
    }

    /// Suggested delay before retrying a request that failed with this code.
    ///
    /// Returns `None` for non-retryable codes.
    #[must_use]
    pub fn suggested_retry_delay(self) -> Option<Duration> {
        match self {
            McpErrorCode::RequestTimeout => Some(Duration::from_secs(5)),
            McpErrorCode::TransportError => Some(Duration::from_secs(5)),
            McpErrorCode::SessionError => Some(Duration::from_secs(30)),
            McpErrorCode::RateLimitError => Some(Duration::from_secs(60)),
            _ => None,
        }
    }
}

impl From<McpErrorCode> for i32 {
    fn from(code: McpErrorCode) -> Self {
        code.code()
    }
}

/// A typed MCP/JSON-RPC error.
///
/// Converts cleanly to a `JsonRpcError` at the dispatcher boundary; the
/// `type` discriminator and any contextual keys are merged into `data`.
#[derive(Debug, Clone)]
pub struct McpError {
    /// The error kind.
    pub code: McpErrorCode,
    /// Human-readable message.
    pub message: String,
    /// Extra structured data (always carries `data.type`).
    pub data: Option<Value>,
}

impl McpError {
    /// Creates a new error, stamping the `type` discriminator into `data`.
    #[must_use]
    pub fn new(code: McpErrorCode, message: impl Into<String>) -> Self {
        let mut err = Self {
            code,
            message: message.into(),
            data: None,
        };
        err.data = Some(serde_json::json!({ "type": code.type_tag() }));
        err
    }

    /// Attaches a contextual key to `data` (e.g. `method`, `session_id`, `field`).
    #[must_use]
    pub fn with_context(mut self, key: &str, value: impl Into<Value>) -> Self {
        let entry = self
            .data
            .get_or_insert_with(|| serde_json::json!({ "type": self.code.type_tag() }));
        if let Some(obj) = entry.as_object_mut() {
            obj.insert(key.to_owned(), value.into());
        }
        self
    }

    /// Whether this error is intrinsically retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    /// The suggested retry delay, if any.
    #[must_use]
    pub fn suggested_retry_delay(&self) -> Option<Duration> {
        self.code.suggested_retry_delay()
    }

    /// Parse error (malformed JSON).
    #[must_use]
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(McpErrorCode::ParseError, message)
    }

    /// Invalid JSON-RPC request envelope.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(McpErrorCode::InvalidRequest, message)
    }

    /// Method name not recognized by the dispatcher.
    #[must_use]
    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            McpErrorCode::MethodNotFound,
            format!("method not found: {method}"),
        )
        .with_context("method", method)
    }

    /// Parameters failed validation against the method's expected shape.
    #[must_use]
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(McpErrorCode::InvalidParams, message)
    }

    /// Unclassified internal failure.
    #[must_use]
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(McpErrorCode::InternalError, message)
    }

    /// The in-flight request was cancelled.
    #[must_use]
    pub fn request_cancelled() -> Self {
        Self::new(McpErrorCode::RequestCancelled, "request cancelled")
    }

    /// The in-flight request exceeded its deadline.
    #[must_use]
    pub fn request_timeout(method: &str) -> Self {
        Self::new(McpErrorCode::RequestTimeout, format!("{method} timed out"))
            .with_context("method", method)
    }

    /// A transport-level failure (I/O, framing, closed connection).
    #[must_use]
    pub fn transport_error(message: impl Into<String>) -> Self {
        Self::new(McpErrorCode::TransportError, message)
    }

    /// The session is not in the state required for the attempted method.
    #[must_use]
    pub fn state_error(method: &str, required: &str) -> Self {
        Self::new(
            McpErrorCode::StateError,
            format!("method {method} requires session state {required}"),
        )
        .with_context("method", method)
    }

    /// The referenced session no longer exists.
    #[must_use]
    pub fn session_error(session_id: &str) -> Self {
        Self::new(
            McpErrorCode::SessionError,
            format!("unknown session: {session_id}"),
        )
        .with_context("session_id", session_id)
    }

    /// The peer did not advertise a capability required for the request.
    #[must_use]
    pub fn capability_error(capability: &str) -> Self {
        Self::new(
            McpErrorCode::CapabilityError,
            format!("missing required capability: {capability}"),
        )
        .with_context("capability", capability)
    }

    /// Negotiated protocol versions did not match.
    #[must_use]
    pub fn protocol_error(requested: &str, supported: &str) -> Self {
        Self::new(
            McpErrorCode::ProtocolError,
            format!("protocol version mismatch: requested {requested}, supported {supported}"),
        )
        .with_context("requested_version", requested)
        .with_context("supported_version", supported)
    }

    /// Caller could not be authenticated.
    #[must_use]
    pub fn authentication_error(message: impl Into<String>) -> Self {
        Self::new(McpErrorCode::AuthenticationError, message)
    }

    /// Caller is authenticated but lacks permission for the operation.
    #[must_use]
    pub fn authorization_error(message: impl Into<String>) -> Self {
        Self::new(McpErrorCode::AuthorizationError, message)
    }

    /// Caller exceeded a rate limit.
    #[must_use]
    pub fn rate_limit_error(message: impl Into<String>) -> Self {
        Self::new(McpErrorCode::RateLimitError, message)
    }

    /// A referenced resource does not exist or could not be read.
    #[must_use]
    pub fn resource_not_found(uri: &str) -> Self {
        Self::new(McpErrorCode::ResourceError, format!("resource not found: {uri}"))
            .with_context("uri", uri)
    }

    /// A referenced prompt does not exist.
    #[must_use]
    pub fn prompt_not_found(name: &str) -> Self {
        Self::new(McpErrorCode::ResourceError, format!("prompt not found: {name}"))
            .with_context("name", name)
    }

    /// Input failed schema or structural validation.
    #[must_use]
    pub fn validation_error(field: &str, message: impl Into<String>) -> Self {
        Self::new(McpErrorCode::ValidationError, message).with_context("field", field)
    }

    /// A handler ran but could not produce a result.
    #[must_use]
    pub fn execution_error(message: impl Into<String>) -> Self {
        Self::new(McpErrorCode::ExecutionError, message)
    }

    /// The server or a referenced upstream is misconfigured.
    #[must_use]
    pub fn configuration_error(message: impl Into<String>) -> Self {
        Self::new(McpErrorCode::ConfigurationError, message)
    }
}

impl std::fmt::Display for McpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code.code(), self.message)
    }
}

impl std::error::Error for McpError {}

/// Convenience alias for fallible MCP operations.
pub type McpResult<T> = Result<T, McpError>;

/// Shorthand constructor for `Ok`.
pub fn ok<T>(value: T) -> McpResult<T> {
    Ok(value)
}

/// Shorthand constructor for a cancelled-request error.
pub fn cancelled<T>() -> McpResult<T> {
    Err(McpError::request_cancelled())
}

/// Shorthand constructor for an arbitrary error code.
pub fn err<T>(code: McpErrorCode, message: impl Into<String>) -> McpResult<T> {
    Err(McpError::new(code, message))
}

/// Extension trait adding context to any `McpResult`.
pub trait ResultExt<T> {
    /// Attaches a contextual key to the error's `data`, if this is an `Err`.
    fn with_context(self, key: &str, value: impl Into<Value>) -> McpResult<T>;
}

impl<T> ResultExt<T> for McpResult<T> {
    fn with_context(self, key: &str, value: impl Into<Value>) -> McpResult<T> {
        self.map_err(|e| e.with_context(key, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_round_trips_through_from_code() {
        for code in [
            McpErrorCode::ParseError,
            McpErrorCode::InvalidRequest,
            McpErrorCode::MethodNotFound,
            McpErrorCode::InvalidParams,
            McpErrorCode::InternalError,
            McpErrorCode::RequestTimeout,
            McpErrorCode::RequestCancelled,
            McpErrorCode::RequestFailed,
            McpErrorCode::TransportError,
            McpErrorCode::StateError,
            McpErrorCode::SessionError,
            McpErrorCode::CapabilityError,
            McpErrorCode::ProtocolError,
            McpErrorCode::AuthenticationError,
            McpErrorCode::AuthorizationError,
            McpErrorCode::RateLimitError,
            McpErrorCode::ResourceError,
            McpErrorCode::ValidationError,
            McpErrorCode::ExecutionError,
            McpErrorCode::ConfigurationError,
        ] {
            assert_eq!(McpErrorCode::from_code(code.code()), Some(code));
        }
    }

    #[test]
    fn state_error_matches_s1_scenario_code() {
        // S1: tools/list before `notifications/initialized` yields -31989.
        assert_eq!(McpErrorCode::StateError.code(), -31989);
    }

    #[test]
    fn retryable_codes_have_suggested_delays() {
        assert_eq!(
            McpErrorCode::RequestTimeout.suggested_retry_delay(),
            Some(Duration::from_secs(5))
        );
        assert_eq!(
            McpErrorCode::TransportError.suggested_retry_delay(),
            Some(Duration::from_secs(5))
        );
        assert_eq!(
            McpErrorCode::SessionError.suggested_retry_delay(),
            Some(Duration::from_secs(30))
        );
        assert_eq!(
            McpErrorCode::RateLimitError.suggested_retry_delay(),
            Some(Duration::from_secs(60))
        );
        assert!(McpErrorCode::ValidationError.suggested_retry_delay().is_none());
    }

    #[test]
    fn non_retryable_codes_are_not_retryable() {
        assert!(!McpErrorCode::ValidationError.is_retryable());
        assert!(!McpErrorCode::MethodNotFound.is_retryable());
    }

    #[test]
    fn error_carries_type_tag_in_data() {
        let err = McpError::method_not_found("tools/call");
        let data = err.data.expect("data present");
        assert_eq!(data["type"], "method_not_found");
        assert_eq!(data["method"], "tools/call");
    }

    #[test]
    fn with_context_merges_additional_keys() {
        let err = McpError::state_error("tools/list", "ready").with_context("session_id", "s-1");
        let data = err.data.expect("data present");
        assert_eq!(data["session_id"], "s-1");
        assert_eq!(data["method"], "tools/list");
    }

    #[test]
    fn display_includes_numeric_code() {
        let err = McpError::internal_error("boom");
        assert_eq!(err.to_string(), "[-32603] boom");
    }
}
