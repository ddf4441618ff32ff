//! JSON-RPC 2.0 message envelope.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC request ID. Either an integer or a string, per the spec.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Integer ID.
    Number(i64),
    /// String ID.
    String(String),
}

impl From<i64> for RequestId {
    fn from(id: i64) -> Self {
        RequestId::Number(id)
    }
}

impl From<String> for RequestId {
    fn from(id: String) -> Self {
        RequestId::String(id)
    }
}

impl From<&str> for RequestId {
    fn from(id: &str) -> Self {
        RequestId::String(id.to_owned())
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{n}"),
            RequestId::String(s) => write!(f, "{s}"),
        }
    }
}

/// JSON-RPC 2.0 request or notification (a request with `id` omitted).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Protocol version, always `"2.0"`.
    pub jsonrpc: String,
    /// Method name, e.g. `"tools/call"`.
    pub method: String,
    /// Method parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// Request ID, absent for notifications.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
}

impl JsonRpcRequest {
    /// Creates a request with the given method, parameters, and id.
    #[must_use]
    pub fn new(method: impl Into<String>, params: Option<Value>, id: impl Into<RequestId>) -> Self {
        Self {
            jsonrpc: "2.0".to_owned(),
            method: method.into(),
            params,
            id: Some(id.into()),
        }
    }

    /// Creates a notification (a request with no id; no response is expected).
    #[must_use]
    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_owned(),
            method: method.into(),
            params,
            id: None,
        }
    }

    /// Whether this is a notification.
    #[must_use]
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Numeric error code.
    pub code: i32,
    /// Human-readable error message.
    pub message: String,
    /// Additional structured error data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl From<mcpmux_core::McpError> for JsonRpcError {
    fn from(err: mcpmux_core::McpError) -> Self {
        Self {
            code: err.code.into(),
            message: err.message,
            data: err.data,
        }
    }
}

/// JSON-RPC 2.0 response. Exactly one of `result`/`error` is present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Protocol version, always `"2.0"`.
    pub jsonrpc: String,
    /// Present on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Present on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    /// The id of the request this responds to.
    pub id: Option<RequestId>,
}

impl JsonRpcResponse {
    /// Creates a success response.
    #[must_use]
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_owned(),
            result: Some(result),
            error: None,
            id: Some(id),
        }
    }

    /// Creates an error response. `id` is `None` when the request could not
    /// even be parsed far enough to recover one.
    #[must_use]
    pub fn error(id: Option<RequestId>, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_owned(),
            result: None,
            error: Some(error),
            id,
        }
    }

    /// Whether this is an error response.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Any JSON-RPC message that can cross a transport boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcMessage {
    /// A request or notification.
    Request(JsonRpcRequest),
    /// A response.
    Response(JsonRpcResponse),
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcpmux_core::{McpError, McpErrorCode};

    #[test]
    fn request_serializes_with_jsonrpc_and_method() {
        let req = JsonRpcRequest::new("tools/list", None, 1i64);
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        assert!(json.contains("\"method\":\"tools/list\""));
        assert!(!json.contains("\"params\""));
    }

    #[test]
    fn notification_has_no_id() {
        let notif = JsonRpcRequest::notification("notifications/progress", None);
        assert!(notif.is_notification());
        let json = serde_json::to_string(&notif).unwrap();
        assert!(!json.contains("\"id\""));
    }

    #[test]
    fn string_and_number_ids_round_trip_untagged() {
        let by_num: RequestId = serde_json::from_str("7").unwrap();
        assert_eq!(by_num, RequestId::Number(7));
        let by_str: RequestId = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(by_str, RequestId::String("abc".into()));
    }

    #[test]
    fn mcp_error_converts_into_json_rpc_error() {
        let err: JsonRpcError = McpError::method_not_found("foo/bar").into();
        assert_eq!(err.code, McpErrorCode::MethodNotFound.code());
        assert!(err.message.contains("foo/bar"));
    }

    #[test]
    fn message_deserializes_as_request_or_response_by_shape() {
        let req: JsonRpcMessage = serde_json::from_str(
            r#"{"jsonrpc":"2.0","method":"ping","id":1}"#,
        )
        .unwrap();
        assert!(matches!(req, JsonRpcMessage::Request(_)));

        let resp: JsonRpcMessage = serde_json::from_str(
            r#"{"jsonrpc":"2.0","result":{},"id":1}"#,
        )
        .unwrap();
        assert!(matches!(resp, JsonRpcMessage::Response(_)));
    }

    #[test]
    fn response_is_error_reflects_error_field() {
        let ok = JsonRpcResponse::success(RequestId::Number(1), serde_json::json!({}));
        assert!(!ok.is_error());
        let err = JsonRpcResponse::error(
            Some(RequestId::Number(1)),
            JsonRpcError {
                code: -32600,
                message: "bad".into(),
                data: None,
            },
        );
        assert!(err.is_error());
    }
}
