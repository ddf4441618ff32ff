//! MCP wire types: the JSON-RPC envelope, method request/response payloads,
//! notification payloads, tool-input schema validation, and the RFC 6570 URI
//! template engine used by resource templates and subscriptions.

#![forbid(unsafe_code)]
#![allow(dead_code)]

pub mod jsonrpc;
pub mod messages;
pub mod schema;
pub mod types;
pub mod uri_template;

pub use jsonrpc::{JsonRpcError, JsonRpcMessage, JsonRpcRequest, JsonRpcResponse, RequestId};
pub use types::PROTOCOL_VERSION;
