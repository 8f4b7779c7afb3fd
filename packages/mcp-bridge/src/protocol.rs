//! JSON-RPC 2.0 protocol types for talking to child servers.
//!
//! The bridge speaks a line-delimited JSON-RPC 2.0 dialect over each child's
//! standard streams. The implementation is self-contained without external
//! JSON-RPC libraries.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC 2.0 version constant.
pub const JSONRPC_VERSION: &str = "2.0";

/// Protocol version advertised in the `initialize` request.
pub const PROTOCOL_VERSION: &str = "0.3.0";

/// Client info sent in the `initialize` request.
pub const CLIENT_NAME: &str = "mcp-bridge";
pub const CLIENT_VERSION: &str = "1.0.0";

/// Method names the bridge issues against children.
pub mod methods {
    pub const INITIALIZE: &str = "initialize";
    pub const TOOLS_LIST: &str = "tools/list";
    pub const TOOLS_CALL: &str = "tools/call";
    pub const RESOURCES_LIST: &str = "resources/list";
    pub const RESOURCES_READ: &str = "resources/read";
    pub const PROMPTS_LIST: &str = "prompts/list";
    pub const PROMPTS_GET: &str = "prompts/get";
}

/// A JSON-RPC 2.0 request.
///
/// Every outbound object carries exactly these four members; `params` is
/// always present, an empty object when the method takes none.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub jsonrpc: String,
    pub id: String,
    pub method: String,
    pub params: Value,
}

impl Request {
    pub fn new(id: impl Into<String>, method: impl Into<String>, params: Value) -> Self {
        Request {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: id.into(),
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC response ID as children echo it back.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
    Null,
}

impl RequestId {
    /// The identifier used for reply routing. The bridge only mints string
    /// ids, so numeric and null ids never match a waiter.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            RequestId::String(id) => Some(id),
            _ => None,
        }
    }
}

/// A JSON-RPC 2.0 response.
///
/// Parsing is lenient: a missing `jsonrpc` member is tolerated, and both
/// `result` and `error` default to absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    #[serde(default)]
    pub jsonrpc: String,
    pub id: RequestId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorObject {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}
