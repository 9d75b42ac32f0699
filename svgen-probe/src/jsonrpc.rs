//! JSON-RPC 2.0 messages the probe exchanges with an MCP server
//!
//! One message per line on the server's stdin/stdout.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// JSON-RPC version
pub const JSONRPC_VERSION: &str = "2.0";

/// MCP protocol version sent in `initialize`
pub const MCP_VERSION: &str = "2024-11-05";

/// Client identity sent in `initialize`
pub const CLIENT_NAME: &str = "test-client";
pub const CLIENT_VERSION: &str = "1.0.0";

/// Request ID
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
    #[default]
    Null,
}

impl From<i64> for RequestId {
    fn from(id: i64) -> Self {
        Self::Number(id)
    }
}

/// Requests the probe knows how to send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Initialize,
    ToolsList,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initialize => "initialize",
            Self::ToolsList => "tools/list",
        }
    }
}

/// JSON-RPC request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: RequestId,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: impl Into<RequestId>, method: Method) -> Self {
        let params = match method {
            Method::Initialize => Some(json!({
                "protocolVersion": MCP_VERSION,
                "capabilities": {},
                "clientInfo": {
                    "name": CLIENT_NAME,
                    "version": CLIENT_VERSION
                }
            })),
            Method::ToolsList => None,
        };

        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: id.into(),
            method: method.as_str().to_string(),
            params,
        }
    }
}

/// JSON-RPC response, lenient enough to accept notifications and requests
/// coming the other way
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub jsonrpc: String,

    #[serde(default)]
    pub id: RequestId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Parse one output line; anything that is not a JSON object is `None`
    pub fn parse_line(line: &str) -> Option<Self> {
        let line = line.trim();
        if !line.starts_with('{') {
            return None;
        }
        serde_json::from_str(line).ok()
    }

    /// `result.tools`, when present as an array
    pub fn tools(&self) -> Option<Vec<ToolInfo>> {
        let tools = self.result.as_ref()?.get("tools")?.as_array()?;
        Some(
            tools
                .iter()
                .filter_map(|tool| serde_json::from_value(tool.clone()).ok())
                .collect(),
        )
    }
}

/// JSON-RPC error object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A tool advertised by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}
