//! Wire and protocol types for the tool-server channel.
//!
//! JSON-RPC 2.0 message framing plus the protocol payloads this layer
//! actually inspects: tool descriptors, initialize results, and tool-call
//! content parts. Tool input schemas are carried verbatim and never
//! interpreted here.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// ─── Server Descriptors ─────────────────────────────────────────────────────

/// Launch configuration for one tool server, supplied by the config loader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerDescriptor {
    /// Stable identifier used for routing and logging.
    pub id: String,
    /// Human-readable name shown in status output.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Executable to launch.
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory for the child process.
    #[serde(default)]
    pub working_dir: Option<String>,
    /// Extra environment variables for the child process.
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl ServerDescriptor {
    /// The name to show in user-facing output.
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.id)
    }
}

// ─── JSON-RPC 2.0 ───────────────────────────────────────────────────────────

/// JSON-RPC 2.0 request message.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: &str, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.to_string(),
            params,
        }
    }
}

/// JSON-RPC 2.0 response message (success or error).
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    #[allow(dead_code)]
    pub jsonrpc: String,
    pub id: u64,
    pub result: Option<serde_json::Value>,
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    pub data: Option<serde_json::Value>,
}

// ─── Protocol Payloads ──────────────────────────────────────────────────────

/// Tool descriptor as returned by `tools/list`.
///
/// `input_schema` is an opaque JSON-Schema-shaped blob forwarded to the
/// gateway byte-for-byte.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, alias = "inputSchema")]
    pub input_schema: serde_json::Value,
}

/// Payload of a `tools/list` response.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolListResult {
    #[serde(default)]
    pub tools: Vec<ToolDescriptor>,
}

/// Payload of an `initialize` response.
#[derive(Debug, Clone, Deserialize)]
pub struct InitializeResult {
    #[serde(default)]
    pub capabilities: serde_json::Value,
    #[serde(default, alias = "serverInfo")]
    pub server_info: Option<ServerInfo>,
}

/// Server identity returned in the initialize response.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerInfo {
    pub name: Option<String>,
    pub version: Option<String>,
}

/// One content part of a `tools/call` response.
///
/// Textual parts are concatenated into the result text; anything else is
/// treated as an opaque stringifiable blob.
#[derive(Debug, Clone, Deserialize)]
pub struct ContentPart {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(flatten)]
    pub rest: serde_json::Value,
}

impl ContentPart {
    /// Render this part as text. Non-textual parts are serialized as JSON.
    pub fn render(&self) -> String {
        match &self.text {
            Some(text) => text.clone(),
            None => serde_json::to_string(&self.rest).unwrap_or_default(),
        }
    }
}

/// Payload of a `tools/call` response.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallPayload {
    #[serde(default)]
    pub content: Vec<ContentPart>,
    #[serde(default, alias = "isError")]
    pub is_error: bool,
}

// ─── Tool Outcomes ──────────────────────────────────────────────────────────

/// Result of one tool invocation, always representable as text so it can be
/// fed back to the model.
#[derive(Debug, Clone, Serialize)]
pub struct ToolOutcome {
    pub server_id: String,
    pub tool_name: String,
    pub succeeded: bool,
    pub text: String,
    pub elapsed_ms: u64,
}

// ─── Standard Error Codes ───────────────────────────────────────────────────

/// Well-known JSON-RPC error codes.
pub mod error_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization_omits_params_when_none() {
        let req = JsonRpcRequest::new(1, "initialize", None);
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        assert!(json.contains("\"id\":1"));
        assert!(!json.contains("params"));
    }

    #[test]
    fn test_response_deserialization() {
        let json = r#"{"jsonrpc": "2.0", "id": 7, "result": {"tools": []}}"#;
        let resp: JsonRpcResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.id, 7);
        assert!(resp.result.is_some());
        assert!(resp.error.is_none());
    }

    #[test]
    fn test_error_response_deserialization() {
        let json = r#"{
            "jsonrpc": "2.0",
            "id": 2,
            "error": {"code": -32601, "message": "Method not found"}
        }"#;
        let resp: JsonRpcResponse = serde_json::from_str(json).unwrap();
        let err = resp.error.unwrap();
        assert_eq!(err.code, error_codes::METHOD_NOT_FOUND);
    }

    #[test]
    fn test_tool_descriptor_accepts_camel_case_schema() {
        let json = r#"{
            "name": "get_time",
            "description": "Current time",
            "inputSchema": {"type": "object", "properties": {}}
        }"#;
        let tool: ToolDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(tool.name, "get_time");
        assert_eq!(tool.input_schema["type"], "object");
    }

    #[test]
    fn test_content_part_renders_text() {
        let json = r#"{"type": "text", "text": "12:00"}"#;
        let part: ContentPart = serde_json::from_str(json).unwrap();
        assert_eq!(part.render(), "12:00");
    }

    #[test]
    fn test_content_part_renders_non_text_as_json() {
        let json = r#"{"type": "image", "data": "base64stuff", "mimeType": "image/png"}"#;
        let part: ContentPart = serde_json::from_str(json).unwrap();
        let rendered = part.render();
        assert!(rendered.contains("base64stuff"));
    }

    #[test]
    fn test_descriptor_label_falls_back_to_id() {
        let d = ServerDescriptor {
            id: "clock".into(),
            display_name: None,
            command: "clock-server".into(),
            args: vec![],
            working_dir: None,
            env: HashMap::new(),
        };
        assert_eq!(d.label(), "clock");
    }
}
