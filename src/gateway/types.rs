//! Conversation and wire types for the chat completion gateway.
//!
//! These mirror the OpenAI Chat Completions API, used for both request
//! building and response parsing.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Conversation ───────────────────────────────────────────────────────────

/// Message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A single message in the conversation.
///
/// Serialization notes for OpenAI-compatible runtimes:
/// - `content` must be `""` (not `null`) for assistant messages that carry
///   tool calls. Several local runtimes mishandle `null` content and lose
///   the tool call round trip.
/// - `tool_call_id` and `tool_calls` are skipped when `None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(serialize_with = "serialize_content")]
    pub content: Option<String>,
    /// Tool results refer back to the call they answer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallResponse>>,
}

fn serialize_content<S>(value: &Option<String>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match value {
        Some(s) => serializer.serialize_str(s),
        None => serializer.serialize_str(""),
    }
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: Some(content.into()),
            tool_call_id: None,
            tool_calls: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Some(content.into()),
            tool_call_id: None,
            tool_calls: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: Some(content.into()),
            tool_call_id: None,
            tool_calls: None,
        }
    }

    /// Assistant message recording the tool calls the model requested.
    pub fn assistant_tool_calls(calls: &[ToolCallRequest]) -> Self {
        Self {
            role: Role::Assistant,
            content: None,
            tool_call_id: None,
            tool_calls: Some(calls.iter().map(ToolCallResponse::from_request).collect()),
        }
    }

    /// Tool result message answering one call.
    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_call_id: Some(call_id.into()),
            tool_calls: None,
        }
    }
}

// ─── Tool calls ─────────────────────────────────────────────────────────────

/// A tool call the model asked for, as the agent loop consumes it.
///
/// `arguments` stays a raw JSON string: parse failures belong to the loop,
/// which soft-fails them into the conversation instead of erroring out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

impl ToolCallRequest {
    pub fn new(name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: format!("call_{}", Uuid::new_v4().simple()),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

/// Tool call in the OpenAI wire format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallResponse {
    pub id: String,
    pub r#type: String,
    pub function: FunctionCallResponse,
}

impl ToolCallResponse {
    fn from_request(req: &ToolCallRequest) -> Self {
        Self {
            id: req.id.clone(),
            r#type: "function".to_string(),
            function: FunctionCallResponse {
                name: req.name.clone(),
                arguments: req.arguments.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCallResponse {
    pub name: String,
    pub arguments: String,
}

// ─── Gateway turn ───────────────────────────────────────────────────────────

/// The model's reply to one completion request.
#[derive(Debug, Clone, Default)]
pub struct GatewayTurn {
    /// Assistant text, possibly empty when the turn is tool calls only.
    pub content: String,
    /// Tool calls the model wants executed, in the order it emitted them.
    pub tool_calls: Vec<ToolCallRequest>,
}

impl GatewayTurn {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

// ─── Wire types ─────────────────────────────────────────────────────────────

/// Request body for `POST /v1/chat/completions`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub stream: bool,
}

#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    pub choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: ResponseMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCallResponse>>,
}

// ─── Tests ──────────────────────────────────────────────────────────────────
