//! OpenAI-compatible chat completion gateway.
//!
//! Sends non-streaming completion requests to an OpenAI-style endpoint
//! (hosted API or a local runtime such as Ollama or llama.cpp) and maps the
//! reply into a `GatewayTurn`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use uuid::Uuid;

use super::errors::GatewayError;
use super::types::{
    ChatCompletionRequest, ChatCompletionResponse, ChatMessage, GatewayTurn, ToolCallRequest,
};
use super::LlmGateway;

// ─── Constants ──────────────────────────────────────────────────────────────

/// TCP connection timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Total request timeout. Local models can be slow to fill a large context,
/// so this is well above typical hosted-API latency.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

const DEFAULT_TEMPERATURE: f32 = 0.2;
const DEFAULT_MAX_TOKENS: u32 = 2048;

// ─── Configuration ──────────────────────────────────────────────────────────

/// Endpoint and sampling settings for the gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Base URL without the completions path, e.g. `http://localhost:11434/v1`.
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl GatewayConfig {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            api_key: None,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

// ─── Gateway ────────────────────────────────────────────────────────────────

pub struct OpenAiGateway {
    http: HttpClient,
    config: GatewayConfig,
}

impl OpenAiGateway {
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        let http = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::ConnectionFailed {
                endpoint: config.base_url.clone(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { http, config })
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl LlmGateway for OpenAiGateway {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[serde_json::Value],
    ) -> Result<GatewayTurn, GatewayError> {
        let request = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: messages.to_vec(),
            tools: if tools.is_empty() {
                None
            } else {
                Some(tools.to_vec())
            },
            tool_choice: if tools.is_empty() {
                None
            } else {
                Some("auto".to_string())
            },
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            stream: false,
        };

        tracing::debug!(
            model = %self.config.model,
            messages = messages.len(),
            tools = tools.len(),
            "sending completion request"
        );

        let mut builder = self.http.post(self.completions_url()).json(&request);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| GatewayError::ConnectionFailed {
                endpoint: self.config.base_url.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatCompletionResponse =
            response
                .json()
                .await
                .map_err(|e| GatewayError::InvalidResponse {
                    reason: format!("failed to parse completion response: {e}"),
                })?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::InvalidResponse {
                reason: "response contained no choices".to_string(),
            })?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolCallRequest {
                // Some runtimes omit the call id; synthesize one so tool
                // results can still refer back.
                id: if tc.id.is_empty() {
                    format!("call_{}", Uuid::new_v4().simple())
                } else {
                    tc.id
                },
                name: tc.function.name,
                arguments: tc.function.arguments,
            })
            .collect();

        Ok(GatewayTurn {
            content: choice.message.content.unwrap_or_default(),
            tool_calls,
        })
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completions_url_handles_trailing_slash() {
        let gw = OpenAiGateway::new(GatewayConfig::new("http://localhost:11434/v1/", "qwen"))
            .unwrap();
        assert_eq!(
            gw.completions_url(),
            "http://localhost:11434/v1/chat/completions"
        );
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_connection_failed() {
        // Port 9 (discard) is not listening in the test environment.
        let gw =
            OpenAiGateway::new(GatewayConfig::new("http://127.0.0.1:9/v1", "qwen")).unwrap();
        let err = gw.complete(&[ChatMessage::user("hi")], &[]).await.unwrap_err();
        assert!(matches!(err, GatewayError::ConnectionFailed { .. }));
    }
}
