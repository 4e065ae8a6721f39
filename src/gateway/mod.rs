//! Chat completion gateway: the model side of the agent loop.

pub mod errors;
pub mod openai;
pub mod types;

use async_trait::async_trait;

pub use errors::GatewayError;
pub use openai::{GatewayConfig, OpenAiGateway};
pub use types::{ChatMessage, GatewayTurn, Role, ToolCallRequest};

/// One chat completion round trip.
///
/// The trait seam keeps the agent loop testable with scripted gateways and
/// leaves room for non-OpenAI backends.
#[async_trait]
pub trait LlmGateway: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[serde_json::Value],
    ) -> Result<GatewayTurn, GatewayError>;
}
