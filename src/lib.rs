//! Multi-server tool orchestration for LLM agents.
//!
//! `coagent` launches tool server processes speaking line-delimited JSON-RPC
//! over stdio, aggregates their tools into one flat catalog, and drives a
//! bounded tool-calling loop against an OpenAI-compatible chat completion
//! gateway.
//!
//! The layers, bottom up:
//!
//! - [`mcp`]: process transport, per-server connection state machine,
//!   catalog aggregation, and the multi-server manager.
//! - [`gateway`]: conversation types and the chat completion client.
//! - [`agent`]: the tool-calling loop and its progress events.
//! - [`config`]: JSON server configuration loading.

pub mod agent;
pub mod config;
pub mod gateway;
pub mod mcp;
pub mod util;

pub use agent::{LoopConfig, LoopError, LoopOutcome, ProgressSender, ToolCallingLoop};
pub use gateway::{ChatMessage, GatewayConfig, GatewayError, LlmGateway, OpenAiGateway};
pub use mcp::{
    ConnectSummary, ConnectionState, McpError, ServerDescriptor, ToolDispatcher, ToolOutcome,
    ToolServerConnection, ToolServerManager,
};
