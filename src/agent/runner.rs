//! The bounded tool-calling loop.
//!
//! One user turn runs model completions and tool executions alternately
//! until the model answers in plain text or the iteration budget runs out.
//! Tool failures are soft: they go back into the conversation as tool
//! results prefixed with `Error:`, giving the model a chance to recover.
//! Only gateway failures abort the turn.

use std::sync::Arc;

use thiserror::Error;

use crate::gateway::types::{ChatMessage, ToolCallRequest};
use crate::gateway::{GatewayError, LlmGateway};
use crate::mcp::manager::ToolDispatcher;
use crate::util::cap_tool_result;

use super::events::{LoopEvent, ProgressSender};

// ─── Constants ──────────────────────────────────────────────────────────────

/// Default iteration budget per user turn.
pub const DEFAULT_MAX_ITERATIONS: usize = 5;

/// Default cap on a single tool result fed back to the model.
pub const DEFAULT_MAX_TOOL_RESULT_BYTES: usize = 16 * 1024;

// ─── Configuration ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub max_iterations: usize,
    pub max_tool_result_bytes: usize,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_tool_result_bytes: DEFAULT_MAX_TOOL_RESULT_BYTES,
        }
    }
}

// ─── Outcome and errors ─────────────────────────────────────────────────────

/// How a turn ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopOutcome {
    /// The model answered in plain text.
    Done { text: String },
    /// The iteration budget ran out while the model was still calling tools.
    IterationLimit { last_text: String },
}

impl LoopOutcome {
    pub fn text(&self) -> &str {
        match self {
            LoopOutcome::Done { text } => text,
            LoopOutcome::IterationLimit { last_text } => last_text,
        }
    }
}

/// Fatal turn errors. Tool-side failures never appear here.
#[derive(Debug, Error)]
pub enum LoopError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

// ─── Loop ───────────────────────────────────────────────────────────────────

pub struct ToolCallingLoop {
    gateway: Arc<dyn LlmGateway>,
    tools: Arc<dyn ToolDispatcher>,
    config: LoopConfig,
    progress: ProgressSender,
}

impl ToolCallingLoop {
    pub fn new(gateway: Arc<dyn LlmGateway>, tools: Arc<dyn ToolDispatcher>) -> Self {
        Self {
            gateway,
            tools,
            config: LoopConfig::default(),
            progress: ProgressSender::disabled(),
        }
    }

    pub fn with_config(mut self, config: LoopConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_progress(mut self, progress: ProgressSender) -> Self {
        self.progress = progress;
        self
    }

    /// Run one user turn. The conversation history is extended in place
    /// with every message the turn produces, so the caller can feed it back
    /// into the next turn.
    pub async fn run_turn(
        &self,
        history: &mut Vec<ChatMessage>,
    ) -> Result<LoopOutcome, LoopError> {
        let definitions = self.tools.gateway_definitions();
        let mut last_text = String::new();

        for iteration in 1..=self.config.max_iterations {
            self.progress.emit(LoopEvent::IterationStarted {
                number: iteration,
                max: self.config.max_iterations,
            });
            tracing::debug!(iteration, max = self.config.max_iterations, "loop iteration");

            let turn = self.gateway.complete(history, &definitions).await?;

            if !turn.content.is_empty() {
                last_text = turn.content.clone();
                self.progress.emit(LoopEvent::AssistantText {
                    text: turn.content.clone(),
                });
            }

            if !turn.has_tool_calls() {
                // A turn with neither content nor tool calls is a stuck
                // model, not an answer.
                if turn.content.is_empty() {
                    tracing::warn!(iteration, "model returned neither content nor tool calls");
                    return Err(LoopError::Gateway(GatewayError::InvalidResponse {
                        reason: "model returned neither content nor tool calls".to_string(),
                    }));
                }
                history.push(ChatMessage::assistant(turn.content.clone()));
                tracing::info!(iteration, "turn complete");
                return Ok(LoopOutcome::Done { text: turn.content });
            }

            history.push(assistant_turn_message(&turn.content, &turn.tool_calls));

            // Sequential, in the model's order: later calls may depend on
            // earlier results.
            for call in &turn.tool_calls {
                let text = self.execute_call(call).await;
                history.push(ChatMessage::tool_result(call.id.clone(), text));
            }
        }

        tracing::warn!(
            max = self.config.max_iterations,
            "iteration budget exhausted"
        );
        Ok(LoopOutcome::IterationLimit { last_text })
    }

    /// Run one tool call and render its result for the conversation.
    /// Every failure path returns `Error: …` text instead of propagating.
    async fn execute_call(&self, call: &ToolCallRequest) -> String {
        self.progress.emit(LoopEvent::ToolStarted {
            call_id: call.id.clone(),
            name: call.name.clone(),
        });

        let arguments = if call.arguments.trim().is_empty() {
            // Some models emit an empty string for zero-argument tools.
            Ok(serde_json::json!({}))
        } else {
            serde_json::from_str::<serde_json::Value>(&call.arguments)
        };

        let (succeeded, elapsed_ms, text) = match arguments {
            Err(e) => {
                tracing::warn!(tool = %call.name, error = %e, "malformed tool arguments");
                (
                    false,
                    0,
                    format!("Error: invalid arguments for {}: {e}", call.name),
                )
            }
            Ok(args) => match self.tools.dispatch(&call.name, args).await {
                Ok(outcome) => {
                    let text =
                        cap_tool_result(&outcome.text, self.config.max_tool_result_bytes);
                    (outcome.succeeded, outcome.elapsed_ms, text)
                }
                Err(e) => {
                    tracing::warn!(tool = %call.name, error = %e, "tool dispatch failed");
                    (false, 0, format!("Error: {e}"))
                }
            },
        };

        self.progress.emit(LoopEvent::ToolFinished {
            call_id: call.id.clone(),
            name: call.name.clone(),
            succeeded,
            elapsed_ms,
        });

        text
    }
}

/// Assistant message recording both the text (if any) and the tool calls.
fn assistant_turn_message(content: &str, calls: &[ToolCallRequest]) -> ChatMessage {
    let mut msg = ChatMessage::assistant_tool_calls(calls);
    if !content.is_empty() {
        msg.content = Some(content.to_string());
    }
    msg
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::types::Role;
    use crate::mcp::errors::McpError;
    use crate::mcp::types::ToolOutcome;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct ScriptedGateway {
        turns: Mutex<Vec<crate::gateway::GatewayTurn>>,
    }

    impl ScriptedGateway {
        fn new(mut turns: Vec<crate::gateway::GatewayTurn>) -> Self {
            turns.reverse();
            Self {
                turns: Mutex::new(turns),
            }
        }
    }

    #[async_trait]
    impl LlmGateway for ScriptedGateway {
        async fn complete(
            &self,
            _messages: &[ChatMessage],
            _tools: &[serde_json::Value],
        ) -> Result<crate::gateway::GatewayTurn, GatewayError> {
            self.turns
                .lock()
                .unwrap()
                .pop()
                .ok_or(GatewayError::InvalidResponse {
                    reason: "script exhausted".into(),
                })
        }
    }

    struct EchoDispatcher;

    #[async_trait]
    impl ToolDispatcher for EchoDispatcher {
        fn gateway_definitions(&self) -> Vec<serde_json::Value> {
            vec![]
        }

        async fn dispatch(
            &self,
            name: &str,
            arguments: serde_json::Value,
        ) -> Result<ToolOutcome, McpError> {
            if name == "missing" {
                return Err(McpError::ToolNotFound { name: name.into() });
            }
            Ok(ToolOutcome {
                server_id: "test".into(),
                tool_name: name.into(),
                succeeded: true,
                text: format!("echo {arguments}"),
                elapsed_ms: 1,
            })
        }
    }

    fn text_turn(text: &str) -> crate::gateway::GatewayTurn {
        crate::gateway::GatewayTurn {
            content: text.into(),
            tool_calls: vec![],
        }
    }

    fn call_turn(name: &str, args: &str) -> crate::gateway::GatewayTurn {
        crate::gateway::GatewayTurn {
            content: String::new(),
            tool_calls: vec![ToolCallRequest::new(name, args)],
        }
    }

    #[tokio::test]
    async fn test_plain_text_turn_finishes_in_one_iteration() {
        let gateway = Arc::new(ScriptedGateway::new(vec![text_turn("hello")]));
        let agent = ToolCallingLoop::new(gateway, Arc::new(EchoDispatcher));

        let mut history = vec![ChatMessage::user("hi")];
        let outcome = agent.run_turn(&mut history).await.unwrap();

        assert_eq!(outcome, LoopOutcome::Done { text: "hello".into() });
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn test_tool_call_round_trip() {
        let gateway = Arc::new(ScriptedGateway::new(vec![
            call_turn("get_time", r#"{"tz":"UTC"}"#),
            text_turn("it is noon"),
        ]));
        let agent = ToolCallingLoop::new(gateway, Arc::new(EchoDispatcher));

        let mut history = vec![ChatMessage::user("what time is it?")];
        let outcome = agent.run_turn(&mut history).await.unwrap();

        assert_eq!(outcome.text(), "it is noon");
        // user, assistant tool call, tool result, final assistant.
        assert_eq!(history.len(), 4);
        assert_eq!(history[2].role, Role::Tool);
        assert!(history[2].content.as_deref().unwrap().starts_with("echo"));
    }

    #[tokio::test]
    async fn test_malformed_arguments_soft_fail() {
        let gateway = Arc::new(ScriptedGateway::new(vec![
            call_turn("get_time", "{not json"),
            text_turn("recovered"),
        ]));
        let agent = ToolCallingLoop::new(gateway, Arc::new(EchoDispatcher));

        let mut history = vec![ChatMessage::user("go")];
        let outcome = agent.run_turn(&mut history).await.unwrap();

        assert_eq!(outcome.text(), "recovered");
        let result = history[2].content.as_deref().unwrap();
        assert!(result.starts_with("Error: invalid arguments for get_time"));
    }

    #[tokio::test]
    async fn test_unknown_tool_soft_fail() {
        let gateway = Arc::new(ScriptedGateway::new(vec![
            call_turn("missing", "{}"),
            text_turn("gave up"),
        ]));
        let agent = ToolCallingLoop::new(gateway, Arc::new(EchoDispatcher));

        let mut history = vec![ChatMessage::user("go")];
        agent.run_turn(&mut history).await.unwrap();

        let result = history[2].content.as_deref().unwrap();
        assert!(result.starts_with("Error:"), "got {result}");
    }

    #[tokio::test]
    async fn test_iteration_limit() {
        let turns: Vec<_> = (0..5).map(|_| call_turn("get_time", "{}")).collect();
        let gateway = Arc::new(ScriptedGateway::new(turns));
        let agent = ToolCallingLoop::new(gateway, Arc::new(EchoDispatcher))
            .with_config(LoopConfig {
                max_iterations: 5,
                ..LoopConfig::default()
            });

        let mut history = vec![ChatMessage::user("loop forever")];
        let outcome = agent.run_turn(&mut history).await.unwrap();

        assert!(matches!(outcome, LoopOutcome::IterationLimit { .. }));
    }

    #[tokio::test]
    async fn test_empty_model_response_is_fatal() {
        let gateway = Arc::new(ScriptedGateway::new(vec![text_turn("")]));
        let agent = ToolCallingLoop::new(gateway, Arc::new(EchoDispatcher));

        let mut history = vec![ChatMessage::user("hi")];
        let err = agent.run_turn(&mut history).await.unwrap_err();
        assert!(matches!(
            err,
            LoopError::Gateway(GatewayError::InvalidResponse { .. })
        ));
        // Nothing was appended for the dead round.
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn test_gateway_error_is_fatal() {
        let gateway = Arc::new(ScriptedGateway::new(vec![]));
        let agent = ToolCallingLoop::new(gateway, Arc::new(EchoDispatcher));

        let mut history = vec![ChatMessage::user("hi")];
        let err = agent.run_turn(&mut history).await.unwrap_err();
        assert!(matches!(err, LoopError::Gateway(_)));
    }

    #[tokio::test]
    async fn test_empty_arguments_treated_as_empty_object() {
        let gateway = Arc::new(ScriptedGateway::new(vec![
            call_turn("get_time", ""),
            text_turn("done"),
        ]));
        let agent = ToolCallingLoop::new(gateway, Arc::new(EchoDispatcher));

        let mut history = vec![ChatMessage::user("go")];
        agent.run_turn(&mut history).await.unwrap();

        let result = history[2].content.as_deref().unwrap();
        assert_eq!(result, "echo {}");
    }

    #[tokio::test]
    async fn test_progress_events_in_order() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let gateway = Arc::new(ScriptedGateway::new(vec![
            call_turn("get_time", "{}"),
            text_turn("noon"),
        ]));
        let agent = ToolCallingLoop::new(gateway, Arc::new(EchoDispatcher))
            .with_progress(ProgressSender::new(tx));

        let mut history = vec![ChatMessage::user("time?")];
        agent.run_turn(&mut history).await.unwrap();

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }

        assert!(matches!(events[0], LoopEvent::IterationStarted { number: 1, .. }));
        assert!(matches!(events[1], LoopEvent::ToolStarted { .. }));
        assert!(matches!(
            events[2],
            LoopEvent::ToolFinished { succeeded: true, .. }
        ));
        assert!(matches!(events[3], LoopEvent::IterationStarted { number: 2, .. }));
        assert!(matches!(events[4], LoopEvent::AssistantText { .. }));
    }
}
