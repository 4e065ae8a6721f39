//! Per-server connection: handshake, discovery, invocation, teardown.
//!
//! A `ToolServerConnection` owns one `ProcessTransport` and tracks a small
//! state machine:
//!
//! ```text
//! Disconnected ──connect()──▶ Connecting ──handshake ok──▶ Ready
//!                                  │                         │
//!                                  └──launch/handshake err──▶ Failed
//! Ready ──disconnect()──▶ Disconnected
//! ```
//!
//! Reconnecting a Ready connection first disconnects it; there are no fixed
//! settle sleeps — readiness is the provider's own initialize response,
//! awaited under a bounded timeout.

use std::time::{Duration, Instant};

use tokio::time::timeout;

use super::catalog::Tool;
use super::errors::McpError;
use super::transport::{extract_result, ProcessTransport};
use super::types::{
    InitializeResult, ServerDescriptor, ToolCallPayload, ToolListResult, ToolOutcome,
};

// ─── Constants ──────────────────────────────────────────────────────────────

/// Deadline for the initialize handshake. Generous because some providers
/// import heavyweight runtimes at startup.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Deadline for a `tools/list` request.
const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Default deadline for a single tool invocation.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

// ─── State ──────────────────────────────────────────────────────────────────

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Ready,
    Failed,
}

// ─── Connection ─────────────────────────────────────────────────────────────

/// One tool server: its descriptor, transport, state, and cached catalog.
pub struct ToolServerConnection {
    descriptor: ServerDescriptor,
    state: ConnectionState,
    transport: Option<ProcessTransport>,
    tool_cache: Vec<Tool>,
    call_timeout: Duration,
}

impl ToolServerConnection {
    pub fn new(descriptor: ServerDescriptor) -> Self {
        Self {
            descriptor,
            state: ConnectionState::Disconnected,
            transport: None,
            tool_cache: Vec::new(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn set_call_timeout(&mut self, timeout: Duration) {
        self.call_timeout = timeout;
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn server_id(&self) -> &str {
        &self.descriptor.id
    }

    pub fn descriptor(&self) -> &ServerDescriptor {
        &self.descriptor
    }

    /// Tools discovered by the last successful `list_tools()`.
    pub fn cached_tools(&self) -> &[Tool] {
        &self.tool_cache
    }

    fn not_connected(&self) -> McpError {
        McpError::NotConnected {
            server: self.descriptor.id.clone(),
        }
    }

    fn timeout_err(&self, what: &str, limit: Duration) -> McpError {
        McpError::Timeout {
            server: self.descriptor.id.clone(),
            what: what.to_string(),
            seconds: limit.as_secs(),
        }
    }

    // ─── Lifecycle ──────────────────────────────────────────────────────

    /// Launch the server process and perform the initialize handshake.
    ///
    /// Idempotent reconnect semantics: a Ready connection is disconnected
    /// first. On any failure the state is Failed and the error is surfaced —
    /// the manager decides whether that is fatal overall.
    pub async fn connect(&mut self) -> Result<(), McpError> {
        if self.state == ConnectionState::Ready {
            tracing::debug!(server = %self.descriptor.id, "reconnect: disconnecting first");
            self.disconnect().await;
        }

        self.state = ConnectionState::Connecting;

        match self.connect_inner().await {
            Ok(()) => {
                self.state = ConnectionState::Ready;
                tracing::info!(server = %self.descriptor.id, "server connected");
                Ok(())
            }
            Err(e) => {
                self.state = ConnectionState::Failed;
                // A half-launched process must not linger after a failed
                // handshake.
                if let Some(transport) = self.transport.take() {
                    transport.close().await;
                }
                Err(e)
            }
        }
    }

    async fn connect_inner(&mut self) -> Result<(), McpError> {
        let transport = ProcessTransport::launch(&self.descriptor)?;

        // Readiness is the provider's initialize response, not a timed guess.
        let response = timeout(
            HANDSHAKE_TIMEOUT,
            transport.channel().request("initialize", None),
        )
        .await
        .map_err(|_| self.timeout_err("initialize", HANDSHAKE_TIMEOUT))?
        .map_err(|e| McpError::HandshakeFailed {
            server: self.descriptor.id.clone(),
            reason: e.to_string(),
        })?;

        let result = extract_result(response).map_err(|e| McpError::HandshakeFailed {
            server: self.descriptor.id.clone(),
            reason: e.to_string(),
        })?;

        let init: InitializeResult =
            serde_json::from_value(result).map_err(|e| McpError::HandshakeFailed {
                server: self.descriptor.id.clone(),
                reason: format!("failed to parse initialize response: {e}"),
            })?;

        if let Some(info) = init.server_info {
            tracing::debug!(
                server = %self.descriptor.id,
                provider = info.name.as_deref().unwrap_or("?"),
                version = info.version.as_deref().unwrap_or("?"),
                "handshake complete"
            );
        }

        transport
            .channel()
            .notify("notifications/initialized", None)
            .await?;

        self.transport = Some(transport);
        Ok(())
    }

    /// Close the transport and terminate the process. The state is
    /// Disconnected afterwards unconditionally, even on error.
    pub async fn disconnect(&mut self) {
        if let Some(transport) = self.transport.take() {
            // Best-effort courtesy notification before the kill.
            let _ = transport.channel().notify("shutdown", None).await;
            transport.close().await;
        }
        self.tool_cache.clear();
        self.state = ConnectionState::Disconnected;
    }

    // ─── Discovery ──────────────────────────────────────────────────────

    /// Ask the provider for its tool catalog. Valid only in Ready.
    pub async fn list_tools(&mut self) -> Result<Vec<Tool>, McpError> {
        let transport = match (&self.state, &self.transport) {
            (ConnectionState::Ready, Some(t)) => t,
            _ => return Err(self.not_connected()),
        };

        let response = timeout(
            DISCOVERY_TIMEOUT,
            transport.channel().request("tools/list", None),
        )
        .await
        .map_err(|_| self.timeout_err("tools/list", DISCOVERY_TIMEOUT))??;

        let result = extract_result(response)?;
        let listing: ToolListResult =
            serde_json::from_value(result).map_err(|e| McpError::Transport {
                server: self.descriptor.id.clone(),
                reason: format!("failed to parse tools/list response: {e}"),
            })?;

        let tools: Vec<Tool> = listing
            .tools
            .into_iter()
            .map(|d| Tool::from_descriptor(&self.descriptor.id, d))
            .collect();

        tracing::info!(
            server = %self.descriptor.id,
            tool_count = tools.len(),
            "discovered tools"
        );

        self.tool_cache = tools.clone();
        Ok(tools)
    }

    // ─── Invocation ─────────────────────────────────────────────────────

    /// Invoke a tool on this server. Valid only in Ready.
    ///
    /// Provider-side errors are converted into a failed `ToolOutcome` with
    /// an `"Error: …"` prefix rather than propagated — a single tool failure
    /// must never destabilize the caller. Transport failures and calls
    /// outside Ready still surface as `Err`.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<ToolOutcome, McpError> {
        let transport = match (&self.state, &self.transport) {
            (ConnectionState::Ready, Some(t)) => t,
            _ => return Err(self.not_connected()),
        };

        let start = Instant::now();
        let params = serde_json::json!({
            "name": name,
            "arguments": arguments,
        });

        let response = timeout(
            self.call_timeout,
            transport.channel().request("tools/call", Some(params)),
        )
        .await
        .map_err(|_| self.timeout_err(name, self.call_timeout))??;

        let elapsed_ms = start.elapsed().as_millis() as u64;

        let outcome = |succeeded: bool, text: String| ToolOutcome {
            server_id: self.descriptor.id.clone(),
            tool_name: name.to_string(),
            succeeded,
            text,
            elapsed_ms,
        };

        match extract_result(response) {
            Ok(result) => {
                let payload: ToolCallPayload =
                    serde_json::from_value(result).map_err(|e| McpError::Transport {
                        server: self.descriptor.id.clone(),
                        reason: format!("failed to parse tools/call response: {e}"),
                    })?;

                let text = payload
                    .content
                    .iter()
                    .map(super::types::ContentPart::render)
                    .collect::<Vec<_>>()
                    .join("\n\n");

                if payload.is_error {
                    return Ok(outcome(false, format!("Error: {text}")));
                }

                if text.is_empty() {
                    tracing::warn!(
                        server = %self.descriptor.id,
                        tool = name,
                        "tool returned empty result"
                    );
                }

                Ok(outcome(true, text))
            }
            Err(McpError::Provider { code, message, .. }) => {
                Ok(outcome(false, format!("Error: [{code}] {message}")))
            }
            Err(e) => Err(e),
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
