//! Tool-server error types.

use thiserror::Error;

/// Errors that can occur while managing or talking to tool servers.
#[derive(Debug, Error)]
pub enum McpError {
    /// The server process failed to launch (missing binary, bad working dir,
    /// OS-level spawn failure). Scoped to one server.
    #[error("failed to launch server '{server}': {reason}")]
    LaunchFailed { server: String, reason: String },

    /// The initialize handshake failed or timed out.
    #[error("server '{server}' handshake failed: {reason}")]
    HandshakeFailed { server: String, reason: String },

    /// An operation was attempted on a connection that is not Ready.
    #[error("server '{server}' is not connected")]
    NotConnected { server: String },

    /// No connected server with the given id.
    #[error("unknown server: '{server}'")]
    UnknownServer { server: String },

    /// No connected server exposes the requested tool name.
    #[error("no connected server exposes tool '{name}'")]
    ToolNotFound { name: String },

    /// Framed-channel I/O or serialization failure.
    #[error("transport error for server '{server}': {reason}")]
    Transport { server: String, reason: String },

    /// The provider returned a JSON-RPC error response.
    #[error("provider error [{code}]: {message}")]
    Provider {
        code: i32,
        message: String,
        data: Option<serde_json::Value>,
    },

    /// A request did not complete within its deadline.
    #[error("request '{what}' to server '{server}' timed out after {seconds}s")]
    Timeout {
        server: String,
        what: String,
        seconds: u64,
    },

    /// Server descriptor configuration could not be loaded.
    #[error("config error: {reason}")]
    Config { reason: String },
}

impl McpError {
    /// Whether the error is transient enough that reconnecting may help.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Timeout { .. })
    }
}
