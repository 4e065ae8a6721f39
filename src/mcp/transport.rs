//! Process transport: a tool-server child process whose stdio carries a
//! line-delimited JSON-RPC channel.
//!
//! Stdin and stdout of the child are the protocol stream — one JSON object
//! per line in each direction. Stderr is never allowed anywhere near the
//! protocol stream: a background task drains it line by line into the log,
//! tagged with the server id. Mixing the two corrupts message framing.

use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::errors::McpError;
use super::types::{JsonRpcRequest, JsonRpcResponse, ServerDescriptor};

// ─── Request ID Generator ───────────────────────────────────────────────────

/// Global monotonic request ID counter.
static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Generate a unique JSON-RPC request ID.
pub fn next_request_id() -> u64 {
    NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed)
}

// ─── Framed Channel ─────────────────────────────────────────────────────────

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;
type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Bidirectional line-framed JSON-RPC channel.
///
/// Generic over the underlying byte streams so tests can drive it with an
/// in-memory duplex pipe instead of a real child process.
pub struct FramedChannel {
    server_id: String,
    writer: Mutex<BoxedWriter>,
    reader: Mutex<BufReader<BoxedReader>>,
}

impl FramedChannel {
    pub fn new(
        server_id: &str,
        writer: impl AsyncWrite + Send + Unpin + 'static,
        reader: impl AsyncRead + Send + Unpin + 'static,
    ) -> Self {
        Self {
            server_id: server_id.to_string(),
            writer: Mutex::new(Box::new(writer)),
            reader: Mutex::new(BufReader::new(Box::new(reader))),
        }
    }

    fn transport_err(&self, reason: String) -> McpError {
        McpError::Transport {
            server: self.server_id.clone(),
            reason,
        }
    }

    async fn write_frame(&self, value: &impl serde::Serialize) -> Result<(), McpError> {
        let mut json = serde_json::to_string(value)
            .map_err(|e| self.transport_err(format!("failed to serialize frame: {e}")))?;
        json.push('\n');

        let mut writer = self.writer.lock().await;
        writer
            .write_all(json.as_bytes())
            .await
            .map_err(|e| self.transport_err(format!("failed to write to stdin: {e}")))?;
        writer
            .flush()
            .await
            .map_err(|e| self.transport_err(format!("failed to flush stdin: {e}")))?;
        Ok(())
    }

    /// Send a JSON-RPC request and wait for the matching response.
    ///
    /// Writes one line of JSON, then reads lines until a response with a
    /// matching `id` arrives. Lines that are not parseable JSON-RPC
    /// responses (stray provider output, notifications) are skipped.
    pub async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<JsonRpcResponse, McpError> {
        let id = next_request_id();
        let req = JsonRpcRequest::new(id, method, params);
        self.write_frame(&req).await?;

        let mut line_buf = String::new();
        let mut reader = self.reader.lock().await;

        loop {
            line_buf.clear();
            let bytes_read = reader
                .read_line(&mut line_buf)
                .await
                .map_err(|e| self.transport_err(format!("failed to read from stdout: {e}")))?;

            if bytes_read == 0 {
                return Err(self.transport_err(
                    "server stdout closed (process may have exited)".into(),
                ));
            }

            let trimmed = line_buf.trim();
            if trimmed.is_empty() {
                continue;
            }

            match serde_json::from_str::<JsonRpcResponse>(trimmed) {
                Ok(resp) if resp.id == id => return Ok(resp),
                Ok(resp) => {
                    // Stale response for an abandoned request — skip.
                    tracing::debug!(
                        server = %self.server_id,
                        expected = id,
                        got = resp.id,
                        "skipping response with non-matching id"
                    );
                }
                Err(_) => {
                    tracing::debug!(
                        server = %self.server_id,
                        line = %trimmed,
                        "skipping non-response line on protocol stream"
                    );
                }
            }
        }
    }

    /// Send a JSON-RPC notification (no response expected).
    pub async fn notify(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), McpError> {
        let notification = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
        });
        self.write_frame(&notification).await
    }
}

// ─── Response Helpers ───────────────────────────────────────────────────────

/// Extract the result from a JSON-RPC response, converting errors to `McpError`.
pub fn extract_result(response: JsonRpcResponse) -> Result<serde_json::Value, McpError> {
    if let Some(err) = response.error {
        return Err(McpError::Provider {
            code: err.code,
            message: err.message,
            data: err.data,
        });
    }

    response.result.ok_or(McpError::Provider {
        code: super::types::error_codes::INTERNAL_ERROR,
        message: "response missing both result and error".into(),
        data: None,
    })
}

// ─── Process Transport ──────────────────────────────────────────────────────

/// A launched tool-server process plus its protocol channel.
///
/// `child` is absent only for channel-only transports built in tests.
pub struct ProcessTransport {
    server_id: String,
    child: Option<Child>,
    channel: FramedChannel,
    stderr_drain: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for ProcessTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessTransport")
            .field("server_id", &self.server_id)
            .finish_non_exhaustive()
    }
}

impl ProcessTransport {
    /// Spawn the server process described by `descriptor` and wire its stdio
    /// into a framed channel.
    ///
    /// Launch failures (missing executable, bad working directory) are scoped
    /// to this one server and must not abort connection of others.
    pub fn launch(descriptor: &ServerDescriptor) -> Result<Self, McpError> {
        let mut cmd = Command::new(&descriptor.command);
        cmd.args(&descriptor.args);

        for (key, value) in &descriptor.env {
            cmd.env(key, value);
        }

        if let Some(ref dir) = descriptor.working_dir {
            cmd.current_dir(dir);
        }

        // Windows: prevent a console window from appearing for the child
        #[cfg(target_os = "windows")]
        {
            use std::os::windows::process::CommandExt;
            const CREATE_NO_WINDOW: u32 = 0x08000000;
            cmd.creation_flags(CREATE_NO_WINDOW);
        }

        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        // Cancellation anywhere above this transport must not orphan the child.
        cmd.kill_on_drop(true);

        let launch_err = |reason: String| McpError::LaunchFailed {
            server: descriptor.id.clone(),
            reason,
        };

        let mut child = cmd.spawn().map_err(|e| launch_err(e.to_string()))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| launch_err("failed to capture stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| launch_err("failed to capture stdout".into()))?;
        let stderr = child.stderr.take();

        // Drain stderr into the log so diagnostics never touch the protocol
        // stream and the pipe never backs up.
        let stderr_drain = stderr.map(|stderr| {
            let server_id = descriptor.id.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(server = %server_id, stderr = %line, "server stderr");
                }
            })
        });

        Ok(Self {
            server_id: descriptor.id.clone(),
            channel: FramedChannel::new(&descriptor.id, stdin, stdout),
            child: Some(child),
            stderr_drain,
        })
    }

    /// Wrap a bare channel with no child process behind it, for driving
    /// connection logic from an in-memory duplex pipe.
    #[cfg(test)]
    pub(crate) fn from_channel(channel: FramedChannel) -> Self {
        Self {
            server_id: channel.server_id.clone(),
            child: None,
            channel,
            stderr_drain: None,
        }
    }

    /// The protocol channel to this server.
    pub fn channel(&self) -> &FramedChannel {
        &self.channel
    }

    /// Whether the child process is still running.
    pub fn is_alive(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => true,
        }
    }

    /// Best-effort teardown: kill the process if still alive, swallowing
    /// secondary errors while logging them.
    pub async fn close(mut self) {
        if let Some(child) = self.child.as_mut() {
            if let Err(e) = child.kill().await {
                tracing::warn!(server = %self.server_id, error = %e, "failed to kill server process");
            }
        }
        if let Some(drain) = self.stderr_drain.take() {
            drain.abort();
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
