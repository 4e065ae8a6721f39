//! Multi-server orchestration: fan-out connect, aggregated catalog, dispatch.
//!
//! The manager owns every `ToolServerConnection` and is the only component
//! the agent loop talks to. One misbehaving server degrades the catalog, it
//! never takes the session down: connect failures are collected per server
//! and reported in the `ConnectSummary`.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::catalog::{Tool, ToolCatalog};
use super::connection::{ConnectionState, ToolServerConnection};
use super::errors::McpError;
use super::types::{ServerDescriptor, ToolOutcome};

// ─── Constants ──────────────────────────────────────────────────────────────

/// Pause before the single retry granted to transient connect failures.
const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Reconnect backoff: base delay, doubled per attempt.
const RECONNECT_BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Reconnect attempts before giving up.
const RECONNECT_ATTEMPTS: u32 = 3;

// ─── Dispatcher seam ────────────────────────────────────────────────────────

/// What the agent loop needs from the tool layer: the catalog rendered for
/// the gateway, and a way to run one call by flat name.
#[async_trait]
pub trait ToolDispatcher: Send + Sync {
    fn gateway_definitions(&self) -> Vec<Value>;

    async fn dispatch(&self, name: &str, arguments: Value) -> Result<ToolOutcome, McpError>;
}

// ─── Connect summary ────────────────────────────────────────────────────────

/// Result of a `connect_all` fan-out.
#[derive(Debug)]
pub struct ConnectSummary {
    pub attempted: usize,
    pub connected: Vec<String>,
    pub failures: Vec<(String, McpError)>,
}

impl ConnectSummary {
    pub fn all_connected(&self) -> bool {
        self.failures.is_empty()
    }
}

// ─── Manager ────────────────────────────────────────────────────────────────

/// Owns all connections and the aggregated catalog.
///
/// Connections are kept in descriptor order, which fixes both catalog
/// ordering and duplicate-name resolution across runs.
pub struct ToolServerManager {
    connections: Vec<ToolServerConnection>,
    catalog: ToolCatalog,
}

impl ToolServerManager {
    pub fn new(descriptors: Vec<ServerDescriptor>) -> Self {
        let connections = descriptors
            .into_iter()
            .map(ToolServerConnection::new)
            .collect();
        Self {
            connections,
            catalog: ToolCatalog::new(),
        }
    }

    pub fn server_ids(&self) -> Vec<String> {
        self.connections
            .iter()
            .map(|c| c.server_id().to_string())
            .collect()
    }

    pub fn catalog(&self) -> &ToolCatalog {
        &self.catalog
    }

    pub fn connection_state(&self, server_id: &str) -> Option<ConnectionState> {
        self.connections
            .iter()
            .find(|c| c.server_id() == server_id)
            .map(|c| c.state())
    }

    // ─── Lifecycle ──────────────────────────────────────────────────────

    /// Connect and discover every configured server concurrently.
    ///
    /// Each server gets its own task; a transient failure earns one retry.
    /// Results are reassembled in descriptor order before the catalog is
    /// rebuilt, so the fan-out never perturbs duplicate-name resolution.
    pub async fn connect_all(&mut self) -> ConnectSummary {
        let attempted = self.connections.len();
        let connections = std::mem::take(&mut self.connections);

        let mut tasks = Vec::with_capacity(attempted);
        for (index, mut conn) in connections.into_iter().enumerate() {
            tasks.push(tokio::spawn(async move {
                let outcome = Self::connect_one(&mut conn).await;
                (index, conn, outcome)
            }));
        }

        let mut slots: Vec<Option<(ToolServerConnection, Result<Vec<Tool>, McpError>)>> =
            (0..attempted).map(|_| None).collect();
        for joined in futures::future::join_all(tasks).await {
            // Connect tasks never panic; a JoinError here would mean the
            // runtime is shutting down underneath us.
            if let Ok((index, conn, outcome)) = joined {
                slots[index] = Some((conn, outcome));
            }
        }

        let mut connected = Vec::new();
        let mut failures = Vec::new();
        self.catalog.clear();

        for slot in slots.into_iter().flatten() {
            let (conn, outcome) = slot;
            match outcome {
                Ok(tools) => {
                    connected.push(conn.server_id().to_string());
                    self.catalog.register(tools);
                }
                Err(e) => {
                    tracing::error!(server = %conn.server_id(), error = %e, "server failed to connect");
                    failures.push((conn.server_id().to_string(), e));
                }
            }
            self.connections.push(conn);
        }

        tracing::info!(
            connected = connected.len(),
            attempted,
            tools = self.catalog.len(),
            "connect fan-out complete"
        );

        ConnectSummary {
            attempted,
            connected,
            failures,
        }
    }

    async fn connect_one(conn: &mut ToolServerConnection) -> Result<Vec<Tool>, McpError> {
        if let Err(first) = conn.connect().await {
            if !first.is_transient() {
                return Err(first);
            }
            tracing::warn!(server = %conn.server_id(), error = %first, "transient connect failure, retrying");
            tokio::time::sleep(CONNECT_RETRY_DELAY).await;
            conn.connect().await?;
        }
        conn.list_tools().await
    }

    /// Reconnect one server by id and refresh its catalog entries.
    ///
    /// Retries with exponential backoff (1s base, doubling) before giving
    /// up; the last error wins.
    pub async fn reconnect(&mut self, server_id: &str) -> Result<(), McpError> {
        let conn = self
            .connections
            .iter_mut()
            .find(|c| c.server_id() == server_id)
            .ok_or_else(|| McpError::UnknownServer {
                server: server_id.to_string(),
            })?;

        let mut delay = RECONNECT_BACKOFF_BASE;
        for attempt in 1..=RECONNECT_ATTEMPTS {
            match conn.connect().await {
                Ok(()) => break,
                Err(e) if attempt == RECONNECT_ATTEMPTS => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        server = server_id,
                        attempt,
                        error = %e,
                        "reconnect attempt failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
        }

        let tools = conn.list_tools().await?;
        self.catalog.remove_server(server_id);
        self.catalog.register(tools);
        Ok(())
    }

    /// Tear down every connection concurrently. Failures are logged, not
    /// surfaced — shutdown always completes, and the connections come back
    /// in descriptor order ready for a later reconnect.
    pub async fn disconnect_all(&mut self) {
        let connections = std::mem::take(&mut self.connections);
        let count = connections.len();

        let mut tasks = Vec::with_capacity(count);
        for (index, mut conn) in connections.into_iter().enumerate() {
            tasks.push(tokio::spawn(async move {
                conn.disconnect().await;
                (index, conn)
            }));
        }

        let mut slots: Vec<Option<ToolServerConnection>> = (0..count).map(|_| None).collect();
        for joined in futures::future::join_all(tasks).await {
            if let Ok((index, conn)) = joined {
                slots[index] = Some(conn);
            }
        }
        self.connections = slots.into_iter().flatten().collect();

        self.catalog.clear();
        tracing::info!("all servers disconnected");
    }

    // ─── Dispatch ───────────────────────────────────────────────────────

    /// Resolve a flat tool name to its owning server.
    pub fn resolve(&self, name: &str) -> Option<&Tool> {
        self.catalog.resolve(name)
    }

    /// Run one tool call, routing by catalog lookup.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolOutcome, McpError> {
        let tool = self.resolve(name).ok_or_else(|| McpError::ToolNotFound {
            name: name.to_string(),
        })?;

        let conn = self
            .connections
            .iter()
            .find(|c| c.server_id() == tool.server_id)
            .ok_or_else(|| McpError::UnknownServer {
                server: tool.server_id.clone(),
            })?;

        tracing::debug!(server = %tool.server_id, tool = name, "dispatching tool call");
        conn.call_tool(name, arguments).await
    }
}

#[async_trait]
impl ToolDispatcher for ToolServerManager {
    fn gateway_definitions(&self) -> Vec<Value> {
        self.catalog.to_gateway_definitions()
    }

    async fn dispatch(&self, name: &str, arguments: Value) -> Result<ToolOutcome, McpError> {
        self.call_tool(name, arguments).await
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
